/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    Register contract for the AES and SHA accelerators: byte offsets, control
    register bit masks and the MMIO capability trait shared by the hardware
    binding and the software model.

--*/

#![no_std]

/// ARM9-side base address of the AES engine register block.
pub const AES_BASE: usize = 0x1000_9000;

/// ARM9-side base address of the SHA engine register block.
pub const SHA_BASE: usize = 0x1000_A000;

/// Word-granular access to a peripheral register block.
///
/// Register reads are `&mut self` because several registers have read side
/// effects (popping the AES read FIFO, for instance). Byte access exists for
/// the byte-wide key-select registers and for streaming a non-word-aligned
/// tail into the SHA input FIFO.
pub trait Bus {
    fn read_u8(&mut self, offset: u32) -> u8;
    fn write_u8(&mut self, offset: u32, val: u8);
    fn read_u32(&mut self, offset: u32) -> u32;
    fn write_u32(&mut self, offset: u32, val: u32);
}

/// Production [`Bus`] implementation over a fixed register base address.
pub struct RealMmio {
    base: *mut u8,
}

impl RealMmio {
    /// # Safety
    ///
    /// `base` must be the base address of a memory-mapped peripheral register
    /// block that is valid for volatile access for the lifetime of the
    /// returned value, and no other handle may access the same block.
    pub const unsafe fn new(base: *mut u8) -> Self {
        Self { base }
    }
}

impl Bus for RealMmio {
    fn read_u8(&mut self, offset: u32) -> u8 {
        unsafe { core::ptr::read_volatile(self.base.add(offset as usize)) }
    }

    fn write_u8(&mut self, offset: u32, val: u8) {
        unsafe { core::ptr::write_volatile(self.base.add(offset as usize), val) }
    }

    fn read_u32(&mut self, offset: u32) -> u32 {
        unsafe { core::ptr::read_volatile(self.base.add(offset as usize) as *const u32) }
    }

    fn write_u32(&mut self, offset: u32, val: u32) {
        unsafe { core::ptr::write_volatile(self.base.add(offset as usize) as *mut u32, val) }
    }
}

/// AES engine registers, as offsets from [`AES_BASE`].
pub mod aes {
    /// Control register.
    pub const CNT: u32 = 0x000;

    /// Block count register; the batch length lives in bits 16-31.
    pub const BLKCNT: u32 = 0x004;

    /// Input data FIFO (16 words deep).
    pub const WRFIFO: u32 = 0x008;

    /// Output data FIFO (16 words deep).
    pub const RDFIFO: u32 = 0x00C;

    /// Active key slot select (byte register).
    pub const KEYSEL: u32 = 0x010;

    /// Key write control (byte register).
    pub const KEYCNT: u32 = 0x011;

    /// Counter/IV load port, 4 words. Limb order on this port is always
    /// reversed and cannot be changed through CNT.
    pub const CTR: u32 = 0x020;

    /// Key component load ports, 4 words each.
    pub const KEYFIFO: u32 = 0x100;
    pub const KEYXFIFO: u32 = 0x104;
    pub const KEYYFIFO: u32 = 0x108;

    pub const CNT_WRFIFO_COUNT_MASK: u32 = 0x1F;
    pub const CNT_RDFIFO_COUNT_SHIFT: u32 = 5;
    pub const CNT_RDFIFO_COUNT_MASK: u32 = 0x1F << CNT_RDFIFO_COUNT_SHIFT;
    pub const CNT_FLUSH_WRITE: u32 = 1 << 10;
    pub const CNT_FLUSH_READ: u32 = 1 << 11;
    pub const CNT_OUTPUT_BIG_ENDIAN: u32 = 1 << 22;
    pub const CNT_INPUT_BIG_ENDIAN: u32 = 1 << 23;
    pub const CNT_OUTPUT_NORMAL_ORDER: u32 = 1 << 24;
    pub const CNT_INPUT_NORMAL_ORDER: u32 = 1 << 25;
    /// Undocumented; must be set after changing the active key slot.
    pub const CNT_SEL_APPLY: u32 = 1 << 26;
    pub const CNT_MODE_SHIFT: u32 = 27;
    pub const CNT_MODE_MASK: u32 = 7 << CNT_MODE_SHIFT;
    pub const CNT_START: u32 = 1 << 31;

    /// Cipher mode field values (CNT bits 27-29).
    pub const MODE_CTR: u32 = 2;
    pub const MODE_CBC_DECRYPT: u32 = 4;
    pub const MODE_CBC_ENCRYPT: u32 = 5;
    pub const MODE_ECB_DECRYPT: u32 = 6;
    pub const MODE_ECB_ENCRYPT: u32 = 7;

    /// KEYCNT write-enable bit.
    pub const KEYCNT_WRITE: u8 = 0x80;

    /// Data FIFO depth in 32-bit words.
    pub const FIFO_DEPTH_WORDS: usize = 16;

    /// A hardware batch cannot exceed the 16-bit block count field.
    pub const MAX_BATCH_BLOCKS: u32 = 0xFFFF;
}

/// SHA engine registers, as offsets from [`SHA_BASE`].
pub mod sha {
    /// Control register.
    pub const CNT: u32 = 0x000;

    /// Result block, up to 32 bytes.
    pub const HASH: u32 = 0x040;

    /// Input FIFO; accepts word and byte writes.
    pub const INFIFO: u32 = 0x080;

    /// Write: start a new digest. Read: engine busy.
    pub const CNT_START: u32 = 1 << 0;
    /// Write: pad and finish. Self-clears when the final round completes.
    pub const CNT_FINAL: u32 = 1 << 1;
    pub const CNT_OUTPUT_BIG_ENDIAN: u32 = 1 << 3;
    pub const CNT_MODE_MASK: u32 = 3 << 4;

    /// Algorithm select values (CNT bits 4-5).
    pub const MODE_SHA256: u32 = 0 << 4;
    pub const MODE_SHA224: u32 = 1 << 4;
    pub const MODE_SHA1: u32 = 2 << 4;

    /// Hardware hashing block size in bytes.
    pub const BLOCK_SIZE: usize = 64;
}
