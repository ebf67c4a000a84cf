/*++

Licensed under the Apache-2.0 license.

File Name:

    aes.rs

Abstract:

    Driver for the AES engine.

    Notes about this hardware:

    * A batch cannot exceed 0xFFFF blocks (the width of the block count
      field); longer transforms are split into sub-batches with the
      counter/IV reloaded before each one.
    * The counter/IV port always takes its limbs in reversed order; the
      word-order flag in CNT does not apply to it.
    * The data FIFOs are 16 words deep. Input is written only while there is
      room for a full block and output is drained only while a full block is
      ready, so neither side stalls the engine.

--*/

use ctrboot_registers::{aes as regs, Bus};

use crate::counter::{self, WordFormat};
use crate::key_slots::{KeyComponent, KeySlot};
use crate::{CtrbootError, CtrbootResult};

pub const AES_BLOCK_SIZE: usize = 16;

/// CNT data-path flags used for every transform: words pass through in
/// memory byte order on both sides.
const DATA_FLAGS: u32 = regs::CNT_INPUT_BIG_ENDIAN
    | regs::CNT_OUTPUT_BIG_ENDIAN
    | regs::CNT_INPUT_NORMAL_ORDER
    | regs::CNT_OUTPUT_NORMAL_ORDER;

/// Cipher mode of a transform.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AesMode {
    EcbEncrypt,
    EcbDecrypt,
    CbcEncrypt,
    CbcDecrypt,
    Ctr,
}

impl AesMode {
    const fn cnt_bits(self) -> u32 {
        let mode = match self {
            AesMode::EcbEncrypt => regs::MODE_ECB_ENCRYPT,
            AesMode::EcbDecrypt => regs::MODE_ECB_DECRYPT,
            AesMode::CbcEncrypt => regs::MODE_CBC_ENCRYPT,
            AesMode::CbcDecrypt => regs::MODE_CBC_DECRYPT,
            AesMode::Ctr => regs::MODE_CTR,
        };
        mode << regs::CNT_MODE_SHIFT
    }

    const fn uses_iv(self) -> bool {
        !matches!(self, AesMode::EcbEncrypt | AesMode::EcbDecrypt)
    }
}

/// Source and destination byte offsets into one shared backing buffer.
/// Equal offsets transform in place; a destination below the source is the
/// only other supported overlap, matching how the boot path slides decrypted
/// regions down over stripped headers.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BlockRegion {
    pub src: usize,
    pub dst: usize,
}

impl BlockRegion {
    /// A region that reads and writes the same range.
    pub const fn in_place(offset: usize) -> Self {
        Self {
            src: offset,
            dst: offset,
        }
    }
}

/// Data flow of one transform: either two disjoint buffers or offsets into
/// a single shared one (aliasing by explicit caller intent).
enum Io<'a> {
    Split {
        dst: &'a mut [u8],
        src: &'a [u8],
        dst_pos: usize,
        src_pos: usize,
    },
    Shared {
        buf: &'a mut [u8],
        dst_pos: usize,
        src_pos: usize,
    },
}

impl Io<'_> {
    fn next_src_word(&mut self) -> u32 {
        let (bytes, pos) = match self {
            Io::Split { src, src_pos, .. } => (&src[*src_pos..*src_pos + 4], src_pos),
            Io::Shared { buf, src_pos, .. } => (&buf[*src_pos..*src_pos + 4], src_pos),
        };
        let word = u32::from_be_bytes(bytes.try_into().unwrap());
        *pos += 4;
        word
    }

    fn push_dst_word(&mut self, word: u32) {
        let (bytes, pos) = match self {
            Io::Split { dst, dst_pos, .. } => (&mut dst[*dst_pos..*dst_pos + 4], dst_pos),
            Io::Shared { buf, dst_pos, .. } => (&mut buf[*dst_pos..*dst_pos + 4], dst_pos),
        };
        bytes.copy_from_slice(&word.to_be_bytes());
        *pos += 4;
    }

    /// Copies the source block `blocks_ahead` blocks past the current read
    /// position.
    fn src_block(&self, blocks_ahead: u32, out: &mut [u8; AES_BLOCK_SIZE]) {
        let (data, pos) = match self {
            Io::Split { src, src_pos, .. } => (&src[..], *src_pos),
            Io::Shared { buf, src_pos, .. } => (&buf[..], *src_pos),
        };
        let offset = pos + blocks_ahead as usize * AES_BLOCK_SIZE;
        out.copy_from_slice(&data[offset..offset + AES_BLOCK_SIZE]);
    }

    /// Copies the most recently written destination block.
    fn last_dst_block(&self, out: &mut [u8; AES_BLOCK_SIZE]) {
        let (data, pos) = match self {
            Io::Split { dst, dst_pos, .. } => (&dst[..], *dst_pos),
            Io::Shared { buf, dst_pos, .. } => (&buf[..], *dst_pos),
        };
        out.copy_from_slice(&data[pos - AES_BLOCK_SIZE..pos]);
    }
}

/// AES engine driver.
pub struct Aes<TBus: Bus> {
    regs: TBus,
}

impl<TBus: Bus> Aes<TBus> {
    pub fn new(regs: TBus) -> Self {
        Self { regs }
    }

    pub fn regs(&self) -> &TBus {
        &self.regs
    }

    pub fn regs_mut(&mut self) -> &mut TBus {
        &mut self.regs
    }

    /// Loads one 128-bit key component into a slot. Writes targeting
    /// protected slots are dropped; those slots are fed through the legacy
    /// key ports, not this interface.
    pub fn set_key(&mut self, slot: KeySlot, component: KeyComponent, key: &[u8; 16], fmt: WordFormat) {
        if slot.is_protected() {
            return;
        }

        let cnt = self.regs.read_u32(regs::CNT)
            & !(regs::CNT_INPUT_BIG_ENDIAN | regs::CNT_INPUT_NORMAL_ORDER);
        self.regs.write_u32(regs::CNT, cnt | fmt.bits());

        let key_cnt = self.regs.read_u8(regs::KEYCNT) >> 6 << 6;
        self.regs
            .write_u8(regs::KEYCNT, key_cnt | slot.index() | regs::KEYCNT_WRITE);

        let port = component.fifo_offset();
        for chunk in key.chunks_exact(4) {
            self.regs
                .write_u32(port, u32::from_be_bytes(chunk.try_into().unwrap()));
        }
    }

    /// Activates a key slot for subsequent transforms.
    pub fn select_slot(&mut self, slot: KeySlot) {
        self.regs.write_u8(regs::KEYSEL, slot.index());
        let cnt = self.regs.read_u32(regs::CNT);
        self.regs.write_u32(regs::CNT, cnt | regs::CNT_SEL_APPLY);
    }

    /// Loads the counter/IV register. The limb load order depends only on
    /// the word-order flag; the port itself always takes reversed order, so
    /// natural order is produced by reversing in software.
    pub fn set_ctr(&mut self, ctr: &[u8; 16], fmt: WordFormat) {
        let cnt = self.regs.read_u32(regs::CNT)
            & !(regs::CNT_INPUT_BIG_ENDIAN | regs::CNT_INPUT_NORMAL_ORDER);
        self.regs.write_u32(regs::CNT, cnt | fmt.bits());

        for index in 0..4 {
            let limb = if fmt.contains(WordFormat::NORMAL_ORDER) {
                3 - index
            } else {
                index
            };
            let bytes: [u8; 4] = ctr[limb * 4..limb * 4 + 4].try_into().unwrap();
            self.regs
                .write_u32(regs::CTR + index as u32 * 4, u32::from_be_bytes(bytes));
        }
    }

    /// Transforms `block_count` blocks from `src` into `dst` (disjoint
    /// buffers). For non-ECB modes `iv` is an in-out value in `iv_fmt`
    /// representation: on return it holds the continuation IV/counter for a
    /// follow-on call.
    pub fn transform_into(
        &mut self,
        dst: &mut [u8],
        src: &[u8],
        block_count: u32,
        iv: Option<&mut [u8; 16]>,
        mode: AesMode,
        iv_fmt: WordFormat,
    ) -> CtrbootResult<()> {
        let byte_len = block_count as usize * AES_BLOCK_SIZE;
        if src.len() < byte_len || dst.len() < byte_len {
            return Err(CtrbootError::DRIVER_AES_INVALID_SLICE);
        }
        let io = Io::Split {
            dst,
            src,
            dst_pos: 0,
            src_pos: 0,
        };
        self.run(io, block_count, iv, mode, iv_fmt)
    }

    /// Transforms within one shared buffer, reading at `region.src` and
    /// writing at `region.dst`. Decrypt-in-place and the header-shift cases
    /// use this entry point.
    pub fn transform_in_place(
        &mut self,
        buf: &mut [u8],
        region: BlockRegion,
        block_count: u32,
        iv: Option<&mut [u8; 16]>,
        mode: AesMode,
        iv_fmt: WordFormat,
    ) -> CtrbootResult<()> {
        let byte_len = block_count as usize * AES_BLOCK_SIZE;
        if region.src + byte_len > buf.len() || region.dst + byte_len > buf.len() {
            return Err(CtrbootError::DRIVER_AES_INVALID_REGION);
        }
        let io = Io::Shared {
            buf,
            dst_pos: region.dst,
            src_pos: region.src,
        };
        self.run(io, block_count, iv, mode, iv_fmt)
    }

    fn run(
        &mut self,
        mut io: Io<'_>,
        mut remaining: u32,
        mut iv: Option<&mut [u8; 16]>,
        mode: AesMode,
        iv_fmt: WordFormat,
    ) -> CtrbootResult<()> {
        self.regs.write_u32(
            regs::CNT,
            mode.cnt_bits() | DATA_FLAGS | regs::CNT_FLUSH_READ | regs::CNT_FLUSH_WRITE,
        );

        while remaining != 0 {
            let blocks = remaining.min(regs::MAX_BATCH_BLOCKS);

            if mode.uses_iv() {
                let iv_ref = iv
                    .as_deref_mut()
                    .ok_or(CtrbootError::DRIVER_AES_MISSING_IV)?;
                self.set_ctr(iv_ref, iv_fmt);

                // Decryption overwrites the source in place, so the IV for
                // the next batch (this batch's final ciphertext block) must
                // be captured before the transform runs.
                if mode == AesMode::CbcDecrypt {
                    io.src_block(blocks - 1, iv_ref);
                    counter::convert(iv_ref, WordFormat::NATIVE, iv_fmt);
                }
            }

            self.batch(&mut io, blocks);

            match mode {
                AesMode::CbcEncrypt => {
                    if let Some(iv_ref) = iv.as_deref_mut() {
                        io.last_dst_block(iv_ref);
                        counter::convert(iv_ref, WordFormat::NATIVE, iv_fmt);
                    }
                }
                AesMode::Ctr => {
                    if let Some(iv_ref) = iv.as_deref_mut() {
                        counter::advance(iv_ref, blocks, iv_fmt);
                    }
                }
                _ => {}
            }

            remaining -= blocks;
        }

        Ok(())
    }

    /// Streams one hardware batch through the data FIFOs, double-buffered:
    /// feed while there is room for a full block, drain while a full block
    /// is ready.
    fn batch(&mut self, io: &mut Io<'_>, blocks: u32) {
        self.regs.write_u32(regs::BLKCNT, blocks << 16);
        let cnt = self.regs.read_u32(regs::CNT);
        self.regs.write_u32(regs::CNT, cnt | regs::CNT_START);

        let mut write_blocks = blocks;
        let mut read_blocks = blocks;
        while read_blocks != 0 {
            if write_blocks != 0
                && self.regs.read_u32(regs::CNT) & regs::CNT_WRFIFO_COUNT_MASK <= 0xC
            {
                for _ in 0..4 {
                    let word = io.next_src_word();
                    self.regs.write_u32(regs::WRFIFO, word);
                }
                write_blocks -= 1;
            }

            if (self.regs.read_u32(regs::CNT) & regs::CNT_RDFIFO_COUNT_MASK)
                >> regs::CNT_RDFIFO_COUNT_SHIFT
                >= 4
            {
                for _ in 0..4 {
                    let word = self.regs.read_u32(regs::RDFIFO);
                    io.push_dst_word(word);
                }
                read_blocks -= 1;
            }
        }
    }
}
