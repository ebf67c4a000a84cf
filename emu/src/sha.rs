/*++

Licensed under the Apache-2.0 license.

File Name:

    sha.rs

Abstract:

    File contains the SHA engine model: streaming input FIFO, algorithm
    select and the result block. Padding happens inside the engine when the
    final round is requested, as on the hardware.

--*/

use ctrboot_registers::{sha as regs, Bus};
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256};
use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::register_bitfields;
use tock_registers::registers::InMemoryRegister;

use crate::helpers::{word_from_bytes, word_to_bytes};

register_bitfields! [
    u32,

    /// Control Register Fields
    Ctrl [
        START OFFSET(0) NUMBITS(1) [],
        FINAL OFFSET(1) NUMBITS(1) [],
        OUTPUT_BIG_ENDIAN OFFSET(3) NUMBITS(1) [],
        MODE OFFSET(4) NUMBITS(2) [
            Sha256 = 0,
            Sha224 = 1,
            Sha1 = 2,
        ],
    ],
];

enum ShaCore {
    Sha1(Sha1),
    Sha224(Sha224),
    Sha256(Sha256),
}

impl ShaCore {
    fn update(&mut self, data: &[u8]) {
        match self {
            ShaCore::Sha1(hasher) => hasher.update(data),
            ShaCore::Sha224(hasher) => hasher.update(data),
            ShaCore::Sha256(hasher) => hasher.update(data),
        }
    }

    /// Finalizes into `out` and returns the digest length.
    fn finalize(&mut self, out: &mut [u8; 32]) -> usize {
        match self {
            ShaCore::Sha1(hasher) => {
                out[..20].copy_from_slice(&hasher.finalize_reset());
                20
            }
            ShaCore::Sha224(hasher) => {
                out[..28].copy_from_slice(&hasher.finalize_reset());
                28
            }
            ShaCore::Sha256(hasher) => {
                out[..32].copy_from_slice(&hasher.finalize_reset());
                32
            }
        }
    }
}

/// SHA engine model. The model hashes instantaneously, so the busy and
/// final-round bits always read back clear.
pub struct ShaAccel {
    /// Control Register
    cnt: InMemoryRegister<u32, Ctrl::Register>,

    /// Active hash core
    core: ShaCore,

    /// Result block
    hash: [u8; 32],
}

impl Default for ShaAccel {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaAccel {
    pub fn new() -> Self {
        Self {
            cnt: InMemoryRegister::new(0),
            core: ShaCore::Sha256(Sha256::new()),
            hash: [0u8; 32],
        }
    }

    /// Result block contents, for test observation.
    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    fn write_cnt(&mut self, val: u32) {
        let req = InMemoryRegister::<u32, Ctrl::Register>::new(val);
        if req.is_set(Ctrl::START) {
            self.core = match req.read(Ctrl::MODE) {
                1 => ShaCore::Sha224(Sha224::new()),
                2 | 3 => ShaCore::Sha1(Sha1::new()),
                _ => ShaCore::Sha256(Sha256::new()),
            };
            self.hash = [0u8; 32];
        }
        if req.is_set(Ctrl::FINAL) {
            let mut out = [0u8; 32];
            self.core.finalize(&mut out);
            self.hash = out;
        }
        // Busy and final self-clear; the model completes instantly.
        self.cnt
            .set(val & (regs::CNT_OUTPUT_BIG_ENDIAN | regs::CNT_MODE_MASK));
    }
}

impl Bus for ShaAccel {
    fn read_u8(&mut self, _offset: u32) -> u8 {
        0
    }

    fn write_u8(&mut self, offset: u32, val: u8) {
        if offset == regs::INFIFO {
            self.core.update(&[val]);
        }
    }

    fn read_u32(&mut self, offset: u32) -> u32 {
        match offset {
            regs::CNT => self.cnt.get(),
            regs::HASH..=0x5C => {
                let index = ((offset - regs::HASH) / 4) as usize;
                let bytes: [u8; 4] = self.hash[index * 4..index * 4 + 4].try_into().unwrap();
                word_from_bytes(&bytes, self.cnt.is_set(Ctrl::OUTPUT_BIG_ENDIAN))
            }
            _ => 0,
        }
    }

    fn write_u32(&mut self, offset: u32, val: u32) {
        match offset {
            regs::CNT => self.write_cnt(val),
            regs::INFIFO => {
                let bytes = word_to_bytes(val, true);
                self.core.update(&bytes);
            }
            _ => {}
        }
    }
}
