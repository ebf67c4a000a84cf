/*++

Licensed under the Apache-2.0 license.

File Name:

    aes.rs

Abstract:

    File contains the AES engine model: 64 key slots with the hardware key
    scrambler, the counter/IV register, the block counter and the two 16-word
    data FIFOs with occupancy-based back-pressure.

--*/

use std::collections::VecDeque;

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use ctrboot_registers::{aes as regs, Bus};
use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};
use tock_registers::register_bitfields;
use tock_registers::registers::InMemoryRegister;

use crate::helpers::{word_from_bytes, word_to_bytes};

register_bitfields! [
    u32,

    /// Control Register Fields
    Ctrl [
        WRFIFO_COUNT OFFSET(0) NUMBITS(5) [],
        RDFIFO_COUNT OFFSET(5) NUMBITS(5) [],
        FLUSH_WRITE OFFSET(10) NUMBITS(1) [],
        FLUSH_READ OFFSET(11) NUMBITS(1) [],
        OUTPUT_BIG_ENDIAN OFFSET(22) NUMBITS(1) [],
        INPUT_BIG_ENDIAN OFFSET(23) NUMBITS(1) [],
        OUTPUT_NORMAL_ORDER OFFSET(24) NUMBITS(1) [],
        INPUT_NORMAL_ORDER OFFSET(25) NUMBITS(1) [],
        SEL_APPLY OFFSET(26) NUMBITS(1) [],
        MODE OFFSET(27) NUMBITS(3) [
            CcmDecrypt = 0,
            CcmEncrypt = 1,
            Ctr = 2,
            CtrAlt = 3,
            CbcDecrypt = 4,
            CbcEncrypt = 5,
            EcbDecrypt = 6,
            EcbEncrypt = 7,
        ],
        START OFFSET(31) NUMBITS(1) [],
    ],
];

/// Bits of CNT that hold writable state between accesses. FIFO counts are
/// read-only and the flush/select-apply bits are write pulses.
const CNT_STORED_MASK: u32 = regs::CNT_OUTPUT_BIG_ENDIAN
    | regs::CNT_INPUT_BIG_ENDIAN
    | regs::CNT_OUTPUT_NORMAL_ORDER
    | regs::CNT_INPUT_NORMAL_ORDER
    | regs::CNT_MODE_MASK
    | regs::CNT_START;

/// The platform key scrambler constant.
const SCRAMBLER_CONSTANT: u128 = 0x1FF9_E9AA_C5FE_0408_0245_91DC_5D52_768A;

/// Normal key derivation performed by the key slot hardware whenever a KeyY
/// is committed.
pub fn derive_normal_key(key_x: &[u8; 16], key_y: &[u8; 16]) -> [u8; 16] {
    let x = u128::from_be_bytes(*key_x);
    let y = u128::from_be_bytes(*key_y);
    (x.rotate_left(2) ^ y)
        .wrapping_add(SCRAMBLER_CONSTANT)
        .rotate_left(87)
        .to_be_bytes()
}

#[derive(Clone, Copy, Default)]
struct KeySlot {
    key_x: [u8; 16],
    key_y: [u8; 16],
    normal: [u8; 16],
}

/// AES engine model.
pub struct AesAccel {
    /// Control Register
    cnt: InMemoryRegister<u32, Ctrl::Register>,

    /// Blocks left in the current batch
    blocks_remaining: u32,

    /// Input data FIFO
    wr_fifo: VecDeque<u32>,

    /// Output data FIFO
    rd_fifo: VecDeque<u32>,

    /// Key slot bank
    slots: [KeySlot; 64],

    /// KEYSEL register
    key_sel: u8,

    /// KEYCNT register
    key_cnt: u8,

    /// Block cipher for the key latched at the last select-apply
    cipher: Aes128,

    /// Counter/IV register in block byte order
    ctr: [u8; 16],

    /// Key FIFO staging, one lane per component
    key_fifo_buf: [[u8; 16]; 3],
    key_fifo_pos: [usize; 3],
}

impl Default for AesAccel {
    fn default() -> Self {
        Self::new()
    }
}

impl AesAccel {
    pub fn new() -> Self {
        Self {
            cnt: InMemoryRegister::new(0),
            blocks_remaining: 0,
            wr_fifo: VecDeque::new(),
            rd_fifo: VecDeque::new(),
            slots: [KeySlot::default(); 64],
            key_sel: 0,
            key_cnt: 0,
            cipher: Aes128::new(&[0u8; 16].into()),
            ctr: [0u8; 16],
            key_fifo_buf: [[0u8; 16]; 3],
            key_fifo_pos: [0; 3],
        }
    }

    /// KeyX component of a slot, for test observation.
    pub fn key_x(&self, slot: usize) -> [u8; 16] {
        self.slots[slot & 0x3F].key_x
    }

    /// KeyY component of a slot, for test observation.
    pub fn key_y(&self, slot: usize) -> [u8; 16] {
        self.slots[slot & 0x3F].key_y
    }

    /// Normal key of a slot, for test observation.
    pub fn normal_key(&self, slot: usize) -> [u8; 16] {
        self.slots[slot & 0x3F].normal
    }

    fn write_cnt(&mut self, val: u32) {
        let req = InMemoryRegister::<u32, Ctrl::Register>::new(val);
        if req.is_set(Ctrl::FLUSH_WRITE) {
            self.wr_fifo.clear();
        }
        if req.is_set(Ctrl::FLUSH_READ) {
            self.rd_fifo.clear();
        }
        if req.is_set(Ctrl::SEL_APPLY) {
            let slot = (self.key_sel & 0x3F) as usize;
            self.cipher = Aes128::new(&self.slots[slot].normal.into());
        }
        self.cnt.set(val & CNT_STORED_MASK);
        self.pump();
    }

    fn read_cnt(&self) -> u32 {
        self.cnt.get()
            | (self.wr_fifo.len() as u32 & regs::CNT_WRFIFO_COUNT_MASK)
            | ((self.rd_fifo.len() as u32) << regs::CNT_RDFIFO_COUNT_SHIFT
                & regs::CNT_RDFIFO_COUNT_MASK)
    }

    fn write_ctr_word(&mut self, index: usize, val: u32) {
        // The counter port always uses reversed limb order; only the byte
        // endianness follows the input flag.
        let limb = 3 - index;
        let bytes = word_to_bytes(val, self.cnt.is_set(Ctrl::INPUT_BIG_ENDIAN));
        self.ctr[limb * 4..limb * 4 + 4].copy_from_slice(&bytes);
    }

    fn write_key_fifo(&mut self, component: usize, val: u32) {
        let index = self.key_fifo_pos[component];
        let limb = if self.cnt.is_set(Ctrl::INPUT_NORMAL_ORDER) {
            index
        } else {
            3 - index
        };
        let bytes = word_to_bytes(val, self.cnt.is_set(Ctrl::INPUT_BIG_ENDIAN));
        self.key_fifo_buf[component][limb * 4..limb * 4 + 4].copy_from_slice(&bytes);
        self.key_fifo_pos[component] = (index + 1) % 4;
        if index == 3 {
            self.commit_key(component);
        }
    }

    fn commit_key(&mut self, component: usize) {
        if self.key_cnt & regs::KEYCNT_WRITE == 0 {
            return;
        }
        let slot = (self.key_cnt & 0x3F) as usize;
        // Slots 0-3 belong to the legacy key domain and are loaded through
        // dedicated registers, not these ports.
        if slot <= 3 {
            return;
        }
        let staged = self.key_fifo_buf[component];
        let entry = &mut self.slots[slot];
        match component {
            0 => entry.normal = staged,
            1 => entry.key_x = staged,
            2 => {
                entry.key_y = staged;
                entry.normal = derive_normal_key(&entry.key_x, &entry.key_y);
            }
            _ => unreachable!(),
        }
    }

    fn crypt_block(&mut self, input: [u8; 16]) -> [u8; 16] {
        match self.cnt.read(Ctrl::MODE) {
            2 | 3 => {
                // CTR: the engine increments its own counter per block
                let mut pad = aes::Block::from(self.ctr);
                self.cipher.encrypt_block(&mut pad);
                let mut out = [0u8; 16];
                for (i, byte) in out.iter_mut().enumerate() {
                    *byte = input[i] ^ pad[i];
                }
                self.ctr = u128::from_be_bytes(self.ctr).wrapping_add(1).to_be_bytes();
                out
            }
            4 => {
                let mut block = aes::Block::from(input);
                self.cipher.decrypt_block(&mut block);
                let mut out = [0u8; 16];
                for (i, byte) in out.iter_mut().enumerate() {
                    *byte = block[i] ^ self.ctr[i];
                }
                self.ctr = input;
                out
            }
            5 => {
                let mut block = aes::Block::from(input);
                for (i, byte) in block.iter_mut().enumerate() {
                    *byte ^= self.ctr[i];
                }
                self.cipher.encrypt_block(&mut block);
                let out: [u8; 16] = block.into();
                self.ctr = out;
                out
            }
            6 => {
                let mut block = aes::Block::from(input);
                self.cipher.decrypt_block(&mut block);
                block.into()
            }
            7 => {
                let mut block = aes::Block::from(input);
                self.cipher.encrypt_block(&mut block);
                block.into()
            }
            // CCM is not modeled
            _ => input,
        }
    }

    /// Moves blocks from the input FIFO to the output FIFO while the batch
    /// is running and the output FIFO has room.
    fn pump(&mut self) {
        loop {
            if !self.cnt.is_set(Ctrl::START) {
                return;
            }
            if self.blocks_remaining == 0 {
                self.cnt.modify(Ctrl::START::CLEAR);
                return;
            }
            if self.wr_fifo.len() < 4 || self.rd_fifo.len() + 4 > regs::FIFO_DEPTH_WORDS {
                return;
            }

            let in_be = self.cnt.is_set(Ctrl::INPUT_BIG_ENDIAN);
            let in_normal = self.cnt.is_set(Ctrl::INPUT_NORMAL_ORDER);
            let mut block = [0u8; 16];
            for index in 0..4 {
                let word = self.wr_fifo.pop_front().unwrap();
                let limb = if in_normal { index } else { 3 - index };
                block[limb * 4..limb * 4 + 4].copy_from_slice(&word_to_bytes(word, in_be));
            }

            let out = self.crypt_block(block);

            let out_be = self.cnt.is_set(Ctrl::OUTPUT_BIG_ENDIAN);
            let out_normal = self.cnt.is_set(Ctrl::OUTPUT_NORMAL_ORDER);
            for index in 0..4 {
                let limb = if out_normal { index } else { 3 - index };
                let bytes: [u8; 4] = out[limb * 4..limb * 4 + 4].try_into().unwrap();
                self.rd_fifo.push_back(word_from_bytes(&bytes, out_be));
            }

            self.blocks_remaining -= 1;
        }
    }
}

impl Bus for AesAccel {
    fn read_u8(&mut self, offset: u32) -> u8 {
        match offset {
            regs::KEYSEL => self.key_sel,
            regs::KEYCNT => self.key_cnt,
            _ => 0,
        }
    }

    fn write_u8(&mut self, offset: u32, val: u8) {
        match offset {
            regs::KEYSEL => self.key_sel = val,
            regs::KEYCNT => self.key_cnt = val,
            _ => {}
        }
    }

    fn read_u32(&mut self, offset: u32) -> u32 {
        match offset {
            regs::CNT => self.read_cnt(),
            regs::RDFIFO => {
                let word = self.rd_fifo.pop_front().unwrap_or(0);
                self.pump();
                word
            }
            _ => 0,
        }
    }

    fn write_u32(&mut self, offset: u32, val: u32) {
        match offset {
            regs::CNT => self.write_cnt(val),
            regs::BLKCNT => self.blocks_remaining = val >> 16,
            regs::WRFIFO => {
                if self.wr_fifo.len() < regs::FIFO_DEPTH_WORDS {
                    self.wr_fifo.push_back(val);
                }
                self.pump();
            }
            regs::CTR..=0x2C => self.write_ctr_word(((offset - regs::CTR) / 4) as usize, val),
            regs::KEYFIFO => self.write_key_fifo(0, val),
            regs::KEYXFIFO => self.write_key_fifo(1, val),
            regs::KEYYFIFO => self.write_key_fifo(2, val),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA_FLAGS: u32 = regs::CNT_INPUT_BIG_ENDIAN
        | regs::CNT_OUTPUT_BIG_ENDIAN
        | regs::CNT_INPUT_NORMAL_ORDER
        | regs::CNT_OUTPUT_NORMAL_ORDER;

    fn load_key(accel: &mut AesAccel, slot: u8, port: u32, key: &[u8; 16]) {
        accel.write_u32(regs::CNT, DATA_FLAGS);
        accel.write_u8(regs::KEYCNT, slot | regs::KEYCNT_WRITE);
        for chunk in key.chunks_exact(4) {
            accel.write_u32(port, u32::from_be_bytes(chunk.try_into().unwrap()));
        }
    }

    #[test]
    fn test_key_commit_and_scrambler() {
        let mut accel = AesAccel::new();
        let key_x: [u8; 16] = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
            0xEE, 0xFF,
        ];
        let key_y: [u8; 16] = [0x5A; 16];

        load_key(&mut accel, 0x3F, regs::KEYXFIFO, &key_x);
        assert_eq!(accel.key_x(0x3F), key_x);
        // KeyX alone does not refresh the normal key
        assert_eq!(accel.normal_key(0x3F), [0u8; 16]);

        load_key(&mut accel, 0x3F, regs::KEYYFIFO, &key_y);
        assert_eq!(accel.key_y(0x3F), key_y);
        assert_eq!(accel.normal_key(0x3F), derive_normal_key(&key_x, &key_y));
    }

    #[test]
    fn test_legacy_slot_ports_ignored() {
        let mut accel = AesAccel::new();
        load_key(&mut accel, 0x02, regs::KEYXFIFO, &[0xAB; 16]);
        load_key(&mut accel, 0x02, regs::KEYFIFO, &[0xCD; 16]);
        assert_eq!(accel.key_x(0x02), [0u8; 16]);
        assert_eq!(accel.normal_key(0x02), [0u8; 16]);
    }

    #[test]
    fn test_ecb_known_answer() {
        // FIPS-197 Appendix C.1
        let key: [u8; 16] = [
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D,
            0x0E, 0x0F,
        ];
        let plaintext: [u8; 16] = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
            0xEE, 0xFF,
        ];
        let ciphertext: [u8; 16] = [
            0x69, 0xC4, 0xE0, 0xD8, 0x6A, 0x7B, 0x04, 0x30, 0xD8, 0xCD, 0xB7, 0x80, 0x70, 0xB4,
            0xC5, 0x5A,
        ];

        let mut accel = AesAccel::new();
        load_key(&mut accel, 0x05, regs::KEYFIFO, &key);
        accel.write_u8(regs::KEYSEL, 0x05);
        accel.write_u32(regs::CNT, DATA_FLAGS | regs::CNT_SEL_APPLY);

        accel.write_u32(regs::BLKCNT, 1 << 16);
        accel.write_u32(
            regs::CNT,
            DATA_FLAGS | (regs::MODE_ECB_ENCRYPT << regs::CNT_MODE_SHIFT) | regs::CNT_START,
        );
        for chunk in plaintext.chunks_exact(4) {
            accel.write_u32(regs::WRFIFO, u32::from_be_bytes(chunk.try_into().unwrap()));
        }
        let mut out = [0u8; 16];
        for chunk in out.chunks_exact_mut(4) {
            chunk.copy_from_slice(&accel.read_u32(regs::RDFIFO).to_be_bytes());
        }
        assert_eq!(out, ciphertext);
    }

    #[test]
    fn test_fifo_backpressure() {
        let mut accel = AesAccel::new();
        accel.write_u32(regs::BLKCNT, 8 << 16);
        accel.write_u32(
            regs::CNT,
            DATA_FLAGS | (regs::MODE_ECB_ENCRYPT << regs::CNT_MODE_SHIFT) | regs::CNT_START,
        );

        // 8 blocks in without draining: 4 results fill the read FIFO, the
        // rest back up in the write FIFO.
        for word in 0..32u32 {
            accel.write_u32(regs::WRFIFO, word);
        }
        let cnt = accel.read_u32(regs::CNT);
        assert_eq!(cnt & regs::CNT_WRFIFO_COUNT_MASK, 16);
        assert_eq!(
            (cnt & regs::CNT_RDFIFO_COUNT_MASK) >> regs::CNT_RDFIFO_COUNT_SHIFT,
            16
        );

        // Draining the output lets the remaining blocks through.
        for _ in 0..32 {
            accel.read_u32(regs::RDFIFO);
        }
        let cnt = accel.read_u32(regs::CNT);
        assert_eq!(cnt & regs::CNT_WRFIFO_COUNT_MASK, 0);
        assert_eq!(cnt & regs::CNT_RDFIFO_COUNT_MASK, 0);
        assert_eq!(cnt & regs::CNT_START, 0);
    }
}
