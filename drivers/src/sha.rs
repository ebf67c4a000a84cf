/*++

Licensed under the Apache-2.0 license.

File Name:

    sha.rs

Abstract:

    Driver for the SHA engine.

    The input FIFO takes whole words; a trailing partial word is fed byte by
    byte. The engine pads and finalizes on its own when the final bit is set,
    so the driver never buffers message bytes.

--*/

use ctrboot_registers::{sha as regs, Bus};

use crate::wait;
use crate::{CtrbootError, CtrbootResult};

/// Digest algorithm selector.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ShaMode {
    Sha256,
    Sha224,
    Sha1,
}

impl ShaMode {
    const fn cnt_bits(self) -> u32 {
        match self {
            ShaMode::Sha256 => regs::MODE_SHA256,
            ShaMode::Sha224 => regs::MODE_SHA224,
            ShaMode::Sha1 => regs::MODE_SHA1,
        }
    }

    /// Digest length in bytes.
    pub const fn digest_size(self) -> usize {
        match self {
            ShaMode::Sha256 => 32,
            ShaMode::Sha224 => 28,
            ShaMode::Sha1 => 20,
        }
    }
}

/// SHA engine driver. A digest is one `init`, any number of `update`s, and
/// one `finalize`.
pub struct Sha<TBus: Bus> {
    regs: TBus,
    mode: ShaMode,
}

impl<TBus: Bus> Sha<TBus> {
    pub fn new(regs: TBus) -> Self {
        Self {
            regs,
            mode: ShaMode::Sha256,
        }
    }

    /// Starts a new digest, discarding any in-progress state.
    pub fn init(&mut self, mode: ShaMode) {
        self.mode = mode;
        self.wait_idle();
        self.regs.write_u32(
            regs::CNT,
            regs::CNT_START | regs::CNT_OUTPUT_BIG_ENDIAN | mode.cnt_bits(),
        );
    }

    /// Feeds message bytes into the engine.
    pub fn update(&mut self, data: &[u8]) {
        let mut chunks = data.chunks_exact(4);
        for chunk in chunks.by_ref() {
            self.wait_idle();
            self.regs
                .write_u32(regs::INFIFO, u32::from_be_bytes(chunk.try_into().unwrap()));
        }
        for &byte in chunks.remainder() {
            self.wait_idle();
            self.regs.write_u8(regs::INFIFO, byte);
        }
    }

    /// Finalizes the digest into `digest`, which must hold at least the
    /// mode's digest size. Returns the number of bytes written.
    pub fn finalize(&mut self, digest: &mut [u8]) -> CtrbootResult<usize> {
        let size = self.mode.digest_size();
        if digest.len() < size {
            return Err(CtrbootError::DRIVER_SHA_DIGEST_BUFFER_TOO_SMALL);
        }

        self.wait_idle();
        let cnt = self.regs.read_u32(regs::CNT);
        self.regs.write_u32(regs::CNT, cnt | regs::CNT_FINAL);
        self.wait_idle();

        for (index, chunk) in digest[..size].chunks_exact_mut(4).enumerate() {
            let word = self.regs.read_u32(regs::HASH + index as u32 * 4);
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        Ok(size)
    }

    /// One-shot digest of a whole message.
    pub fn digest(&mut self, mode: ShaMode, data: &[u8], digest: &mut [u8]) -> CtrbootResult<usize> {
        self.init(mode);
        self.update(data);
        self.finalize(digest)
    }

    fn wait_idle(&mut self) {
        let bus = &mut self.regs;
        wait::until(|| bus.read_u32(regs::CNT) & regs::CNT_START == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctrboot_emu::ShaAccel;
    use sha2::{Digest, Sha256};

    #[test]
    fn test_sha256_one_shot() {
        let mut sha = Sha::new(ShaAccel::new());
        let mut digest = [0u8; 32];
        let n = sha.digest(ShaMode::Sha256, b"abc", &mut digest).unwrap();
        assert_eq!(n, 32);
        assert_eq!(
            digest,
            [
                0xBA, 0x78, 0x16, 0xBF, 0x8F, 0x01, 0xCF, 0xEA, 0x41, 0x41, 0x40, 0xDE, 0x5D,
                0xAE, 0x22, 0x23, 0xB0, 0x03, 0x61, 0xA3, 0x96, 0x17, 0x7A, 0x9C, 0xB4, 0x10,
                0xFF, 0x61, 0xF2, 0x00, 0x15, 0xAD,
            ]
        );
    }

    #[test]
    fn test_streamed_update_matches_one_shot() {
        let data: Vec<u8> = (0..1037).map(|i| (i % 251) as u8).collect();
        let mut sha = Sha::new(ShaAccel::new());

        sha.init(ShaMode::Sha256);
        // Odd split sizes exercise the byte-wise tail writes.
        sha.update(&data[..13]);
        sha.update(&data[13..700]);
        sha.update(&data[700..]);
        let mut digest = [0u8; 32];
        sha.finalize(&mut digest).unwrap();

        let expected = Sha256::digest(&data);
        assert_eq!(digest, expected[..]);
    }

    #[test]
    fn test_digest_sizes_per_mode() {
        use sha2::Sha224;

        let data = [0x5Au8; 130];
        let mut sha = Sha::new(ShaAccel::new());
        let mut digest = [0u8; 32];

        assert_eq!(sha.digest(ShaMode::Sha256, b"", &mut digest).unwrap(), 32);
        assert_eq!(digest, Sha256::digest(b"")[..]);

        assert_eq!(sha.digest(ShaMode::Sha224, &data, &mut digest).unwrap(), 28);
        assert_eq!(digest[..28], Sha224::digest(data)[..]);

        assert_eq!(sha.digest(ShaMode::Sha1, &data, &mut digest).unwrap(), 20);
    }

    #[test]
    fn test_sha1_digest_size() {
        let mut sha = Sha::new(ShaAccel::new());
        let mut digest = [0u8; 32];
        let n = sha.digest(ShaMode::Sha1, b"abc", &mut digest).unwrap();
        assert_eq!(n, 20);
        assert_eq!(
            &digest[..20],
            &[
                0xA9, 0x99, 0x3E, 0x36, 0x47, 0x06, 0x81, 0x6A, 0xBA, 0x3E, 0x25, 0x71, 0x78,
                0x50, 0xC2, 0x6C, 0x9C, 0xD0, 0xD8, 0x9D,
            ]
        );
    }

    #[test]
    fn test_small_digest_buffer() {
        let mut sha = Sha::new(ShaAccel::new());
        let mut digest = [0u8; 16];
        assert_eq!(
            sha.digest(ShaMode::Sha256, b"abc", &mut digest),
            Err(CtrbootError::DRIVER_SHA_DIGEST_BUFFER_TOO_SMALL)
        );
    }

    #[test]
    fn test_reinit_discards_state() {
        let mut sha = Sha::new(ShaAccel::new());
        sha.init(ShaMode::Sha256);
        sha.update(b"garbage");
        sha.init(ShaMode::Sha256);
        sha.update(b"abc");
        let mut digest = [0u8; 32];
        sha.finalize(&mut digest).unwrap();
        assert_eq!(digest, Sha256::digest(b"abc")[..]);
    }
}
