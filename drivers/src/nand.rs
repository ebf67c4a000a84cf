/*++

Licensed under the Apache-2.0 license.

File Name:

    nand.rs

Abstract:

    Transparent decryption layer over the raw NAND.

    The NAND is encrypted with AES-CTR under a console-unique key. The base
    counter is the first half of the SHA-256 of the device CID, and each
    sector's counter is the base advanced by the sector's absolute offset in
    blocks. The data partition does not start at sector zero, so reads are
    offset by a family-specific FAT start sector.

--*/

use ctrboot_registers::Bus;

use crate::aes::{Aes, AesMode, BlockRegion, AES_BLOCK_SIZE};
use crate::counter::{self, WordFormat};
use crate::key_slots::{KeyComponent, KeySlot, KeySlots};
use crate::sha::{Sha, ShaMode};
use crate::{CtrbootError, CtrbootResult};

pub const SECTOR_SIZE: usize = 0x200;

const OLD3DS_SLOT: KeySlot = KeySlot::new_const(0x04);
const NEW3DS_SLOT: KeySlot = KeySlot::new_const(0x05);

/// Key Y for the New3DS data partition slot. The Old3DS slot is keyed from
/// fuses at boot and needs no software component.
const NEW3DS_KEY_Y: [u8; 16] = [
    0x4D, 0x80, 0x4F, 0x4E, 0x99, 0x90, 0x19, 0x46, 0x13, 0xA2, 0x04, 0xAC, 0x58, 0x44, 0x60,
    0xBE,
];

/// Hardware family the NAND was written by. Selects the key slot and the
/// data partition's FAT start sector.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConsoleFamily {
    Old3ds,
    New3ds,
}

impl ConsoleFamily {
    const fn key_slot(self) -> KeySlot {
        match self {
            ConsoleFamily::Old3ds => OLD3DS_SLOT,
            ConsoleFamily::New3ds => NEW3DS_SLOT,
        }
    }

    const fn fat_start_sector(self) -> u32 {
        match self {
            ConsoleFamily::Old3ds => 0x5CAE5,
            ConsoleFamily::New3ds => 0x5CAD7,
        }
    }
}

/// Raw sector access to the NAND device. Implementations return their
/// controller status word verbatim; zero is success.
pub trait NandStorage {
    /// Device CID, hashed to derive the base counter.
    fn cid(&self) -> [u8; 16];

    /// Reads `count` raw (still encrypted) sectors starting at `sector`
    /// into `out`.
    fn read_raw_sectors(&mut self, sector: u32, count: u32, out: &mut [u8]) -> u32;
}

/// Decrypting view of the NAND data partition.
pub struct CtrNand {
    family: ConsoleFamily,
    base_ctr: [u8; 16],
}

impl CtrNand {
    /// Derives the base counter from the device CID and loads the family's
    /// key slot. Must run before any reads.
    pub fn init<ABus: Bus, SBus: Bus>(
        family: ConsoleFamily,
        storage: &impl NandStorage,
        aes: &mut Aes<ABus>,
        sha: &mut Sha<SBus>,
    ) -> CtrbootResult<CtrNand> {
        let mut digest = [0u8; 32];
        sha.digest(ShaMode::Sha256, &storage.cid(), &mut digest)?;
        let mut base_ctr = [0u8; 16];
        base_ctr.copy_from_slice(&digest[..16]);

        if family == ConsoleFamily::New3ds {
            let mut slots = KeySlots::new(aes);
            slots.set_key(
                NEW3DS_SLOT,
                KeyComponent::Y,
                &NEW3DS_KEY_Y,
                WordFormat::NATIVE,
            );
        }

        Ok(CtrNand { family, base_ctr })
    }

    /// Reads and decrypts `count` sectors of the data partition starting at
    /// `sector`. Partition sectors are relative to the FAT start; the raw
    /// read and the counter both use the absolute device sector. The
    /// controller status from the raw read is passed through; the sectors
    /// are decrypted either way so a caller that retries sees consistent
    /// plaintext.
    pub fn read_sectors<TBus: Bus>(
        &self,
        storage: &mut impl NandStorage,
        aes: &mut Aes<TBus>,
        sector: u32,
        count: u32,
        out: &mut [u8],
    ) -> CtrbootResult<u32> {
        let byte_len = count as usize * SECTOR_SIZE;
        if out.len() < byte_len {
            return Err(CtrbootError::NAND_BUFFER_TOO_SMALL);
        }

        let device_sector = sector + self.family.fat_start_sector();
        let status = storage.read_raw_sectors(device_sector, count, &mut out[..byte_len]);

        let mut ctr = self.base_ctr;
        let offset_blocks = device_sector * (SECTOR_SIZE / AES_BLOCK_SIZE) as u32;
        counter::advance(&mut ctr, offset_blocks, WordFormat::NATIVE);

        aes.select_slot(self.family.key_slot());
        aes.transform_in_place(
            &mut out[..byte_len],
            BlockRegion::in_place(0),
            count * (SECTOR_SIZE / AES_BLOCK_SIZE) as u32,
            Some(&mut ctr),
            AesMode::Ctr,
            WordFormat::NATIVE,
        )?;

        Ok(status)
    }
}
