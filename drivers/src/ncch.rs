/*++

Licensed under the Apache-2.0 license.

File Name:

    ncch.rs

Abstract:

    NCCH container ExeFS decryption.

    The container header is its own key source: its first 16 bytes double
    as the key Y, and its partition id seeds the counter. The decrypted
    ExeFS lands one header-size below the container so the image can be
    executed with the header stripped.

--*/

use ctrboot_registers::Bus;

use crate::aes::{Aes, AesMode, BlockRegion, AES_BLOCK_SIZE};
use crate::counter::WordFormat;
use crate::key_slots::{KeyComponent, KeySlot, KeySlots};
use crate::{CtrbootError, CtrbootResult};

/// Container offsets are in media units of 0x200 bytes; the header itself
/// is one unit.
pub const MEDIA_UNIT: usize = 0x200;

const PARTITION_ID_OFFSET: usize = 0x108;
const EXEFS_OFFSET_FIELD: usize = 0x1A0;
const EXEFS_SIZE_FIELD: usize = 0x1A4;

/// ExeFS counter type tag, placed just past the partition id.
const CTR_TYPE_EXEFS: u8 = 2;

const NCCH_SLOT: KeySlot = KeySlot::new_const(0x2C);

fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

/// Decrypts the ExeFS of the container at `ncch_offset` within `buf`,
/// writing the plaintext one media unit below the container. Returns the
/// decrypted size in bytes.
pub fn decrypt_exefs<TBus: Bus>(
    aes: &mut Aes<TBus>,
    buf: &mut [u8],
    ncch_offset: usize,
) -> CtrbootResult<usize> {
    if ncch_offset < MEDIA_UNIT || buf.len() < ncch_offset + MEDIA_UNIT {
        return Err(CtrbootError::NCCH_IMAGE_TOO_SMALL);
    }
    let header = &buf[ncch_offset..ncch_offset + MEDIA_UNIT];

    let exefs_offset = read_u32_le(header, EXEFS_OFFSET_FIELD) as usize * MEDIA_UNIT;
    let exefs_size = read_u32_le(header, EXEFS_SIZE_FIELD) as usize * MEDIA_UNIT;
    if ncch_offset + exefs_offset + exefs_size > buf.len() {
        return Err(CtrbootError::NCCH_REGION_OUT_OF_BOUNDS);
    }

    // Counter: partition id byte-reversed into the top half, then the
    // section type tag.
    let mut ctr = [0u8; 16];
    for i in 0..8 {
        ctr[7 - i] = header[PARTITION_ID_OFFSET + i];
    }
    ctr[8] = CTR_TYPE_EXEFS;

    let key_y: [u8; 16] = header[..16].try_into().unwrap();
    let mut slots = KeySlots::new(aes);
    slots.set_key(NCCH_SLOT, KeyComponent::Y, &key_y, WordFormat::NATIVE);
    slots.select(NCCH_SLOT);

    aes.transform_in_place(
        buf,
        BlockRegion {
            src: ncch_offset + exefs_offset,
            dst: ncch_offset - MEDIA_UNIT,
        },
        (exefs_size / AES_BLOCK_SIZE) as u32,
        Some(&mut ctr),
        AesMode::Ctr,
        WordFormat::NATIVE,
    )?;

    Ok(exefs_size)
}
