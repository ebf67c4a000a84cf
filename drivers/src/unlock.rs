/*++

Licensed under the Apache-2.0 license.

File Name:

    unlock.rs

Abstract:

    Unlock sequence for the encrypted boot-stage binary.

    The binary carries its own key material in a plaintext header: a key Y,
    a counter, an ASCII payload size, and (on non-legacy revisions) a
    wrapped key X that must first be unwrapped with a bootstrap key through
    a scratch slot. Revision 2 additionally seeds a ladder of derived key
    slots consumed by later boot stages.

--*/

use ctrboot_registers::Bus;

use crate::aes::{Aes, AesMode, BlockRegion, AES_BLOCK_SIZE};
use crate::counter::WordFormat;
use crate::key_slots::{KeyComponent, KeySlot, KeySlots};
use crate::{CtrbootError, CtrbootResult};

const KEY_Y_OFFSET: usize = 0x10;
const CTR_OFFSET: usize = 0x20;
const SIZE_OFFSET: usize = 0x30;
const VERSION_OFFSET: usize = 0x53;
const WRAPPED_KEY_X_OFFSET: usize = 0x60;
const PAYLOAD_OFFSET: usize = 0x800;

const SCRATCH_SLOT: KeySlot = KeySlot::new_const(0x11);
const LEGACY_SLOT: KeySlot = KeySlot::new_const(0x15);
const MODERN_SLOT: KeySlot = KeySlot::new_const(0x16);

const LADDER_FIRST_SLOT: u8 = 0x19;
const LADDER_LAST_SLOT: u8 = 0x1F;

/// Bootstrap normal keys for unwrapping the header's key X, one per
/// non-legacy revision.
const BOOTSTRAP_V1: [u8; 16] = [
    0x07, 0x29, 0x44, 0x38, 0xF8, 0xC9, 0x75, 0x93, 0xAA, 0x0E, 0x4A, 0xB4, 0xAE, 0x84, 0xC1,
    0xD8,
];
const BOOTSTRAP_V2: [u8; 16] = [
    0x42, 0x3F, 0x81, 0x7A, 0x23, 0x52, 0x58, 0x31, 0x6E, 0x75, 0x8E, 0x3A, 0x39, 0x43, 0x2E,
    0xD0,
];

/// Seed for the revision-2 key ladder; incremented per derived slot.
const LADDER_SEED: [u8; 16] = [
    0xDD, 0xDA, 0xA4, 0xC6, 0x2C, 0xC4, 0x50, 0xE9, 0xDA, 0xB6, 0x9B, 0x0D, 0x9D, 0x2A, 0x21,
    0x98,
];

/// Revision of the boot-stage binary, read from its header.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BootstageVersion {
    Legacy,
    V1,
    V2,
}

impl BootstageVersion {
    /// A legacy binary marks the version byte unused (0xFF); later
    /// revisions store it as an ASCII digit.
    fn detect(byte: u8) -> BootstageVersion {
        match byte {
            0xFF => BootstageVersion::Legacy,
            b'1' => BootstageVersion::V1,
            _ => BootstageVersion::V2,
        }
    }

    /// The legacy payload key slot is keyed with a boot-ROM key X; later
    /// revisions derive theirs from the wrapped header key X.
    fn key_slot(self) -> KeySlot {
        match self {
            BootstageVersion::Legacy => LEGACY_SLOT,
            _ => MODERN_SLOT,
        }
    }
}

/// Payload size is stored as a NUL-terminated ASCII decimal. A malformed
/// field accumulates a wrong size without any error signal, like every
/// other bad-input path in this subsystem.
fn parse_size(field: &[u8]) -> usize {
    let mut size = 0usize;
    for &byte in field {
        if byte == 0 {
            break;
        }
        size = size * 10 + byte.wrapping_sub(b'0') as usize;
    }
    size
}

/// Decrypts the boot-stage payload in place and loads the key slots the
/// binary will expect once it runs. Returns the detected revision.
pub fn unlock<TBus: Bus>(
    image: &mut [u8],
    aes: &mut Aes<TBus>,
) -> CtrbootResult<BootstageVersion> {
    if image.len() < PAYLOAD_OFFSET {
        return Err(CtrbootError::UNLOCK_IMAGE_TOO_SMALL);
    }
    let version = BootstageVersion::detect(image[VERSION_OFFSET]);
    let size = parse_size(&image[SIZE_OFFSET..SIZE_OFFSET + 0x10]);
    if image.len() < PAYLOAD_OFFSET + size {
        return Err(CtrbootError::UNLOCK_IMAGE_TOO_SMALL);
    }

    let slot = version.key_slot();
    if version != BootstageVersion::Legacy {
        let bootstrap = match version {
            BootstageVersion::V1 => &BOOTSTRAP_V1,
            _ => &BOOTSTRAP_V2,
        };
        {
            let mut slots = KeySlots::new(aes);
            slots.set_key(
                SCRATCH_SLOT,
                KeyComponent::Normal,
                bootstrap,
                WordFormat::NATIVE,
            );
            slots.select(SCRATCH_SLOT);
        }

        let mut key_x: [u8; 16] = image
            [WRAPPED_KEY_X_OFFSET..WRAPPED_KEY_X_OFFSET + 16]
            .try_into()
            .unwrap();
        unwrap_block(aes, &mut key_x)?;
        KeySlots::new(aes).set_key(slot, KeyComponent::X, &key_x, WordFormat::NATIVE);
    }

    let key_y: [u8; 16] = image[KEY_Y_OFFSET..KEY_Y_OFFSET + 16].try_into().unwrap();
    {
        let mut slots = KeySlots::new(aes);
        slots.set_key(slot, KeyComponent::Y, &key_y, WordFormat::NATIVE);
        slots.select(slot);
    }

    let mut ctr: [u8; 16] = image[CTR_OFFSET..CTR_OFFSET + 16].try_into().unwrap();
    aes.transform_in_place(
        image,
        BlockRegion::in_place(PAYLOAD_OFFSET),
        (size / AES_BLOCK_SIZE) as u32,
        Some(&mut ctr),
        AesMode::Ctr,
        WordFormat::NATIVE,
    )?;

    // The derived slots are consumed by later boot stages, not by the
    // payload decryption above.
    if version == BootstageVersion::V2 {
        derive_key_ladder(aes)?;
    }

    Ok(version)
}

/// Populates the revision-2 derived key slots: each slot's key X is the
/// ladder seed (incremented per step) unwrapped under the scratch slot,
/// which still holds the bootstrap key.
fn derive_key_ladder<TBus: Bus>(aes: &mut Aes<TBus>) -> CtrbootResult<()> {
    aes.select_slot(SCRATCH_SLOT);
    let mut seed = LADDER_SEED;
    for index in LADDER_FIRST_SLOT..=LADDER_LAST_SLOT {
        let mut key_x = seed;
        unwrap_block(aes, &mut key_x)?;
        KeySlots::new(aes).set_key(
            KeySlot::new_const(index),
            KeyComponent::X,
            &key_x,
            WordFormat::NATIVE,
        );
        seed[15] = seed[15].wrapping_add(1);
    }
    Ok(())
}

fn unwrap_block<TBus: Bus>(aes: &mut Aes<TBus>, block: &mut [u8; 16]) -> CtrbootResult<()> {
    aes.transform_in_place(
        block,
        BlockRegion::in_place(0),
        1,
        None,
        AesMode::EcbDecrypt,
        WordFormat::empty(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctrboot_emu::AesAccel;

    const KEY_X: [u8; 16] = [0x1A; 16];
    const KEY_Y: [u8; 16] = [0x2B; 16];
    const CTR: [u8; 16] = [
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE,
        0xFF,
    ];

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 3 % 256) as u8).collect()
    }

    fn ecb_one_block(
        aes: &mut Aes<AesAccel>,
        key: &[u8; 16],
        block: &[u8; 16],
        mode: AesMode,
    ) -> [u8; 16] {
        let mut slots = KeySlots::new(aes);
        slots.set_key(SCRATCH_SLOT, KeyComponent::Normal, key, WordFormat::NATIVE);
        slots.select(SCRATCH_SLOT);
        let mut out = *block;
        aes.transform_in_place(
            &mut out,
            BlockRegion::in_place(0),
            1,
            None,
            mode,
            WordFormat::empty(),
        )
        .unwrap();
        out
    }

    /// Builds an encrypted image for the given version byte. Key material
    /// and ciphertext are produced with a scratch engine so the unlock path
    /// is exercised against an independently built binary.
    fn build_image(version_byte: u8, bootstrap: Option<&[u8; 16]>, plaintext: &[u8]) -> Vec<u8> {
        let mut builder = Aes::new(AesAccel::new());

        let mut image = vec![0u8; PAYLOAD_OFFSET + plaintext.len()];
        image[KEY_Y_OFFSET..KEY_Y_OFFSET + 16].copy_from_slice(&KEY_Y);
        image[CTR_OFFSET..CTR_OFFSET + 16].copy_from_slice(&CTR);
        let size_ascii = alloc_size_field(plaintext.len());
        image[SIZE_OFFSET..SIZE_OFFSET + size_ascii.len()].copy_from_slice(&size_ascii);
        image[VERSION_OFFSET] = version_byte;
        if let Some(bootstrap) = bootstrap {
            let wrapped = ecb_one_block(&mut builder, bootstrap, &KEY_X, AesMode::EcbEncrypt);
            image[WRAPPED_KEY_X_OFFSET..WRAPPED_KEY_X_OFFSET + 16].copy_from_slice(&wrapped);
        }

        // Encrypt the payload under the scrambled key the console derives.
        let mut slots = KeySlots::new(&mut builder);
        slots.set_key(MODERN_SLOT, KeyComponent::X, &KEY_X, WordFormat::NATIVE);
        slots.set_key(MODERN_SLOT, KeyComponent::Y, &KEY_Y, WordFormat::NATIVE);
        slots.select(MODERN_SLOT);
        let mut ctr = CTR;
        image[PAYLOAD_OFFSET..].copy_from_slice(plaintext);
        builder
            .transform_in_place(
                &mut image,
                BlockRegion::in_place(PAYLOAD_OFFSET),
                (plaintext.len() / AES_BLOCK_SIZE) as u32,
                Some(&mut ctr),
                AesMode::Ctr,
                WordFormat::NATIVE,
            )
            .unwrap();
        image
    }

    fn alloc_size_field(size: usize) -> Vec<u8> {
        let mut field = size.to_string().into_bytes();
        field.push(0);
        field
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size(b"0\0\0\0"), 0);
        assert_eq!(parse_size(b"123\0garbage"), 123);
        assert_eq!(parse_size(b"262144\0"), 0x40000);
        // Non-digit bytes accumulate a wrong value but never panic.
        assert_eq!(parse_size(b"1A\0"), 27);
    }

    #[test]
    fn test_detect_version() {
        assert_eq!(BootstageVersion::detect(0xFF), BootstageVersion::Legacy);
        assert_eq!(BootstageVersion::detect(b'1'), BootstageVersion::V1);
        assert_eq!(BootstageVersion::detect(b'2'), BootstageVersion::V2);
        assert_eq!(BootstageVersion::detect(0x00), BootstageVersion::V2);
    }

    #[test]
    fn test_unlock_v1() {
        let plaintext = payload(4 * AES_BLOCK_SIZE);
        let mut image = build_image(b'1', Some(&BOOTSTRAP_V1), &plaintext);

        let mut aes = Aes::new(AesAccel::new());
        let version = unlock(&mut image, &mut aes).unwrap();
        assert_eq!(version, BootstageVersion::V1);
        assert_eq!(&image[PAYLOAD_OFFSET..], &plaintext[..]);
        // The unwrapped key X must have landed in the payload slot.
        assert_eq!(aes.regs().key_x(MODERN_SLOT.index() as usize), KEY_X);
    }

    #[test]
    fn test_unlock_v2_populates_ladder() {
        let plaintext = payload(8 * AES_BLOCK_SIZE);
        let mut image = build_image(b'2', Some(&BOOTSTRAP_V2), &plaintext);

        let mut aes = Aes::new(AesAccel::new());
        let version = unlock(&mut image, &mut aes).unwrap();
        assert_eq!(version, BootstageVersion::V2);
        assert_eq!(&image[PAYLOAD_OFFSET..], &plaintext[..]);

        // Each ladder slot holds the unwrapped, incremented seed.
        let mut expected_builder = Aes::new(AesAccel::new());
        let mut seed = LADDER_SEED;
        for index in LADDER_FIRST_SLOT..=LADDER_LAST_SLOT {
            let expected =
                ecb_one_block(&mut expected_builder, &BOOTSTRAP_V2, &seed, AesMode::EcbDecrypt);
            assert_eq!(aes.regs().key_x(index as usize), expected);
            seed[15] += 1;
        }
    }

    #[test]
    fn test_unlock_legacy_uses_preloaded_key_x() {
        let plaintext = payload(2 * AES_BLOCK_SIZE);

        // Legacy images rely on a key X the boot ROM left in the slot;
        // build the ciphertext under that same slot state.
        let mut builder = Aes::new(AesAccel::new());
        let mut slots = KeySlots::new(&mut builder);
        slots.set_key(LEGACY_SLOT, KeyComponent::X, &KEY_X, WordFormat::NATIVE);
        slots.set_key(LEGACY_SLOT, KeyComponent::Y, &KEY_Y, WordFormat::NATIVE);
        slots.select(LEGACY_SLOT);

        let mut image = vec![0u8; PAYLOAD_OFFSET + plaintext.len()];
        image[KEY_Y_OFFSET..KEY_Y_OFFSET + 16].copy_from_slice(&KEY_Y);
        image[CTR_OFFSET..CTR_OFFSET + 16].copy_from_slice(&CTR);
        let size_ascii = alloc_size_field(plaintext.len());
        image[SIZE_OFFSET..SIZE_OFFSET + size_ascii.len()].copy_from_slice(&size_ascii);
        image[VERSION_OFFSET] = 0xFF;
        image[PAYLOAD_OFFSET..].copy_from_slice(&plaintext);
        let mut ctr = CTR;
        builder
            .transform_in_place(
                &mut image,
                BlockRegion::in_place(PAYLOAD_OFFSET),
                2,
                Some(&mut ctr),
                AesMode::Ctr,
                WordFormat::NATIVE,
            )
            .unwrap();

        let mut aes = Aes::new(AesAccel::new());
        KeySlots::new(&mut aes).set_key(LEGACY_SLOT, KeyComponent::X, &KEY_X, WordFormat::NATIVE);
        let version = unlock(&mut image, &mut aes).unwrap();
        assert_eq!(version, BootstageVersion::Legacy);
        assert_eq!(&image[PAYLOAD_OFFSET..], &plaintext[..]);
    }

    #[test]
    fn test_unlock_truncated_image() {
        let mut aes = Aes::new(AesAccel::new());
        let mut short = vec![0u8; PAYLOAD_OFFSET - 1];
        assert_eq!(
            unlock(&mut short, &mut aes),
            Err(CtrbootError::UNLOCK_IMAGE_TOO_SMALL)
        );

        // Header claims more payload than the buffer holds.
        let mut image = vec![0u8; PAYLOAD_OFFSET + 16];
        image[VERSION_OFFSET] = b'1';
        image[SIZE_OFFSET..SIZE_OFFSET + 3].copy_from_slice(b"32\0");
        assert_eq!(
            unlock(&mut image, &mut aes),
            Err(CtrbootError::UNLOCK_IMAGE_TOO_SMALL)
        );
    }
}
