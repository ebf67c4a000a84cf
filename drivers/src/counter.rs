/*++

Licensed under the Apache-2.0 license.

File Name:

    counter.rs

Abstract:

    File contains 128-bit counter/IV arithmetic. The word format must match
    how the engine interprets loaded words; a mismatch desynchronizes stream
    decryption with no error signal.

--*/

use bitflags::bitflags;
use ctrboot_registers::aes as regs;

bitflags! {
    /// How the engine interprets the 32-bit limbs of a counter or IV. The
    /// bit values are the CNT input-format bits so a format can be OR'd
    /// straight into the control register.
    pub struct WordFormat: u32 {
        /// Limb bytes are big-endian on the bus.
        const BIG_ENDIAN = regs::CNT_INPUT_BIG_ENDIAN;
        /// Limbs are in natural order rather than reversed.
        const NORMAL_ORDER = regs::CNT_INPUT_NORMAL_ORDER;
    }
}

impl WordFormat {
    /// Format used for every counter, IV and key load in the boot path.
    pub const NATIVE: WordFormat =
        WordFormat::from_bits_truncate(regs::CNT_INPUT_BIG_ENDIAN | regs::CNT_INPUT_NORMAL_ORDER);
}

fn load_limbs(ctr: &[u8; 16], fmt: WordFormat) -> [u32; 4] {
    let mut limbs = [0u32; 4];
    for (limb, chunk) in limbs.iter_mut().zip(ctr.chunks_exact(4)) {
        let bytes: [u8; 4] = chunk.try_into().unwrap();
        *limb = if fmt.contains(WordFormat::BIG_ENDIAN) {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        };
    }
    limbs
}

fn store_limbs(ctr: &mut [u8; 16], limbs: [u32; 4], fmt: WordFormat) {
    for (limb, chunk) in limbs.iter().zip(ctr.chunks_exact_mut(4)) {
        let bytes = if fmt.contains(WordFormat::BIG_ENDIAN) {
            limb.to_be_bytes()
        } else {
            limb.to_le_bytes()
        };
        chunk.copy_from_slice(&bytes);
    }
}

/// Adds `amount` to a 128-bit counter with carry propagation, matching the
/// engine's native increment. The on-wire representation is preserved: under
/// a big-endian format the limbs are swapped in, added and swapped back out.
pub fn advance(ctr: &mut [u8; 16], amount: u32, fmt: WordFormat) {
    let mut limbs = load_limbs(ctr, fmt);

    // The amount lands in the least significant limb: limb 3 under natural
    // order, limb 0 under reversed order.
    let order: [usize; 4] = if fmt.contains(WordFormat::NORMAL_ORDER) {
        [3, 2, 1, 0]
    } else {
        [0, 1, 2, 3]
    };

    let (sum, mut carry) = limbs[order[0]].overflowing_add(amount);
    limbs[order[0]] = sum;
    for &index in &order[1..] {
        let (sum, next) = limbs[index].overflowing_add(carry as u32);
        limbs[index] = sum;
        carry = next;
    }

    store_limbs(ctr, limbs, fmt);
}

/// Rewrites a counter from one word format to another without changing the
/// 128-bit value the engine would see.
pub fn convert(ctr: &mut [u8; 16], from: WordFormat, to: WordFormat) {
    let diff = from ^ to;

    if diff.contains(WordFormat::BIG_ENDIAN) {
        for chunk in ctr.chunks_exact_mut(4) {
            chunk.reverse();
        }
    }

    if diff.contains(WordFormat::NORMAL_ORDER) {
        for limb in 0..2 {
            for byte in 0..4 {
                ctr.swap(limb * 4 + byte, (3 - limb) * 4 + byte);
            }
        }
    }
}
