/*++

Licensed under the Apache-2.0 license.

File Name:

    helpers.rs

Abstract:

    Word/byte conversion helpers shared by the peripheral models.

--*/

/// Splits a bus word into block bytes under the engine's endianness flag.
pub fn word_to_bytes(word: u32, big_endian: bool) -> [u8; 4] {
    if big_endian {
        word.to_be_bytes()
    } else {
        word.to_le_bytes()
    }
}

/// Assembles a bus word from block bytes under the engine's endianness flag.
pub fn word_from_bytes(bytes: &[u8; 4], big_endian: bool) -> u32 {
    if big_endian {
        u32::from_be_bytes(*bytes)
    } else {
        u32::from_le_bytes(*bytes)
    }
}
