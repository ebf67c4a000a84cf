/*++

Licensed under the Apache-2.0 license.

File Name:

    firm.rs

Abstract:

    FIRM boot image header parsing.

--*/

use crate::{CtrbootError, CtrbootResult};

/// "FIRM" in little-endian byte order.
pub const FIRM_MAGIC: u32 = 0x4D52_4946;

/// Parsed header length in bytes.
pub const FIRM_HEADER_SIZE: usize = 0x100;

const SECTION_TABLE_OFFSET: usize = 0x40;
const SECTION_ENTRY_SIZE: usize = 0x30;

fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

/// One loadable section: where it sits in the image, where it loads, and
/// its expected hash.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FirmSectionHeader {
    pub offset: u32,
    pub address: u32,
    pub size: u32,
    pub proc_type: u32,
    pub hash: [u8; 0x20],
}

impl FirmSectionHeader {
    fn parse(buf: &[u8]) -> FirmSectionHeader {
        let mut hash = [0u8; 0x20];
        hash.copy_from_slice(&buf[0x10..0x30]);
        FirmSectionHeader {
            offset: read_u32_le(buf, 0x00),
            address: read_u32_le(buf, 0x04),
            size: read_u32_le(buf, 0x08),
            proc_type: read_u32_le(buf, 0x0C),
            hash,
        }
    }

    /// Unused table entries have zero size.
    pub fn is_present(&self) -> bool {
        self.size != 0
    }
}

/// Boot image header: entrypoints for both cores and up to four sections.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FirmHeader {
    pub arm11_entry: u32,
    pub arm9_entry: u32,
    pub sections: [FirmSectionHeader; 4],
}

impl FirmHeader {
    pub fn parse(buf: &[u8]) -> CtrbootResult<FirmHeader> {
        if buf.len() < FIRM_HEADER_SIZE {
            return Err(CtrbootError::FIRM_HEADER_TOO_SMALL);
        }
        if read_u32_le(buf, 0x00) != FIRM_MAGIC {
            return Err(CtrbootError::FIRM_BAD_MAGIC);
        }

        let mut sections = [FirmSectionHeader {
            offset: 0,
            address: 0,
            size: 0,
            proc_type: 0,
            hash: [0u8; 0x20],
        }; 4];
        for (index, section) in sections.iter_mut().enumerate() {
            let start = SECTION_TABLE_OFFSET + index * SECTION_ENTRY_SIZE;
            *section = FirmSectionHeader::parse(&buf[start..start + SECTION_ENTRY_SIZE]);
        }

        Ok(FirmHeader {
            arm11_entry: read_u32_le(buf, 0x08),
            arm9_entry: read_u32_le(buf, 0x0C),
            sections,
        })
    }
}
