/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the early-boot crypto driver library.

--*/

#![cfg_attr(not(test), no_std)]

mod error;
mod wait;

pub mod aes;
pub mod counter;
pub mod firm;
pub mod key_slots;
pub mod nand;
pub mod ncch;
pub mod sha;
pub mod unlock;

pub use crate::aes::{Aes, AesMode, BlockRegion, AES_BLOCK_SIZE};
pub use crate::counter::WordFormat;
pub use crate::error::CtrbootError;
pub use crate::firm::{FirmHeader, FirmSectionHeader, FIRM_MAGIC};
pub use crate::key_slots::{KeyComponent, KeySlot, KeySlots};
pub use crate::nand::{ConsoleFamily, CtrNand, NandStorage, SECTOR_SIZE};
pub use crate::ncch::decrypt_exefs;
pub use crate::sha::{Sha, ShaMode};
pub use crate::unlock::{unlock, BootstageVersion};

pub type CtrbootResult<T> = Result<T, CtrbootError>;
