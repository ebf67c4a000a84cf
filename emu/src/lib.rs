/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    Software models of the AES and SHA accelerators. The models implement the
    same register contract the hardware binding exposes, so driver code can be
    exercised on the host without the physical engines.

--*/

mod aes;
mod helpers;
mod sha;

pub use crate::aes::{derive_normal_key, AesAccel};
pub use crate::sha::ShaAccel;
