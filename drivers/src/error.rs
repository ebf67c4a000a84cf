/*++

Licensed under the Apache-2.0 license.

File Name:

    error.rs

Abstract:

    File contains the error type used by the library for caller-geometry
    violations. The crypto path itself has no failure signal: wrong keys,
    counters or word formats produce wrong bytes, which only a downstream
    integrity check can catch.

--*/

use core::num::NonZeroU32;

/// Library error type. The wrapped value is a component-coded constant.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CtrbootError(pub NonZeroU32);

impl CtrbootError {
    /// Create an error constant; intended only for const contexts so a zero
    /// value fails at compile time rather than at runtime.
    const fn new_const(val: u32) -> Self {
        match NonZeroU32::new(val) {
            Some(val) => Self(val),
            None => panic!("CtrbootError cannot be 0"),
        }
    }

    pub const DRIVER_AES_INVALID_SLICE: CtrbootError = CtrbootError::new_const(0x0001_0001);
    pub const DRIVER_AES_INVALID_REGION: CtrbootError = CtrbootError::new_const(0x0001_0002);
    pub const DRIVER_AES_MISSING_IV: CtrbootError = CtrbootError::new_const(0x0001_0003);

    pub const DRIVER_SHA_DIGEST_BUFFER_TOO_SMALL: CtrbootError = CtrbootError::new_const(0x0002_0001);

    pub const NAND_BUFFER_TOO_SMALL: CtrbootError = CtrbootError::new_const(0x0003_0001);

    pub const UNLOCK_IMAGE_TOO_SMALL: CtrbootError = CtrbootError::new_const(0x0004_0001);

    pub const NCCH_IMAGE_TOO_SMALL: CtrbootError = CtrbootError::new_const(0x0005_0001);
    pub const NCCH_REGION_OUT_OF_BOUNDS: CtrbootError = CtrbootError::new_const(0x0005_0002);

    pub const FIRM_HEADER_TOO_SMALL: CtrbootError = CtrbootError::new_const(0x0006_0001);
    pub const FIRM_BAD_MAGIC: CtrbootError = CtrbootError::new_const(0x0006_0002);
}

impl From<CtrbootError> for u32 {
    fn from(val: CtrbootError) -> Self {
        val.0.get()
    }
}
