//! Horizon OS result codes for HLE service handlers.
//!
//! Every service operation terminates with a 32-bit result code that guest
//! software branches on, so the encoding is frozen by the guest ABI and must
//! be reproduced bit-exactly.
//!
//! # Structure
//!
//! The 32-bit result code is structured as follows:
//!
//! - **Bits 0-8:** Module ID
//! - **Bits 9-21:** Description
//! - **Bits 22-31:** Reserved (zero)
//!
//! Zero is the success sentinel. Error codes are conventionally displayed as
//! `2XXX-YYYY` where `XXX` is `2000` + module and `YYYY` is the description.
//!
//! # References
//!
//! - [Switchbrew Wiki: Error codes](https://switchbrew.org/wiki/Error_codes)

use static_assertions::const_assert_eq;

/// Type alias for Result with [`Error`] as the error type.
///
/// This is the return type of every service command handler: `Ok(())` maps to
/// the zero result code on the wire, `Err(e)` to `e`'s raw value.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// The raw success value.
pub const SUCCESS: u32 = 0;

/// Mask for the module field (9 bits).
const MODULE_MASK: u32 = 0x1FF;
/// Mask for the description field (13 bits).
const DESCRIPTION_MASK: u32 = 0x1FFF;
/// Shift amount for the description field.
const DESCRIPTION_SHIFT: u32 = 9;

/// Error module identifiers used by this substrate.
///
/// Values follow the emulated platform's assignment; only the modules the
/// substrate and its services actually return are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Module {
    /// Kernel (handle and session level failures).
    Kernel = 1,
    /// Filesystem services.
    Fs = 2,
    /// OS layer (host-internal fault conversion target).
    Os = 3,
    /// Service framework (command dispatch).
    Sf = 10,
    /// IPC transport.
    Hipc = 11,
    /// Service manager.
    Sm = 21,
    /// Network interface manager.
    Nifm = 110,
    /// Applet manager.
    Am = 128,
    /// Network install manager (shop services).
    Nim = 137,
    /// Capture services.
    Capsrv = 206,
}

/// A Horizon OS result code, success or failure.
///
/// This is the wire representation handlers and the dispatcher exchange; it is
/// exactly the `u32` the guest receives in the reply header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ResultCode(u32);

const_assert_eq!(size_of::<ResultCode>(), size_of::<u32>());

impl ResultCode {
    /// The success result.
    pub const SUCCESS: Self = Self(SUCCESS);

    /// Creates a result code from a raw `u32` value.
    #[inline]
    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Creates a result code from a module and description.
    #[inline]
    pub const fn from_parts(module: Module, description: u32) -> Self {
        Self((module as u32 & MODULE_MASK) | ((description & DESCRIPTION_MASK) << DESCRIPTION_SHIFT))
    }

    /// Returns the raw `u32` value.
    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    /// Returns `true` if this code represents success.
    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 == SUCCESS
    }

    /// Returns the raw module field.
    #[inline]
    pub const fn module(self) -> u32 {
        self.0 & MODULE_MASK
    }

    /// Returns the description field.
    #[inline]
    pub const fn description(self) -> u32 {
        (self.0 >> DESCRIPTION_SHIFT) & DESCRIPTION_MASK
    }

    /// Converts into a `Result`, mapping non-zero codes to [`Error`].
    #[inline]
    pub const fn into_result(self) -> Result<()> {
        match Error::new(self) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl core::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}-{:04}", 2000 + self.module(), self.description())
    }
}

impl From<Error> for ResultCode {
    #[inline]
    fn from(err: Error) -> Self {
        err.code()
    }
}

/// A non-zero result code, for use as the error half of [`Result`].
///
/// Guaranteed to never hold the success value, so `Result<(), Error>` and the
/// wire `u32` convert losslessly in both directions.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Error(ResultCode);

impl Error {
    /// Wraps a result code, returning `None` for success.
    #[inline]
    pub const fn new(code: ResultCode) -> Option<Self> {
        if code.is_success() {
            None
        } else {
            Some(Self(code))
        }
    }

    /// Creates an error directly from a module and description.
    ///
    /// # Panics
    ///
    /// Panics if the combination encodes to zero, which no valid module does.
    #[inline]
    pub const fn from_parts(module: Module, description: u32) -> Self {
        let code = ResultCode::from_parts(module, description);
        assert!(!code.is_success());
        Self(code)
    }

    /// Returns the underlying result code.
    #[inline]
    pub const fn code(self) -> ResultCode {
        self.0
    }

    /// Returns the raw `u32` value.
    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0.to_raw()
    }

    /// Returns the raw module field.
    #[inline]
    pub const fn module(self) -> u32 {
        self.0.module()
    }

    /// Returns the description field.
    #[inline]
    pub const fn description(self) -> u32 {
        self.0.description()
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

impl core::fmt::Debug for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Error")
            .field("code", &format_args!("{}", self.0))
            .field("raw", &format_args!("{:#x}", self.0.to_raw()))
            .finish()
    }
}

impl core::error::Error for Error {}

/// Named result codes the substrate itself produces.
pub mod codes {
    use super::{Error, Module};

    /// The target session was closed (kernel, 2001-0123).
    pub const SESSION_CLOSED: Error = Error::from_parts(Module::Kernel, 123);
    /// A handle did not name a live kernel object (kernel, 2001-0114).
    pub const INVALID_HANDLE: Error = Error::from_parts(Module::Kernel, 114);
    /// The handle table is out of free slots (kernel, 2001-0105).
    pub const OUT_OF_HANDLES: Error = Error::from_parts(Module::Kernel, 105);
    /// The command id is absent from the service's table (sf, 2010-0221).
    pub const UNKNOWN_COMMAND: Error = Error::from_parts(Module::Sf, 221);
    /// The request carried a malformed command header (sf, 2010-0211).
    pub const INVALID_HEADER: Error = Error::from_parts(Module::Sf, 211);
    /// A host-side defect was contained at the dispatch boundary (os, 2003-0004).
    pub const INTERNAL_ERROR: Error = Error::from_parts(Module::Os, 4);
    /// No service is registered under the requested name (sm, 2021-0007).
    pub const SERVICE_NOT_REGISTERED: Error = Error::from_parts(Module::Sm, 7);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_zero() {
        assert!(ResultCode::SUCCESS.is_success());
        assert_eq!(ResultCode::SUCCESS.to_raw(), 0);
        assert!(ResultCode::from_raw(0).into_result().is_ok());
    }

    #[test]
    fn parts_round_trip() {
        let code = ResultCode::from_parts(Module::Sm, 7);
        assert_eq!(code.module(), 21);
        assert_eq!(code.description(), 7);
        assert!(!code.is_success());
    }

    #[test]
    fn wire_values_match_guest_abi() {
        // Values guest software is known to branch on.
        assert_eq!(codes::SESSION_CLOSED.to_raw(), 0xF601);
        assert_eq!(codes::INVALID_HANDLE.to_raw(), 0xE401);
        assert_eq!(codes::UNKNOWN_COMMAND.to_raw(), 221 << 9 | 10);
    }

    #[test]
    fn display_format() {
        assert_eq!(format!("{}", codes::SESSION_CLOSED), "2001-0123");
        assert_eq!(format!("{}", codes::UNKNOWN_COMMAND), "2010-0221");
    }

    #[test]
    fn error_refuses_success() {
        assert!(Error::new(ResultCode::SUCCESS).is_none());
        assert!(Error::new(ResultCode::from_raw(0xF601)).is_some());
    }
}
