//! Settings services (`set`, `set:sys`).
//!
//! Surfaces the host-configured language and a canned firmware version to
//! the guest. The firmware version blob is what version-gated titles branch
//! on, so its 0x100-byte layout is reproduced exactly.

use hos_sf::{IpcRequest, IpcResponse};
use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{CommandResult, ServiceContext, service_commands};

/// Firmware version reported to the guest.
const FIRMWARE_MAJOR: u8 = 15;
const FIRMWARE_MINOR: u8 = 0;
const FIRMWARE_PATCH: u8 = 0;
const FIRMWARE_PLATFORM: &[u8] = b"NX";
const FIRMWARE_HASH: &[u8] = b"4de65c071fd0869695b7629f75eb97b2551dbf2f";
const FIRMWARE_DISPLAY_VERSION: &[u8] = b"15.0.0";
const FIRMWARE_DISPLAY_TITLE: &[u8] = b"NintendoSDK Firmware for NX 15.0.0-1.0";

/// Firmware version blob returned by `GetFirmwareVersion` (0x100 bytes).
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct FirmwareVersion {
    /// Major version number.
    pub major: u8,
    /// Minor version number.
    pub minor: u8,
    /// Patch version number.
    pub patch: u8,
    /// Padding (alignment).
    pub _pad1: u8,
    /// Revision major number.
    pub revision_major: u8,
    /// Revision minor number.
    pub revision_minor: u8,
    /// Padding (alignment).
    pub _pad2: [u8; 2],
    /// Platform identifier string (e.g., "NX").
    pub platform: [u8; 0x20],
    /// Version hash string (build identifier).
    pub version_hash: [u8; 0x40],
    /// Display version string (e.g., "15.0.0").
    pub display_version: [u8; 0x18],
    /// Display title string (full firmware title).
    pub display_title: [u8; 0x80],
}
const_assert_eq!(size_of::<FirmwareVersion>(), 0x100);

impl FirmwareVersion {
    /// Builds the canned version blob this emulator reports.
    fn current() -> Self {
        Self {
            major: FIRMWARE_MAJOR,
            minor: FIRMWARE_MINOR,
            patch: FIRMWARE_PATCH,
            _pad1: 0,
            revision_major: 1,
            revision_minor: 0,
            _pad2: [0; 2],
            platform: copy_padded(FIRMWARE_PLATFORM),
            version_hash: copy_padded(FIRMWARE_HASH),
            display_version: copy_padded(FIRMWARE_DISPLAY_VERSION),
            display_title: copy_padded(FIRMWARE_DISPLAY_TITLE),
        }
    }
}

/// Copies a string into a zero-padded fixed field.
fn copy_padded<const N: usize>(value: &[u8]) -> [u8; N] {
    let mut field = [0u8; N];
    field[..value.len()].copy_from_slice(value);
    field
}

/// Packs a BCP-47 tag into the guest's 8-byte language-code value.
pub(crate) fn language_code(tag: &str) -> u64 {
    let mut packed = [0u8; 8];
    for (slot, byte) in packed.iter_mut().zip(tag.bytes()) {
        *slot = byte;
    }
    u64::from_le_bytes(packed)
}

/// `set` — user settings queries.
#[derive(Debug, Default)]
pub struct ISettingsServer;

impl ISettingsServer {
    /// Returns the configured system language code.
    fn get_language_code(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        res.push(language_code(&ctx.state.settings().language));
        Ok(())
    }

    /// Writes the supported language codes into the output buffer and
    /// pushes how many were written.
    fn get_available_language_codes(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        let configured = language_code(&ctx.state.settings().language);
        let out = res.out_buffer(0)?;

        let mut written = 0i32;
        if out.capacity() >= size_of::<u64>() {
            out.write(0, &configured)?;
            written = 1;
        }
        res.push(written);
        Ok(())
    }
}

service_commands! {
    impl ISettingsServer {
        0x0 => get_language_code,
        0x1 => get_available_language_codes,
    }
}

/// `set:sys` — system settings queries.
#[derive(Debug, Default)]
pub struct ISystemSettingsServer;

impl ISystemSettingsServer {
    /// Pre-3.0.0 firmware version query; the revision field is zeroed.
    fn get_firmware_version(
        &mut self,
        _ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        let mut version = FirmwareVersion::current();
        version.revision_major = 0;
        version.revision_minor = 0;
        res.out_buffer(0)?.write(0, &version)?;
        Ok(())
    }

    /// 3.0.0+ firmware version query; the revision field is preserved.
    fn get_firmware_version2(
        &mut self,
        _ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        res.out_buffer(0)?.write(0, &FirmwareVersion::current())?;
        Ok(())
    }
}

service_commands! {
    impl ISystemSettingsServer {
        0x3 => get_firmware_version,
        0x4 => get_firmware_version2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firmware_blob_is_wire_sized() {
        let version = FirmwareVersion::current();
        assert_eq!(version.as_bytes().len(), 0x100);
        assert_eq!(&version.platform[..2], b"NX");
        assert_eq!(version.major, 15);
    }

    #[test]
    fn padded_copy_zero_fills() {
        let field: [u8; 8] = copy_padded(b"NX");
        assert_eq!(&field, b"NX\0\0\0\0\0\0");
    }

    #[test]
    fn language_code_packs_ascii_tag() {
        assert_eq!(language_code("en-US"), u64::from_le_bytes(*b"en-US\0\0\0"));
        // Overlong tags truncate to the 8-byte field.
        assert_eq!(language_code("zh-Hans-CN"), u64::from_le_bytes(*b"zh-Hans-"));
    }
}
