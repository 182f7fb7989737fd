//! CMIF (Command Message Interface Format) framing, server side.
//!
//! CMIF is the command serialization layer of the Horizon IPC stack. A
//! request payload starts with a 16-byte [`InHeader`] carrying the `"SFCI"`
//! magic and the command id; a reply starts with a 16-byte [`OutHeader`]
//! carrying `"SFCO"` and the result code. Domain sessions prepend a
//! [`DomainInHeader`]/[`DomainOutHeader`] that routes the message to one of
//! several service objects multiplexed over the same session handle.
//!
//! Guest software was compiled against these exact layouts, so every struct
//! here is `#[repr(C)]` with its size asserted.
//!
//! # References
//!
//! - [Switchbrew IPC Marshalling](https://switchbrew.org/wiki/IPC_Marshalling)

use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Magic number for CMIF input headers (`"SFCI"`).
pub const IN_HEADER_MAGIC: u32 = 0x49434653;

/// Magic number for CMIF output headers (`"SFCO"`).
pub const OUT_HEADER_MAGIC: u32 = 0x4F434653;

/// CMIF command type, carried in the HIPC message type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CommandType {
    /// Invalid command.
    Invalid = 0,
    /// Legacy request (pre-5.0.0).
    LegacyRequest = 1,
    /// Close session.
    Close = 2,
    /// Legacy control request.
    LegacyControl = 3,
    /// Standard request.
    Request = 4,
    /// Control request (domain conversion, cloning, etc.).
    Control = 5,
    /// Request with context token (5.0.0+).
    RequestWithContext = 6,
    /// Control request with context token.
    ControlWithContext = 7,
}

impl CommandType {
    /// Converts a raw HIPC message type value.
    pub const fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            0 => Self::Invalid,
            1 => Self::LegacyRequest,
            2 => Self::Close,
            3 => Self::LegacyControl,
            4 => Self::Request,
            5 => Self::Control,
            6 => Self::RequestWithContext,
            7 => Self::ControlWithContext,
            _ => return None,
        })
    }

    /// Returns `true` for the request flavors (with or without context).
    #[inline]
    pub const fn is_request(self) -> bool {
        matches!(self, Self::Request | Self::RequestWithContext)
    }

    /// Returns `true` for the control flavors (with or without context).
    #[inline]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Control | Self::ControlWithContext)
    }
}

/// Domain request command, stored in the domain header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DomainCommand {
    /// Send a message to a domain object.
    SendMessage = 1,
    /// Close a single domain object.
    CloseObject = 2,
}

impl DomainCommand {
    /// Converts a raw domain command byte.
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::SendMessage),
            2 => Some(Self::CloseObject),
            _ => None,
        }
    }
}

/// Control request ids for CMIF session management.
pub mod control {
    /// Convert the session to a domain.
    pub const CONVERT_TO_DOMAIN: u32 = 0;
    /// Copy a domain object out to a standalone session.
    pub const COPY_FROM_CURRENT_DOMAIN: u32 = 1;
    /// Clone the current session object.
    pub const CLONE_OBJECT: u32 = 2;
    /// Query the server's pointer buffer capacity.
    pub const QUERY_POINTER_BUFFER_SIZE: u32 = 3;
    /// Clone the current session object with a tag.
    pub const CLONE_OBJECT_EX: u32 = 4;
}

/// CMIF input header (16 bytes), at the start of every request payload.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct InHeader {
    /// Magic number (`"SFCI"`).
    pub magic: u32,
    /// Protocol version (0 = standard, 1 = with context).
    pub version: u32,
    /// Command id to invoke.
    pub command_id: u32,
    /// Context token (non-domain only).
    pub token: u32,
}
const_assert_eq!(size_of::<InHeader>(), 16);

/// CMIF output header (16 bytes), at the start of every reply payload.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct OutHeader {
    /// Magic number (`"SFCO"`).
    pub magic: u32,
    /// Protocol version.
    pub version: u32,
    /// Result code (0 = success).
    pub result: u32,
    /// Echo of the request token.
    pub token: u32,
}
const_assert_eq!(size_of::<OutHeader>(), 16);

/// Domain input header (16 bytes), prepended to the CMIF header on domain
/// sessions.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct DomainInHeader {
    /// Domain command (see [`DomainCommand`]).
    pub command: u8,
    /// Number of input object ids trailing the payload.
    pub num_in_objects: u8,
    /// Size of the CMIF header plus payload.
    pub data_size: u16,
    /// Target object id within the domain.
    pub object_id: u32,
    /// Reserved padding.
    pub _padding: u32,
    /// Context token.
    pub token: u32,
}
const_assert_eq!(size_of::<DomainInHeader>(), 16);

/// Domain output header (16 bytes), prepended to the CMIF header on domain
/// replies.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct DomainOutHeader {
    /// Number of object ids returned after the payload.
    pub num_out_objects: u32,
    /// Reserved padding.
    pub _padding: [u32; 3],
}
const_assert_eq!(size_of::<DomainOutHeader>(), 16);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magics_spell_sfci_sfco() {
        assert_eq!(&IN_HEADER_MAGIC.to_le_bytes(), b"SFCI");
        assert_eq!(&OUT_HEADER_MAGIC.to_le_bytes(), b"SFCO");
    }

    #[test]
    fn command_type_round_trip() {
        for raw in 0..8u16 {
            let ty = CommandType::from_raw(raw).unwrap();
            assert_eq!(ty as u16, raw);
        }
        assert!(CommandType::from_raw(8).is_none());
    }

    #[test]
    fn domain_command_rejects_invalid() {
        assert_eq!(DomainCommand::from_raw(1), Some(DomainCommand::SendMessage));
        assert_eq!(DomainCommand::from_raw(2), Some(DomainCommand::CloseObject));
        assert!(DomainCommand::from_raw(0).is_none());
        assert!(DomainCommand::from_raw(3).is_none());
    }
}
