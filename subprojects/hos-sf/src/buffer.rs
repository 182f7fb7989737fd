//! Bulk-transfer buffer views.
//!
//! Large payloads (save-data listings, firmware version blobs, shop
//! responses) do not travel through the argument stream: the guest describes
//! them with HIPC descriptors (address + size + access flags) and the kernel
//! boundary resolves those ranges against guest memory before dispatch. A
//! handler sees them as [`InBuffer`] / [`OutBuffer`] views it reads or fills
//! directly, preserving zero-copy semantics with respect to the marshaled
//! arguments.
//!
//! Descriptor taxonomy (Switchbrew naming): Send (A) and Send Static (X)
//! resolve to [`InBuffer`]; Recv (B) and Recv List (C) resolve to
//! [`OutBuffer`]; Exchange (W) resolves to one of each over the same range.

use bitflags::bitflags;
use zerocopy::{Immutable, IntoBytes};

use crate::request::ProtocolViolation;

bitflags! {
    /// Access and transfer-mode flags carried by a buffer descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BufferFlags: u32 {
        /// Guest-to-service direction.
        const IN = 1 << 0;
        /// Service-to-guest direction.
        const OUT = 1 << 1;
        /// Transferred by memory mapping (HIPC Type A/B/W).
        const MAP_ALIAS = 1 << 2;
        /// Transferred by kernel copy (HIPC Type X/C).
        const POINTER = 1 << 3;
        /// Fixed-size pointer transfer.
        const FIXED_SIZE = 1 << 4;
        /// Size-dependent selection between mapping and pointer transfer.
        const AUTO_SELECT = 1 << 5;
    }
}

/// A resolved guest-to-service bulk buffer.
#[derive(Debug, Clone)]
pub struct InBuffer {
    flags: BufferFlags,
    data: Vec<u8>,
}

impl InBuffer {
    /// Wraps resolved guest bytes with their descriptor flags.
    pub fn new(flags: BufferFlags, data: Vec<u8>) -> Self {
        Self {
            flags: flags | BufferFlags::IN,
            data,
        }
    }

    /// Returns the descriptor flags.
    #[inline]
    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    /// Returns the buffer contents.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Returns the buffer length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A resolved service-to-guest bulk buffer.
///
/// Pre-sized to the capacity the guest declared; the kernel boundary copies
/// the contents back into the guest range after dispatch.
#[derive(Debug, Clone)]
pub struct OutBuffer {
    flags: BufferFlags,
    data: Vec<u8>,
}

impl OutBuffer {
    /// Allocates a zeroed buffer of the guest-declared capacity.
    pub fn new(flags: BufferFlags, capacity: usize) -> Self {
        Self {
            flags: flags | BufferFlags::OUT,
            data: vec![0; capacity],
        }
    }

    /// Returns the descriptor flags.
    #[inline]
    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    /// Returns the guest-declared capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Returns the buffer contents.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Returns the buffer contents for direct writing.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Writes a wire value at the given byte offset.
    ///
    /// Fails if the value does not fit within the guest-declared capacity;
    /// a handler overrunning a guest buffer is a protocol violation, never a
    /// silent truncation.
    pub fn write<T: IntoBytes + Immutable>(
        &mut self,
        offset: usize,
        value: &T,
    ) -> Result<(), ProtocolViolation> {
        self.write_bytes(offset, value.as_bytes())
    }

    /// Writes raw bytes at the given byte offset, bounds-checked.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<(), ProtocolViolation> {
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= self.data.len())
            .ok_or(ProtocolViolation::OutBufferOverflow {
                offset,
                len: bytes.len(),
                capacity: self.data.len(),
            })?;
        self.data[offset..end].copy_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_buffer_bounds_checked() {
        let mut buf = OutBuffer::new(BufferFlags::MAP_ALIAS, 8);
        assert!(buf.write(0, &0x1122_3344u32).is_ok());
        assert!(buf.write(4, &0x5566_7788u32).is_ok());
        assert!(buf.write(5, &0u32).is_err());
        assert_eq!(&buf.as_slice()[..4], &0x1122_3344u32.to_le_bytes());
    }

    #[test]
    fn direction_flags_implied() {
        let inbuf = InBuffer::new(BufferFlags::POINTER, vec![1, 2, 3]);
        assert!(inbuf.flags().contains(BufferFlags::IN));
        let outbuf = OutBuffer::new(BufferFlags::MAP_ALIAS, 4);
        assert!(outbuf.flags().contains(BufferFlags::OUT));
    }
}
