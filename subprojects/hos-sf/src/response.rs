//! Reply accumulation and serialization.

use hos_result::ResultCode;
use zerocopy::{FromBytes, Immutable, IntoBytes};

use crate::{
    buffer::OutBuffer,
    cmif::{self, DomainOutHeader, OutHeader},
    request::ProtocolViolation,
};

/// Mutable accumulator for one command's reply.
///
/// Handlers append wire arguments in call order with [`push`](Self::push),
/// attach returned kernel handles with explicit copy/move semantics, and
/// fill guest out-buffers in place. The response owns no kernel state; the
/// dispatcher serializes it with [`into_reply`](Self::into_reply) once the
/// handler returns.
#[derive(Debug, Default)]
pub struct IpcResponse {
    data: Vec<u8>,
    copy_handles: Vec<u32>,
    move_handles: Vec<u32>,
    objects: Vec<u32>,
    out_buffers: Vec<OutBuffer>,
}

impl IpcResponse {
    /// Creates a response owning the pre-sized guest out-buffers.
    pub fn new(out_buffers: Vec<OutBuffer>) -> Self {
        Self {
            out_buffers,
            ..Self::default()
        }
    }

    /// Appends a wire value to the argument stream.
    ///
    /// Bytes land in the guest's little-endian layout with no implicit
    /// alignment, mirroring [`IpcRequest::pop`](crate::IpcRequest::pop).
    pub fn push<T: IntoBytes + Immutable>(&mut self, value: T) {
        self.data.extend_from_slice(value.as_bytes());
    }

    /// Appends raw bytes to the argument stream.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Attaches a handle the guest receives a duplicate of.
    pub fn copy_handle(&mut self, handle: u32) {
        self.copy_handles.push(handle);
    }

    /// Attaches a handle whose ownership transfers to the guest.
    pub fn move_handle(&mut self, handle: u32) {
        self.move_handles.push(handle);
    }

    /// Attaches a domain object id (domain sessions only).
    pub fn push_object(&mut self, object_id: u32) {
        self.objects.push(object_id);
    }

    /// Returns the service-to-guest buffer at `index` for filling.
    pub fn out_buffer(&mut self, index: usize) -> Result<&mut OutBuffer, ProtocolViolation> {
        let count = self.out_buffers.len();
        self.out_buffers
            .get_mut(index)
            .ok_or(ProtocolViolation::BufferIndex { index, count })
    }

    /// Returns the bytes pushed so far.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.data.len()
    }

    /// Serializes into the wire reply the kernel boundary copies back.
    ///
    /// `is_domain` selects the framing of the target session; `token` echoes
    /// the request's context token. Whatever the handler pushed is copied
    /// verbatim even on failure: the result code alone signals the outcome,
    /// and any partial payload is guest-undefined by contract.
    pub fn into_reply(self, result: ResultCode, is_domain: bool, token: u32) -> ReplyBuffer {
        let header = OutHeader {
            magic: cmif::OUT_HEADER_MAGIC,
            version: 0,
            result: result.to_raw(),
            token,
        };

        let mut payload = Vec::new();
        if is_domain {
            let domain = DomainOutHeader {
                num_out_objects: self.objects.len() as u32,
                _padding: [0; 3],
            };
            payload.extend_from_slice(domain.as_bytes());
        }
        payload.extend_from_slice(header.as_bytes());
        payload.extend_from_slice(&self.data);
        if is_domain {
            for object_id in &self.objects {
                payload.extend_from_slice(&object_id.to_le_bytes());
            }
        }

        ReplyBuffer {
            result,
            is_domain,
            payload,
            copy_handles: self.copy_handles,
            move_handles: self.move_handles,
            out_buffers: self.out_buffers,
        }
    }
}

/// A serialized reply, ready for the kernel boundary.
#[derive(Debug)]
pub struct ReplyBuffer {
    /// The operation's result code, also embedded in the payload header.
    pub result: ResultCode,
    /// Whether the payload carries domain framing.
    pub is_domain: bool,
    /// CMIF reply bytes (headers, arguments, object ids).
    pub payload: Vec<u8>,
    /// Handles duplicated to the guest.
    pub copy_handles: Vec<u32>,
    /// Handles transferred to the guest.
    pub move_handles: Vec<u32>,
    /// Filled service-to-guest buffers.
    pub out_buffers: Vec<OutBuffer>,
}

impl ReplyBuffer {
    /// Reads back the CMIF output header.
    pub fn out_header(&self) -> Option<OutHeader> {
        let start = if self.is_domain {
            size_of::<DomainOutHeader>()
        } else {
            0
        };
        OutHeader::read_from_bytes(self.payload.get(start..start + size_of::<OutHeader>())?).ok()
    }

    /// Returns the argument bytes after the headers.
    pub fn data(&self) -> &[u8] {
        let mut start = size_of::<OutHeader>();
        let mut end = self.payload.len();
        if self.is_domain {
            start += size_of::<DomainOutHeader>();
            let num_objects = DomainOutHeader::read_from_bytes(
                &self.payload[..size_of::<DomainOutHeader>()],
            )
            .map(|hdr| hdr.num_out_objects as usize)
            .unwrap_or(0);
            end -= num_objects * size_of::<u32>();
        }
        &self.payload[start..end]
    }

    /// Returns the returned domain object ids.
    pub fn objects(&self) -> Vec<u32> {
        if !self.is_domain {
            return Vec::new();
        }
        let Ok(hdr) = DomainOutHeader::read_from_bytes(&self.payload[..size_of::<DomainOutHeader>()])
        else {
            return Vec::new();
        };
        let count = hdr.num_out_objects as usize;
        let start = self.payload.len() - count * size_of::<u32>();
        self.payload[start..]
            .chunks_exact(size_of::<u32>())
            .map(|raw| u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use hos_result::codes;
    use proptest::prelude::*;

    use super::*;
    use crate::request::{CommandBuffer, IpcRequest, ParsedRequest};

    #[test]
    fn reply_header_carries_result() {
        let response = IpcResponse::default();
        let reply = response.into_reply(codes::UNKNOWN_COMMAND.code(), false, 0);

        let header = reply.out_header().unwrap();
        assert_eq!(&header.magic.to_le_bytes(), b"SFCO");
        assert_eq!(header.result, codes::UNKNOWN_COMMAND.to_raw());
        assert!(reply.data().is_empty());
    }

    #[test]
    fn domain_reply_carries_objects() {
        let mut response = IpcResponse::default();
        response.push(1u32);
        response.push_object(4);
        response.push_object(9);
        let reply = response.into_reply(ResultCode::SUCCESS, true, 0);

        assert_eq!(reply.objects(), vec![4, 9]);
        assert_eq!(reply.data(), &1u32.to_le_bytes());
    }

    /// Round-trip: bytes pushed into a response pop back bit-identical on
    /// the receiving side.
    fn round_trip(args: &[(u64, u32, u8)]) {
        let mut response = IpcResponse::default();
        for &(a, b, c) in args {
            response.push(a);
            response.push(b);
            response.push(c);
        }
        let reply = response.into_reply(ResultCode::SUCCESS, false, 0);

        // Rebuild the data section as a request argument stream.
        let buffer = CommandBuffer::request(0).arg_bytes(reply.data()).build();
        let ParsedRequest::Command(mut req) =
            IpcRequest::parse(buffer.payload, false, vec![], vec![], vec![]).unwrap()
        else {
            unreachable!()
        };

        for &(a, b, c) in args {
            assert_eq!(req.pop::<u64>().unwrap(), a);
            assert_eq!(req.pop::<u32>().unwrap(), b);
            assert_eq!(req.pop::<u8>().unwrap(), c);
        }
        assert_eq!(req.remaining(), 0);
    }

    #[test]
    fn push_pop_round_trip() {
        round_trip(&[(u64::MAX, 0, 0x7F), (0, u32::MAX, 0), (0x0123_4567_89AB_CDEF, 42, 1)]);
    }

    proptest! {
        #[test]
        fn push_pop_round_trip_any_bits(args in prop::collection::vec(any::<(u64, u32, u8)>(), 0..16)) {
            round_trip(&args);
        }
    }
}
