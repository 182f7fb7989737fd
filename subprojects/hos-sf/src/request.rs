//! Incoming request parsing and the typed argument stream.

use zerocopy::FromBytes;

use crate::{
    buffer::{BufferFlags, InBuffer, OutBuffer},
    cmif::{self, CommandType, DomainCommand, DomainInHeader, InHeader},
};

/// A malformed request or a host/guest protocol mismatch.
///
/// These are substrate-detected defects, not normal guest-visible failures:
/// the dispatcher surfaces them as a specific error result instead of
/// letting a handler read garbage or the host crash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    /// `pop` requested more bytes than the argument stream holds.
    #[error("argument stream exhausted: requested {requested} bytes, {remaining} remaining")]
    PopOutOfBounds {
        /// Bytes the failed `pop` asked for.
        requested: usize,
        /// Bytes left in the stream.
        remaining: usize,
    },
    /// The payload is too short to hold its declared headers.
    #[error("truncated command payload ({len} bytes)")]
    Truncated {
        /// Total payload length.
        len: usize,
    },
    /// The CMIF input header carried the wrong magic.
    #[error("invalid CMIF magic {found:#010x}")]
    BadMagic {
        /// Value found where `"SFCI"` was expected.
        found: u32,
    },
    /// The domain header carried an unknown command byte.
    #[error("invalid domain command {0:#04x}")]
    BadDomainCommand(u8),
    /// A handler asked for a buffer descriptor that was not supplied.
    #[error("buffer index {index} out of range ({count} descriptors)")]
    BufferIndex {
        /// Requested descriptor index.
        index: usize,
        /// Descriptors actually supplied.
        count: usize,
    },
    /// A handler asked for a handle slot that was not supplied.
    #[error("handle slot {index} out of range ({count} handles)")]
    HandleIndex {
        /// Requested slot index.
        index: usize,
        /// Handles actually supplied.
        count: usize,
    },
    /// A handler wrote past the end of a guest out-buffer.
    #[error("out-buffer write of {len} bytes at offset {offset} exceeds capacity {capacity}")]
    OutBufferOverflow {
        /// Write offset.
        offset: usize,
        /// Write length.
        len: usize,
        /// Guest-declared capacity.
        capacity: usize,
    },
}

impl From<ProtocolViolation> for hos_result::Error {
    /// Protocol violations surface to the guest as a malformed-header
    /// failure; the host-side detail stays in the logs.
    fn from(_: ProtocolViolation) -> Self {
        hos_result::codes::INVALID_HEADER
    }
}

/// The raw material the kernel boundary delivers for one IPC call.
///
/// HIPC framing has already been stripped: descriptors are resolved to byte
/// views, handles are split into their copy/move lists, and the CMIF payload
/// is carried verbatim.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    /// CMIF command type from the HIPC message type field.
    pub command_type: Option<CommandType>,
    /// CMIF payload bytes (headers plus arguments).
    pub payload: Vec<u8>,
    /// Resolved guest-to-service buffers, in descriptor order.
    pub in_buffers: Vec<InBuffer>,
    /// Pre-sized service-to-guest buffers, in descriptor order.
    pub out_buffers: Vec<OutBuffer>,
    /// Handles the guest shares (it keeps its own).
    pub copy_handles: Vec<u32>,
    /// Handles the guest transfers (it loses them).
    pub move_handles: Vec<u32>,
}

impl CommandBuffer {
    /// Starts a builder for a standard request.
    pub fn request(command_id: u32) -> RequestBuilder {
        RequestBuilder::new(CommandType::Request, command_id)
    }

    /// Starts a builder for a control request.
    pub fn control(control_id: u32) -> RequestBuilder {
        RequestBuilder::new(CommandType::Control, control_id)
    }

    /// Builds a session-close message.
    pub fn close() -> Self {
        Self {
            command_type: Some(CommandType::Close),
            ..Self::default()
        }
    }
}

/// A request after CMIF framing has been validated.
#[derive(Debug)]
pub enum ParsedRequest {
    /// A command for a service instance (non-domain, or domain `SendMessage`).
    Command(IpcRequest),
    /// A domain `CloseObject` message.
    CloseObject {
        /// Domain object id to drop.
        object_id: u32,
    },
}

/// Immutable view over an incoming command's argument stream.
///
/// Arguments are consumed strictly in the order the service's ABI declares
/// via [`pop`](Self::pop); bulk buffers and handles are addressed by
/// descriptor index instead and never pass through the stream.
#[derive(Debug)]
pub struct IpcRequest {
    header: InHeader,
    domain_object: Option<u32>,
    data: Vec<u8>,
    cursor: usize,
    args_end: usize,
    in_objects: Vec<u32>,
    in_buffers: Vec<InBuffer>,
    copy_handles: Vec<u32>,
    move_handles: Vec<u32>,
}

impl IpcRequest {
    /// Parses the CMIF payload of a request-type message.
    ///
    /// `is_domain` reflects the target session's state; domain sessions carry
    /// the extra routing header and trailing object-id list.
    pub fn parse(
        payload: Vec<u8>,
        is_domain: bool,
        in_buffers: Vec<InBuffer>,
        copy_handles: Vec<u32>,
        move_handles: Vec<u32>,
    ) -> Result<ParsedRequest, ProtocolViolation> {
        let truncated = || ProtocolViolation::Truncated { len: payload.len() };

        let (domain_object, cmif_start, args_end, in_objects) = if is_domain {
            let domain = DomainInHeader::read_from_bytes(
                payload
                    .get(..size_of::<DomainInHeader>())
                    .ok_or_else(truncated)?,
            )
            .map_err(|_| truncated())?;

            match DomainCommand::from_raw(domain.command) {
                Some(DomainCommand::CloseObject) => {
                    return Ok(ParsedRequest::CloseObject {
                        object_id: domain.object_id,
                    });
                }
                Some(DomainCommand::SendMessage) => {}
                None => return Err(ProtocolViolation::BadDomainCommand(domain.command)),
            }

            // data_size covers the CMIF header plus arguments; anything
            // smaller cannot hold the header it claims to carry.
            if (domain.data_size as usize) < size_of::<InHeader>() {
                return Err(truncated());
            }
            let cmif_start = size_of::<DomainInHeader>();
            let args_end = cmif_start + domain.data_size as usize;
            if args_end > payload.len() {
                return Err(truncated());
            }

            let mut in_objects = Vec::with_capacity(domain.num_in_objects as usize);
            let mut offset = args_end;
            for _ in 0..domain.num_in_objects {
                let raw = payload
                    .get(offset..offset + size_of::<u32>())
                    .ok_or_else(truncated)?;
                in_objects.push(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]));
                offset += size_of::<u32>();
            }

            (Some(domain.object_id), cmif_start, args_end, in_objects)
        } else {
            (None, 0, payload.len(), Vec::new())
        };

        let header = InHeader::read_from_bytes(
            payload
                .get(cmif_start..cmif_start + size_of::<InHeader>())
                .ok_or_else(truncated)?,
        )
        .map_err(|_| truncated())?;

        if header.magic != cmif::IN_HEADER_MAGIC {
            return Err(ProtocolViolation::BadMagic {
                found: header.magic,
            });
        }

        Ok(ParsedRequest::Command(Self {
            header,
            domain_object,
            cursor: cmif_start + size_of::<InHeader>(),
            args_end,
            data: payload,
            in_objects,
            in_buffers,
            copy_handles,
            move_handles,
        }))
    }

    /// Returns the command id to dispatch on.
    #[inline]
    pub fn command_id(&self) -> u32 {
        self.header.command_id
    }

    /// Returns the context token from the request header.
    #[inline]
    pub fn token(&self) -> u32 {
        self.header.token
    }

    /// Returns the target domain object id, if this is a domain request.
    #[inline]
    pub fn domain_object(&self) -> Option<u32> {
        self.domain_object
    }

    /// Removes and returns the next `size_of::<T>()` bytes as a `T`.
    ///
    /// The bytes are reinterpreted in the guest's little-endian layout with
    /// no implicit alignment: handlers express ABI padding explicitly.
    pub fn pop<T: FromBytes + Copy>(&mut self) -> Result<T, ProtocolViolation> {
        let bytes = self.pop_bytes(size_of::<T>())?;
        // Length was just checked; read_from_bytes only fails on size mismatch.
        Ok(T::read_from_bytes(bytes).unwrap_or_else(|_| unreachable!()))
    }

    /// Removes and returns the next `len` raw bytes.
    pub fn pop_bytes(&mut self, len: usize) -> Result<&[u8], ProtocolViolation> {
        let remaining = self.args_end - self.cursor;
        if len > remaining {
            return Err(ProtocolViolation::PopOutOfBounds {
                requested: len,
                remaining,
            });
        }
        let start = self.cursor;
        self.cursor += len;
        Ok(&self.data[start..self.cursor])
    }

    /// Returns the bytes left in the argument stream.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.args_end - self.cursor
    }

    /// Returns the guest-to-service buffer at `index`.
    pub fn in_buffer(&self, index: usize) -> Result<&InBuffer, ProtocolViolation> {
        self.in_buffers
            .get(index)
            .ok_or(ProtocolViolation::BufferIndex {
                index,
                count: self.in_buffers.len(),
            })
    }

    /// Returns the shared (copy) handle at `index`.
    pub fn copy_handle(&self, index: usize) -> Result<u32, ProtocolViolation> {
        self.copy_handles
            .get(index)
            .copied()
            .ok_or(ProtocolViolation::HandleIndex {
                index,
                count: self.copy_handles.len(),
            })
    }

    /// Returns the transferred (move) handle at `index`.
    pub fn move_handle(&self, index: usize) -> Result<u32, ProtocolViolation> {
        self.move_handles
            .get(index)
            .copied()
            .ok_or(ProtocolViolation::HandleIndex {
                index,
                count: self.move_handles.len(),
            })
    }

    /// Returns the input domain object ids (domain requests only).
    #[inline]
    pub fn in_objects(&self) -> &[u32] {
        &self.in_objects
    }
}

/// Builder assembling wire-format [`CommandBuffer`]s.
///
/// This is the loopback counterpart of [`IpcRequest::parse`], producing the
/// exact byte layout a guest would submit. The integration tests and host
/// tooling drive the dispatcher through it.
#[derive(Debug)]
pub struct RequestBuilder {
    command_type: CommandType,
    command_id: u32,
    token: u32,
    domain_object: Option<u32>,
    args: Vec<u8>,
    in_objects: Vec<u32>,
    in_buffers: Vec<InBuffer>,
    out_buffers: Vec<OutBuffer>,
    copy_handles: Vec<u32>,
    move_handles: Vec<u32>,
}

impl RequestBuilder {
    fn new(command_type: CommandType, command_id: u32) -> Self {
        Self {
            command_type,
            command_id,
            token: 0,
            domain_object: None,
            args: Vec::new(),
            in_objects: Vec::new(),
            in_buffers: Vec::new(),
            out_buffers: Vec::new(),
            copy_handles: Vec::new(),
            move_handles: Vec::new(),
        }
    }

    /// Targets a domain object instead of the session root.
    pub fn domain_object(mut self, object_id: u32) -> Self {
        self.domain_object = Some(object_id);
        self
    }

    /// Appends a wire argument to the stream.
    pub fn arg<T: zerocopy::IntoBytes + zerocopy::Immutable>(mut self, value: T) -> Self {
        self.args.extend_from_slice(value.as_bytes());
        self
    }

    /// Appends raw bytes to the argument stream.
    pub fn arg_bytes(mut self, bytes: &[u8]) -> Self {
        self.args.extend_from_slice(bytes);
        self
    }

    /// Adds a guest-to-service bulk buffer.
    pub fn in_buffer(mut self, data: Vec<u8>) -> Self {
        self.in_buffers
            .push(InBuffer::new(BufferFlags::MAP_ALIAS, data));
        self
    }

    /// Declares a service-to-guest bulk buffer of the given capacity.
    pub fn out_buffer(mut self, capacity: usize) -> Self {
        self.out_buffers
            .push(OutBuffer::new(BufferFlags::MAP_ALIAS, capacity));
        self
    }

    /// Adds a shared (copy) handle.
    pub fn copy_handle(mut self, handle: u32) -> Self {
        self.copy_handles.push(handle);
        self
    }

    /// Adds a transferred (move) handle.
    pub fn move_handle(mut self, handle: u32) -> Self {
        self.move_handles.push(handle);
        self
    }

    /// Adds an input domain object id.
    pub fn in_object(mut self, object_id: u32) -> Self {
        self.in_objects.push(object_id);
        self
    }

    /// Serializes into the wire-format command buffer.
    pub fn build(self) -> CommandBuffer {
        use zerocopy::IntoBytes as _;

        let header = InHeader {
            magic: cmif::IN_HEADER_MAGIC,
            version: 0,
            command_id: self.command_id,
            token: self.token,
        };

        let mut payload = Vec::new();
        if let Some(object_id) = self.domain_object {
            let domain = DomainInHeader {
                command: DomainCommand::SendMessage as u8,
                num_in_objects: self.in_objects.len() as u8,
                data_size: (size_of::<InHeader>() + self.args.len()) as u16,
                object_id,
                _padding: 0,
                token: self.token,
            };
            payload.extend_from_slice(domain.as_bytes());
        }
        payload.extend_from_slice(header.as_bytes());
        payload.extend_from_slice(&self.args);
        for object_id in &self.in_objects {
            payload.extend_from_slice(&object_id.to_le_bytes());
        }

        CommandBuffer {
            command_type: Some(self.command_type),
            payload,
            in_buffers: self.in_buffers,
            out_buffers: self.out_buffers,
            copy_handles: self.copy_handles,
            move_handles: self.move_handles,
        }
    }

    /// Builds a domain `CloseObject` message for the given object.
    pub fn close_object(object_id: u32) -> CommandBuffer {
        use zerocopy::IntoBytes as _;

        let domain = DomainInHeader {
            command: DomainCommand::CloseObject as u8,
            num_in_objects: 0,
            data_size: 0,
            object_id,
            _padding: 0,
            token: 0,
        };
        CommandBuffer {
            command_type: Some(CommandType::Request),
            payload: domain.as_bytes().to_vec(),
            ..CommandBuffer::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_command(buffer: CommandBuffer, is_domain: bool) -> IpcRequest {
        match IpcRequest::parse(
            buffer.payload,
            is_domain,
            buffer.in_buffers,
            buffer.copy_handles,
            buffer.move_handles,
        )
        .unwrap()
        {
            ParsedRequest::Command(req) => req,
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn pop_in_declared_order() {
        let buffer = CommandBuffer::request(0x1)
            .arg(0x7Fu8)
            .arg([0u8; 3])
            .arg(0xDEAD_BEEFu32)
            .build();
        let mut req = parse_command(buffer, false);

        assert_eq!(req.command_id(), 0x1);
        assert_eq!(req.pop::<u8>().unwrap(), 0x7F);
        assert_eq!(req.pop::<[u8; 3]>().unwrap(), [0; 3]);
        assert_eq!(req.pop::<u32>().unwrap(), 0xDEAD_BEEF);
        assert_eq!(req.remaining(), 0);
    }

    #[test]
    fn pop_past_end_is_a_violation() {
        let buffer = CommandBuffer::request(0).arg(1u16).build();
        let mut req = parse_command(buffer, false);

        req.pop::<u16>().unwrap();
        assert_eq!(
            req.pop::<u32>(),
            Err(ProtocolViolation::PopOutOfBounds {
                requested: 4,
                remaining: 0,
            })
        );
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buffer = CommandBuffer::request(0).build();
        buffer.payload[0] ^= 0xFF;
        let err = IpcRequest::parse(buffer.payload, false, vec![], vec![], vec![]).unwrap_err();
        assert!(matches!(err, ProtocolViolation::BadMagic { .. }));
    }

    #[test]
    fn rejects_truncated_header() {
        let err = IpcRequest::parse(vec![0; 4], false, vec![], vec![], vec![]).unwrap_err();
        assert_eq!(err, ProtocolViolation::Truncated { len: 4 });
    }

    #[test]
    fn domain_request_routes_by_object() {
        let buffer = CommandBuffer::request(7)
            .domain_object(3)
            .arg(9u32)
            .in_object(5)
            .build();
        let mut req = parse_command(buffer, true);

        assert_eq!(req.domain_object(), Some(3));
        assert_eq!(req.in_objects(), &[5]);
        assert_eq!(req.pop::<u32>().unwrap(), 9);
        // The trailing object list is not part of the argument stream.
        assert_eq!(req.remaining(), 0);
    }

    #[test]
    fn domain_header_with_undersized_data_is_truncated() {
        let mut buffer = CommandBuffer::request(0).domain_object(1).build();
        // Corrupt data_size (offset 2) below the CMIF header size.
        buffer.payload[2] = 4;
        buffer.payload[3] = 0;
        let err = IpcRequest::parse(buffer.payload, true, vec![], vec![], vec![]).unwrap_err();
        assert!(matches!(err, ProtocolViolation::Truncated { .. }));
    }

    #[test]
    fn domain_close_object() {
        let buffer = RequestBuilder::close_object(2);
        match IpcRequest::parse(buffer.payload, true, vec![], vec![], vec![]).unwrap() {
            ParsedRequest::CloseObject { object_id } => assert_eq!(object_id, 2),
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[test]
    fn handles_live_outside_the_stream() {
        let buffer = CommandBuffer::request(0)
            .copy_handle(0xD001)
            .move_handle(0xD002)
            .build();
        let req = parse_command(buffer, false);

        assert_eq!(req.copy_handle(0).unwrap(), 0xD001);
        assert_eq!(req.move_handle(0).unwrap(), 0xD002);
        assert_eq!(
            req.copy_handle(1),
            Err(ProtocolViolation::HandleIndex { index: 1, count: 1 })
        );
        assert_eq!(req.remaining(), 0);
    }
}
