//! Service Framework (SF) wire layer for HLE service dispatch.
//!
//! This crate implements the server half of the Horizon OS IPC serialization
//! stack: it takes the command buffer a guest thread submitted, exposes it to
//! service handlers as a typed, cursor-ordered argument stream, and
//! accumulates the reply the kernel boundary copies back into guest memory.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  HLE services (psm, ts, fssrv, …)   │  Command handlers
//! ├─────────────────────────────────────┤
//! │  CMIF  ← this crate                 │  Command serialization
//! ├─────────────────────────────────────┤
//! │  Kernel boundary (out of scope)     │  HIPC framing, guest memory
//! └─────────────────────────────────────┘
//! ```
//!
//! The kernel boundary resolves HIPC descriptors against guest memory and
//! delivers a [`CommandBuffer`]: the CMIF payload bytes plus resolved bulk
//! buffers and handle lists. [`IpcRequest::parse`] validates the CMIF framing
//! and yields the handler-facing view; [`IpcResponse`] collects pushed
//! arguments, handles and domain objects, and [`IpcResponse::into_reply`]
//! serializes them back into wire form.
//!
//! # Layout discipline
//!
//! Argument order and sizes are dictated by the frozen guest ABI: `pop` and
//! `push` move raw bytes in call order with no implicit alignment, so
//! handlers express the ABI's padding explicitly in their wire structs. Bulk
//! payloads never travel through the argument stream; they are separately
//! enumerated buffer views (see [`buffer`]).
//!
//! # References
//!
//! - [Switchbrew IPC Marshalling](https://switchbrew.org/wiki/IPC_Marshalling)

pub mod buffer;
pub mod cmif;
mod request;
mod response;
mod service_name;

pub use self::{
    request::{CommandBuffer, IpcRequest, ParsedRequest, ProtocolViolation, RequestBuilder},
    response::{IpcResponse, ReplyBuffer},
    service_name::ServiceName,
};
