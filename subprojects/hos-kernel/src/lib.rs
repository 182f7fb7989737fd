//! Kernel object model for HLE service dispatch.
//!
//! This crate provides the host-side stand-ins for the guest kernel objects
//! the IPC substrate manipulates: per-process handle tables mapping small
//! integer handles to reference-counted objects, IPC session endpoints,
//! signalable events, and the process itself. It also owns the
//! process-scoped [`DeviceState`] context that replaces ambient globals:
//! one owning context per emulation run, created at start and torn down at
//! stop, with subsystems holding non-owning back-references.
//!
//! Object ownership is reference counting via `Arc`: an object lives while
//! the handle table or any substrate-internal holder still references it,
//! and is destroyed when the last reference drops.

mod event;
mod handle;
mod object;
mod process;
mod session;
mod state;

pub use self::{
    event::KEvent,
    handle::{HANDLE_CAPACITY, Handle, HandleError, HandleTable, INITIAL_HANDLE},
    object::{KernelObject, ObjectType},
    process::{ApplicationMetadata, KProcess, LoadedImage, Segment},
    session::{KSession, ROOT_OBJECT_ID, SessionId},
    state::{DeviceState, PerfCounters, Settings},
};
