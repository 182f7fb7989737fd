//! Addressable kernel objects.

use std::sync::Arc;

use crate::{event::KEvent, process::KProcess, session::KSession};

/// Discriminant for [`KernelObject`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// An IPC session endpoint.
    Session,
    /// A signalable event.
    Event,
    /// A guest process.
    Process,
}

/// A reference-counted kernel object addressable through a handle table.
///
/// The substrate's object population is closed: sessions, events and
/// processes are the only objects IPC dispatch manipulates, so a single
/// exhaustive enum replaces an open-ended class hierarchy and keeps
/// type-checked lookups explicit.
#[derive(Debug, Clone)]
pub enum KernelObject {
    /// An IPC session endpoint.
    Session(Arc<KSession>),
    /// A signalable event.
    Event(Arc<KEvent>),
    /// A guest process.
    Process(Arc<KProcess>),
}

impl KernelObject {
    /// Returns the variant's type discriminant.
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Session(_) => ObjectType::Session,
            Self::Event(_) => ObjectType::Event,
            Self::Process(_) => ObjectType::Process,
        }
    }

    /// Returns the session, if this object is one.
    pub fn session(&self) -> Option<&Arc<KSession>> {
        match self {
            Self::Session(session) => Some(session),
            _ => None,
        }
    }

    /// Returns the event, if this object is one.
    pub fn event(&self) -> Option<&Arc<KEvent>> {
        match self {
            Self::Event(event) => Some(event),
            _ => None,
        }
    }

    /// Returns the process, if this object is one.
    pub fn process(&self) -> Option<&Arc<KProcess>> {
        match self {
            Self::Process(process) => Some(process),
            _ => None,
        }
    }
}
