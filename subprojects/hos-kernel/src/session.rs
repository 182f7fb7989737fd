//! IPC session endpoints.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

/// Process-unique identity of a session, stable across its lifetime.
///
/// The service manager keys its session-to-service bindings on this rather
/// than on handle values, which are reused after closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }
}

/// The domain object id a session's root object takes after conversion.
pub const ROOT_OBJECT_ID: u32 = 1;

/// One endpoint of a client/server IPC channel.
///
/// Lifecycle: `Open → Bound → [Dispatch]* → Closed`, with no transition out
/// of `Closed`. Binding to a service instance is owned by the service
/// manager; the session itself carries identity, liveness, the domain flag
/// and the per-session dispatch lock that serializes requests in submission
/// order.
#[derive(Debug)]
pub struct KSession {
    id: SessionId,
    open: AtomicBool,
    is_domain: AtomicBool,
    next_object_id: AtomicU32,
    dispatch_lock: Mutex<()>,
}

impl KSession {
    /// Creates an open, non-domain session.
    pub fn new() -> Self {
        Self {
            id: SessionId::next(),
            open: AtomicBool::new(true),
            is_domain: AtomicBool::new(false),
            next_object_id: AtomicU32::new(ROOT_OBJECT_ID + 1),
            dispatch_lock: Mutex::new(()),
        }
    }

    /// Returns the session's stable identity.
    #[inline]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns whether the session is still open.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Closes the session.
    ///
    /// Idempotent: returns `true` only for the transition that actually
    /// closed it, so exactly one caller tears down the binding. In-flight
    /// dispatches complete (their replies are discarded by the caller);
    /// later dispatch attempts observe closure before running any handler.
    pub fn close(&self) -> bool {
        self.open.swap(false, Ordering::AcqRel)
    }

    /// Returns whether the session has been converted to a domain.
    #[inline]
    pub fn is_domain(&self) -> bool {
        self.is_domain.load(Ordering::Acquire)
    }

    /// Converts the session to a domain, multiplexing objects over one
    /// handle. Returns the root object's id.
    pub fn convert_to_domain(&self) -> u32 {
        self.is_domain.store(true, Ordering::Release);
        ROOT_OBJECT_ID
    }

    /// Allocates a fresh domain object id.
    pub fn allocate_object_id(&self) -> u32 {
        self.next_object_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Acquires the per-session dispatch lock.
    ///
    /// Holding this across a handler invocation gives requests on one
    /// session their submission-order guarantee while leaving requests on
    /// other sessions free to run concurrently.
    pub fn dispatch_guard(&self) -> MutexGuard<'_, ()> {
        self.dispatch_lock.lock()
    }
}

impl Default for KSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_is_idempotent() {
        let session = KSession::new();
        assert!(session.is_open());
        assert!(session.close());
        assert!(!session.close());
        assert!(!session.is_open());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(KSession::new().id(), KSession::new().id());
    }

    #[test]
    fn domain_object_ids_start_after_root() {
        let session = KSession::new();
        assert!(!session.is_domain());
        assert_eq!(session.convert_to_domain(), ROOT_OBJECT_ID);
        assert!(session.is_domain());
        assert_eq!(session.allocate_object_id(), ROOT_OBJECT_ID + 1);
        assert_eq!(session.allocate_object_id(), ROOT_OBJECT_ID + 2);
    }
}
