//! Signalable events.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A host-side signalable event.
///
/// Services that complete work asynchronously hand the guest a readable
/// event handle; the guest polls or waits on it and re-queries the service
/// once it fires. Semantics follow the guest kernel's sticky events: a
/// signal stays set until explicitly cleared.
#[derive(Debug, Default)]
pub struct KEvent {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl KEvent {
    /// Creates an unsignaled event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals the event, waking all waiters.
    pub fn signal(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.condvar.notify_all();
    }

    /// Clears the signal.
    pub fn clear(&self) {
        *self.signaled.lock() = false;
    }

    /// Returns whether the event is currently signaled.
    pub fn poll(&self) -> bool {
        *self.signaled.lock()
    }

    /// Blocks until the event is signaled or the timeout elapses.
    ///
    /// Returns `true` if the event was signaled.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut signaled = self.signaled.lock();
        if *signaled {
            return true;
        }
        self.condvar.wait_for(&mut signaled, timeout);
        *signaled
    }
}
