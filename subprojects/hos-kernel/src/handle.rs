//! Handles and the per-process handle table.

use crate::object::{KernelObject, ObjectType};

/// First handle value the table hands out.
///
/// Matches the guest kernel's convention; handle values below this range
/// (and zero in particular) never name a table entry.
pub const INITIAL_HANDLE: u32 = 0xD000;

/// Maximum number of simultaneously live handles per process.
pub const HANDLE_CAPACITY: usize = 0x400;

/// A small per-process integer naming a kernel object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Handle(u32);

impl Handle {
    /// The invalid handle sentinel.
    pub const INVALID: Self = Self(0);

    /// Wraps a raw handle value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    /// Returns `true` if the handle is not the invalid sentinel.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl core::fmt::Display for Handle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Errors from handle table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    /// The handle does not name a live object.
    #[error("invalid handle {0}")]
    Invalid(Handle),
    /// The handle names an object of a different type.
    #[error("handle {handle} names a {found:?}, expected {expected:?}")]
    WrongType {
        /// The offending handle.
        handle: Handle,
        /// Type the caller asked for.
        expected: ObjectType,
        /// Type actually stored.
        found: ObjectType,
    },
    /// The table has no free slots left.
    #[error("handle table exhausted ({HANDLE_CAPACITY} entries)")]
    Exhausted,
}

impl From<HandleError> for hos_result::Error {
    fn from(err: HandleError) -> Self {
        match err {
            HandleError::Invalid(_) | HandleError::WrongType { .. } => {
                hos_result::codes::INVALID_HANDLE
            }
            HandleError::Exhausted => hos_result::codes::OUT_OF_HANDLES,
        }
    }
}

/// Dense mapping from handles to kernel objects.
///
/// Slots are reused after closure (a closed handle value may later name a
/// different object, but never two live objects at once). Callers serialize
/// access externally; `KProcess` wraps the table in a mutex with short
/// critical sections.
#[derive(Debug, Default)]
pub struct HandleTable {
    entries: Vec<Option<KernelObject>>,
    free: Vec<usize>,
}

impl HandleTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an object and returns its new handle.
    pub fn open(&mut self, object: KernelObject) -> Result<Handle, HandleError> {
        let slot = match self.free.pop() {
            Some(slot) => {
                self.entries[slot] = Some(object);
                slot
            }
            None => {
                if self.entries.len() >= HANDLE_CAPACITY {
                    return Err(HandleError::Exhausted);
                }
                self.entries.push(Some(object));
                self.entries.len() - 1
            }
        };
        Ok(Handle(INITIAL_HANDLE + slot as u32))
    }

    /// Looks up the object a handle names.
    pub fn get(&self, handle: Handle) -> Result<KernelObject, HandleError> {
        self.slot(handle)
            .and_then(|slot| self.entries[slot].clone())
            .ok_or(HandleError::Invalid(handle))
    }

    /// Removes a handle, dropping the table's reference to the object.
    pub fn close(&mut self, handle: Handle) -> Result<KernelObject, HandleError> {
        let slot = self
            .slot(handle)
            .filter(|&slot| self.entries[slot].is_some())
            .ok_or(HandleError::Invalid(handle))?;
        let object = self.entries[slot].take().unwrap_or_else(|| unreachable!());
        self.free.push(slot);
        Ok(object)
    }

    /// Returns the number of live handles.
    pub fn len(&self) -> usize {
        self.entries.len() - self.free.len()
    }

    /// Returns whether no handles are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, handle: Handle) -> Option<usize> {
        handle
            .to_raw()
            .checked_sub(INITIAL_HANDLE)
            .map(|slot| slot as usize)
            .filter(|&slot| slot < self.entries.len())
    }
}
