//! Guest processes and the loader boundary.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    event::KEvent,
    handle::{Handle, HandleError, HandleTable},
    object::KernelObject,
    session::KSession,
};

/// A mapped segment of the guest executable.
///
/// Produced by the loader; this substrate only records the shape, it never
/// parses or maps anything itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Guest virtual base address.
    pub address: u64,
    /// Segment size in bytes.
    pub size: u64,
}

/// Application metadata extracted by the loader from the container's
/// control data, consumed by the applet and system-version services.
#[derive(Debug, Clone, Default)]
pub struct ApplicationMetadata {
    /// Display name.
    pub name: String,
    /// Title id.
    pub title_id: u64,
    /// Publisher string.
    pub publisher: String,
    /// Display version string.
    pub version: String,
    /// Icon image bytes (format opaque to this substrate).
    pub icon: Vec<u8>,
    /// Supported language codes, in the container's priority order.
    pub languages: Vec<String>,
}

/// A parsed executable image, as delivered by the loader.
#[derive(Debug, Clone, Default)]
pub struct LoadedImage {
    /// Guest entry point address.
    pub entry_point: u64,
    /// Mapped segments.
    pub segments: Vec<Segment>,
    /// Optional application metadata (absent for bare executables).
    pub metadata: Option<ApplicationMetadata>,
}

/// An emulated guest process.
///
/// Owns the handle table for its IPC namespace. One `KProcess` exists per
/// emulated process; dropping the last reference at emulation stop tears
/// down every object the table still holds.
#[derive(Debug)]
pub struct KProcess {
    image: LoadedImage,
    handles: Mutex<HandleTable>,
}

impl KProcess {
    /// Creates a process around a loaded image.
    pub fn new(image: LoadedImage) -> Self {
        Self {
            image,
            handles: Mutex::new(HandleTable::new()),
        }
    }

    /// Returns the loaded image this process runs.
    #[inline]
    pub fn image(&self) -> &LoadedImage {
        &self.image
    }

    /// Returns the application metadata, if the loader supplied any.
    #[inline]
    pub fn metadata(&self) -> Option<&ApplicationMetadata> {
        self.image.metadata.as_ref()
    }

    /// Inserts an object into the handle table.
    pub fn open_handle(&self, object: KernelObject) -> Result<Handle, HandleError> {
        self.handles.lock().open(object)
    }

    /// Looks up any object by handle.
    pub fn get_object(&self, handle: Handle) -> Result<KernelObject, HandleError> {
        self.handles.lock().get(handle)
    }

    /// Looks up a session by handle, type-checked.
    pub fn get_session(&self, handle: Handle) -> Result<Arc<KSession>, HandleError> {
        let object = self.get_object(handle)?;
        object
            .session()
            .cloned()
            .ok_or_else(|| HandleError::WrongType {
                handle,
                expected: crate::object::ObjectType::Session,
                found: object.object_type(),
            })
    }

    /// Looks up an event by handle, type-checked.
    pub fn get_event(&self, handle: Handle) -> Result<Arc<KEvent>, HandleError> {
        let object = self.get_object(handle)?;
        object
            .event()
            .cloned()
            .ok_or_else(|| HandleError::WrongType {
                handle,
                expected: crate::object::ObjectType::Event,
                found: object.object_type(),
            })
    }

    /// Closes a handle, dropping the table's reference.
    ///
    /// Returns the object so the caller can run type-specific teardown
    /// (the service manager unbinds closed sessions, for instance).
    pub fn close_handle(&self, handle: Handle) -> Result<KernelObject, HandleError> {
        self.handles.lock().close(handle)
    }

    /// Returns the number of live handles.
    pub fn handle_count(&self) -> usize {
        self.handles.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_checked_lookup() {
        let process = KProcess::new(LoadedImage::default());
        let session_handle = process
            .open_handle(KernelObject::Session(Arc::new(KSession::new())))
            .unwrap();
        let event_handle = process
            .open_handle(KernelObject::Event(Arc::new(KEvent::new())))
            .unwrap();

        assert!(process.get_session(session_handle).is_ok());
        assert!(process.get_event(event_handle).is_ok());
        assert!(matches!(
            process.get_session(event_handle),
            Err(HandleError::WrongType { .. })
        ));
    }

    #[test]
    fn close_drops_table_reference() {
        let process = KProcess::new(LoadedImage::default());
        let session = Arc::new(KSession::new());
        let handle = process
            .open_handle(KernelObject::Session(session.clone()))
            .unwrap();
        assert_eq!(process.handle_count(), 1);

        process.close_handle(handle).unwrap();
        assert_eq!(process.handle_count(), 0);
        // The internal reference keeps the object alive; the table's is gone.
        assert_eq!(Arc::strong_count(&session), 1);
    }
}
