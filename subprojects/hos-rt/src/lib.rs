//! Embedding facade for the HLE substrate.
//!
//! The platform layer (an activity bridge, a test harness) drives emulation
//! through [`EmulationSession`]: start with a loaded image and settings,
//! push guest IPC calls through the SVC-shaped entry points, poll the
//! performance counters, stop. One session owns one [`DeviceState`] and one
//! root process; there are no ambient globals to leak across runs.
//!
//! Surface and input delivery are sinks outside this substrate; the entry
//! points exist so the embedding layer has a stable boundary to call, and
//! deliberately do nothing here.

use std::sync::Arc;

use hos_kernel::KProcess;
use hos_services::ServiceManager;
use hos_sf::{CommandBuffer, ReplyBuffer, ServiceName};
use parking_lot::Mutex;

pub use hos_kernel::{
    ApplicationMetadata, DeviceState, Handle, LoadedImage, PerfCounters, Segment, Settings,
};

/// Snapshot of the performance counters, polled by the host UI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerfSnapshot {
    /// Frames presented since start.
    pub frames: u64,
    /// Average frame time in milliseconds.
    pub average_frame_time_ms: f64,
}

/// One emulation run: the owning context for process, services and state.
pub struct EmulationSession {
    state: Arc<DeviceState>,
    manager: ServiceManager,
    process: Mutex<Option<Arc<KProcess>>>,
}

impl EmulationSession {
    /// Starts emulation of a loaded image.
    ///
    /// Builds the device context, the root process and its service
    /// namespace. The image comes parsed from the loader; this substrate
    /// never touches container formats.
    pub fn start(image: LoadedImage, settings: Settings) -> Self {
        let state = Arc::new(DeviceState::new(settings));
        let process = Arc::new(KProcess::new(image));
        state.attach_process(&process);
        let manager = ServiceManager::new(state.clone());

        if let Some(metadata) = process.metadata() {
            log::info!(
                "starting {} ({:#018x}) v{}",
                metadata.name,
                metadata.title_id,
                metadata.version,
            );
        } else {
            log::info!("starting untitled image");
        }

        Self {
            state,
            manager,
            process: Mutex::new(Some(process)),
        }
    }

    /// Stops emulation, tearing down the process and everything it owns.
    ///
    /// Idempotent; the context itself stays valid so late counter polls
    /// from the host UI see the final values.
    pub fn stop(&self) {
        if let Some(process) = self.process.lock().take() {
            log::info!("stopping emulation ({} live handles)", process.handle_count());
        }
    }

    /// Returns whether a process is live.
    pub fn is_running(&self) -> bool {
        self.process.lock().is_some()
    }

    /// Returns the device context.
    #[inline]
    pub fn state(&self) -> &Arc<DeviceState> {
        &self.state
    }

    /// Connects to a named service port (the guest's `sm:` front door).
    pub fn connect_to_named_port(&self, name: &str) -> hos_result::Result<Handle> {
        let name =
            ServiceName::new(name).ok_or(hos_result::codes::SERVICE_NOT_REGISTERED)?;
        self.manager.open_named_session(&self.running()?, name)
    }

    /// Submits one synchronous IPC request on a session handle.
    ///
    /// The SVC-shaped entry: blocks the calling guest thread until the
    /// handler returns, then yields the wire reply.
    pub fn send_sync_request(
        &self,
        handle: Handle,
        command: CommandBuffer,
    ) -> hos_result::Result<ReplyBuffer> {
        self.manager.dispatch(&self.running()?, handle, command)
    }

    /// Closes a handle in the running process.
    pub fn close_handle(&self, handle: Handle) -> hos_result::Result<()> {
        self.manager.close_handle(&self.running()?, handle)
    }

    /// Pushes refreshed settings into the device context.
    pub fn update_settings(&self, settings: Settings) {
        self.state.update_settings(settings);
    }

    /// Records one presented frame.
    pub fn notify_frame(&self, frame_time_ns: u64) {
        self.state.perf().record_frame(frame_time_ns);
    }

    /// Returns the counters the host UI polls.
    pub fn performance(&self) -> PerfSnapshot {
        let perf = self.state.perf();
        PerfSnapshot {
            frames: perf.frames(),
            average_frame_time_ms: perf.average_frame_time_ms(),
        }
    }

    /// Attaches the presentation surface. Presentation is a sink outside
    /// this substrate; the entry point is the boundary only.
    pub fn attach_surface(&self) {}

    /// Detaches the presentation surface.
    pub fn detach_surface(&self) {}

    /// Pushes an input state packet. Input is a sink outside this
    /// substrate; the entry point is the boundary only.
    pub fn push_input(&self, _packed_state: u64) {}

    fn running(&self) -> hos_result::Result<Arc<KProcess>> {
        self.process
            .lock()
            .clone()
            .ok_or(hos_result::codes::SESSION_CLOSED)
    }
}
