//! The process-scoped device context.

use std::sync::{
    Weak,
    atomic::{AtomicU64, Ordering},
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::process::KProcess;

/// Host-configurable emulation settings.
///
/// Pushed in by the embedding layer at start and refreshed on change; the
/// settings services surface these values to the guest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// BCP-47 language tag reported to the guest.
    pub language: String,
    /// Region string reported to the guest.
    pub region: String,
    /// Whether the console reports itself as docked.
    pub docked: bool,
    /// Profile username.
    pub username: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: "en-US".into(),
            region: "USA".into(),
            docked: false,
            username: "Player".into(),
        }
    }
}

/// Performance counters polled by the host UI.
///
/// Plain atomic fields: the embedding layer reads them without taking any
/// lock the emulation loop could be holding.
#[derive(Debug, Default)]
pub struct PerfCounters {
    frames: AtomicU64,
    frame_time_total_ns: AtomicU64,
}

impl PerfCounters {
    /// Records one presented frame and its frame time.
    pub fn record_frame(&self, frame_time_ns: u64) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.frame_time_total_ns
            .fetch_add(frame_time_ns, Ordering::Relaxed);
    }

    /// Returns the number of frames presented so far.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Returns the average frame time in milliseconds, zero before the
    /// first frame.
    pub fn average_frame_time_ms(&self) -> f64 {
        let frames = self.frames();
        if frames == 0 {
            return 0.0;
        }
        let total = self.frame_time_total_ns.load(Ordering::Relaxed);
        total as f64 / frames as f64 / 1_000_000.0
    }
}

/// The owning context for one emulation run.
///
/// Created at emulation start and explicitly torn down at stop. Subsystems
/// receive shared references to it instead of reaching through ambient
/// globals; the running process is held weakly so the context never keeps
/// a stopped process alive.
#[derive(Debug)]
pub struct DeviceState {
    settings: RwLock<Settings>,
    perf: PerfCounters,
    process: RwLock<Weak<KProcess>>,
}

impl DeviceState {
    /// Creates a context with the given settings and no attached process.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
            perf: PerfCounters::default(),
            process: RwLock::new(Weak::new()),
        }
    }

    /// Attaches the running process (called once at emulation start).
    pub fn attach_process(&self, process: &std::sync::Arc<KProcess>) {
        *self.process.write() = std::sync::Arc::downgrade(process);
    }

    /// Returns the running process, if emulation is live.
    pub fn process(&self) -> Option<std::sync::Arc<KProcess>> {
        self.process.read().upgrade()
    }

    /// Returns a snapshot of the current settings.
    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Replaces the settings (embedding-layer refresh).
    pub fn update_settings(&self, settings: Settings) {
        *self.settings.write() = settings;
    }

    /// Returns the performance counters.
    #[inline]
    pub fn perf(&self) -> &PerfCounters {
        &self.perf
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::process::{KProcess, LoadedImage};

    #[test]
    fn process_reference_is_non_owning() {
        let state = DeviceState::default();
        let process = Arc::new(KProcess::new(LoadedImage::default()));
        state.attach_process(&process);
        assert!(state.process().is_some());

        drop(process);
        assert!(state.process().is_none());
    }

    #[test]
    fn perf_counters_average() {
        let state = DeviceState::default();
        assert_eq!(state.perf().average_frame_time_ms(), 0.0);
        state.perf().record_frame(16_000_000);
        state.perf().record_frame(18_000_000);
        assert_eq!(state.perf().frames(), 2);
        assert!((state.perf().average_frame_time_ms() - 17.0).abs() < f64::EPSILON);
    }
}
