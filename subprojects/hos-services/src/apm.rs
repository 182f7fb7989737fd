//! Performance management services (`apm`).
//!
//! Performance modes and configurations follow the guest API contract: the
//! manager reports the current mode, the session stores the configuration
//! the guest selects per mode and reads it back.

use hos_sf::{IpcRequest, IpcResponse};

use crate::{CommandResult, ServiceContext, service_commands};

/// Performance mode reported to the guest (0 = Normal, 1 = Boost).
const PERFORMANCE_MODE_NORMAL: i32 = 0;

/// Default performance configuration id per mode.
const DEFAULT_CONFIGURATION: u32 = 0x0001_0000;

/// `apm` — performance session factory and mode queries.
#[derive(Debug, Default)]
pub struct IManager;

impl IManager {
    /// Opens a performance control session.
    fn open_session(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        ctx.manager
            .register_service(Box::new(ISession::default()), ctx.session, ctx.process, res)
    }

    /// Reports the current performance mode. Handheld/docked switching is
    /// not emulated; the mode tracks the docked setting.
    fn get_performance_mode(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        let mode = if ctx.state.settings().docked {
            1
        } else {
            PERFORMANCE_MODE_NORMAL
        };
        res.push(mode);
        Ok(())
    }
}

service_commands! {
    impl IManager {
        0x0 => open_session,
        0x1 => get_performance_mode,
    }
}

/// `apm` performance control session.
#[derive(Debug)]
pub struct ISession {
    /// Configuration id per mode (index 0 = Normal, 1 = Boost).
    configurations: [u32; 2],
}

impl Default for ISession {
    fn default() -> Self {
        Self {
            configurations: [DEFAULT_CONFIGURATION; 2],
        }
    }
}

impl ISession {
    /// Stores the configuration the guest selects for a mode. The actual
    /// clocks are not emulated; the value only needs to read back.
    fn set_performance_configuration(
        &mut self,
        _ctx: &ServiceContext<'_>,
        req: &mut IpcRequest,
        _res: &mut IpcResponse,
    ) -> CommandResult {
        let mode: i32 = req.pop()?;
        let configuration: u32 = req.pop()?;
        if let Some(slot) = self.configurations.get_mut(mode.max(0) as usize) {
            *slot = configuration;
        }
        Ok(())
    }

    /// Reads back the configuration for a mode.
    fn get_performance_configuration(
        &mut self,
        _ctx: &ServiceContext<'_>,
        req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        let mode: i32 = req.pop()?;
        let configuration = self
            .configurations
            .get(mode.max(0) as usize)
            .copied()
            .unwrap_or(DEFAULT_CONFIGURATION);
        res.push(configuration);
        Ok(())
    }
}

service_commands! {
    impl ISession {
        0x0 => set_performance_configuration,
        0x1 => get_performance_configuration,
    }
}
