//! Power supply management services (`psm`).
//!
//! Battery and charger state. The host has no guest-meaningful battery, so
//! the server reports a full battery on an official charger, a deliberate
//! simplification, not an error path.

use std::sync::Arc;

use hos_kernel::{Handle, KEvent, KernelObject};
use hos_sf::{IpcRequest, IpcResponse};

use crate::{CommandResult, ServiceContext, service_commands};

/// `psm` — top-level power state queries.
#[derive(Debug, Default)]
pub struct IPsmServer;

impl IPsmServer {
    /// Reports a constant 100% charge.
    fn get_battery_charge_percentage(
        &mut self,
        _ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        res.push(100u32);
        Ok(())
    }

    /// Reports an official charger connected.
    fn get_charger_type(
        &mut self,
        _ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        res.push(1u32);
        Ok(())
    }

    /// Opens a stateful notification session.
    fn open_session(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        ctx.manager
            .register_service(Box::new(IPsmSession::default()), ctx.session, ctx.process, res)
    }
}

service_commands! {
    impl IPsmServer {
        0x0 => get_battery_charge_percentage,
        0x1 => get_charger_type,
        0x7 => open_session,
    }
}

/// `psm` notification session.
///
/// Owns the state-change event the guest binds to. The event never fires
/// here (the reported power state is constant) but the guest expects a
/// real, waitable handle.
#[derive(Debug, Default)]
pub struct IPsmSession {
    state_change_event: Arc<KEvent>,
    bound_handle: Option<Handle>,
    charger_type_notify: bool,
    power_supply_notify: bool,
    battery_voltage_notify: bool,
}

impl IPsmSession {
    /// Hands the guest a copy handle to the state-change event.
    fn bind_state_change_event(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        let handle = ctx
            .process
            .open_handle(KernelObject::Event(self.state_change_event.clone()))?;
        self.bound_handle = Some(handle);
        res.copy_handle(handle.to_raw());
        Ok(())
    }

    /// Releases the previously bound event handle.
    fn unbind_state_change_event(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        _res: &mut IpcResponse,
    ) -> CommandResult {
        if let Some(handle) = self.bound_handle.take() {
            ctx.process.close_handle(handle)?;
        }
        Ok(())
    }

    fn set_charger_type_change_event_enabled(
        &mut self,
        _ctx: &ServiceContext<'_>,
        req: &mut IpcRequest,
        _res: &mut IpcResponse,
    ) -> CommandResult {
        self.charger_type_notify = req.pop::<u8>()? != 0;
        Ok(())
    }

    fn set_power_supply_change_event_enabled(
        &mut self,
        _ctx: &ServiceContext<'_>,
        req: &mut IpcRequest,
        _res: &mut IpcResponse,
    ) -> CommandResult {
        self.power_supply_notify = req.pop::<u8>()? != 0;
        Ok(())
    }

    fn set_battery_voltage_state_change_event_enabled(
        &mut self,
        _ctx: &ServiceContext<'_>,
        req: &mut IpcRequest,
        _res: &mut IpcResponse,
    ) -> CommandResult {
        self.battery_voltage_notify = req.pop::<u8>()? != 0;
        Ok(())
    }
}

service_commands! {
    impl IPsmSession {
        0x0 => bind_state_change_event,
        0x1 => unbind_state_change_event,
        0x2 => set_charger_type_change_event_enabled,
        0x3 => set_power_supply_change_event_enabled,
        0x4 => set_battery_voltage_state_change_event_enabled,
    }
}
