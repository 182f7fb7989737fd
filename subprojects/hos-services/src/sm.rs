//! Service manager interface (`sm:`).
//!
//! The first session every guest process opens. `GetServiceHandle` is the
//! front door to the whole registry: it resolves a service name and hands
//! back a move handle to a fresh session bound to that service.

use hos_sf::{IpcRequest, IpcResponse, ServiceName};

use crate::{CommandResult, ServiceContext, service_commands};

/// `sm:` — the user-facing service manager interface.
#[derive(Debug, Default)]
pub struct IUserInterface;

impl IUserInterface {
    /// Registers the client process. The process id descriptor carries no
    /// information this implementation needs.
    fn initialize(
        &mut self,
        _ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        _res: &mut IpcResponse,
    ) -> CommandResult {
        Ok(())
    }

    /// Resolves a service name to a session move handle.
    fn get_service_handle(
        &mut self,
        ctx: &ServiceContext<'_>,
        req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        let raw: u64 = req.pop()?;
        let name = ServiceName::from_wire(raw).ok_or(hos_result::codes::INVALID_HEADER)?;
        let handle = ctx.manager.open_named_session(ctx.process, name)?;
        res.move_handle(handle.to_raw());
        Ok(())
    }
}

service_commands! {
    impl IUserInterface {
        0x0 => initialize,
        0x1 => get_service_handle,
    }
}
