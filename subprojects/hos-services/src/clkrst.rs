//! Clock and reset control services (`clkrst`).

use hos_sf::{IpcRequest, IpcResponse};

use crate::{CommandResult, ServiceContext, service_commands};

/// `clkrst` — clock/reset session factory.
#[derive(Debug, Default)]
pub struct IClkrstManager;

impl IClkrstManager {
    /// Opens a clock/reset control session.
    fn open_session(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        ctx.manager
            .register_service(Box::new(IClkrstSession), ctx.session, ctx.process, res)
    }
}

service_commands! {
    impl IClkrstManager {
        0x0 => open_session,
    }
}

/// `clkrst` control session. No commands are implemented yet; the guest
/// only needs the session to exist.
#[derive(Debug, Default)]
pub struct IClkrstSession;

service_commands! {
    impl IClkrstSession {}
}
