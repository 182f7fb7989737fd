//! Network install manager shop services (`nim:eca`).
//!
//! Titles probe the shop interface chain at startup even when offline; each
//! link only needs to exist and hand out the next one.

use hos_sf::{IpcRequest, IpcResponse};

use crate::{CommandResult, ServiceContext, service_commands};

/// `nim:eca` — shop service access entry point.
#[derive(Debug, Default)]
pub struct IShopServiceAccessServerInterface;

impl IShopServiceAccessServerInterface {
    /// Opens the shop access server.
    fn create_server_interface(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        ctx.manager.register_service(
            Box::new(IShopServiceAccessServer),
            ctx.session,
            ctx.process,
            res,
        )
    }
}

service_commands! {
    impl IShopServiceAccessServerInterface {
        0x0 => create_server_interface,
    }
}

/// Shop access server, producing accessors.
#[derive(Debug, Default)]
pub struct IShopServiceAccessServer;

impl IShopServiceAccessServer {
    /// Opens a shop accessor.
    fn create_accessor_interface(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        ctx.manager
            .register_service(Box::new(IShopServiceAccessor), ctx.session, ctx.process, res)
    }
}

service_commands! {
    impl IShopServiceAccessServer {
        0x0 => create_accessor_interface,
    }
}

/// Shop accessor, producing async request interfaces.
#[derive(Debug, Default)]
pub struct IShopServiceAccessor;

impl IShopServiceAccessor {
    /// Opens an asynchronous shop request interface.
    fn create_async_interface(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        ctx.manager
            .register_service(Box::new(IShopServiceAsync), ctx.session, ctx.process, res)
    }
}

service_commands! {
    impl IShopServiceAccessor {
        0x0 => create_async_interface,
    }
}

/// Asynchronous shop request interface. No commands are implemented yet;
/// offline titles never get further than opening it.
#[derive(Debug, Default)]
pub struct IShopServiceAsync;

service_commands! {
    impl IShopServiceAsync {}
}
