//! Network interface management services (`nifm:u`).
//!
//! The guest submits connection requests and waits on their completion
//! events. No real network is negotiated: requests report themselves
//! available immediately, which is what titles running offline expect.

use std::sync::Arc;

use hos_kernel::{KEvent, KernelObject};
use hos_sf::{IpcRequest, IpcResponse};

use crate::{CommandResult, ServiceContext, service_commands};

/// `nifm:u` — entry point producing general service sessions.
#[derive(Debug, Default)]
pub struct IStaticService;

impl IStaticService {
    /// Pre-3.0.0 variant of [`Self::create_general_service`].
    fn create_general_service_old(
        &mut self,
        ctx: &ServiceContext<'_>,
        req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        self.create_general_service(ctx, req, res)
    }

    /// Opens a general network service session.
    fn create_general_service(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        ctx.manager
            .register_service(Box::new(IGeneralService), ctx.session, ctx.process, res)
    }
}

service_commands! {
    impl IStaticService {
        0x4 => create_general_service_old,
        0x5 => create_general_service,
    }
}

/// `nifm` general service: request and scan-request factory.
#[derive(Debug, Default)]
pub struct IGeneralService;

impl IGeneralService {
    /// Returns this client's id.
    fn get_client_id(
        &mut self,
        _ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        res.push(0u32);
        Ok(())
    }

    /// Creates a wireless scan request session.
    fn create_scan_request(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        ctx.manager
            .register_service(Box::new(IScanRequest), ctx.session, ctx.process, res)
    }

    /// Creates a connection request session.
    fn create_request(
        &mut self,
        ctx: &ServiceContext<'_>,
        req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        let _requirement_preset: u32 = req.pop()?;
        ctx.manager
            .register_service(Box::new(IRequest::default()), ctx.session, ctx.process, res)
    }
}

service_commands! {
    impl IGeneralService {
        0x1 => get_client_id,
        0x2 => create_scan_request,
        0x4 => create_request,
    }
}

/// Request states reported by [`IRequest::get_request_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum RequestState {
    /// No request submitted yet.
    Free = 1,
    /// Connection established.
    Available = 2,
}

/// `nifm` connection request.
///
/// Holds the two system events the guest waits on. Submission signals the
/// first immediately: there is no asynchronous network bring-up to wait for.
#[derive(Debug, Default)]
pub struct IRequest {
    event0: Arc<KEvent>,
    event1: Arc<KEvent>,
    submitted: bool,
}

impl IRequest {
    fn get_request_state(
        &mut self,
        _ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        let state = if self.submitted {
            RequestState::Available
        } else {
            RequestState::Free
        };
        res.push(state as u32);
        Ok(())
    }

    /// Reports the submitted request's outcome.
    fn get_result(
        &mut self,
        _ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        _res: &mut IpcResponse,
    ) -> CommandResult {
        Ok(())
    }

    /// Hands the guest copy handles to both completion events.
    fn get_system_event_readable_handles(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        for event in [&self.event0, &self.event1] {
            let handle = ctx
                .process
                .open_handle(KernelObject::Event(event.clone()))?;
            res.copy_handle(handle.to_raw());
        }
        Ok(())
    }

    /// Submits the request; completion is immediate.
    fn request_submit_and_wait(
        &mut self,
        _ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        _res: &mut IpcResponse,
    ) -> CommandResult {
        self.submitted = true;
        self.event0.signal();
        Ok(())
    }
}

service_commands! {
    impl IRequest {
        0x0 => get_request_state,
        0x1 => get_result,
        0x2 => get_system_event_readable_handles,
        0x4 => request_submit_and_wait,
    }
}

/// `nifm` wireless scan request. No commands are implemented yet.
#[derive(Debug, Default)]
pub struct IScanRequest;

service_commands! {
    impl IScanRequest {}
}
