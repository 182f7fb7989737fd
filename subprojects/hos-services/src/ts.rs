//! Temperature measurement services (`ts`).

use hos_sf::{IpcRequest, IpcResponse};

use crate::{CommandResult, ServiceContext, service_commands};

/// Temperature reported for the internal sensor, in degrees Celsius.
const INTERNAL_TEMPERATURE: u32 = 35;
/// Temperature reported for the external sensor, in degrees Celsius.
const EXTERNAL_TEMPERATURE: u32 = 20;

/// `ts` — thermal sensor queries.
#[derive(Debug, Default)]
pub struct IMeasurementServer;

impl IMeasurementServer {
    /// Reads a sensor by location selector: `0` is the internal (SoC)
    /// sensor, anything else the external (PCB) one. Values are canned at
    /// plausible operating temperatures.
    fn get_temperature(
        &mut self,
        _ctx: &ServiceContext<'_>,
        req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        let location: u8 = req.pop()?;
        res.push(if location == 0 {
            INTERNAL_TEMPERATURE
        } else {
            EXTERNAL_TEMPERATURE
        });
        Ok(())
    }

    /// Opens a measurement session.
    fn open_session(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        ctx.manager
            .register_service(Box::new(ISession), ctx.session, ctx.process, res)
    }
}

service_commands! {
    impl IMeasurementServer {
        0x1 => get_temperature,
        0x4 => open_session,
    }
}

/// `ts` measurement session. No commands are implemented yet; the guest
/// only needs the session to exist.
#[derive(Debug, Default)]
pub struct ISession;

service_commands! {
    impl ISession {}
}
