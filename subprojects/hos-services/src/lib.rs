//! HLE service implementations and the dispatch substrate.
//!
//! Every guest-visible system service is reimplemented here as a host-side
//! object satisfying one uniform contract: a static command table mapping
//! command ids to handler methods, invoked through [`HleService::dispatch`].
//! The [`ServiceManager`] owns the name registry and the session-to-instance
//! bindings, and routes every IPC call:
//!
//! ```text
//! guest thread ─► KProcess handle table ─► KSession
//!                                             │
//!                     ServiceManager::dispatch┘
//!                         │  CMIF parse, domain routing
//!                         ▼
//!                 service command table ─► handler(ctx, req, res)
//! ```
//!
//! Handlers read typed arguments in ABI order via `IpcRequest::pop`, write
//! results via `IpcResponse::push` (or fill bulk out-buffers), and return a
//! guest [`Result`](hos_result::Result). The dispatcher is the first
//! recovery point for any handler fault: panics are contained there and
//! surfaced to the guest as a generic internal error, never unwound further.
//!
//! Command tables are declared with [`service_commands!`], which expands to
//! an instance-scoped match: command ids are only unique per service, and no
//! global table exists to alias them across services.

pub mod am;
pub mod apm;
pub mod capsrv;
pub mod clkrst;
pub mod fssrv;
mod manager;
pub mod nifm;
pub mod nim;
pub mod psm;
pub mod set;
pub mod sm;
pub mod ts;

use std::sync::Arc;

use hos_kernel::{DeviceState, KProcess, KSession};
use hos_sf::{IpcRequest, IpcResponse};

pub use self::manager::{POINTER_BUFFER_SIZE, ServiceFactory, ServiceManager};

/// Outcome of one command handler: `Ok(())` becomes the zero result code on
/// the wire, `Err` carries the guest-visible failure.
pub type CommandResult = hos_result::Result<()>;

/// Per-dispatch context handed to command handlers.
///
/// Bundles the non-owning references a handler may need: the device context,
/// the manager (for registering sub-services), the calling process (for
/// handle-table access) and the session the command arrived on.
pub struct ServiceContext<'a> {
    /// Process-scoped device context.
    pub state: &'a Arc<DeviceState>,
    /// The dispatching service manager.
    pub manager: &'a ServiceManager,
    /// The calling guest process.
    pub process: &'a Arc<KProcess>,
    /// The session the request arrived on.
    pub session: &'a Arc<KSession>,
}

/// The contract every HLE service implements.
///
/// Implementations come from [`service_commands!`]; the only hand-written
/// parts of a service are its handler methods.
pub trait HleService: Send {
    /// Service implementation name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Returns the handler name for a command id, if the table has it.
    fn command_name(&self, command_id: u32) -> Option<&'static str>;

    /// Looks up `command_id` in the service's table and invokes exactly that
    /// handler, or fails with `UNKNOWN_COMMAND` for absent ids.
    fn dispatch(
        &mut self,
        ctx: &ServiceContext<'_>,
        command_id: u32,
        req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult;
}

/// Shared, internally synchronized reference to a live service instance.
pub type ServiceRef = Arc<parking_lot::Mutex<Box<dyn HleService>>>;

/// Declares a service's command table.
///
/// Expands to the [`HleService`] implementation for the type: a fixed match
/// from command id to handler method, with absent ids falling through to
/// `UNKNOWN_COMMAND`. Tables are fixed at compile time and never mutated.
///
/// ```ignore
/// service_commands! {
///     impl IMeasurementServer {
///         0x1 => get_temperature,
///         0x4 => open_session,
///     }
/// }
/// ```
///
/// An empty body declares a service with no commands (every id unknown),
/// which several leaf services legitimately are.
#[macro_export]
macro_rules! service_commands {
    {
        impl $ty:ident {
            $( $id:literal => $handler:ident ),* $(,)?
        }
    } => {
        impl $crate::HleService for $ty {
            fn name(&self) -> &'static str {
                stringify!($ty)
            }

            fn command_name(&self, command_id: u32) -> Option<&'static str> {
                match command_id {
                    $( $id => Some(stringify!($handler)), )*
                    _ => None,
                }
            }

            fn dispatch(
                &mut self,
                ctx: &$crate::ServiceContext<'_>,
                command_id: u32,
                req: &mut ::hos_sf::IpcRequest,
                res: &mut ::hos_sf::IpcResponse,
            ) -> $crate::CommandResult {
                let _ = (&ctx, &req, &res);
                match command_id {
                    $( $id => self.$handler(ctx, req, res), )*
                    _ => {
                        ::log::warn!(
                            "{}: unknown command {:#x}",
                            self.name(),
                            command_id
                        );
                        Err(::hos_result::codes::UNKNOWN_COMMAND)
                    }
                }
            }
        }
    };
}
