//! The per-process service registry and IPC dispatcher.

use std::{
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use hos_kernel::{
    DeviceState, Handle, KProcess, KSession, KernelObject, ROOT_OBJECT_ID, SessionId,
};
use hos_result::{ResultCode, codes};
use hos_sf::{
    CommandBuffer, IpcRequest, IpcResponse, ReplyBuffer, ServiceName,
    cmif::{CommandType, control},
};
use parking_lot::Mutex;

use crate::{CommandResult, HleService, ServiceContext, ServiceRef};

/// Pointer buffer capacity reported by `QueryPointerBufferSize`.
pub const POINTER_BUFFER_SIZE: u16 = 0x500;

/// Constructor for a fresh service instance.
pub type ServiceFactory = fn() -> Box<dyn HleService>;

/// Process-scoped registry routing sessions to service instances.
///
/// Holds the name → factory table (fixed at construction), the memoized
/// top-level instances, and the live session bindings. Every session is
/// bound to exactly one service instance at a time; domain sessions
/// additionally map object ids to the sub-instances multiplexed over them.
///
/// Locking discipline: the binding maps are only held long enough to clone
/// an `Arc` or update an entry; no service logic ever runs under them.
pub struct ServiceManager {
    state: Arc<DeviceState>,
    /// Name registry, sorted by wire value for binary-search lookup.
    registry: Vec<(u64, ServiceFactory)>,
    /// Memoized top-level instances, one per service name.
    named: Mutex<HashMap<u64, ServiceRef>>,
    /// Root binding of every live session.
    bindings: Mutex<HashMap<SessionId, ServiceRef>>,
    /// Domain object bindings (object ids above the root).
    domains: Mutex<HashMap<(SessionId, u32), ServiceRef>>,
}

impl ServiceManager {
    /// Creates a manager with the built-in service registry.
    pub fn new(state: Arc<DeviceState>) -> Self {
        Self::with_registry(state, builtin_registry())
    }

    /// Creates a manager with an explicit registry (used by tests).
    pub fn with_registry(
        state: Arc<DeviceState>,
        entries: Vec<(ServiceName, ServiceFactory)>,
    ) -> Self {
        let mut registry: Vec<(u64, ServiceFactory)> = entries
            .into_iter()
            .map(|(name, factory)| (name.to_wire(), factory))
            .collect();
        registry.sort_unstable_by_key(|&(name, _)| name);
        registry.dedup_by_key(|&mut (name, _)| name);

        Self {
            state,
            registry,
            named: Mutex::new(HashMap::new()),
            bindings: Mutex::new(HashMap::new()),
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the device context this manager dispatches for.
    #[inline]
    pub fn state(&self) -> &Arc<DeviceState> {
        &self.state
    }

    /// Opens a session to a registered service by name.
    ///
    /// Top-level instances are memoized: repeated opens of the same name
    /// share one instance behind distinct sessions, as the guest expects.
    pub fn open_named_session(
        &self,
        process: &Arc<KProcess>,
        name: ServiceName,
    ) -> hos_result::Result<Handle> {
        let factory = self
            .registry
            .binary_search_by_key(&name.to_wire(), |&(wire, _)| wire)
            .map(|index| self.registry[index].1)
            .map_err(|_| {
                log::warn!("no service registered as {name}");
                codes::SERVICE_NOT_REGISTERED
            })?;

        let service = self
            .named
            .lock()
            .entry(name.to_wire())
            .or_insert_with(|| Arc::new(Mutex::new(factory())))
            .clone();

        let session = Arc::new(KSession::new());
        self.bindings.lock().insert(session.id(), service);
        let handle = process.open_handle(KernelObject::Session(session))?;
        log::debug!("opened session to {name} as handle {handle}");
        Ok(handle)
    }

    /// Binds a freshly constructed sub-service and hands it to the guest.
    ///
    /// On a plain session this creates a new `KSession`, binds the instance
    /// and pushes a move handle; on a domain session it allocates an object
    /// id within the parent and pushes that instead.
    pub fn register_service(
        &self,
        service: Box<dyn HleService>,
        parent: &Arc<KSession>,
        process: &Arc<KProcess>,
        response: &mut IpcResponse,
    ) -> CommandResult {
        let name = service.name();
        let service: ServiceRef = Arc::new(Mutex::new(service));

        if parent.is_domain() {
            let object_id = parent.allocate_object_id();
            self.domains
                .lock()
                .insert((parent.id(), object_id), service);
            response.push_object(object_id);
            log::debug!("registered {name} as domain object {object_id}");
        } else {
            let session = Arc::new(KSession::new());
            self.bindings.lock().insert(session.id(), service);
            let handle = process.open_handle(KernelObject::Session(session))?;
            response.move_handle(handle.to_raw());
            log::debug!("registered {name} behind handle {handle}");
        }
        Ok(())
    }

    /// Closes a session and drops its bindings.
    ///
    /// Idempotent; only the transition that actually closed the session
    /// tears anything down.
    pub fn close_session(&self, session: &Arc<KSession>) {
        if session.close() {
            self.bindings.lock().remove(&session.id());
            self.domains
                .lock()
                .retain(|&(owner, _), _| owner != session.id());
            log::debug!("session {} closed", session.id().value());
        }
    }

    /// Closes a handle; sessions additionally have their binding torn down.
    pub fn close_handle(
        &self,
        process: &Arc<KProcess>,
        handle: Handle,
    ) -> hos_result::Result<()> {
        let object = process.close_handle(handle)?;
        if let Some(session) = object.session() {
            self.close_session(session);
        }
        Ok(())
    }

    /// Routes one IPC call to its session's bound service.
    ///
    /// `Err` is reserved for transport-level failures the kernel would
    /// report on the send itself (bad handle, closed session); everything
    /// else, including guest-visible command failures and contained host
    /// defects, terminates in a [`ReplyBuffer`] whose header carries the
    /// result code.
    pub fn dispatch(
        &self,
        process: &Arc<KProcess>,
        handle: Handle,
        command: CommandBuffer,
    ) -> hos_result::Result<ReplyBuffer> {
        let session = process.get_session(handle)?;
        // Serializes requests on this session in submission order; other
        // sessions dispatch concurrently.
        let _guard = session.dispatch_guard();
        if !session.is_open() {
            return Err(codes::SESSION_CLOSED);
        }

        let Some(command_type) = command.command_type else {
            return Ok(error_reply(command, codes::INVALID_HEADER.code()));
        };

        match command_type {
            CommandType::Close => {
                self.close_session(&session);
                Ok(IpcResponse::default().into_reply(ResultCode::SUCCESS, false, 0))
            }
            ty if ty.is_control() => Ok(self.control(process, &session, command)),
            ty if ty.is_request() => Ok(self.request(process, &session, command)),
            _ => Ok(error_reply(command, codes::INVALID_HEADER.code())),
        }
    }

    /// Handles a standard request: domain routing, table lookup, handler
    /// invocation, fault containment.
    fn request(
        &self,
        process: &Arc<KProcess>,
        session: &Arc<KSession>,
        command: CommandBuffer,
    ) -> ReplyBuffer {
        let mut response = IpcResponse::new(command.out_buffers);

        let parsed = match IpcRequest::parse(
            command.payload,
            session.is_domain(),
            command.in_buffers,
            command.copy_handles,
            command.move_handles,
        ) {
            Ok(parsed) => parsed,
            Err(violation) => {
                log::warn!("malformed request on session {}: {violation}", session.id().value());
                return response.into_reply(codes::INVALID_HEADER.code(), session.is_domain(), 0);
            }
        };

        let mut req = match parsed {
            hos_sf::ParsedRequest::Command(req) => req,
            hos_sf::ParsedRequest::CloseObject { object_id } => {
                self.domains.lock().remove(&(session.id(), object_id));
                return response.into_reply(ResultCode::SUCCESS, true, 0);
            }
        };

        let domain_framing = req.domain_object().is_some();
        let command_id = req.command_id();
        let token = req.token();

        let Some(service) = self.resolve(session, req.domain_object()) else {
            return response.into_reply(codes::INVALID_HANDLE.code(), domain_framing, token);
        };

        let ctx = ServiceContext {
            state: &self.state,
            manager: self,
            process,
            session,
        };

        let mut service = service.lock();
        log::debug!(
            "{}: {} ({:#x})",
            service.name(),
            service.command_name(command_id).unwrap_or("?"),
            command_id,
        );

        // The dispatcher is the first recovery point for handler faults: a
        // panicking handler is contained here and the guest sees a generic
        // internal error instead of a host crash.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            service.dispatch(&ctx, command_id, &mut req, &mut response)
        }));

        let result = match outcome {
            Ok(Ok(())) => ResultCode::SUCCESS,
            Ok(Err(err)) => {
                log::debug!("{}: command {command_id:#x} returned {err}", service.name());
                err.code()
            }
            Err(_) => {
                log::error!(
                    "{}: handler fault contained for command {command_id:#x}",
                    service.name(),
                );
                codes::INTERNAL_ERROR.code()
            }
        };

        response.into_reply(result, domain_framing, token)
    }

    /// Handles CMIF control requests (session management).
    fn control(
        &self,
        process: &Arc<KProcess>,
        session: &Arc<KSession>,
        command: CommandBuffer,
    ) -> ReplyBuffer {
        let mut response = IpcResponse::new(command.out_buffers);

        // Control messages never carry domain framing.
        let parsed = IpcRequest::parse(
            command.payload,
            false,
            command.in_buffers,
            command.copy_handles,
            command.move_handles,
        );
        let hos_sf::ParsedRequest::Command(mut req) = (match parsed {
            Ok(parsed) => parsed,
            Err(violation) => {
                log::warn!("malformed control request: {violation}");
                return response.into_reply(codes::INVALID_HEADER.code(), false, 0);
            }
        }) else {
            return response.into_reply(codes::INVALID_HEADER.code(), false, 0);
        };

        let token = req.token();
        let result = self
            .control_command(process, session, &mut req, &mut response)
            .map_or_else(hos_result::Error::code, |()| ResultCode::SUCCESS);
        response.into_reply(result, false, token)
    }

    fn control_command(
        &self,
        process: &Arc<KProcess>,
        session: &Arc<KSession>,
        req: &mut IpcRequest,
        response: &mut IpcResponse,
    ) -> CommandResult {
        match req.command_id() {
            control::CONVERT_TO_DOMAIN => {
                let root = session.convert_to_domain();
                log::debug!("session {} converted to domain", session.id().value());
                response.push(root);
                Ok(())
            }
            control::COPY_FROM_CURRENT_DOMAIN => {
                let object_id: u32 = req.pop()?;
                let service = self
                    .resolve(session, Some(object_id))
                    .ok_or(codes::INVALID_HANDLE)?;
                self.bind_standalone(process, service, response)
            }
            control::CLONE_OBJECT | control::CLONE_OBJECT_EX => {
                let service = self
                    .resolve(session, None)
                    .ok_or(codes::INVALID_HANDLE)?;
                self.bind_standalone(process, service, response)
            }
            control::QUERY_POINTER_BUFFER_SIZE => {
                response.push(POINTER_BUFFER_SIZE);
                Ok(())
            }
            other => {
                log::warn!("unknown control command {other:#x}");
                Err(codes::UNKNOWN_COMMAND)
            }
        }
    }

    /// Binds an existing instance behind a fresh standalone session.
    fn bind_standalone(
        &self,
        process: &Arc<KProcess>,
        service: ServiceRef,
        response: &mut IpcResponse,
    ) -> CommandResult {
        let session = Arc::new(KSession::new());
        self.bindings.lock().insert(session.id(), service);
        let handle = process.open_handle(KernelObject::Session(session))?;
        response.move_handle(handle.to_raw());
        Ok(())
    }

    /// Resolves the service instance a request targets.
    ///
    /// Lookup is always session-scoped: `None` and the root object id name
    /// the session's own binding, anything else a domain object of this
    /// session. There is no global fallback.
    fn resolve(&self, session: &Arc<KSession>, object: Option<u32>) -> Option<ServiceRef> {
        match object {
            None | Some(ROOT_OBJECT_ID) => self.bindings.lock().get(&session.id()).cloned(),
            Some(object_id) => self
                .domains
                .lock()
                .get(&(session.id(), object_id))
                .cloned(),
        }
    }
}

/// Builds an error reply preserving the request's out-buffer shape.
fn error_reply(command: CommandBuffer, result: ResultCode) -> ReplyBuffer {
    IpcResponse::new(command.out_buffers).into_reply(result, false, 0)
}

/// The built-in service registry.
///
/// One entry per guest-visible service name; the long tail of trivial
/// services grows here mechanically.
fn builtin_registry() -> Vec<(ServiceName, ServiceFactory)> {
    fn boxed<S: HleService + Default + 'static>() -> Box<dyn HleService> {
        Box::new(S::default())
    }

    vec![
        (name("sm:"), boxed::<crate::sm::IUserInterface>),
        (name("psm"), boxed::<crate::psm::IPsmServer>),
        (name("ts"), boxed::<crate::ts::IMeasurementServer>),
        (name("clkrst"), boxed::<crate::clkrst::IClkrstManager>),
        (name("apm"), boxed::<crate::apm::IManager>),
        (name("apm:am"), boxed::<crate::apm::IManager>),
        (name("nifm:u"), boxed::<crate::nifm::IStaticService>),
        (name("fsp-srv"), boxed::<crate::fssrv::IFileSystemProxy>),
        (name("nim:eca"), boxed::<crate::nim::IShopServiceAccessServerInterface>),
        (name("caps:a"), boxed::<crate::capsrv::IAlbumAccessorService>),
        (name("appletOE"), boxed::<crate::am::IApplicationProxyService>),
        (name("set"), boxed::<crate::set::ISettingsServer>),
        (name("set:sys"), boxed::<crate::set::ISystemSettingsServer>),
    ]
}

fn name(raw: &str) -> ServiceName {
    ServiceName::new(raw).unwrap_or_else(|| unreachable!("service name too long: {raw}"))
}
