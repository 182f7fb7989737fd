//! Applet manager services (`appletOE`).
//!
//! The application proxy tree: one proxy per running application, handing
//! out the narrower-scoped controllers the guest framework expects. Only
//! the surface titles touch during startup and focus handling is
//! implemented.

use std::collections::VecDeque;
use std::sync::Arc;

use hos_kernel::{KEvent, KernelObject};
use hos_result::{Error, Module};
use hos_sf::{IpcRequest, IpcResponse};

use crate::{CommandResult, ServiceContext, service_commands, set::language_code};

/// No message is pending in the applet message queue (am, 2128-0003).
const NO_MESSAGES: Error = Error::from_parts(Module::Am, 3);

/// Applet message: the application gained focus.
const MESSAGE_FOCUS_STATE_CHANGED: u32 = 15;

/// Focus state: the application is in focus.
const FOCUS_STATE_IN_FOCUS: u8 = 1;

/// `appletOE` — application proxy factory.
#[derive(Debug, Default)]
pub struct IApplicationProxyService;

impl IApplicationProxyService {
    /// Opens the application's proxy.
    fn open_application_proxy(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        ctx.manager
            .register_service(Box::new(IApplicationProxy), ctx.session, ctx.process, res)
    }
}

service_commands! {
    impl IApplicationProxyService {
        0x0 => open_application_proxy,
    }
}

/// Application proxy, handing out scoped controllers.
#[derive(Debug, Default)]
pub struct IApplicationProxy;

impl IApplicationProxy {
    fn get_common_state_getter(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        ctx.manager.register_service(
            Box::new(ICommonStateGetter::default()),
            ctx.session,
            ctx.process,
            res,
        )
    }

    fn get_self_controller(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        ctx.manager
            .register_service(Box::new(ISelfController), ctx.session, ctx.process, res)
    }

    fn get_application_functions(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        ctx.manager
            .register_service(Box::new(IApplicationFunctions), ctx.session, ctx.process, res)
    }

    fn get_debug_functions(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        ctx.manager
            .register_service(Box::new(IDebugFunctions), ctx.session, ctx.process, res)
    }
}

service_commands! {
    impl IApplicationProxy {
        0x0 => get_common_state_getter,
        0x1 => get_self_controller,
        0x14 => get_application_functions,
        0x3E8 => get_debug_functions,
    }
}

/// Shared applet state: the message queue and its wakeup event.
///
/// The queue starts with a focus-state change so the application observes
/// itself gaining focus on its first poll, matching console boot behavior.
#[derive(Debug)]
pub struct ICommonStateGetter {
    message_event: Arc<KEvent>,
    messages: VecDeque<u32>,
}

impl Default for ICommonStateGetter {
    fn default() -> Self {
        let event = Arc::new(KEvent::new());
        event.signal();
        Self {
            message_event: event,
            messages: VecDeque::from([MESSAGE_FOCUS_STATE_CHANGED]),
        }
    }
}

impl ICommonStateGetter {
    /// Hands the guest a copy handle to the message wakeup event.
    fn get_event_handle(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        let handle = ctx
            .process
            .open_handle(KernelObject::Event(self.message_event.clone()))?;
        res.copy_handle(handle.to_raw());
        Ok(())
    }

    /// Pops the next applet message, failing when the queue is empty.
    fn receive_message(
        &mut self,
        _ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        let message = self.messages.pop_front().ok_or(NO_MESSAGES)?;
        if self.messages.is_empty() {
            self.message_event.clear();
        }
        res.push(message);
        Ok(())
    }

    fn get_current_focus_state(
        &mut self,
        _ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        res.push(FOCUS_STATE_IN_FOCUS);
        Ok(())
    }
}

service_commands! {
    impl ICommonStateGetter {
        0x0 => get_event_handle,
        0x1 => receive_message,
        0x9 => get_current_focus_state,
    }
}

/// Application self-controller. State transitions the guest requests are
/// accepted and ignored; nothing here affects a host window.
#[derive(Debug, Default)]
pub struct ISelfController;

impl ISelfController {
    fn lock_exit(
        &mut self,
        _ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        _res: &mut IpcResponse,
    ) -> CommandResult {
        Ok(())
    }

    fn unlock_exit(
        &mut self,
        _ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        _res: &mut IpcResponse,
    ) -> CommandResult {
        Ok(())
    }

    fn set_focus_handling_mode(
        &mut self,
        _ctx: &ServiceContext<'_>,
        req: &mut IpcRequest,
        _res: &mut IpcResponse,
    ) -> CommandResult {
        let _flags: [u8; 3] = req.pop()?;
        Ok(())
    }

    fn set_out_of_focus_suspending_enabled(
        &mut self,
        _ctx: &ServiceContext<'_>,
        req: &mut IpcRequest,
        _res: &mut IpcResponse,
    ) -> CommandResult {
        let _enabled: u8 = req.pop()?;
        Ok(())
    }

    /// Creates the application's display layer and returns its id.
    fn create_managed_display_layer(
        &mut self,
        _ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        res.push(0u64);
        Ok(())
    }
}

service_commands! {
    impl ISelfController {
        0x1 => lock_exit,
        0x2 => unlock_exit,
        0xD => set_focus_handling_mode,
        0x10 => set_out_of_focus_suspending_enabled,
        0x28 => create_managed_display_layer,
    }
}

/// Application-facing functions.
#[derive(Debug, Default)]
pub struct IApplicationFunctions;

impl IApplicationFunctions {
    /// Returns the language the application should present in, as a packed
    /// language-code value, honoring the title's supported set when the
    /// loader provided one.
    fn get_desired_language(
        &mut self,
        ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        let settings = ctx.state.settings();
        let supported = ctx
            .state
            .process()
            .and_then(|process| process.metadata().map(|meta| meta.languages.clone()))
            .unwrap_or_default();

        let language = if supported.is_empty() || supported.iter().any(|l| *l == settings.language)
        {
            settings.language
        } else {
            supported[0].clone()
        };
        res.push(language_code(&language));
        Ok(())
    }

    /// Acknowledges that the application reached its main loop.
    fn notify_running(
        &mut self,
        _ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        res.push(0u8);
        Ok(())
    }
}

service_commands! {
    impl IApplicationFunctions {
        0x15 => get_desired_language,
        0x28 => notify_running,
    }
}

/// Debug functions. No commands are implemented yet.
#[derive(Debug, Default)]
pub struct IDebugFunctions;

service_commands! {
    impl IDebugFunctions {}
}

