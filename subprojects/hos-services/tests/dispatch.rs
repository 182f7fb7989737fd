//! End-to-end dispatch tests: guest-shaped command buffers in, wire replies
//! out, through the full manager/session/handle-table path.

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use hos_kernel::{ApplicationMetadata, DeviceState, Handle, KProcess, LoadedImage};
use hos_result::{ResultCode, codes};
use hos_services::{
    CommandResult, HleService, ServiceContext, ServiceManager, service_commands,
};
use hos_sf::{
    CommandBuffer, IpcRequest, IpcResponse, ReplyBuffer, RequestBuilder, ServiceName,
    cmif::control,
};

fn setup() -> (Arc<DeviceState>, Arc<KProcess>, ServiceManager) {
    let state = Arc::new(DeviceState::default());
    let image = LoadedImage {
        entry_point: 0x8000_0000,
        segments: Vec::new(),
        metadata: Some(ApplicationMetadata {
            name: "TestTitle".into(),
            title_id: 0x0100_0000_0000_C0DE,
            publisher: "TestPub".into(),
            version: "1.0.0".into(),
            icon: Vec::new(),
            languages: vec!["en-US".into()],
        }),
    };
    let process = Arc::new(KProcess::new(image));
    state.attach_process(&process);
    let manager = ServiceManager::new(state.clone());
    (state, process, manager)
}

fn open(manager: &ServiceManager, process: &Arc<KProcess>, name: &str) -> Handle {
    manager
        .open_named_session(process, ServiceName::new(name).unwrap())
        .unwrap()
}

fn expect_success(reply: &ReplyBuffer) {
    assert_eq!(reply.out_header().unwrap().result, 0, "reply: {reply:?}");
}

#[test]
fn thermal_sensor_reports_by_location() {
    let (_state, process, manager) = setup();
    let handle = open(&manager, &process, "ts");

    for (location, expected) in [(0u8, 35u32), (1u8, 20u32)] {
        let reply = manager
            .dispatch(
                &process,
                handle,
                CommandBuffer::request(0x1).arg(location).build(),
            )
            .unwrap();
        expect_success(&reply);
        assert_eq!(reply.data(), expected.to_le_bytes());
    }
}

#[test]
fn battery_percentage_is_stateless_constant() {
    let (_state, process, manager) = setup();
    let handle = open(&manager, &process, "psm");

    for _ in 0..3 {
        let reply = manager
            .dispatch(&process, handle, CommandBuffer::request(0x0).build())
            .unwrap();
        expect_success(&reply);
        assert_eq!(reply.data(), 100u32.to_le_bytes());
    }
}

#[test]
fn unknown_command_writes_no_payload() {
    let (_state, process, manager) = setup();
    let handle = open(&manager, &process, "psm");

    let reply = manager
        .dispatch(&process, handle, CommandBuffer::request(0x7777).build())
        .unwrap();
    assert_eq!(
        reply.out_header().unwrap().result,
        codes::UNKNOWN_COMMAND.to_raw()
    );
    assert!(reply.data().is_empty());
}

#[test]
fn command_ids_are_scoped_per_service() {
    let (_state, process, manager) = setup();

    // Command 0x1 means GetChargerType on psm but GetTemperature on ts;
    // each session resolves it against its own instance's table only.
    let psm = open(&manager, &process, "psm");
    let ts = open(&manager, &process, "ts");

    let reply = manager
        .dispatch(&process, psm, CommandBuffer::request(0x1).build())
        .unwrap();
    expect_success(&reply);
    assert_eq!(reply.data(), 1u32.to_le_bytes());

    let reply = manager
        .dispatch(&process, ts, CommandBuffer::request(0x1).arg(0u8).build())
        .unwrap();
    expect_success(&reply);
    assert_eq!(reply.data(), 35u32.to_le_bytes());

    // An id neither table carries fails identically on both.
    for handle in [psm, ts] {
        let reply = manager
            .dispatch(&process, handle, CommandBuffer::request(0x4444).build())
            .unwrap();
        assert_eq!(
            reply.out_header().unwrap().result,
            codes::UNKNOWN_COMMAND.to_raw()
        );
        assert!(reply.data().is_empty());
    }
}

#[test]
fn session_factory_yields_independent_sessions() {
    let (_state, process, manager) = setup();
    let manager_handle = open(&manager, &process, "ts");

    let mut sessions = Vec::new();
    for _ in 0..2 {
        let reply = manager
            .dispatch(&process, manager_handle, CommandBuffer::request(0x4).build())
            .unwrap();
        expect_success(&reply);
        assert_eq!(reply.move_handles.len(), 1);
        sessions.push(Handle::from_raw(reply.move_handles[0]));
    }

    let [first, second] = sessions[..] else {
        unreachable!()
    };
    assert_ne!(first, second);

    // Both dispatch independently (any id: the sub-session table is empty,
    // so UNKNOWN_COMMAND proves the handler path was reached).
    for handle in [first, second] {
        let reply = manager
            .dispatch(&process, handle, CommandBuffer::request(0x0).build())
            .unwrap();
        assert_eq!(
            reply.out_header().unwrap().result,
            codes::UNKNOWN_COMMAND.to_raw()
        );
    }

    // Closing one leaves the other dispatchable.
    manager.close_handle(&process, first).unwrap();
    assert!(
        manager
            .dispatch(&process, first, CommandBuffer::request(0x0).build())
            .is_err()
    );
    assert!(
        manager
            .dispatch(&process, second, CommandBuffer::request(0x0).build())
            .is_ok()
    );
}

#[test]
fn dispatch_after_close_reports_session_closed() {
    let (_state, process, manager) = setup();
    let handle = open(&manager, &process, "psm");
    let session = process.get_session(handle).unwrap();

    manager.close_session(&session);
    // Close is idempotent.
    manager.close_session(&session);

    let err = manager
        .dispatch(&process, handle, CommandBuffer::request(0x0).build())
        .unwrap_err();
    assert_eq!(err, codes::SESSION_CLOSED);
}

#[test]
fn close_message_tears_down_the_session() {
    let (_state, process, manager) = setup();
    let handle = open(&manager, &process, "psm");

    let reply = manager
        .dispatch(&process, handle, CommandBuffer::close())
        .unwrap();
    assert_eq!(reply.out_header().unwrap().result, 0);

    let err = manager
        .dispatch(&process, handle, CommandBuffer::request(0x0).build())
        .unwrap_err();
    assert_eq!(err, codes::SESSION_CLOSED);
}

#[test]
fn invalid_handle_is_a_transport_error() {
    let (_state, process, manager) = setup();
    let err = manager
        .dispatch(
            &process,
            Handle::from_raw(0xDEAD),
            CommandBuffer::request(0x0).build(),
        )
        .unwrap_err();
    assert_eq!(err, codes::INVALID_HANDLE);
}

#[test]
fn unknown_service_name_is_guest_visible() {
    let (_state, process, manager) = setup();
    let sm = open(&manager, &process, "sm:");

    let reply = manager
        .dispatch(
            &process,
            sm,
            CommandBuffer::request(0x1)
                .arg(ServiceName::new("nosuchsv").unwrap().to_wire())
                .build(),
        )
        .unwrap();
    assert_eq!(
        reply.out_header().unwrap().result,
        codes::SERVICE_NOT_REGISTERED.to_raw()
    );
}

#[test]
fn sm_resolves_registered_services() {
    let (_state, process, manager) = setup();
    let sm = open(&manager, &process, "sm:");

    // Initialize, then resolve psm through the front door.
    let reply = manager
        .dispatch(&process, sm, CommandBuffer::request(0x0).build())
        .unwrap();
    expect_success(&reply);

    let reply = manager
        .dispatch(
            &process,
            sm,
            CommandBuffer::request(0x1)
                .arg(ServiceName::new("psm").unwrap().to_wire())
                .build(),
        )
        .unwrap();
    expect_success(&reply);
    assert_eq!(reply.move_handles.len(), 1);

    let psm = Handle::from_raw(reply.move_handles[0]);
    let reply = manager
        .dispatch(&process, psm, CommandBuffer::request(0x0).build())
        .unwrap();
    expect_success(&reply);
    assert_eq!(reply.data(), 100u32.to_le_bytes());
}

#[test]
fn domain_conversion_and_routing() {
    let (_state, process, manager) = setup();
    let handle = open(&manager, &process, "ts");

    // Convert the session to a domain (control request 0).
    let reply = manager
        .dispatch(
            &process,
            handle,
            CommandBuffer::control(control::CONVERT_TO_DOMAIN).build(),
        )
        .unwrap();
    expect_success(&reply);
    assert_eq!(reply.data(), 1u32.to_le_bytes());

    // OpenSession now yields a domain object id instead of a move handle.
    let reply = manager
        .dispatch(
            &process,
            handle,
            CommandBuffer::request(0x4).domain_object(1).build(),
        )
        .unwrap();
    expect_success(&reply);
    assert!(reply.move_handles.is_empty());
    let objects = reply.objects();
    assert_eq!(objects.len(), 1);
    let sub_object = objects[0];
    assert_ne!(sub_object, 1);

    // The root object still dispatches through the domain header.
    let reply = manager
        .dispatch(
            &process,
            handle,
            CommandBuffer::request(0x1).domain_object(1).arg(1u8).build(),
        )
        .unwrap();
    expect_success(&reply);
    assert_eq!(reply.data(), 20u32.to_le_bytes());

    // The sub-object dispatches too (empty table: UNKNOWN_COMMAND).
    let reply = manager
        .dispatch(
            &process,
            handle,
            CommandBuffer::request(0x0).domain_object(sub_object).build(),
        )
        .unwrap();
    assert_eq!(
        reply.out_header().unwrap().result,
        codes::UNKNOWN_COMMAND.to_raw()
    );

    // Closing the sub-object unbinds it.
    let reply = manager
        .dispatch(&process, handle, RequestBuilder::close_object(sub_object))
        .unwrap();
    assert_eq!(reply.out_header().unwrap().result, 0);
    let reply = manager
        .dispatch(
            &process,
            handle,
            CommandBuffer::request(0x0).domain_object(sub_object).build(),
        )
        .unwrap();
    assert_eq!(
        reply.out_header().unwrap().result,
        codes::INVALID_HANDLE.to_raw()
    );
}

#[test]
fn malformed_domain_request_keeps_domain_framing() {
    let (_state, process, manager) = setup();
    let handle = open(&manager, &process, "ts");

    manager
        .dispatch(
            &process,
            handle,
            CommandBuffer::control(control::CONVERT_TO_DOMAIN).build(),
        )
        .unwrap();

    // Corrupt the CMIF magic behind the domain header; the error reply must
    // still carry the framing a domain-session client parses.
    let mut buffer = CommandBuffer::request(0x1).domain_object(1).arg(0u8).build();
    buffer.payload[16] ^= 0xFF;
    let reply = manager.dispatch(&process, handle, buffer).unwrap();
    assert!(reply.is_domain);
    assert_eq!(
        reply.out_header().unwrap().result,
        codes::INVALID_HEADER.to_raw()
    );
}

#[test]
fn clone_object_shares_the_instance() {
    let (_state, process, manager) = setup();
    let handle = open(&manager, &process, "apm");

    // Open a session and set a configuration through it.
    let reply = manager
        .dispatch(&process, handle, CommandBuffer::request(0x0).build())
        .unwrap();
    let session_handle = Handle::from_raw(reply.move_handles[0]);
    let reply = manager
        .dispatch(
            &process,
            session_handle,
            CommandBuffer::request(0x0).arg(0i32).arg(0xAA55u32).build(),
        )
        .unwrap();
    expect_success(&reply);

    // A clone of the session observes the same instance state.
    let reply = manager
        .dispatch(
            &process,
            session_handle,
            CommandBuffer::control(control::CLONE_OBJECT).build(),
        )
        .unwrap();
    expect_success(&reply);
    let clone_handle = Handle::from_raw(reply.move_handles[0]);
    assert_ne!(clone_handle, session_handle);

    let reply = manager
        .dispatch(
            &process,
            clone_handle,
            CommandBuffer::request(0x1).arg(0i32).build(),
        )
        .unwrap();
    expect_success(&reply);
    assert_eq!(reply.data(), 0xAA55u32.to_le_bytes());
}

#[test]
fn query_pointer_buffer_size() {
    let (_state, process, manager) = setup();
    let handle = open(&manager, &process, "ts");

    let reply = manager
        .dispatch(
            &process,
            handle,
            CommandBuffer::control(control::QUERY_POINTER_BUFFER_SIZE).build(),
        )
        .unwrap();
    expect_success(&reply);
    assert_eq!(reply.data(), 0x500u16.to_le_bytes());
}

#[test]
fn firmware_version_fills_the_out_buffer() {
    let (_state, process, manager) = setup();
    let handle = open(&manager, &process, "set:sys");

    let reply = manager
        .dispatch(
            &process,
            handle,
            CommandBuffer::request(0x4).out_buffer(0x100).build(),
        )
        .unwrap();
    expect_success(&reply);

    let blob = reply.out_buffers[0].as_slice();
    assert_eq!(blob.len(), 0x100);
    assert_eq!(blob[0], 15); // major
    assert_eq!(&blob[8..10], b"NX"); // platform
    assert_eq!(blob[4], 1); // revision preserved by version 2

    // Version 1 zeroes the revision.
    let reply = manager
        .dispatch(
            &process,
            handle,
            CommandBuffer::request(0x3).out_buffer(0x100).build(),
        )
        .unwrap();
    expect_success(&reply);
    assert_eq!(reply.out_buffers[0].as_slice()[4], 0);
}

#[test]
fn save_data_listing_enumerates_running_title() {
    let (_state, process, manager) = setup();
    let fs = open(&manager, &process, "fsp-srv");

    let reply = manager
        .dispatch(&process, fs, CommandBuffer::request(0x3C).build())
        .unwrap();
    expect_success(&reply);
    let reader = Handle::from_raw(reply.move_handles[0]);

    // First read: one synthesized entry for the running title.
    let reply = manager
        .dispatch(
            &process,
            reader,
            CommandBuffer::request(0x0).out_buffer(0x60 * 4).build(),
        )
        .unwrap();
    expect_success(&reply);
    assert_eq!(reply.data(), 1u64.to_le_bytes());
    let entry = reply.out_buffers[0].as_slice();
    assert_eq!(
        &entry[0x28..0x30],
        &0x0100_0000_0000_C0DEu64.to_le_bytes()
    );

    // Second read: enumeration is exhausted.
    let reply = manager
        .dispatch(
            &process,
            reader,
            CommandBuffer::request(0x0).out_buffer(0x60 * 4).build(),
        )
        .unwrap();
    expect_success(&reply);
    assert_eq!(reply.data(), 0u64.to_le_bytes());
}

#[test]
fn nifm_request_hands_out_completion_events() {
    let (_state, process, manager) = setup();
    let nifm = open(&manager, &process, "nifm:u");

    let reply = manager
        .dispatch(&process, nifm, CommandBuffer::request(0x5).build())
        .unwrap();
    let general = Handle::from_raw(reply.move_handles[0]);

    let reply = manager
        .dispatch(
            &process,
            general,
            CommandBuffer::request(0x4).arg(0u32).build(),
        )
        .unwrap();
    let request = Handle::from_raw(reply.move_handles[0]);

    let reply = manager
        .dispatch(&process, request, CommandBuffer::request(0x2).build())
        .unwrap();
    expect_success(&reply);
    assert_eq!(reply.copy_handles.len(), 2);
    let event = process
        .get_event(Handle::from_raw(reply.copy_handles[0]))
        .unwrap();
    assert!(!event.poll());

    // Submission completes immediately and signals the first event.
    let reply = manager
        .dispatch(&process, request, CommandBuffer::request(0x4).build())
        .unwrap();
    expect_success(&reply);
    assert!(event.poll());
}

#[test]
fn applet_message_queue_drains_to_no_messages() {
    let (_state, process, manager) = setup();
    let applet = open(&manager, &process, "appletOE");

    let reply = manager
        .dispatch(&process, applet, CommandBuffer::request(0x0).build())
        .unwrap();
    let proxy = Handle::from_raw(reply.move_handles[0]);

    let reply = manager
        .dispatch(&process, proxy, CommandBuffer::request(0x0).build())
        .unwrap();
    let state_getter = Handle::from_raw(reply.move_handles[0]);

    // First message: focus state changed.
    let reply = manager
        .dispatch(&process, state_getter, CommandBuffer::request(0x1).build())
        .unwrap();
    expect_success(&reply);
    assert_eq!(reply.data(), 15u32.to_le_bytes());

    // Queue now empty: guest-visible NoMessages, module am.
    let reply = manager
        .dispatch(&process, state_getter, CommandBuffer::request(0x1).build())
        .unwrap();
    let result = ResultCode::from_raw(reply.out_header().unwrap().result);
    assert_eq!(result.module(), 128);
    assert_eq!(result.description(), 3);
}

// A deliberately faulty service used to prove the dispatcher contains
// handler panics instead of unwinding past the boundary.
static FAULT_COUNT: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Default)]
struct FaultyService;

impl FaultyService {
    fn explode(
        &mut self,
        _ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        _res: &mut IpcResponse,
    ) -> CommandResult {
        FAULT_COUNT.fetch_add(1, Ordering::Relaxed);
        panic!("handler defect");
    }

    fn still_alive(
        &mut self,
        _ctx: &ServiceContext<'_>,
        _req: &mut IpcRequest,
        res: &mut IpcResponse,
    ) -> CommandResult {
        res.push(1u32);
        Ok(())
    }
}

service_commands! {
    impl FaultyService {
        0x0 => explode,
        0x1 => still_alive,
    }
}

fn faulty_factory() -> Box<dyn HleService> {
    Box::new(FaultyService)
}

#[test]
fn handler_faults_are_contained_at_the_dispatch_boundary() {
    let state = Arc::new(DeviceState::default());
    let process = Arc::new(KProcess::new(LoadedImage::default()));
    let manager = ServiceManager::with_registry(
        state,
        vec![(ServiceName::new("faulty").unwrap(), faulty_factory)],
    );
    let handle = open(&manager, &process, "faulty");

    let reply = manager
        .dispatch(&process, handle, CommandBuffer::request(0x0).build())
        .unwrap();
    assert_eq!(
        reply.out_header().unwrap().result,
        codes::INTERNAL_ERROR.to_raw()
    );
    assert_eq!(FAULT_COUNT.load(Ordering::Relaxed), 1);

    // Execution continues: the same instance still dispatches.
    let reply = manager
        .dispatch(&process, handle, CommandBuffer::request(0x1).build())
        .unwrap();
    expect_success(&reply);
    assert_eq!(reply.data(), 1u32.to_le_bytes());
}

#[test]
fn concurrent_sessions_dispatch_independently() {
    let (_state, process, manager) = setup();
    let manager = Arc::new(manager);

    let mut workers = Vec::new();
    for _ in 0..4 {
        let manager = manager.clone();
        let process = process.clone();
        workers.push(std::thread::spawn(move || {
            let handle = open(&manager, &process, "psm");
            for _ in 0..50 {
                let reply = manager
                    .dispatch(&process, handle, CommandBuffer::request(0x0).build())
                    .unwrap();
                assert_eq!(reply.data(), 100u32.to_le_bytes());
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }
}
