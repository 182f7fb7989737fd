//! Emulation lifecycle: start, resolve services the way a guest does,
//! exchange IPC, stop, observe teardown.

use hos_kernel::{ApplicationMetadata, Handle, LoadedImage, Settings};
use hos_rt::EmulationSession;
use hos_sf::{CommandBuffer, ServiceName};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn image() -> LoadedImage {
    LoadedImage {
        entry_point: 0x8000_0000,
        segments: Vec::new(),
        metadata: Some(ApplicationMetadata {
            name: "LifecycleTest".into(),
            title_id: 0x0100_0000_0000_BEEF,
            publisher: "Tests".into(),
            version: "1.2.3".into(),
            icon: Vec::new(),
            languages: vec!["en-US".into(), "ja".into()],
        }),
    }
}

#[test]
fn guest_boot_sequence_resolves_and_calls_services() {
    init_logging();
    let session = EmulationSession::start(image(), Settings::default());
    assert!(session.is_running());

    // Guest boot: connect to sm:, initialize, resolve ts by name.
    let sm = session.connect_to_named_port("sm:").unwrap();
    let reply = session
        .send_sync_request(sm, CommandBuffer::request(0x0).build())
        .unwrap();
    assert_eq!(reply.out_header().unwrap().result, 0);

    let reply = session
        .send_sync_request(
            sm,
            CommandBuffer::request(0x1)
                .arg(ServiceName::new("ts").unwrap().to_wire())
                .build(),
        )
        .unwrap();
    assert_eq!(reply.out_header().unwrap().result, 0);
    let ts = Handle::from_raw(reply.move_handles[0]);

    let reply = session
        .send_sync_request(ts, CommandBuffer::request(0x1).arg(0u8).build())
        .unwrap();
    assert_eq!(reply.out_header().unwrap().result, 0);
    assert_eq!(reply.data(), 35u32.to_le_bytes());

    session.close_handle(ts).unwrap();
    session.stop();

    assert!(!session.is_running());
    assert!(session.state().process().is_none());
    assert!(session.connect_to_named_port("sm:").is_err());
}

#[test]
fn stop_is_idempotent_and_counters_survive() {
    init_logging();
    let session = EmulationSession::start(LoadedImage::default(), Settings::default());

    session.notify_frame(16_000_000);
    session.notify_frame(16_000_000);
    session.stop();
    session.stop();

    let perf = session.performance();
    assert_eq!(perf.frames, 2);
    assert!((perf.average_frame_time_ms - 16.0).abs() < 1e-9);
}

#[test]
fn settings_refresh_reaches_services() {
    init_logging();
    let session = EmulationSession::start(LoadedImage::default(), Settings::default());

    let mut settings = Settings::default();
    settings.language = "ja".into();
    session.update_settings(settings);

    let set = session.connect_to_named_port("set").unwrap();
    let reply = session
        .send_sync_request(set, CommandBuffer::request(0x0).build())
        .unwrap();
    assert_eq!(reply.out_header().unwrap().result, 0);
    assert_eq!(reply.data(), u64::from_le_bytes(*b"ja\0\0\0\0\0\0").to_le_bytes());
}
