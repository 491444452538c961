//! Integration tests for the desk session.
//!
//! These run entirely against [`MockTransport`]; tests that need a physical
//! desk are `#[ignore]`d and can be run with `cargo test -- --ignored`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ergomate_core::mock::MockTransport;
use ergomate_core::uuids::{NOTIFY_CHARACTERISTIC, WRITE_CHARACTERISTIC};
use ergomate_core::{
    ConnectionConfig, ConnectionStatus, Desk, DeskEvent, DeskTransport, Error, ReconnectOptions,
    UnsupportedFeature,
};

const UP_FRAME: [u8; 5] = [0xA5, 0x00, 0x20, 0xDF, 0xFF];
const DOWN_FRAME: [u8; 5] = [0xA5, 0x00, 0x40, 0xBF, 0xFF];
const STOP_FRAME: [u8; 5] = [0xA5, 0x00, 0x00, 0xFF, 0xFF];

fn make_desk(offset_cm: f32) -> (Arc<Desk>, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let desk = Desk::with_transport(
        "AA:BB:CC:DD:EE:FF",
        offset_cm,
        Arc::clone(&transport) as Arc<dyn ergomate_core::DeskTransport>,
        ConnectionConfig::default(),
    );
    (Arc::new(desk), transport)
}

/// Wait (in paused time) until the desk reports connected again.
async fn wait_for_reconnect(desk: &Desk) {
    // The status is still the stale `Connected` until the supervisor task is
    // polled, so first wait for it to leave `Connected` before polling for
    // the reconnection.
    for _ in 0..600 {
        if desk.status() != ConnectionStatus::Connected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    for _ in 0..600 {
        if desk.status() == ConnectionStatus::Connected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("desk did not reconnect within the test window");
}

fn drain_events(rx: &mut ergomate_core::EventReceiver) -> Vec<DeskEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let (desk, transport) = make_desk(0.0);

    desk.connect().await.unwrap();
    desk.connect().await.unwrap();

    assert_eq!(desk.status(), ConnectionStatus::Connected);
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test]
async fn test_concurrent_connects_share_one_attempt() {
    let (desk, transport) = make_desk(0.0);

    let a = {
        let desk = Arc::clone(&desk);
        tokio::spawn(async move { desk.connect().await })
    };
    let b = {
        let desk = Arc::clone(&desk);
        tokio::spawn(async move { desk.connect().await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_yields_typed_error() {
    let transport = Arc::new(MockTransport::new());
    let config = ConnectionConfig::default().connect_timeout(Duration::from_secs(2));
    let desk = Desk::with_transport(
        "AA:BB:CC:DD:EE:FF",
        0.0,
        Arc::clone(&transport) as Arc<dyn ergomate_core::DeskTransport>,
        config,
    );

    // Peripheral in range but the handshake never completes.
    transport.hang_next_opens(1);
    match desk.connect().await {
        Err(Error::Timeout { operation, duration }) => {
            assert_eq!(operation, "connect");
            assert_eq!(duration, Duration::from_secs(2));
        }
        other => panic!("expected timeout error, got {:?}", other),
    }
    assert_eq!(desk.status(), ConnectionStatus::Disconnected);

    // A later attempt with a responsive peripheral succeeds.
    desk.connect().await.unwrap();
    assert_eq!(desk.status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_write_failure_surfaces_without_reconnect() {
    let (desk, transport) = make_desk(0.0);
    desk.connect().await.unwrap();

    transport.set_fail_writes(true);
    assert!(matches!(
        desk.move_up().await,
        Err(Error::WriteFailed { .. })
    ));
    assert!(!desk.is_moving());

    // A failed write is not link loss: still connected, no reopen.
    assert_eq!(desk.status(), ConnectionStatus::Connected);
    assert_eq!(transport.open_count(), 1);

    transport.set_fail_writes(false);
    desk.move_up().await.unwrap();
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test]
async fn test_failed_connect_returns_to_disconnected() {
    let (desk, transport) = make_desk(0.0);
    transport.fail_next_opens(1);

    assert!(desk.connect().await.is_err());
    assert_eq!(desk.status(), ConnectionStatus::Disconnected);

    // A later attempt succeeds.
    desk.connect().await.unwrap();
    assert_eq!(desk.status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_motor_commands_write_expected_frames() {
    let (desk, transport) = make_desk(0.0);
    desk.connect().await.unwrap();

    desk.move_up().await.unwrap();
    assert!(desk.is_moving());
    desk.move_down().await.unwrap();
    desk.stop().await.unwrap();
    assert!(!desk.is_moving());

    let frames = transport.frames_for(WRITE_CHARACTERISTIC);
    assert_eq!(frames, vec![UP_FRAME.to_vec(), DOWN_FRAME.to_vec(), STOP_FRAME.to_vec()]);
}

#[tokio::test]
async fn test_command_auto_connects_when_disconnected() {
    let (desk, transport) = make_desk(0.0);

    desk.move_up().await.unwrap();

    assert_eq!(transport.open_count(), 1);
    assert_eq!(desk.status(), ConnectionStatus::Connected);
    assert_eq!(transport.frames_for(WRITE_CHARACTERISTIC), vec![UP_FRAME.to_vec()]);
}

#[tokio::test]
async fn test_move_to_height_encodes_millimeters() {
    let (desk, transport) = make_desk(0.0);
    desk.connect().await.unwrap();

    desk.move_to_height(100.0).await.unwrap();

    let frames = transport.frames_for(WRITE_CHARACTERISTIC);
    assert_eq!(
        frames,
        vec![vec![0xA6, 0xA8, 0x01, 0x03, 0xE8, 0x00, 0x00, 0xEA, 0xFF]]
    );
    assert!(desk.is_moving());
}

#[tokio::test]
async fn test_move_to_height_clamps_out_of_range_targets() {
    let (desk, transport) = make_desk(0.0);
    desk.connect().await.unwrap();

    desk.move_to_height(150.0).await.unwrap();
    desk.move_to_height(10.0).await.unwrap();

    let frames = transport.frames_for(WRITE_CHARACTERISTIC);
    // 150 cm clamps to 130 cm (1300 mm), 10 cm clamps to 65 cm (650 mm).
    assert_eq!(frames[0][3..5], [0x05, 0x14]);
    assert_eq!(frames[1][3..5], [0x02, 0x8A]);
}

#[tokio::test]
async fn test_move_to_height_rejects_non_finite() {
    let (desk, _transport) = make_desk(0.0);
    desk.connect().await.unwrap();

    assert!(matches!(
        desk.move_to_height(f32::NAN).await,
        Err(Error::InvalidConfig(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_timed_move_stops_after_duration() {
    let (desk, transport) = make_desk(0.0);
    desk.connect().await.unwrap();

    desk.move_up_for(Duration::from_secs(3)).await.unwrap();

    let frames = transport.frames_for(WRITE_CHARACTERISTIC);
    assert_eq!(frames, vec![UP_FRAME.to_vec(), STOP_FRAME.to_vec()]);
    assert!(!desk.is_moving());
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_stop_yields_to_later_command() {
    let (desk, transport) = make_desk(0.0);
    desk.connect().await.unwrap();

    let timed = {
        let desk = Arc::clone(&desk);
        tokio::spawn(async move { desk.move_up_for(Duration::from_secs(5)).await })
    };
    // Let the up command land, then supersede the pending stop.
    tokio::time::sleep(Duration::from_millis(100)).await;
    desk.move_down().await.unwrap();
    timed.await.unwrap().unwrap();

    let frames = transport.frames_for(WRITE_CHARACTERISTIC);
    assert_eq!(frames, vec![UP_FRAME.to_vec(), DOWN_FRAME.to_vec()]);
    assert!(desk.is_moving());
}

#[tokio::test(start_paused = true)]
async fn test_early_stop_suppresses_scheduled_stop() {
    let (desk, transport) = make_desk(0.0);
    desk.connect().await.unwrap();

    let timed = {
        let desk = Arc::clone(&desk);
        tokio::spawn(async move { desk.move_up_for(Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    desk.stop().await.unwrap();
    timed.await.unwrap().unwrap();

    // Exactly one stop on the wire; the 5 s mark sends nothing further.
    let frames = transport.frames_for(WRITE_CHARACTERISTIC);
    assert_eq!(frames, vec![UP_FRAME.to_vec(), STOP_FRAME.to_vec()]);
}

#[tokio::test]
async fn test_height_notifications_reach_reading_and_observers() {
    let (desk, transport) = make_desk(2.0);
    desk.connect().await.unwrap();
    desk.subscribe_notifications().await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    desk.register_callback(Arc::new(move |reading| {
        sink.lock().unwrap().push(reading.calibrated_cm());
    }));

    transport.push_notification(NOTIFY_CHARACTERISTIC, b"0720");

    let reading = desk.current_reading().unwrap();
    assert_eq!(reading.raw_mm, 720);
    assert_eq!(desk.raw_height_cm(), Some(72.0));
    assert_eq!(desk.calibrated_height_cm(), Some(74.0));
    assert_eq!(seen.lock().unwrap().as_slice(), &[74.0]);
}

#[tokio::test]
async fn test_observer_fan_out_and_unregister() {
    let (desk, transport) = make_desk(0.0);
    desk.connect().await.unwrap();
    desk.subscribe_notifications().await.unwrap();

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let c1 = Arc::clone(&first);
    let c2 = Arc::clone(&second);
    let h1 = desk.register_callback(Arc::new(move |_| {
        c1.fetch_add(1, Ordering::SeqCst);
    }));
    desk.register_callback(Arc::new(move |_| {
        c2.fetch_add(1, Ordering::SeqCst);
    }));

    transport.push_notification(NOTIFY_CHARACTERISTIC, b"0800");
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);

    assert!(desk.unregister_callback(h1));
    transport.push_notification(NOTIFY_CHARACTERISTIC, b"0810");
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_malformed_and_implausible_payloads_are_dropped() {
    let (desk, transport) = make_desk(0.0);
    desk.connect().await.unwrap();
    desk.subscribe_notifications().await.unwrap();
    let mut events = desk.events();

    transport.push_notification(NOTIFY_CHARACTERISTIC, b"0720");
    transport.push_notification(NOTIFY_CHARACTERISTIC, b"07x0");
    transport.push_notification(NOTIFY_CHARACTERISTIC, b"0400");

    // The last good reading survives both bad payloads.
    assert_eq!(desk.current_reading().unwrap().raw_mm, 720);

    let events = drain_events(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, DeskEvent::MalformedNotification { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, DeskEvent::ImplausibleReading { raw_mm: 400 })));
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let (desk, transport) = make_desk(0.0);
    desk.connect().await.unwrap();
    desk.subscribe_notifications().await.unwrap();
    assert!(transport.is_subscribed(NOTIFY_CHARACTERISTIC));

    desk.unsubscribe_notifications().await.unwrap();
    assert!(!transport.is_subscribed(NOTIFY_CHARACTERISTIC));

    transport.push_notification(NOTIFY_CHARACTERISTIC, b"0900");
    assert!(desk.current_reading().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_link_loss_triggers_reconnect_and_resubscribe() {
    let (desk, transport) = make_desk(0.0);
    desk.connect().await.unwrap();
    desk.subscribe_notifications().await.unwrap();
    let mut events = desk.events();

    transport.drop_link();
    wait_for_reconnect(&desk).await;

    assert_eq!(transport.open_count(), 2);
    assert!(transport.is_subscribed(NOTIFY_CHARACTERISTIC));

    // Notifications resume after the automatic resubscribe.
    transport.push_notification(NOTIFY_CHARACTERISTIC, b"0815");
    assert_eq!(desk.current_reading().unwrap().raw_mm, 815);

    let events = drain_events(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, DeskEvent::Disconnected { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, DeskEvent::ReconnectStarted { attempt: 1, .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, DeskEvent::ReconnectSucceeded { attempts: 1, .. })));
}

#[tokio::test(start_paused = true)]
async fn test_link_drop_right_after_connect_is_not_missed() {
    let (desk, transport) = make_desk(0.0);
    desk.connect().await.unwrap();
    // Keeps the session in active use without yielding to the supervisor.
    desk.register_callback(Arc::new(|_| {}));

    // No await since connect() returned: the supervisor task has not polled
    // yet and must still see this drop.
    transport.drop_link();
    wait_for_reconnect(&desk).await;

    assert_eq!(transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_stands_down_when_caller_reconnects_first() {
    let (desk, transport) = make_desk(0.0);
    desk.connect().await.unwrap();
    desk.subscribe_notifications().await.unwrap();

    transport.drop_link();
    desk.connect().await.unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;

    // The supervisor saw the link was already back and did not reopen it.
    assert_eq!(transport.open_count(), 2);
    assert_eq!(desk.status(), ConnectionStatus::Connected);

    // Notification delivery survives either recovery path.
    transport.push_notification(NOTIFY_CHARACTERISTIC, b"0910");
    assert_eq!(desk.current_reading().unwrap().raw_mm, 910);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_retries_through_failures() {
    let (desk, transport) = make_desk(0.0);
    desk.connect().await.unwrap();
    desk.subscribe_notifications().await.unwrap();

    transport.fail_next_opens(3);
    transport.drop_link();
    wait_for_reconnect(&desk).await;

    // Initial connect, three failed retries, one success.
    assert_eq!(transport.open_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_no_reconnect_when_idle() {
    let (desk, transport) = make_desk(0.0);
    desk.connect().await.unwrap();

    // No subscription, no observers, not moving: link loss is final.
    transport.drop_link();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(transport.open_count(), 1);
    assert_eq!(desk.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_bounded_reconnect_gives_up() {
    let transport = Arc::new(MockTransport::new());
    let config = ConnectionConfig::default()
        .reconnect(ReconnectOptions::new().max_attempts(2));
    let desk = Desk::with_transport(
        "AA:BB:CC:DD:EE:FF",
        0.0,
        Arc::clone(&transport) as Arc<dyn ergomate_core::DeskTransport>,
        config,
    );
    desk.connect().await.unwrap();
    desk.subscribe_notifications().await.unwrap();

    transport.fail_next_opens(10);
    transport.drop_link();
    tokio::time::sleep(Duration::from_secs(120)).await;

    // Initial connect plus exactly two retries.
    assert_eq!(transport.open_count(), 3);
    assert_eq!(desk.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_disconnect_sends_safety_stop_and_closes() {
    let (desk, transport) = make_desk(0.0);
    desk.connect().await.unwrap();
    desk.move_up().await.unwrap();
    transport.clear_writes();

    desk.disconnect().await.unwrap();

    assert_eq!(transport.frames_for(WRITE_CHARACTERISTIC), vec![STOP_FRAME.to_vec()]);
    assert_eq!(desk.status(), ConnectionStatus::Disconnected);
    assert!(!transport.is_open().await);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_disarms_reconnect() {
    let (desk, transport) = make_desk(0.0);
    desk.connect().await.unwrap();
    desk.subscribe_notifications().await.unwrap();

    desk.disconnect().await.unwrap();
    transport.drop_link();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(transport.open_count(), 1);
}

#[tokio::test]
async fn test_cloud_only_features_report_unsupported() {
    let (desk, _transport) = make_desk(0.0);

    assert!(matches!(
        desk.beep(Duration::from_secs(1)).await,
        Err(Error::Unsupported(UnsupportedFeature::Beep))
    ));
    assert!(matches!(
        desk.lock().await,
        Err(Error::Unsupported(UnsupportedFeature::ChildLock))
    ));
    assert!(matches!(
        desk.unlock().await,
        Err(Error::Unsupported(UnsupportedFeature::ChildLock))
    ));
    assert!(matches!(
        desk.factory_reset().await,
        Err(Error::Unsupported(UnsupportedFeature::FactoryReset))
    ));
}

// --- Hardware tests (require a physical desk in range) ---

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_finds_real_desks() {
    let desks = ergomate_core::scan_for_desks().await.unwrap();
    for desk in &desks {
        println!("Found {} at {}", desk.name, desk.address);
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_connect_to_real_desk() {
    let desks = ergomate_core::scan_for_desks().await.unwrap();
    let Some(found) = desks.first() else {
        eprintln!("No desk in range, skipping");
        return;
    };

    let desk = Desk::new(found.address.clone(), 0.0);
    desk.connect().await.unwrap();
    desk.subscribe_notifications().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    println!("Height: {:?} cm", desk.calibrated_height_cm());
    desk.disconnect().await.unwrap();
}
