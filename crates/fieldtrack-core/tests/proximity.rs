//! End-to-end monitoring scenarios driven through a host-fed source.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fieldtrack_core::{
    ConfigUpdate, FieldtrackError, ManualPositionSource, MonitorConfig, PermissionStatus,
    Position, ProximityEvent, ProximityEventKind, ProximityMonitor, ProximityTarget, SourceError,
    TargetType,
};
use tokio::sync::broadcast;
use tokio::time::timeout;

// Depot at the equator; 0.0005 deg latitude is about 55 m.
const INSIDE: f64 = 0.0005;
const FAR: f64 = 0.01;

fn config() -> MonitorConfig {
    MonitorConfig {
        distance_filter_meters: 0.0,
        ..MonitorConfig::default()
    }
}

fn setup() -> (Arc<ManualPositionSource>, ProximityMonitor) {
    let source = Arc::new(ManualPositionSource::new(PermissionStatus::Granted));
    let monitor = ProximityMonitor::new(source.clone(), config());
    (source, monitor)
}

fn depot(id: &str) -> ProximityTarget {
    ProximityTarget::new(id, "Depot", 0.0, 0.0, 100.0, TargetType::Location)
}

fn fix(latitude: f64) -> Position {
    Position::new(latitude, 0.0, 5.0).unwrap()
}

async fn next_event(rx: &mut broadcast::Receiver<ProximityEvent>) -> ProximityEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn assert_no_event(rx: &mut broadcast::Receiver<ProximityEvent>) {
    let result = timeout(Duration::from_millis(150), rx.recv()).await;
    assert!(result.is_err(), "unexpected event: {result:?}");
}

#[tokio::test]
async fn enter_and_exit_follow_the_device() {
    let (source, monitor) = setup();
    monitor.add_target(depot("depot")).unwrap();
    let mut events = monitor.subscribe();
    monitor.start_monitoring().await.unwrap();

    source.push_position(fix(FAR));
    source.push_position(fix(INSIDE));
    let enter = next_event(&mut events).await;
    assert_eq!(enter.kind, ProximityEventKind::Enter);
    assert_eq!(enter.target_id, "depot");
    assert!(monitor.targets_in_range().contains("depot"));

    // Moving around inside stays silent.
    source.push_position(fix(INSIDE / 2.0));
    source.push_position(fix(0.0));
    assert_no_event(&mut events).await;

    source.push_position(fix(FAR));
    let exit = next_event(&mut events).await;
    assert_eq!(exit.kind, ProximityEventKind::Exit);
    assert!(monitor.targets_in_range().is_empty());

    monitor.stop_monitoring();
}

#[tokio::test]
async fn inaccurate_fixes_never_reach_evaluation() {
    let (source, monitor) = setup();
    monitor.add_target(depot("depot")).unwrap();
    let mut events = monitor.subscribe();
    monitor.start_monitoring().await.unwrap();

    source.push_position(Position::new(INSIDE, 0.0, 500.0).unwrap());
    assert_no_event(&mut events).await;
    assert!(monitor.last_position().is_none());
    assert!(monitor.targets_in_range().is_empty());

    source.push_position(fix(INSIDE));
    assert_eq!(next_event(&mut events).await.kind, ProximityEventKind::Enter);

    monitor.stop_monitoring();
}

#[tokio::test]
async fn stream_errors_do_not_stop_monitoring() {
    let (source, monitor) = setup();
    monitor.add_target(depot("depot")).unwrap();
    let mut events = monitor.subscribe();
    monitor.start_monitoring().await.unwrap();

    source.push_error(SourceError::unavailable("no satellites"));
    source.push_position(fix(INSIDE));

    assert_eq!(next_event(&mut events).await.kind, ProximityEventKind::Enter);
    assert!(monitor.is_monitoring());

    monitor.stop_monitoring();
}

#[tokio::test]
async fn start_without_permission_fails_and_stays_stopped() {
    let source = Arc::new(ManualPositionSource::new(PermissionStatus::DeniedPermanently));
    let monitor = ProximityMonitor::new(source.clone(), config());

    let err = monitor.start_monitoring().await.unwrap_err();
    assert!(matches!(
        err,
        FieldtrackError::PermissionDenied { permanent: true }
    ));
    assert!(!monitor.is_monitoring());
    assert_eq!(source.subscriber_count(), 0);

    // Granting afterwards lets a retry succeed.
    source.set_permission(PermissionStatus::Granted);
    monitor.start_monitoring().await.unwrap();
    assert!(monitor.is_monitoring());
    monitor.stop_monitoring();
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let (source, monitor) = setup();

    monitor.start_monitoring().await.unwrap();
    monitor.start_monitoring().await.unwrap();
    assert_eq!(source.subscriber_count(), 1);

    monitor.stop_monitoring();
    monitor.stop_monitoring();
    assert!(!monitor.is_monitoring());
    assert!(!monitor.provider().is_tracking());
}

#[tokio::test]
async fn nothing_is_delivered_after_stop() {
    let (source, monitor) = setup();
    monitor.add_target(depot("depot")).unwrap();
    let calls = Arc::new(Mutex::new(0_usize));
    let counter = calls.clone();
    monitor.add_event_handler(move |_| {
        *counter.lock().unwrap() += 1;
        Ok(())
    });
    let mut events = monitor.subscribe();

    monitor.start_monitoring().await.unwrap();
    monitor.stop_monitoring();

    source.push_position(fix(INSIDE));
    assert_no_event(&mut events).await;
    assert_eq!(*calls.lock().unwrap(), 0);
    assert!(monitor.evaluate_now().is_empty());
}

#[tokio::test]
async fn stop_clears_membership_and_restart_refires_enter() {
    let (source, monitor) = setup();
    monitor.add_target(depot("depot")).unwrap();
    let mut events = monitor.subscribe();

    monitor.start_monitoring().await.unwrap();
    source.push_position(fix(INSIDE));
    assert_eq!(next_event(&mut events).await.kind, ProximityEventKind::Enter);

    monitor.stop_monitoring();
    assert!(monitor.targets_in_range().is_empty());
    assert!(monitor.last_position().is_some());

    monitor.start_monitoring().await.unwrap();
    assert!(monitor.targets_in_range().is_empty());

    let events_now = monitor.evaluate_now();
    assert_eq!(events_now.len(), 1);
    assert_eq!(events_now[0].kind, ProximityEventKind::Enter);
    assert_eq!(next_event(&mut events).await.kind, ProximityEventKind::Enter);

    monitor.stop_monitoring();
}

#[tokio::test]
async fn removing_a_target_emits_no_exit() {
    let (source, monitor) = setup();
    monitor.add_target(depot("depot")).unwrap();
    let mut events = monitor.subscribe();
    monitor.start_monitoring().await.unwrap();

    source.push_position(fix(INSIDE));
    next_event(&mut events).await;

    assert!(monitor.remove_target("depot"));
    assert!(monitor.targets_in_range().is_empty());
    source.push_position(fix(FAR));
    assert_no_event(&mut events).await;

    monitor.stop_monitoring();
}

#[tokio::test]
async fn replacing_a_target_keeps_membership_until_next_evaluation() {
    let (source, monitor) = setup();
    monitor.add_target(depot("depot")).unwrap();
    let mut events = monitor.subscribe();
    monitor.start_monitoring().await.unwrap();

    source.push_position(fix(INSIDE));
    next_event(&mut events).await;

    // Shrink the fence so the device is now outside it.
    let mut shrunk = depot("depot");
    shrunk.radius_meters = 10.0;
    monitor.add_target(shrunk).unwrap();
    assert!(monitor.targets_in_range().contains("depot"));

    let events_now = monitor.evaluate_now();
    assert_eq!(events_now.len(), 1);
    assert_eq!(events_now[0].kind, ProximityEventKind::Exit);
    assert!(monitor.targets_in_range().is_empty());

    monitor.stop_monitoring();
}

#[tokio::test]
async fn failing_handlers_do_not_block_the_rest() {
    let (source, monitor) = setup();
    monitor.add_target(depot("depot")).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    monitor.add_event_handler(|_| anyhow::bail!("webhook unreachable"));
    monitor.add_event_handler(|_| panic!("handler bug"));
    let sink = seen.clone();
    monitor.add_event_handler(move |event| {
        sink.lock().unwrap().push(event.target_id.clone());
        Ok(())
    });
    let mut events = monitor.subscribe();

    monitor.start_monitoring().await.unwrap();
    source.push_position(fix(INSIDE));
    next_event(&mut events).await;

    // Give the dispatch pass time to reach the last handler.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*seen.lock().unwrap(), vec!["depot".to_string()]);
    assert!(monitor.is_monitoring());

    // The panic left the monitor usable.
    source.push_position(fix(FAR));
    assert_eq!(next_event(&mut events).await.kind, ProximityEventKind::Exit);
    monitor.stop_monitoring();
}

#[tokio::test]
async fn handlers_run_in_registration_order() {
    let (source, monitor) = setup();
    let order = Arc::new(Mutex::new(Vec::new()));
    for name in ["first", "second", "third"] {
        let order = order.clone();
        monitor.add_event_handler(move |_| {
            order.lock().unwrap().push(name);
            Ok(())
        });
    }
    monitor.add_target(depot("depot")).unwrap();
    let mut events = monitor.subscribe();
    monitor.start_monitoring().await.unwrap();

    // No position yet, nothing to report.
    assert!(monitor.evaluate_now().is_empty());

    source.push_position(fix(INSIDE));
    next_event(&mut events).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    monitor.stop_monitoring();
}

#[tokio::test]
async fn stopping_from_a_handler_cuts_the_pass_short() {
    let (source, monitor) = setup();
    monitor.add_target(depot("north")).unwrap();
    monitor.add_target(depot("south")).unwrap();

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = delivered.clone();
    let handle = monitor.clone();
    monitor.add_event_handler(move |event| {
        sink.lock().unwrap().push(event.target_id.clone());
        handle.stop_monitoring();
        Ok(())
    });

    monitor.start_monitoring().await.unwrap();
    source.push_position(fix(0.0));

    timeout(Duration::from_secs(2), async {
        while monitor.is_monitoring() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*delivered.lock().unwrap(), vec!["north".to_string()]);
    assert!(monitor.targets_in_range().is_empty());
}

#[tokio::test(start_paused = true)]
async fn timer_reevaluates_a_stationary_device() {
    let (source, monitor) = setup();
    let mut events = monitor.subscribe();
    monitor.start_monitoring().await.unwrap();

    source.push_position(fix(INSIDE));
    // Let the fix land before any target exists.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(monitor.last_position().is_some());

    monitor.add_target(depot("depot")).unwrap();
    let event = timeout(Duration::from_secs(15), events.recv())
        .await
        .expect("timer never fired")
        .unwrap();
    assert_eq!(event.kind, ProximityEventKind::Enter);

    monitor.stop_monitoring();
}

#[tokio::test(start_paused = true)]
async fn interval_change_restarts_the_timer() {
    let (source, monitor) = setup();
    let mut events = monitor.subscribe();
    monitor.start_monitoring().await.unwrap();

    source.push_position(fix(INSIDE));
    tokio::time::sleep(Duration::from_millis(10)).await;
    monitor.add_target(depot("depot")).unwrap();

    monitor
        .update_config(&ConfigUpdate {
            check_interval_secs: Some(60),
            ..ConfigUpdate::default()
        })
        .unwrap();

    // The old 10 s tick is gone.
    assert!(timeout(Duration::from_secs(30), events.recv()).await.is_err());
    let event = timeout(Duration::from_secs(40), events.recv())
        .await
        .expect("restarted timer never fired")
        .unwrap();
    assert_eq!(event.kind, ProximityEventKind::Enter);

    monitor.stop_monitoring();
}

#[tokio::test]
async fn one_shot_position_applies_accuracy_threshold() {
    let (source, monitor) = setup();

    source.push_position(Position::new(1.0, 2.0, 80.0).unwrap());
    let err = monitor.provider().get_current_position().await.unwrap_err();
    assert!(matches!(err, FieldtrackError::AccuracyTooLow { .. }));

    source.push_position(fix(1.0));
    let position = monitor.provider().get_current_position().await.unwrap();
    assert!((position.latitude - 1.0).abs() < f64::EPSILON);

    let check = monitor.check_target_proximity("missing", Some(&position));
    assert!(!check.is_in_range);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stop_never_strands_a_tracking_session() {
    let (_source, monitor) = setup();

    for _ in 0..2_000 {
        let stopper = {
            let monitor = monitor.clone();
            std::thread::spawn(move || {
                for _ in 0..20 {
                    monitor.stop_monitoring();
                }
            })
        };
        monitor.start_monitoring().await.unwrap();
        stopper.join().unwrap();

        monitor.stop_monitoring();
        assert!(!monitor.is_monitoring());
        assert!(!monitor.provider().is_tracking());
    }

    monitor.start_monitoring().await.unwrap();
    assert!(monitor.is_monitoring());
    monitor.stop_monitoring();
}

#[tokio::test]
async fn handlers_may_drive_another_monitor() {
    let (source_a, monitor_a) = setup();
    let (source_b, monitor_b) = setup();
    monitor_a.add_target(depot("a-depot")).unwrap();
    monitor_a.start_monitoring().await.unwrap();
    monitor_b.start_monitoring().await.unwrap();

    // B knows where the device is before it has anything to compare against.
    source_b.push_position(fix(0.0));
    for _ in 0..100 {
        if monitor_b.last_position().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(monitor_b.last_position().is_some());
    monitor_b.add_target(depot("b-depot")).unwrap();

    let from_handler = Arc::new(Mutex::new(Vec::new()));
    {
        let monitor_b = monitor_b.clone();
        let from_handler = Arc::clone(&from_handler);
        monitor_a.add_event_handler(move |_| {
            let events = monitor_b.evaluate_now();
            from_handler.lock().unwrap().extend(events);
            Ok(())
        });
    }

    source_a.push_position(fix(INSIDE));
    for _ in 0..100 {
        if !from_handler.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let driven = from_handler.lock().unwrap().clone();
    assert_eq!(driven.len(), 1);
    assert_eq!(driven[0].target_id, "b-depot");
    assert_eq!(driven[0].kind, ProximityEventKind::Enter);
    assert!(monitor_b.targets_in_range().contains("b-depot"));

    monitor_a.stop_monitoring();
    monitor_b.stop_monitoring();
}
