use shutterbus::ports::{ManualClock, MemoryOutputs, PublishResult, RecordingTransport};
use shutterbus::publish::{PublishOutcome, FORCE_PUBLISH_INTERVAL_MS};
use shutterbus::*;

type TestController = ShutterController<MemoryOutputs, ManualClock, RecordingTransport>;

fn controller() -> TestController {
    ShutterController::new(MemoryOutputs::new(), ManualClock::new(), RecordingTransport::new("attic"))
}

fn tick_after(controller: &mut TestController, ms: u32) {
    controller.clock_mut().advance(ms);
    controller.tick();
}

#[test]
fn test_configure_publishes_every_field() {
    let mut controller = controller();
    let outcome = controller.configure(2, 5, 6).unwrap();
    assert_eq!(outcome, PublishOutcome::Sent { delivered: 3, settled: true });

    let sent = controller.transport().sent();
    let topics: Vec<&str> = sent.iter().map(|m| m.topic.as_str()).collect();
    assert_eq!(
        topics,
        vec![
            "attic/shutter2/direction/get",
            "attic/shutter2/position/get",
            "attic/shutter2/state/get",
        ]
    );
    let payloads: Vec<&str> = sent.iter().map(|m| m.payload.as_str()).collect();
    assert_eq!(payloads, vec!["0", "0", "closed"]);
    assert!(sent.iter().all(|m| !m.retain));
}

#[test]
fn test_changes_inside_rate_window_are_suppressed() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();
    controller.transport_mut().take_sent();

    controller.clock_mut().advance(100);
    let outcome = controller.set_position(0, 50.0).unwrap();
    assert_eq!(outcome, PublishOutcome::RateLimited);
    assert!(controller.transport().sent().is_empty());

    // The next tick has moved far enough to report.
    tick_after(&mut controller, 1000);
    let transport = controller.transport();
    assert_eq!(transport.last_payload("attic/shutter0/direction/get"), Some("1"));
    assert_eq!(transport.last_payload("attic/shutter0/state/get"), Some("opening"));
    assert_eq!(transport.last_payload("attic/shutter0/position/get"), Some("3"));
}

#[test]
fn test_suppressed_direction_change_sent_on_next_tick_of_slow_travel() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();
    controller.set_travel_time(0, 600_000).unwrap();
    controller.transport_mut().take_sent();

    controller.clock_mut().advance(100);
    assert_eq!(controller.set_position(0, 100.0).unwrap(), PublishOutcome::RateLimited);

    // One second of a ten minute travel is far below the report threshold.
    tick_after(&mut controller, 1000);
    let transport = controller.transport();
    assert_eq!(transport.last_payload("attic/shutter0/direction/get"), Some("1"));
    assert_eq!(transport.last_payload("attic/shutter0/state/get"), Some("opening"));

    // Once delivered, the slow drift alone does not republish.
    controller.transport_mut().take_sent();
    tick_after(&mut controller, 1000);
    assert!(controller.transport().sent().is_empty());
}

#[test]
fn test_only_changed_fields_are_resent() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();
    controller.set_travel_time(0, 10_000).unwrap();
    controller.clock_mut().advance(1000);
    controller.set_position(0, 100.0).unwrap();
    tick_after(&mut controller, 1000);
    controller.transport_mut().take_sent();

    tick_after(&mut controller, 1000);
    let sent = controller.transport().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].topic, "attic/shutter0/position/get");
    assert_eq!(sent[0].payload, "20");
}

#[test]
fn test_not_ready_defers_then_sends_all_fields() {
    let mut controller = controller();
    controller.transport_mut().set_ready(false);

    let outcome = controller.configure(0, 1, 2).unwrap();
    assert_eq!(outcome, PublishOutcome::Deferred);
    controller.set_position(0, 40.0).unwrap();
    assert_eq!(controller.transport().attempts(), 0);
    assert!(controller.shutter(0).unwrap().publisher().needs_republish());

    controller.transport_mut().set_ready(true);
    tick_after(&mut controller, 1000);

    let sent = controller.transport().sent();
    assert_eq!(sent.len(), 3);
    assert!(!controller.shutter(0).unwrap().publisher().needs_republish());
}

#[test]
fn test_pending_flush_while_idle() {
    let mut controller = controller();
    controller.transport_mut().set_ready(false);
    controller.configure(0, 1, 2).unwrap();

    controller.transport_mut().set_ready(true);
    tick_after(&mut controller, 1000);

    assert_eq!(controller.transport().sent().len(), 3);
    assert_eq!(
        controller.transport().last_payload("attic/shutter0/state/get"),
        Some("closed")
    );
}

#[test]
fn test_failed_field_keeps_republish_pending() {
    let mut controller = controller();
    controller.transport_mut().script(&[PublishResult::Failed]);

    let outcome = controller.configure(0, 1, 2).unwrap();
    assert_eq!(outcome, PublishOutcome::Sent { delivered: 2, settled: false });
    assert!(controller.shutter(0).unwrap().publisher().needs_republish());
    assert!(controller.shutter(0).unwrap().publisher().last_publish().is_none());

    // Pending bypasses the rate limit.
    tick_after(&mut controller, 100);
    assert_eq!(controller.transport().sent().len(), 5);
    assert!(!controller.shutter(0).unwrap().publisher().needs_republish());
}

#[test]
fn test_memory_failure_settles_but_field_stays_dirty() {
    let mut controller = controller();
    controller.transport_mut().script(&[PublishResult::MemoryFailure]);

    let outcome = controller.configure(0, 1, 2).unwrap();
    assert_eq!(outcome, PublishOutcome::Sent { delivered: 2, settled: true });
    assert!(!controller.shutter(0).unwrap().publisher().needs_republish());
    assert_eq!(controller.shutter(0).unwrap().publisher().last_sent().direction, None);

    controller.transport_mut().take_sent();
    tick_after(&mut controller, 600);

    let sent = controller.transport().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].topic, "attic/shutter0/direction/get");
}

#[test]
fn test_force_interval_republishes_unchanged_state() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();
    controller.transport_mut().take_sent();

    tick_after(&mut controller, 30_000);
    assert!(controller.transport().sent().is_empty());

    tick_after(&mut controller, FORCE_PUBLISH_INTERVAL_MS - 30_000);
    assert_eq!(controller.transport().sent().len(), 3);
}

#[test]
fn test_label_follows_position_when_idle() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();
    controller.set_travel_time(0, 10_000).unwrap();

    controller.set_position(0, 100.0).unwrap();
    for _ in 0..10 {
        tick_after(&mut controller, 1000);
    }
    assert_eq!(controller.transport().last_payload("attic/shutter0/state/get"), Some("open"));
    assert_eq!(controller.transport().last_payload("attic/shutter0/position/get"), Some("100"));

    tick_after(&mut controller, 1000);
    controller.set_position(0, 50.0).unwrap();
    for _ in 0..5 {
        tick_after(&mut controller, 1000);
    }
    assert_eq!(controller.transport().last_payload("attic/shutter0/state/get"), Some("stopped"));
    assert_eq!(controller.transport().last_payload("attic/shutter0/direction/get"), Some("0"));
}

#[test]
fn test_interlock_wait_publishes_direction_code() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();
    controller.set_position(0, 100.0).unwrap();
    tick_after(&mut controller, 1000);
    tick_after(&mut controller, 1000);

    controller.clock_mut().advance(600);
    controller.close(0).unwrap();
    assert_eq!(
        controller.transport().last_payload("attic/shutter0/direction/get"),
        Some("-2")
    );
}
