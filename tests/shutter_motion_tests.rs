use shutterbus::ports::{ManualClock, MemoryOutputs, RecordingTransport};
use shutterbus::*;

type TestController = ShutterController<MemoryOutputs, ManualClock, RecordingTransport>;

fn controller() -> TestController {
    ShutterController::new(MemoryOutputs::new(), ManualClock::new(), RecordingTransport::new("test"))
}

fn tick_after(controller: &mut TestController, ms: u32) {
    controller.clock_mut().advance(ms);
    controller.tick();
}

/// Ticks once a second until the shutter goes idle, up to `max_ticks`.
fn run_until_idle(controller: &mut TestController, index: usize, max_ticks: usize) {
    for _ in 0..max_ticks {
        if controller.shutter(index).unwrap().direction() == Direction::Idle {
            return;
        }
        tick_after(controller, 1000);
    }
}

#[test]
fn test_full_open_over_travel_time() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();
    controller.set_travel_time(0, 10_000).unwrap();

    controller.set_position(0, 100.0).unwrap();
    let status = controller.render_status(0).unwrap();
    assert_eq!(status.direction, Direction::Opening);
    assert!(status.open_output);
    assert!(!status.close_output);

    for _ in 0..5 {
        tick_after(&mut controller, 1000);
    }
    let status = controller.render_status(0).unwrap();
    assert!((status.position - 50.0).abs() < 0.01);
    assert!(status.open_output);

    for _ in 0..5 {
        tick_after(&mut controller, 1000);
    }
    let status = controller.render_status(0).unwrap();
    assert_eq!(status.position, 100.0);
    assert_eq!(status.direction, Direction::Idle);
    assert!(!status.open_output);
    assert!(!status.close_output);
}

#[test]
fn test_set_position_converges_within_tolerance() {
    for &target in &[12.5f32, 37.0, 50.2, 99.6, 100.0, 0.0] {
        let mut controller = controller();
        controller.configure(0, 1, 2).unwrap();
        controller.set_travel_time(0, 10_000).unwrap();

        // Start from the middle so both headings are exercised.
        controller.set_position(0, 60.0).unwrap();
        run_until_idle(&mut controller, 0, 20);
        tick_after(&mut controller, 1000);

        controller.set_position(0, target).unwrap();
        run_until_idle(&mut controller, 0, 40);

        let shutter = controller.shutter(0).unwrap();
        assert_eq!(shutter.direction(), Direction::Idle, "target {}", target);
        assert!(
            (shutter.position() - target).abs() <= 0.5,
            "target {} ended at {}",
            target,
            shutter.position()
        );
    }
}

#[test]
fn test_target_clamped_to_travel_range() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();

    controller.set_position(0, 150.0).unwrap();
    assert_eq!(controller.shutter(0).unwrap().target_position(), 100.0);

    controller.set_position(0, -20.0).unwrap();
    assert_eq!(controller.shutter(0).unwrap().target_position(), 0.0);

    controller.set_position(0, f32::NAN).unwrap();
    assert_eq!(controller.shutter(0).unwrap().target_position(), 0.0);
}

#[test]
fn test_position_stays_in_range_past_limits() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();
    controller.set_travel_time(0, 1_000).unwrap();

    controller.open(0).unwrap();
    tick_after(&mut controller, 5_000);

    let shutter = controller.shutter(0).unwrap();
    assert_eq!(shutter.position(), 100.0);
    assert_eq!(shutter.direction(), Direction::Idle);
}

#[test]
fn test_stop_twice_is_idempotent() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();
    controller.set_travel_time(0, 10_000).unwrap();
    controller.set_position(0, 100.0).unwrap();
    tick_after(&mut controller, 1000);
    tick_after(&mut controller, 1000);

    controller.clock_mut().advance(300);
    controller.stop(0).unwrap();
    let first = controller.render_status(0).unwrap();
    assert!((first.position - 23.0).abs() < 0.01);
    assert_eq!(first.direction, Direction::Idle);

    controller.clock_mut().advance(1000);
    let attempts = controller.transport().attempts();
    controller.stop(0).unwrap();
    let second = controller.render_status(0).unwrap();

    assert_eq!(first.position, second.position);
    assert_eq!(second.direction, Direction::Idle);
    assert!(!second.open_output && !second.close_output);
    // One publish round at most: direction, position and state.
    assert!(controller.transport().attempts() - attempts <= 3);

    let outcome = controller.stop(0).unwrap();
    assert_eq!(outcome, publish::PublishOutcome::Unchanged);
    assert_eq!(controller.render_status(0).unwrap().position, first.position);
}

#[test]
fn test_open_toggles_to_stop() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();

    controller.open(0).unwrap();
    assert_eq!(controller.shutter(0).unwrap().direction(), Direction::Opening);

    tick_after(&mut controller, 1000);
    controller.open(0).unwrap();
    let status = controller.render_status(0).unwrap();
    assert_eq!(status.direction, Direction::Idle);
    assert!(!status.open_output);
}

#[test]
fn test_cover_action_open_does_not_toggle() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();

    controller.apply_action(0, CoverAction::Open).unwrap();
    tick_after(&mut controller, 1000);
    controller.apply_action(0, CoverAction::Open).unwrap();

    let status = controller.render_status(0).unwrap();
    assert_eq!(status.direction, Direction::Opening);
    assert!(status.open_output);

    controller.apply_action(0, CoverAction::Stop).unwrap();
    assert_eq!(controller.shutter(0).unwrap().direction(), Direction::Idle);
}

#[test]
fn test_retarget_same_heading_keeps_relay_on() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();
    controller.set_travel_time(0, 10_000).unwrap();

    controller.set_position(0, 80.0).unwrap();
    tick_after(&mut controller, 2000);
    controller.set_position(0, 40.0).unwrap();

    let shutter = controller.shutter(0).unwrap();
    assert_eq!(shutter.direction(), Direction::Opening);
    assert_eq!(shutter.target_position(), 40.0);
    assert!(controller.render_status(0).unwrap().open_output);

    run_until_idle(&mut controller, 0, 10);
    assert_eq!(controller.shutter(0).unwrap().position(), 40.0);
}

#[test]
fn test_target_within_tolerance_snaps_without_moving() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();

    controller.set_position(0, 0.4).unwrap();
    let status = controller.render_status(0).unwrap();
    assert_eq!(status.direction, Direction::Idle);
    assert_eq!(status.position, 0.4);
    assert!(!status.open_output && !status.close_output);
}

#[test]
fn test_travel_time_change_mid_motion() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();
    controller.set_travel_time(0, 10_000).unwrap();
    controller.set_position(0, 100.0).unwrap();

    // 2 s at 10 s travel, then 1 s at 20 s travel.
    controller.clock_mut().advance(2000);
    controller.set_travel_time(0, 20_000).unwrap();
    tick_after(&mut controller, 1000);

    assert!((controller.shutter(0).unwrap().position() - 25.0).abs() < 0.01);
}

#[test]
fn test_invalid_travel_time_keeps_previous() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();
    controller.set_travel_time(0, 12_000).unwrap();

    assert_eq!(controller.set_travel_time(0, 999), Err(ShutterError::InvalidTravelTime(999)));
    assert_eq!(controller.shutter(0).unwrap().travel_time_ms(), 12_000);
}

#[test]
fn test_motion_across_clock_rollover() {
    let mut controller = ShutterController::new(
        MemoryOutputs::new(),
        ManualClock::starting_at(u32::MAX - 1500),
        RecordingTransport::new("test"),
    );
    controller.configure(0, 1, 2).unwrap();
    controller.set_travel_time(0, 10_000).unwrap();
    controller.set_position(0, 100.0).unwrap();

    tick_after(&mut controller, 1000);
    tick_after(&mut controller, 1000);

    assert!((controller.shutter(0).unwrap().position() - 20.0).abs() < 0.01);
}
