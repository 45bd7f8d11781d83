use shutterbus::ports::{CoverDiscovery, ManualClock, MemoryOutputs, OutputDriver, RecordingTransport};
use shutterbus::protocol::ResponseStatus;
use shutterbus::shutter::ChannelFault;
use shutterbus::*;

type TestController = ShutterController<MemoryOutputs, ManualClock, RecordingTransport>;

fn controller() -> TestController {
    ShutterController::new(MemoryOutputs::new(), ManualClock::new(), RecordingTransport::new("test"))
}

fn command(id: u32, command_type: CommandType) -> Command {
    Command { id, command_type }
}

#[test]
fn test_configure_rejects_out_of_range_slot() {
    let mut controller = controller();
    assert_eq!(
        controller.configure(10, 1, 2),
        Err(ShutterError::InvalidIndex { index: 10, limit: 10 })
    );
    assert_eq!(controller.active_count(), 0);
}

#[test]
fn test_configure_rejects_bad_channels() {
    let mut controller = controller();

    assert_eq!(
        controller.configure(0, 0, 2),
        Err(ShutterError::InvalidChannelAssignment(ChannelFault::OutOfRange { channel: 0, limit: 64 }))
    );
    assert_eq!(
        controller.configure(0, 1, 64),
        Err(ShutterError::InvalidChannelAssignment(ChannelFault::OutOfRange { channel: 64, limit: 64 }))
    );
    assert_eq!(
        controller.configure(0, 3, 3),
        Err(ShutterError::InvalidChannelAssignment(ChannelFault::SameChannel(3)))
    );

    controller.configure(0, 1, 2).unwrap();
    assert_eq!(
        controller.configure(1, 2, 3),
        Err(ShutterError::InvalidChannelAssignment(ChannelFault::InUse { channel: 2, owner: 0 }))
    );
    assert_eq!(controller.active_count(), 1);
    assert!(controller.shutter(1).is_err());
}

#[test]
fn test_custom_channel_limit() {
    let mut controller = controller().with_channel_limit(8);
    assert!(controller.configure(0, 6, 7).is_ok());
    assert_eq!(
        controller.configure(1, 4, 8),
        Err(ShutterError::InvalidChannelAssignment(ChannelFault::OutOfRange { channel: 8, limit: 8 }))
    );
}

#[test]
fn test_reconfigure_same_slot_reuses_its_channels() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();
    assert!(controller.configure(0, 2, 1).is_ok());
    assert_eq!(controller.shutter(0).unwrap().channels(), (2, 1));
}

#[test]
fn test_reconfigure_releases_previous_outputs() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();
    controller.open(0).unwrap();
    assert!(controller.outputs().get(1));

    controller.configure(0, 5, 6).unwrap();
    assert!(!controller.outputs().get(1));
    assert!(!controller.outputs().get(5));
    assert!(!controller.outputs().get(6));
    assert!(controller.outputs().is_reserved(5));
    assert!(controller.outputs().is_reserved(6));

    let shutter = controller.shutter(0).unwrap();
    assert_eq!(shutter.position(), 0.0);
    assert_eq!(shutter.direction(), Direction::Idle);
    assert_eq!(controller.outputs().energized().count(), 0);
}

#[test]
fn test_operations_on_unknown_slots() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();

    assert_eq!(controller.open(3), Err(ShutterError::Inactive(3)));
    assert_eq!(controller.stop(12), Err(ShutterError::InvalidIndex { index: 12, limit: 10 }));
    assert_eq!(controller.set_position(4, 20.0), Err(ShutterError::Inactive(4)));
    assert!(controller.render_status(9).is_err());
}

#[test]
fn test_default_index_resolution() {
    let mut controller = controller();
    assert_eq!(controller.resolve_index(None), Err(ShutterError::NoDefaultShutter));

    controller.configure(4, 1, 2).unwrap();
    assert_eq!(controller.resolve_index(None), Ok(4));
    assert_eq!(controller.resolve_index(Some(4)), Ok(4));
    assert_eq!(controller.resolve_index(Some(0)), Err(ShutterError::Inactive(0)));

    controller.configure(5, 3, 4).unwrap();
    assert_eq!(controller.resolve_index(None), Err(ShutterError::NoDefaultShutter));
}

#[test]
fn test_tick_advances_every_shutter() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();
    controller.configure(1, 3, 4).unwrap();
    controller.set_travel_time(0, 10_000).unwrap();
    controller.set_travel_time(1, 20_000).unwrap();
    controller.open(0).unwrap();
    controller.open(1).unwrap();

    controller.clock_mut().advance(2000);
    controller.tick();

    let all = controller.status_all();
    assert_eq!(all.len(), 2);
    assert!((all[0].position - 20.0).abs() < 0.01);
    assert!((all[1].position - 10.0).abs() < 0.01);
    assert_eq!(controller.get_state().tick_count, 1);
}

#[test]
fn test_execute_defaults_to_single_shutter() {
    let mut controller = controller();
    controller.configure(2, 1, 2).unwrap();

    let response = controller.execute(command(
        7,
        CommandType::SetPosition { index: None, position: 40.0 },
    ));
    assert_eq!(response.id, 7);
    assert_eq!(response.status, ResponseStatus::Success);
    assert_eq!(response.shutters.len(), 1);
    assert_eq!(response.shutters[0].index, 2);
    assert_eq!(response.shutters[0].target_position, 40.0);
    assert!(response.shutters[0].open_output);
}

#[test]
fn test_execute_reports_rejections() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();

    let response = controller.execute(command(3, CommandType::Open { index: Some(7) }));
    assert_eq!(response.status, ResponseStatus::Rejected);
    assert!(response.message.unwrap().contains("not configured"));
    assert!(response.shutters.is_empty());

    let response = controller.execute(command(
        4,
        CommandType::SetTravelTime { index: Some(0), travel_time_ms: 10 },
    ));
    assert_eq!(response.status, ResponseStatus::Rejected);
    assert_eq!(controller.get_state().rejected_count, 2);
    assert_eq!(controller.get_state().command_count, 2);
}

#[test]
fn test_execute_status_lists_all() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();
    controller.configure(3, 7, 8).unwrap();

    let response = controller.execute(command(1, CommandType::Status { index: None }));
    assert_eq!(response.status, ResponseStatus::Success);
    let indices: Vec<usize> = response.shutters.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![0, 3]);

    let response = controller.execute(command(2, CommandType::Ping));
    assert_eq!(response.message.as_deref(), Some("pong"));
}

#[test]
fn test_discovery_publishes_retained_per_active_shutter() {
    let mut controller = controller();
    controller.configure(0, 1, 2).unwrap();
    controller.configure(2, 3, 4).unwrap();
    controller.transport_mut().take_sent();

    let published = controller.discovery(&CoverDiscovery::new("homeassistant"));
    assert_eq!(published, 2);

    let sent = controller.transport().sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|m| m.retain));
    assert_eq!(sent[0].topic, "homeassistant/cover/test_shutter_0/config");
    assert_eq!(sent[1].topic, "homeassistant/cover/test_shutter_2/config");
}

#[test]
fn test_discovery_command_uses_configured_prefix() {
    let mut controller = controller().with_discovery_prefix("ha");
    controller.configure(1, 1, 2).unwrap();
    controller.transport_mut().take_sent();

    let response = controller.execute(command(9, CommandType::Discovery));
    assert_eq!(response.status, ResponseStatus::Success);
    assert_eq!(controller.transport().sent()[0].topic, "ha/cover/test_shutter_1/config");
}

#[test]
fn test_high_channels_drive_a_sized_output_table() {
    let mut controller = ShutterController::new(
        MemoryOutputs::with_channels(128),
        ManualClock::new(),
        RecordingTransport::new("test"),
    )
    .with_channel_limit(128);
    controller.configure(0, 70, 71).unwrap();
    controller.set_travel_time(0, 10_000).unwrap();

    controller.open(0).unwrap();
    assert!(controller.outputs().get(70));
    assert!(controller.outputs().is_reserved(71));

    controller.clock_mut().advance(2000);
    controller.tick();
    controller.set_position(0, 0.0).unwrap();
    let status = controller.render_status(0).unwrap();
    assert_eq!(status.direction, Direction::InterlockWait(Heading::Close));
    assert!(!controller.outputs().get(70));
    assert!(!controller.outputs().get(71));
}
