use super::estimator;
use super::interlock::{InterlockGate, Release};
use super::{
    clamp_position, Direction, Heading, ShutterError, DEFAULT_INTERLOCK_DELAY_MS,
    DEFAULT_TRAVEL_TIME_MS, MIN_TRAVEL_TIME_MS, POSITION_MAX, POSITION_MIN,
    POSITION_REPORT_THRESHOLD,
};
use crate::ports::{Channel, OutputDriver, Timestamp, Transport};
use crate::publish::{PublishOutcome, Snapshot, StateLabel, StatePublisher};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Host resources borrowed for one transition, with the time sampled once.
pub struct Ports<'a, O, T> {
    pub outputs: &'a mut O,
    pub transport: &'a mut T,
    pub now: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutterStatus {
    pub index: usize,
    pub open_channel: Channel,
    pub close_channel: Channel,
    pub position: f32,
    pub target_position: f32,
    pub direction: Direction,
    pub state: StateLabel,
    pub open_output: bool,
    pub close_output: bool,
    pub travel_time_ms: u32,
    pub interlock_delay_ms: u32,
}

/// One configured shutter slot: motion state, position estimate and
/// publish bookkeeping.
#[derive(Debug, Clone)]
pub struct Shutter {
    index: usize,
    open_channel: Channel,
    close_channel: Channel,
    position: f32,
    direction: Direction,
    target_position: f32,
    travel_time_ms: u32,
    gate: InterlockGate,
    // Start of the current motion segment, or of the interlock countdown.
    segment_start: Timestamp,
    last_release: Option<Release>,
    last_reported_position: Option<f32>,
    publisher: StatePublisher,
}

impl Shutter {
    pub fn new(index: usize, open_channel: Channel, close_channel: Channel, now: Timestamp) -> Self {
        let mut publisher = StatePublisher::new();
        publisher.reset();

        Self {
            index,
            open_channel,
            close_channel,
            position: POSITION_MIN,
            direction: Direction::Idle,
            target_position: POSITION_MIN,
            travel_time_ms: DEFAULT_TRAVEL_TIME_MS,
            gate: InterlockGate::new(DEFAULT_INTERLOCK_DELAY_MS),
            segment_start: now,
            last_release: None,
            last_reported_position: None,
            publisher,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn channels(&self) -> (Channel, Channel) {
        (self.open_channel, self.close_channel)
    }

    pub fn uses_channel(&self, channel: Channel) -> bool {
        self.open_channel == channel || self.close_channel == channel
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn target_position(&self) -> f32 {
        self.target_position
    }

    pub fn travel_time_ms(&self) -> u32 {
        self.travel_time_ms
    }

    pub fn interlock_delay_ms(&self) -> u32 {
        self.gate.delay_ms()
    }

    pub fn last_reported_position(&self) -> Option<f32> {
        self.last_reported_position
    }

    pub fn publisher(&self) -> &StatePublisher {
        &self.publisher
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            direction: self.direction,
            position: self.position,
        }
    }

    pub fn status<O: OutputDriver>(&self, outputs: &O) -> ShutterStatus {
        ShutterStatus {
            index: self.index,
            open_channel: self.open_channel,
            close_channel: self.close_channel,
            position: self.position,
            target_position: self.target_position,
            direction: self.direction,
            state: StateLabel::derive(self.direction, self.position),
            open_output: outputs.get(self.open_channel),
            close_output: outputs.get(self.close_channel),
            travel_time_ms: self.travel_time_ms,
            interlock_delay_ms: self.gate.delay_ms(),
        }
    }

    /// Heading the outputs are physically driving right now.
    fn energized_heading<O: OutputDriver>(&self, outputs: &O) -> Option<Heading> {
        match (outputs.get(self.open_channel), outputs.get(self.close_channel)) {
            (true, false) => Some(Heading::Open),
            (false, true) => Some(Heading::Close),
            (false, false) => None,
            // Both relays latched: treat it as driving against whatever is
            // requested next so the gate enforces a dead time.
            (true, true) => Some(match self.direction.heading() {
                Some(heading) => heading,
                None => Heading::Open,
            }),
        }
    }

    fn set_relays<O: OutputDriver>(&self, outputs: &mut O, open: bool, close: bool) {
        debug!(
            shutter = self.index,
            open_channel = self.open_channel,
            close_channel = self.close_channel,
            open,
            close,
            "commanding relays"
        );
        // Switch the inactive side first so both are never on together.
        if open {
            outputs.set(self.close_channel, false);
            outputs.set(self.open_channel, true);
        } else {
            outputs.set(self.open_channel, false);
            outputs.set(self.close_channel, close);
        }
    }

    /// Drives both channels low without touching motion state.
    pub fn release_outputs<O: OutputDriver>(&self, outputs: &mut O) {
        self.set_relays(outputs, false, false);
    }

    fn integrate_to(&mut self, now: Timestamp) {
        if let Some(heading) = self.direction.heading() {
            let elapsed = now.millis_since(self.segment_start);
            self.position = estimator::integrate(self.position, heading, elapsed, self.travel_time_ms);
            self.segment_start = now;
        }

        // Safety assertion: the estimate never leaves the travel range
        debug_assert!(
            (POSITION_MIN..=POSITION_MAX).contains(&self.position),
            "shutter {} position {} out of range",
            self.index,
            self.position
        );
    }

    /// Brings motion to a halt: integrate, drop both outputs, go idle.
    fn halt<O: OutputDriver, T: Transport>(&mut self, ports: &mut Ports<'_, O, T>) {
        let energized = self.energized_heading(ports.outputs);
        self.integrate_to(ports.now);
        self.set_relays(ports.outputs, false, false);
        if let Some(heading) = energized {
            self.last_release = Some(Release { heading, at: ports.now });
        }
        self.direction = Direction::Idle;

        info!(
            shutter = self.index,
            open_channel = self.open_channel,
            close_channel = self.close_channel,
            position = self.position,
            "stopped"
        );
    }

    fn start_moving<O: OutputDriver>(&mut self, heading: Heading, outputs: &mut O, now: Timestamp) {
        self.direction = Direction::moving(heading);
        self.segment_start = now;
        match heading {
            Heading::Open => self.set_relays(outputs, true, false),
            Heading::Close => self.set_relays(outputs, false, true),
        }
    }

    /// Runs the throttler for the current snapshot.
    pub fn publish<O, T: Transport>(&mut self, ports: &mut Ports<'_, O, T>) -> PublishOutcome {
        let snapshot = self.snapshot();
        let outcome = self.publisher.publish(self.index, &snapshot, ports.now, ports.transport);
        self.last_reported_position = Some(self.position);
        outcome
    }

    pub fn stop<O: OutputDriver, T: Transport>(&mut self, ports: &mut Ports<'_, O, T>) -> PublishOutcome {
        self.halt(ports);
        self.publish(ports)
    }

    pub fn set_position<O: OutputDriver, T: Transport>(
        &mut self,
        target: f32,
        ports: &mut Ports<'_, O, T>,
    ) -> PublishOutcome {
        let target = clamp_position(target);
        let now = ports.now;

        // Fold in motion so far before comparing against the target.
        self.integrate_to(now);

        let Some(heading) = Heading::toward(self.position, target) else {
            self.halt(ports);
            self.position = target;
            self.target_position = target;
            info!(shutter = self.index, target, "target within tolerance, holding");
            return self.publish(ports);
        };

        self.target_position = target;

        if self.direction.heading() == Some(heading) {
            info!(shutter = self.index, target, "retargeting while moving");
            return self.publish(ports);
        }

        let energized = self.energized_heading(ports.outputs);
        if self.direction != Direction::Idle || energized.is_some() {
            self.halt(ports);
        }

        match self.gate.countdown_start(energized, self.last_release, heading, now) {
            Some(start) => {
                self.direction = Direction::InterlockWait(heading);
                self.segment_start = start;
                info!(
                    shutter = self.index,
                    delay_ms = self.gate.delay_ms(),
                    target,
                    "entering interlock wait before direction change"
                );
            }
            None => {
                self.start_moving(heading, ports.outputs, now);
                info!(shutter = self.index, target, ?heading, "starting movement");
            }
        }

        self.publish(ports)
    }

    /// Toggle semantics: a second open while opening stops the shutter.
    pub fn open<O: OutputDriver, T: Transport>(&mut self, ports: &mut Ports<'_, O, T>) -> PublishOutcome {
        if self.direction == Direction::Opening {
            info!(shutter = self.index, "already opening, stopping");
            self.stop(ports)
        } else {
            self.set_position(POSITION_MAX, ports)
        }
    }

    pub fn close<O: OutputDriver, T: Transport>(&mut self, ports: &mut Ports<'_, O, T>) -> PublishOutcome {
        if self.direction == Direction::Closing {
            info!(shutter = self.index, "already closing, stopping");
            self.stop(ports)
        } else {
            self.set_position(POSITION_MIN, ports)
        }
    }

    pub fn set_interlock_delay<O, T: Transport>(
        &mut self,
        delay_ms: u32,
        ports: &mut Ports<'_, O, T>,
    ) -> PublishOutcome {
        self.gate.set_delay_ms(delay_ms);
        info!(shutter = self.index, delay_ms, "interlock delay set");
        self.publish(ports)
    }

    pub fn set_travel_time<O, T: Transport>(
        &mut self,
        travel_time_ms: u32,
        ports: &mut Ports<'_, O, T>,
    ) -> Result<PublishOutcome, ShutterError> {
        if travel_time_ms < MIN_TRAVEL_TIME_MS {
            return Err(ShutterError::InvalidTravelTime(travel_time_ms));
        }

        // Close the running segment at the old speed.
        self.integrate_to(ports.now);
        self.travel_time_ms = travel_time_ms;
        info!(shutter = self.index, travel_time_ms, "full travel time set");
        Ok(self.publish(ports))
    }

    pub fn tick<O: OutputDriver, T: Transport>(&mut self, ports: &mut Ports<'_, O, T>) {
        match self.direction {
            Direction::InterlockWait(heading) => self.tick_interlock(heading, ports),
            Direction::Opening | Direction::Closing => self.tick_motion(ports),
            Direction::Idle => self.flush_if_stale(ports),
        }
    }

    fn tick_interlock<O: OutputDriver, T: Transport>(&mut self, heading: Heading, ports: &mut Ports<'_, O, T>) {
        match self.gate.remaining(self.segment_start, ports.now) {
            None => {
                info!(shutter = self.index, ?heading, "interlock complete, moving");
                self.start_moving(heading, ports.outputs, ports.now);
                self.publish(ports);
            }
            Some(remaining_ms) => {
                debug!(
                    shutter = self.index,
                    target = self.target_position,
                    remaining_ms,
                    "in interlock wait"
                );
                self.flush_if_stale(ports);
            }
        }
    }

    fn tick_motion<O: OutputDriver, T: Transport>(&mut self, ports: &mut Ports<'_, O, T>) {
        let Some(heading) = self.direction.heading() else {
            return;
        };

        self.integrate_to(ports.now);

        let limit_reached = match heading {
            Heading::Open => self.position >= POSITION_MAX,
            Heading::Close => self.position <= POSITION_MIN,
        };
        let target_reached = match heading {
            Heading::Open => self.position >= self.target_position,
            Heading::Close => self.position <= self.target_position,
        };

        let mut published = false;
        if limit_reached || target_reached {
            if limit_reached {
                info!(shutter = self.index, position = self.position, "travel limit reached");
            } else {
                self.position = self.target_position;
                info!(shutter = self.index, target = self.target_position, "target reached");
            }
            self.halt(ports);
            self.publish(ports);
            published = true;
        }

        let drifted = match self.last_reported_position {
            Some(reported) => (self.position - reported).abs() >= POSITION_REPORT_THRESHOLD,
            None => true,
        };
        // Heartbeat while the estimate sits on the last reported value.
        let stalled = self.direction.is_moving() && self.last_reported_position == Some(self.position);
        let changes = self.publisher.last_sent().diff(&self.snapshot());
        let unsent_state = changes.direction || changes.label;

        if drifted || stalled || (!published && (self.publisher.needs_republish() || unsent_state)) {
            self.publish(ports);
        }
    }

    /// Catch-up for shutters that are not moving: pending republish,
    /// a suppressed change, or the periodic refresh.
    fn flush_if_stale<O, T: Transport>(&mut self, ports: &mut Ports<'_, O, T>) {
        if self.publisher.is_stale(&self.snapshot(), ports.now) {
            self.publish(ports);
        }
    }
}
