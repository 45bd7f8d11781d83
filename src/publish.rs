use crate::ports::{PublishResult, Timestamp, Transport};
use crate::shutter::Direction;
use arrayvec::ArrayString;
use core::fmt::Write;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const MIN_PUBLISH_INTERVAL_MS: u32 = 500;
pub const FORCE_PUBLISH_INTERVAL_MS: u32 = 60_000;

const MAX_TOPIC_SIZE: usize = 128;
const MAX_PAYLOAD_SIZE: usize = 32;

pub type TopicBuffer = ArrayString<MAX_TOPIC_SIZE>;
type PayloadBuffer = ArrayString<MAX_PAYLOAD_SIZE>;

/// Cover state as understood by home-automation hubs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateLabel {
    Opening,
    Closing,
    Open,
    Closed,
    Stopped,
}

impl StateLabel {
    pub fn derive(direction: Direction, position: f32) -> Self {
        match direction {
            Direction::Opening => StateLabel::Opening,
            Direction::Closing => StateLabel::Closing,
            Direction::Idle | Direction::InterlockWait(_) => {
                if position >= 99.0 {
                    StateLabel::Open
                } else if position <= 1.0 {
                    StateLabel::Closed
                } else {
                    StateLabel::Stopped
                }
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StateLabel::Opening => "opening",
            StateLabel::Closing => "closing",
            StateLabel::Open => "open",
            StateLabel::Closed => "closed",
            StateLabel::Stopped => "stopped",
        }
    }
}

/// Current published-facing view of a shutter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub direction: Direction,
    pub position: f32,
}

impl Snapshot {
    pub fn label(&self) -> StateLabel {
        StateLabel::derive(self.direction, self.position)
    }
}

/// What the transport last confirmed for each field. `None` = never sent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SentSnapshot {
    pub direction: Option<i8>,
    pub position: Option<f32>,
    pub label: Option<StateLabel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldChanges {
    pub direction: bool,
    pub position: bool,
    pub label: bool,
}

impl FieldChanges {
    pub fn any(&self) -> bool {
        self.direction || self.position || self.label
    }
}

impl SentSnapshot {
    pub fn diff(&self, current: &Snapshot) -> FieldChanges {
        FieldChanges {
            direction: self.direction != Some(current.direction.code()),
            // Exact comparison: any estimate movement counts as a change.
            position: self.position != Some(current.position),
            label: self.label != Some(current.label()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Nothing differs from what was last sent and no refresh is due.
    Unchanged,
    /// Transport not ready; the pending flag is now set.
    Deferred,
    /// Too soon after the previous publish.
    RateLimited,
    Sent { delivered: u8, settled: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Direction,
    Position,
    State,
}

impl Field {
    fn segment(self) -> &'static str {
        match self {
            Field::Direction => "direction",
            Field::Position => "position",
            Field::State => "state",
        }
    }
}

pub fn status_topic(client_id: &str, index: usize, field: &str) -> Option<TopicBuffer> {
    let mut topic = TopicBuffer::new();
    write!(topic, "{}/shutter{}/{}/get", client_id, index, field).ok()?;
    Some(topic)
}

/// Change- and rate-limited status publisher for one shutter.
#[derive(Debug, Clone)]
pub struct StatePublisher {
    last_sent: SentSnapshot,
    last_publish: Option<Timestamp>,
    needs_republish: bool,
}

impl StatePublisher {
    pub fn new() -> Self {
        Self {
            last_sent: SentSnapshot::default(),
            last_publish: None,
            needs_republish: false,
        }
    }

    /// Forget everything sent so far and force a full republish.
    pub fn reset(&mut self) {
        self.last_sent = SentSnapshot::default();
        self.last_publish = None;
        self.needs_republish = true;
    }

    pub fn needs_republish(&self) -> bool {
        self.needs_republish
    }

    pub fn last_sent(&self) -> &SentSnapshot {
        &self.last_sent
    }

    pub fn last_publish(&self) -> Option<Timestamp> {
        self.last_publish
    }

    fn force_due(&self, now: Timestamp) -> bool {
        match self.last_publish {
            Some(at) => now.millis_since(at) >= FORCE_PUBLISH_INTERVAL_MS,
            None => true,
        }
    }

    /// True when a publish attempt now would have something to send.
    pub fn is_stale(&self, snapshot: &Snapshot, now: Timestamp) -> bool {
        self.needs_republish || self.force_due(now) || self.last_sent.diff(snapshot).any()
    }

    pub fn publish<T: Transport>(
        &mut self,
        index: usize,
        snapshot: &Snapshot,
        now: Timestamp,
        transport: &mut T,
    ) -> PublishOutcome {
        if !transport.is_ready() {
            self.needs_republish = true;
            debug!(shutter = index, "state change while transport not ready, republish pending");
            return PublishOutcome::Deferred;
        }

        let changes = self.last_sent.diff(snapshot);
        let forced = self.force_due(now);
        let pending = self.needs_republish;

        if !(changes.any() || forced || pending) {
            return PublishOutcome::Unchanged;
        }

        if let Some(at) = self.last_publish {
            if now.millis_since(at) < MIN_PUBLISH_INTERVAL_MS && !forced && !pending {
                debug!(shutter = index, "rate limiting publish");
                return PublishOutcome::RateLimited;
            }
        }

        let everything = forced || pending;
        let label = snapshot.label();
        let mut delivered = 0u8;
        let mut settled = true;

        if changes.direction || everything {
            let mut payload = PayloadBuffer::new();
            let _ = write!(payload, "{}", snapshot.direction.code());
            let result = self.send(index, Field::Direction, &payload, transport);
            if result == PublishResult::Ok {
                self.last_sent.direction = Some(snapshot.direction.code());
                delivered += 1;
            }
            settled &= result.settles();
        }

        if changes.position || everything {
            let mut payload = PayloadBuffer::new();
            let _ = write!(payload, "{:.0}", snapshot.position);
            let result = self.send(index, Field::Position, &payload, transport);
            if result == PublishResult::Ok {
                self.last_sent.position = Some(snapshot.position);
                delivered += 1;
            }
            settled &= result.settles();
        }

        if changes.label || everything {
            let result = self.send(index, Field::State, label.as_str(), transport);
            if result == PublishResult::Ok {
                self.last_sent.label = Some(label);
                delivered += 1;
            }
            settled &= result.settles();
        }

        if settled {
            self.last_publish = Some(now);
            self.needs_republish = false;
        }

        PublishOutcome::Sent { delivered, settled }
    }

    fn send<T: Transport>(
        &self,
        index: usize,
        field: Field,
        payload: &str,
        transport: &mut T,
    ) -> PublishResult {
        let Some(topic) = status_topic(transport.client_id(), index, field.segment()) else {
            warn!(shutter = index, "client id too long for {} topic", field.segment());
            return PublishResult::Failed;
        };

        let result = transport.publish(&topic, payload, false);
        match result {
            PublishResult::Ok => debug!(shutter = index, %topic, payload, "published"),
            other => warn!(shutter = index, %topic, result = ?other, "publish failed"),
        }
        result
    }
}

impl Default for StatePublisher {
    fn default() -> Self {
        Self::new()
    }
}
