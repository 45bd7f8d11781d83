pub mod estimator;
pub mod interlock;
pub mod machine;

pub use interlock::InterlockGate;
pub use machine::{Ports, Shutter, ShutterStatus};

use crate::ports::Channel;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use thiserror::Error;

pub const MAX_SHUTTERS: usize = 10;
pub const DEFAULT_TRAVEL_TIME_MS: u32 = 30_000;
pub const MIN_TRAVEL_TIME_MS: u32 = 1_000;
pub const DEFAULT_INTERLOCK_DELAY_MS: u32 = 500;
pub const DEFAULT_CHANNEL_LIMIT: Channel = 64;

pub const POSITION_MIN: f32 = 0.0;
pub const POSITION_MAX: f32 = 100.0;
// Targets closer than this to the estimate are treated as reached.
pub const POSITION_TOLERANCE: f32 = 0.5;
pub const POSITION_REPORT_THRESHOLD: f32 = 2.0;

const_assert!(MAX_SHUTTERS > 0);
const_assert!(MIN_TRAVEL_TIME_MS <= DEFAULT_TRAVEL_TIME_MS);

/// Motor heading while energized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Heading {
    Open,
    Close,
}

impl Heading {
    pub fn sign(self) -> f32 {
        match self {
            Heading::Open => 1.0,
            Heading::Close => -1.0,
        }
    }

    /// Heading needed to get from `position` to `target`, if the gap is
    /// wider than the positioning tolerance.
    pub fn toward(position: f32, target: f32) -> Option<Heading> {
        if target > position + POSITION_TOLERANCE {
            Some(Heading::Open)
        } else if target < position - POSITION_TOLERANCE {
            Some(Heading::Close)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Idle,
    Opening,
    Closing,
    /// Outputs off, waiting out the reversal delay before moving toward the heading.
    InterlockWait(Heading),
}

impl Direction {
    pub fn moving(heading: Heading) -> Self {
        match heading {
            Heading::Open => Direction::Opening,
            Heading::Close => Direction::Closing,
        }
    }

    pub fn heading(self) -> Option<Heading> {
        match self {
            Direction::Opening => Some(Heading::Open),
            Direction::Closing => Some(Heading::Close),
            Direction::Idle | Direction::InterlockWait(_) => None,
        }
    }

    pub fn is_moving(self) -> bool {
        self.heading().is_some()
    }

    /// Integer code published on the direction topic.
    pub fn code(self) -> i8 {
        match self {
            Direction::Idle => 0,
            Direction::Opening => 1,
            Direction::Closing => -1,
            Direction::InterlockWait(_) => -2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelFault {
    #[error("channel {channel} outside 1..{limit}")]
    OutOfRange { channel: Channel, limit: Channel },
    #[error("open and close channel are both {0}")]
    SameChannel(Channel),
    #[error("channel {channel} already used by shutter {owner}")]
    InUse { channel: Channel, owner: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShutterError {
    #[error("shutter index {index} out of range (0-{})", .limit - 1)]
    InvalidIndex { index: usize, limit: usize },
    #[error("shutter {0} is not configured")]
    Inactive(usize),
    #[error("no shutter index given and no single configured shutter to default to")]
    NoDefaultShutter,
    #[error("invalid channel assignment: {0}")]
    InvalidChannelAssignment(ChannelFault),
    #[error("travel time {0}ms below minimum of 1000ms")]
    InvalidTravelTime(u32),
}

pub fn clamp_position(position: f32) -> f32 {
    if position.is_nan() {
        return POSITION_MIN;
    }
    position.clamp(POSITION_MIN, POSITION_MAX)
}
