use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Millisecond reading of a free-running 32-bit monotonic counter.
///
/// The counter wraps roughly every 49.7 days, so timestamps are only ever
/// compared through [`Timestamp::millis_since`], which is wrap-safe as long
/// as the two readings are less than one full period apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(u32);

impl Timestamp {
    pub const fn from_millis(ms: u32) -> Self {
        Self(ms)
    }

    pub const fn as_millis(self) -> u32 {
        self.0
    }

    /// Milliseconds elapsed from `earlier` to `self`, across counter rollover.
    pub const fn millis_since(self, earlier: Timestamp) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    pub const fn offset(self, ms: u32) -> Self {
        Self(self.0.wrapping_add(ms))
    }
}

pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Wall-clock backed source, counting from construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        // Truncation is the intended 32-bit counter wrap.
        Timestamp(self.origin.elapsed().as_millis() as u32)
    }
}

/// Hand-driven clock for tests and deterministic simulation.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Timestamp,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(ms: u32) -> Self {
        Self { now: Timestamp(ms) }
    }

    pub fn advance(&mut self, ms: u32) {
        self.now = self.now.offset(ms);
    }

    pub fn set(&mut self, now: Timestamp) {
        self.now = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now
    }
}
