//! Reversal protection for the motor and its relays.
//!
//! Switching a running motor straight into the opposite direction shorts
//! the relay contacts through the motor's back-EMF. The gate forces a dead
//! time between de-energizing one output and energizing the other.

use super::Heading;
use crate::ports::Timestamp;

/// The heading an output was driving when it was last switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Release {
    pub heading: Heading,
    pub at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterlockGate {
    delay_ms: u32,
}

impl InterlockGate {
    pub fn new(delay_ms: u32) -> Self {
        Self { delay_ms }
    }

    pub fn delay_ms(&self) -> u32 {
        self.delay_ms
    }

    pub fn set_delay_ms(&mut self, delay_ms: u32) {
        self.delay_ms = delay_ms;
    }

    pub fn is_enabled(&self) -> bool {
        self.delay_ms > 0
    }

    /// Decides whether starting toward `requested` has to wait, and if so
    /// from which instant the dead time counts.
    ///
    /// `energized` is the heading read back from the outputs just before the
    /// stop that precedes this move. `last_release` covers the case where the
    /// outputs were already switched off by an earlier stop whose dead time
    /// has not run out yet.
    pub fn countdown_start(
        &self,
        energized: Option<Heading>,
        last_release: Option<Release>,
        requested: Heading,
        now: Timestamp,
    ) -> Option<Timestamp> {
        if !self.is_enabled() {
            return None;
        }

        if let Some(heading) = energized {
            return (heading != requested).then_some(now);
        }

        match last_release {
            Some(release)
                if release.heading != requested
                    && self.remaining(release.at, now).is_some() =>
            {
                Some(release.at)
            }
            _ => None,
        }
    }

    /// Milliseconds still to wait for a countdown started at `stopped_at`,
    /// or `None` once the gate has released.
    pub fn remaining(&self, stopped_at: Timestamp, now: Timestamp) -> Option<u32> {
        let elapsed = now.millis_since(stopped_at);
        if elapsed >= self.delay_ms {
            None
        } else {
            Some(self.delay_ms - elapsed)
        }
    }
}
