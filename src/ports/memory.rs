//! In-memory port implementations for tests and the simulator.

use super::outputs::{Channel, OutputDriver};
use super::transport::{PublishResult, Transport};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub use super::clock::ManualClock;

/// Channel count of `MemoryOutputs::new`, matching the default channel limit.
pub const MEMORY_CHANNELS: usize = 64;

#[derive(Debug, Clone)]
pub struct MemoryOutputs {
    levels: Vec<bool>,
    reserved: Vec<bool>,
    write_count: u32,
}

impl MemoryOutputs {
    pub fn new() -> Self {
        Self::with_channels(MEMORY_CHANNELS)
    }

    /// Output table covering channels `0..channels`. Size it from the
    /// controller's channel limit so every assignable channel reads back.
    pub fn with_channels(channels: usize) -> Self {
        Self {
            levels: vec![false; channels],
            reserved: vec![false; channels],
            write_count: 0,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.levels.len()
    }

    pub fn is_reserved(&self, channel: Channel) -> bool {
        self.reserved.get(channel as usize).copied().unwrap_or(false)
    }

    pub fn write_count(&self) -> u32 {
        self.write_count
    }

    /// Channels currently driven high, lowest first.
    pub fn energized(&self) -> impl Iterator<Item = Channel> + '_ {
        self.levels
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(channel, _)| channel as Channel)
    }
}

impl Default for MemoryOutputs {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputDriver for MemoryOutputs {
    fn set(&mut self, channel: Channel, on: bool) {
        if let Some(level) = self.levels.get_mut(channel as usize) {
            *level = on;
            self.write_count = self.write_count.saturating_add(1);
        }
    }

    fn get(&self, channel: Channel) -> bool {
        self.levels.get(channel as usize).copied().unwrap_or(false)
    }

    fn reserve(&mut self, channel: Channel) {
        if let Some(slot) = self.reserved.get_mut(channel as usize) {
            *slot = true;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// Transport that records every publish and can be scripted to fail.
#[derive(Debug, Clone)]
pub struct RecordingTransport {
    client_id: String,
    ready: bool,
    scripted: VecDeque<PublishResult>,
    sent: Vec<PublishedMessage>,
    attempts: u32,
}

impl RecordingTransport {
    pub fn new(client_id: &str) -> Self {
        Self {
            client_id: client_id.into(),
            ready: true,
            scripted: VecDeque::new(),
            sent: Vec::new(),
            attempts: 0,
        }
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Queue results returned by the next publishes, in order. Once the
    /// script runs dry every publish succeeds.
    pub fn script(&mut self, results: &[PublishResult]) {
        self.scripted.extend(results.iter().copied());
    }

    /// Successfully delivered messages.
    pub fn sent(&self) -> &[PublishedMessage] {
        &self.sent
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn take_sent(&mut self) -> Vec<PublishedMessage> {
        core::mem::take(&mut self.sent)
    }

    pub fn last_payload(&self, topic: &str) -> Option<&str> {
        self.sent
            .iter()
            .rev()
            .find(|m| m.topic == topic)
            .map(|m| m.payload.as_str())
    }
}

impl Transport for RecordingTransport {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn publish(&mut self, topic: &str, payload: &str, retain: bool) -> PublishResult {
        self.attempts = self.attempts.saturating_add(1);
        let result = self.scripted.pop_front().unwrap_or(PublishResult::Ok);
        if result == PublishResult::Ok {
            self.sent.push(PublishedMessage {
                topic: topic.into(),
                payload: payload.into(),
                retain,
            });
        }
        result
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }
}
