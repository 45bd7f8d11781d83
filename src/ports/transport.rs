use serde::{Deserialize, Serialize};

/// Outcome reported by the transport for a single publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublishResult {
    Ok,
    Failed,
    /// The message could not be queued for lack of buffer space. Retrying
    /// right away would hit the same wall, so it settles the batch like `Ok`.
    MemoryFailure,
}

impl PublishResult {
    pub fn settles(self) -> bool {
        matches!(self, PublishResult::Ok | PublishResult::MemoryFailure)
    }
}

/// Pub/sub link used for status updates and discovery announcements.
pub trait Transport {
    fn is_ready(&self) -> bool;

    fn publish(&mut self, topic: &str, payload: &str, retain: bool) -> PublishResult;

    /// Identity used as the first topic segment.
    fn client_id(&self) -> &str;
}
