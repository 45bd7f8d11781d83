//! Boundaries between the shutter core and the host: output table, clock,
//! pub/sub transport and discovery encoder.

pub mod clock;
pub mod discovery;
pub mod memory;
pub mod outputs;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use discovery::{Announcement, CoverDiscovery, DiscoveryEncoder};
pub use memory::{MemoryOutputs, PublishedMessage, RecordingTransport};
pub use outputs::{Channel, OutputDriver};
pub use transport::{PublishResult, Transport};
