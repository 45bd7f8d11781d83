/// Logical output channel number. Channel 0 is reserved by the host.
pub type Channel = u16;

/// Boolean output table shared with the host (relays, GPIO, virtual channels).
pub trait OutputDriver {
    fn set(&mut self, channel: Channel, on: bool);

    /// Reads back the level actually latched on the channel.
    fn get(&self, channel: Channel) -> bool;

    /// Marks a channel as owned by a shutter so the host hides it from its
    /// own UI and status reporting. Hosts without that notion ignore it.
    fn reserve(&mut self, _channel: Channel) {}
}
