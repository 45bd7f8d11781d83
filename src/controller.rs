use crate::ports::{Channel, Clock, CoverDiscovery, DiscoveryEncoder, OutputDriver, Transport};
use crate::protocol::{Command, CommandResponse, CommandType, CoverAction, ResponseStatus};
use crate::publish::PublishOutcome;
use crate::shutter::{
    ChannelFault, Ports, Shutter, ShutterError, ShutterStatus, DEFAULT_CHANNEL_LIMIT, MAX_SHUTTERS,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub type StatusList = heapless::Vec<ShutterStatus, MAX_SHUTTERS>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerState {
    pub tick_count: u64,
    pub command_count: u32,
    pub rejected_count: u32,
    pub last_error: Option<alloc::string::String>,
}

/// Owns the shutter table and the host ports, and serializes every
/// operation on them. Ticks and commands must come from one context.
pub struct ShutterController<O: OutputDriver, C: Clock, T: Transport> {
    slots: [Option<Shutter>; MAX_SHUTTERS],
    outputs: O,
    clock: C,
    transport: T,
    channel_limit: Channel,
    announcer: CoverDiscovery,
    state: ControllerState,
}

pub const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";

impl<O: OutputDriver, C: Clock, T: Transport> ShutterController<O, C, T> {
    pub fn new(outputs: O, clock: C, transport: T) -> Self {
        Self {
            slots: Default::default(),
            outputs,
            clock,
            transport,
            channel_limit: DEFAULT_CHANNEL_LIMIT,
            announcer: CoverDiscovery::new(DEFAULT_DISCOVERY_PREFIX),
            state: ControllerState::default(),
        }
    }

    /// Channels must be below `limit`; channel 0 is never assignable.
    pub fn with_channel_limit(mut self, limit: Channel) -> Self {
        self.channel_limit = limit;
        self
    }

    pub fn with_discovery_prefix(mut self, prefix: &str) -> Self {
        self.announcer = CoverDiscovery::new(prefix);
        self
    }

    pub fn channel_limit(&self) -> Channel {
        self.channel_limit
    }

    pub fn outputs(&self) -> &O {
        &self.outputs
    }

    pub fn outputs_mut(&mut self) -> &mut O {
        &mut self.outputs
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn get_state(&self) -> &ControllerState {
        &self.state
    }

    pub fn shutter(&self, index: usize) -> Result<&Shutter, ShutterError> {
        self.slots
            .get(index)
            .ok_or(ShutterError::InvalidIndex { index, limit: MAX_SHUTTERS })?
            .as_ref()
            .ok_or(ShutterError::Inactive(index))
    }

    pub fn active_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|_| index))
    }

    pub fn active_count(&self) -> usize {
        self.active_indices().count()
    }

    /// An omitted index means "the only configured shutter".
    pub fn resolve_index(&self, index: Option<usize>) -> Result<usize, ShutterError> {
        match index {
            Some(index) => self.shutter(index).map(|_| index),
            None => {
                let mut active = self.active_indices();
                match (active.next(), active.next()) {
                    (Some(only), None) => {
                        debug!(shutter = only, "no index given, defaulting to single configured shutter");
                        Ok(only)
                    }
                    _ => Err(ShutterError::NoDefaultShutter),
                }
            }
        }
    }

    fn with_shutter<R>(
        &mut self,
        index: usize,
        op: impl FnOnce(&mut Shutter, &mut Ports<'_, O, T>) -> R,
    ) -> Result<R, ShutterError> {
        let now = self.clock.now();
        let shutter = self
            .slots
            .get_mut(index)
            .ok_or(ShutterError::InvalidIndex { index, limit: MAX_SHUTTERS })?
            .as_mut()
            .ok_or(ShutterError::Inactive(index))?;

        let mut ports = Ports {
            outputs: &mut self.outputs,
            transport: &mut self.transport,
            now,
        };
        Ok(op(shutter, &mut ports))
    }

    fn validate_channels(
        &self,
        index: usize,
        open_channel: Channel,
        close_channel: Channel,
    ) -> Result<(), ChannelFault> {
        for channel in [open_channel, close_channel] {
            if channel == 0 || channel >= self.channel_limit {
                return Err(ChannelFault::OutOfRange { channel, limit: self.channel_limit });
            }
        }

        if open_channel == close_channel {
            return Err(ChannelFault::SameChannel(open_channel));
        }

        for (owner, slot) in self.slots.iter().enumerate() {
            if owner == index {
                continue;
            }
            if let Some(other) = slot {
                for channel in [open_channel, close_channel] {
                    if other.uses_channel(channel) {
                        return Err(ChannelFault::InUse { channel, owner });
                    }
                }
            }
        }

        Ok(())
    }

    /// Assigns a channel pair to a slot, resetting all motion and publish
    /// state. Outputs of a previous pair are switched off first.
    pub fn configure(
        &mut self,
        index: usize,
        open_channel: Channel,
        close_channel: Channel,
    ) -> Result<PublishOutcome, ShutterError> {
        if index >= MAX_SHUTTERS {
            return Err(ShutterError::InvalidIndex { index, limit: MAX_SHUTTERS });
        }
        self.validate_channels(index, open_channel, close_channel)
            .map_err(ShutterError::InvalidChannelAssignment)?;

        if let Some(previous) = &self.slots[index] {
            let (old_open, old_close) = previous.channels();
            info!(shutter = index, old_open, old_close, "reconfiguring shutter");
            previous.release_outputs(&mut self.outputs);
        }

        let shutter = Shutter::new(index, open_channel, close_channel, self.clock.now());
        self.outputs.reserve(open_channel);
        self.outputs.reserve(close_channel);
        shutter.release_outputs(&mut self.outputs);
        self.slots[index] = Some(shutter);

        info!(shutter = index, open_channel, close_channel, "shutter defined");
        self.with_shutter(index, |shutter, ports| shutter.publish(ports))
    }

    pub fn open(&mut self, index: usize) -> Result<PublishOutcome, ShutterError> {
        self.with_shutter(index, |shutter, ports| shutter.open(ports))
    }

    pub fn close(&mut self, index: usize) -> Result<PublishOutcome, ShutterError> {
        self.with_shutter(index, |shutter, ports| shutter.close(ports))
    }

    pub fn stop(&mut self, index: usize) -> Result<PublishOutcome, ShutterError> {
        self.with_shutter(index, |shutter, ports| shutter.stop(ports))
    }

    pub fn set_position(&mut self, index: usize, percent: f32) -> Result<PublishOutcome, ShutterError> {
        self.with_shutter(index, |shutter, ports| shutter.set_position(percent, ports))
    }

    /// Absolute cover action: unlike open/close there is no toggle.
    pub fn apply_action(&mut self, index: usize, action: CoverAction) -> Result<PublishOutcome, ShutterError> {
        match action {
            CoverAction::Close => self.set_position(index, crate::shutter::POSITION_MIN),
            CoverAction::Open => self.set_position(index, crate::shutter::POSITION_MAX),
            CoverAction::Stop => self.stop(index),
        }
    }

    pub fn set_interlock_delay(&mut self, index: usize, delay_ms: u32) -> Result<PublishOutcome, ShutterError> {
        self.with_shutter(index, |shutter, ports| shutter.set_interlock_delay(delay_ms, ports))
    }

    pub fn set_travel_time(&mut self, index: usize, travel_time_ms: u32) -> Result<PublishOutcome, ShutterError> {
        self.with_shutter(index, |shutter, ports| shutter.set_travel_time(travel_time_ms, ports))?
    }

    /// Periodic update for every configured shutter, nominally once a second.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        let mut ports = Ports {
            outputs: &mut self.outputs,
            transport: &mut self.transport,
            now,
        };

        for shutter in self.slots.iter_mut().flatten() {
            shutter.tick(&mut ports);
        }

        self.state.tick_count = self.state.tick_count.saturating_add(1);
    }

    pub fn render_status(&self, index: usize) -> Result<ShutterStatus, ShutterError> {
        self.shutter(index).map(|shutter| shutter.status(&self.outputs))
    }

    pub fn status_all(&self) -> StatusList {
        let mut list = StatusList::new();
        for shutter in self.slots.iter().flatten() {
            // Capacity equals the slot count.
            let _ = list.push(shutter.status(&self.outputs));
        }
        list
    }

    /// Publishes one retained announcement per configured shutter.
    /// Returns how many were accepted by the transport.
    pub fn discovery<E: DiscoveryEncoder>(&mut self, encoder: &E) -> usize {
        info!("publishing discovery announcements");
        let mut published = 0;

        for index in 0..MAX_SHUTTERS {
            if self.slots[index].is_none() {
                debug!(shutter = index, "not configured, skipping discovery");
                continue;
            }

            let Some(announcement) = encoder.announce(index, self.transport.client_id()) else {
                warn!(shutter = index, "failed to build discovery announcement");
                continue;
            };

            let result = self.transport.publish(&announcement.topic, &announcement.payload, true);
            if result.settles() {
                published += 1;
                debug!(shutter = index, topic = %announcement.topic, "discovery queued");
            } else {
                warn!(shutter = index, topic = %announcement.topic, "discovery publish failed");
            }
        }

        published
    }

    /// Runs one structured command and reports the outcome.
    pub fn execute(&mut self, command: Command) -> CommandResponse {
        self.state.command_count = self.state.command_count.saturating_add(1);
        let id = command.id;

        match self.dispatch(command.command_type) {
            Ok(reply) => CommandResponse {
                id,
                status: ResponseStatus::Success,
                message: reply.message,
                shutters: reply.shutters,
            },
            Err(e) => {
                warn!(command = id, error = %e, "command rejected");
                self.state.rejected_count = self.state.rejected_count.saturating_add(1);
                self.state.last_error = Some(alloc::string::ToString::to_string(&e));
                CommandResponse {
                    id,
                    status: ResponseStatus::Rejected,
                    message: Some(alloc::string::ToString::to_string(&e)),
                    shutters: alloc::vec::Vec::new(),
                }
            }
        }
    }

    fn dispatch(&mut self, command_type: CommandType) -> Result<Reply, ShutterError> {
        let touched = match command_type {
            CommandType::Ping => return Ok(Reply::message("pong")),

            CommandType::Discovery => {
                let announcer = self.announcer.clone();
                let published = self.discovery(&announcer);
                return Ok(Reply {
                    message: Some(alloc::format!("{} announcements published", published)),
                    shutters: alloc::vec::Vec::new(),
                });
            }

            CommandType::Status { index: None } => {
                return Ok(Reply {
                    message: None,
                    shutters: self.status_all().into_iter().collect(),
                });
            }

            CommandType::Status { index: Some(index) } => index,

            CommandType::Configure { index, open_channel, close_channel } => {
                self.configure(index, open_channel, close_channel)?;
                index
            }

            CommandType::Open { index } => {
                let index = self.resolve_index(index)?;
                self.open(index)?;
                index
            }

            CommandType::Close { index } => {
                let index = self.resolve_index(index)?;
                self.close(index)?;
                index
            }

            CommandType::Stop { index } => {
                let index = self.resolve_index(index)?;
                self.stop(index)?;
                index
            }

            CommandType::SetPosition { index, position } => {
                let index = self.resolve_index(index)?;
                self.set_position(index, position)?;
                index
            }

            CommandType::SetState { index, action } => {
                let index = self.resolve_index(index)?;
                self.apply_action(index, action)?;
                index
            }

            CommandType::SetInterlockDelay { index, delay_ms } => {
                let index = self.resolve_index(index)?;
                self.set_interlock_delay(index, delay_ms)?;
                index
            }

            CommandType::SetTravelTime { index, travel_time_ms } => {
                let index = self.resolve_index(index)?;
                self.set_travel_time(index, travel_time_ms)?;
                index
            }
        };

        let status = self.render_status(touched)?;
        Ok(Reply {
            message: None,
            shutters: alloc::vec![status],
        })
    }
}

struct Reply {
    message: Option<alloc::string::String>,
    shutters: alloc::vec::Vec<ShutterStatus>,
}

impl Reply {
    fn message(text: &str) -> Self {
        Self {
            message: Some(text.into()),
            shutters: alloc::vec::Vec::new(),
        }
    }
}
