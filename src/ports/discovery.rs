use serde::Serialize;

/// Retained announcement describing one shutter to a home-automation hub.
#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    pub topic: alloc::string::String,
    pub payload: alloc::string::String,
}

pub trait DiscoveryEncoder {
    /// Returns `None` when no announcement can be built for the slot.
    fn announce(&self, index: usize, client_id: &str) -> Option<Announcement>;
}

/// Home Assistant MQTT cover config, one entity per shutter slot.
#[derive(Debug, Clone)]
pub struct CoverDiscovery {
    prefix: alloc::string::String,
}

#[derive(Serialize)]
struct CoverConfig<'a> {
    name: alloc::string::String,
    unique_id: alloc::string::String,
    device_class: &'a str,
    command_topic: alloc::string::String,
    state_topic: alloc::string::String,
    position_topic: alloc::string::String,
    set_position_topic: alloc::string::String,
    payload_open: &'a str,
    payload_close: &'a str,
    payload_stop: &'a str,
    position_open: u8,
    position_closed: u8,
}

impl CoverDiscovery {
    pub fn new(prefix: &str) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl DiscoveryEncoder for CoverDiscovery {
    fn announce(&self, index: usize, client_id: &str) -> Option<Announcement> {
        let unique_id = alloc::format!("{}_shutter_{}", client_id, index);
        let config = CoverConfig {
            name: alloc::format!("{} Shutter {}", client_id, index),
            unique_id: unique_id.clone(),
            device_class: "shutter",
            command_topic: alloc::format!("cmnd/{}/shutterstate{}", client_id, index),
            state_topic: alloc::format!("{}/shutter{}/state/get", client_id, index),
            position_topic: alloc::format!("{}/shutter{}/position/get", client_id, index),
            set_position_topic: alloc::format!("cmnd/{}/ShutterPosition{}", client_id, index),
            payload_open: "1",
            payload_close: "0",
            payload_stop: "2",
            position_open: 100,
            position_closed: 0,
        };

        let payload = serde_json::to_string(&config).ok()?;
        Some(Announcement {
            topic: alloc::format!("{}/cover/{}/config", self.prefix, unique_id),
            payload,
        })
    }
}
