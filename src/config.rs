//! TOML configuration for a controller instance.
//!
//! ```toml
//! client_id = "livingroom"
//! listen = "0.0.0.0:8080"
//! log_level = "debug"
//!
//! [[shutter]]
//! index = 0
//! open_channel = 1
//! close_channel = 2
//! travel_time_ms = 25000
//! ```

use crate::controller::ShutterController;
use crate::ports::{Channel, Clock, OutputDriver, Transport};
use crate::shutter::{ShutterError, MAX_SHUTTERS, MIN_TRAVEL_TIME_MS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const DEFAULT_CLIENT_ID: &str = "shutterbus";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("configuration validation failed: {0}")]
    Validation(String),

    #[error("shutter {index} rejected: {source}")]
    Rejected {
        index: usize,
        #[source]
        source: ShutterError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutterConfig {
    pub index: usize,
    pub open_channel: Channel,
    pub close_channel: Channel,
    #[serde(default)]
    pub travel_time_ms: Option<u32>,
    #[serde(default)]
    pub interlock_delay_ms: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub client_id: String,
    pub listen: String,
    pub log_level: LogLevel,
    pub tick_interval_ms: u64,
    pub channel_limit: Channel,
    pub discovery_prefix: String,
    #[serde(rename = "shutter")]
    pub shutters: Vec<ShutterConfig>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.into(),
            listen: DEFAULT_LISTEN.into(),
            log_level: LogLevel::default(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            channel_limit: crate::shutter::DEFAULT_CHANNEL_LIMIT,
            discovery_prefix: crate::controller::DEFAULT_DISCOVERY_PREFIX.into(),
            shutters: Vec::new(),
        }
    }
}

impl ControllerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Structural checks only. Channel conflicts are caught by `apply`,
    /// which goes through the same validation as a live command.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.is_empty() {
            return Err(ConfigError::Validation("client_id cannot be empty".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Validation("tick_interval_ms must be positive".into()));
        }
        if self.channel_limit < 2 {
            return Err(ConfigError::Validation(format!(
                "channel_limit {} leaves no assignable channel pair",
                self.channel_limit
            )));
        }

        let mut seen = [false; MAX_SHUTTERS];
        for shutter in &self.shutters {
            let slot = seen.get_mut(shutter.index).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "shutter index {} out of range (0-{})",
                    shutter.index,
                    MAX_SHUTTERS - 1
                ))
            })?;
            if *slot {
                return Err(ConfigError::Validation(format!(
                    "shutter index {} defined twice",
                    shutter.index
                )));
            }
            *slot = true;

            if let Some(travel_time_ms) = shutter.travel_time_ms {
                if travel_time_ms < MIN_TRAVEL_TIME_MS {
                    return Err(ConfigError::Validation(format!(
                        "shutter {} travel_time_ms {} below minimum {}",
                        shutter.index, travel_time_ms, MIN_TRAVEL_TIME_MS
                    )));
                }
            }
        }

        Ok(())
    }

    /// Configures every listed shutter on `controller`.
    pub fn apply<O: OutputDriver, C: Clock, T: Transport>(
        &self,
        controller: &mut ShutterController<O, C, T>,
    ) -> Result<(), ConfigError> {
        for shutter in &self.shutters {
            let index = shutter.index;
            let rejected = |source| ConfigError::Rejected { index, source };

            // Checked before the slot is touched so a bad entry leaves it as it was.
            if let Some(travel_time_ms) = shutter.travel_time_ms {
                if travel_time_ms < MIN_TRAVEL_TIME_MS {
                    return Err(rejected(ShutterError::InvalidTravelTime(travel_time_ms)));
                }
            }

            controller
                .configure(index, shutter.open_channel, shutter.close_channel)
                .map_err(rejected)?;
            if let Some(travel_time_ms) = shutter.travel_time_ms {
                controller.set_travel_time(index, travel_time_ms).map_err(rejected)?;
            }
            if let Some(delay_ms) = shutter.interlock_delay_ms {
                controller.set_interlock_delay(index, delay_ms).map_err(rejected)?;
            }
        }

        info!(shutters = self.shutters.len(), "configuration applied");
        Ok(())
    }
}
