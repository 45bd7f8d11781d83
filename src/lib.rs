//! # Shutterbus
//!
//! Relay-driven window shutter controller. Each shutter is a pair of
//! mutually exclusive outputs (open relay, close relay); position is
//! estimated from how long the motor has run and reported to a pub/sub
//! transport with change detection and rate limiting.
//!
//! ## Features
//!
//! - **Time-integrated position**: no sensors, position follows relay on-time
//! - **Reversal interlock**: dead time between de-energizing one relay and energizing the other
//! - **Throttled publishing**: per-field change detection, 500 ms rate limit, 60 s heartbeat
//! - **Command processing**: JSON commands and classic console lines
//! - **Bounded memory**: fixed shutter table, stack buffers for topics and payloads
//!
//! ## Quick Start
//!
//! ```rust
//! use shutterbus::ports::{ManualClock, MemoryOutputs, RecordingTransport};
//! use shutterbus::ShutterController;
//!
//! let mut controller = ShutterController::new(
//!     MemoryOutputs::new(),
//!     ManualClock::new(),
//!     RecordingTransport::new("livingroom"),
//! );
//!
//! controller.configure(0, 1, 2).unwrap();
//! controller.set_position(0, 40.0).unwrap();
//!
//! for _ in 0..15 {
//!     controller.clock_mut().advance(1000);
//!     controller.tick();
//! }
//!
//! let status = controller.render_status(0).unwrap();
//! assert!((status.position - 40.0).abs() <= 0.5);
//! ```
//!
//! ## Architecture
//!
//! - [`controller`] - Shutter table and public API
//! - [`shutter`] - Per-shutter state machine, position estimator and interlock gate
//! - [`publish`] - Publish throttling and topic layout
//! - [`protocol`] - Command/response protocol handling
//! - [`config`] - TOML configuration
//! - [`ports`] - Output, clock, transport and discovery boundaries

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

extern crate alloc;

pub mod config;
pub mod controller;
pub mod ports;
pub mod protocol;
pub mod publish;
pub mod shutter;

// Re-export main public types for convenience
pub use config::{ConfigError, ControllerConfig};
pub use controller::ShutterController;
pub use protocol::{Command, CommandResponse, CommandType, CoverAction, ProtocolError};
pub use shutter::{Direction, Heading, ShutterError, ShutterStatus};
