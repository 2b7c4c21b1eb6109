//! # MarkStim Core Library
//!
//! Host-side driver for the MarkStim TMS trigger / EEG event registration device.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - The serial handshake / setup / trigger / reset protocol
//! - A latency probe that characterizes serial round-trip timing
//! - A typed device configuration
//! - A simulated device for testing without hardware
//!
//! ## Supported boards
//!
//! - Teensy
//! - Arduino
//! - Generic serial input/output devices running the MarkStim firmware
//!
//! ## Example
//!
//! ```rust,ignore
//! use markstim_core::{config::DeviceConfig, protocol::Connection};
//!
//! let config = DeviceConfig::default();
//! let mut conn = Connection::open(config)?;
//! conn.handshake()?;
//! conn.setup(Default::default())?;
//!
//! // Inside the task loop
//! conn.trigger(255)?;
//!
//! // After the experiment
//! conn.reset();
//! ```

pub mod clock;
pub mod config;
pub mod latency;
pub mod protocol;
pub mod simulator;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::DeviceConfig;
    pub use crate::latency::{LatencyProbe, LatencyReport, Statistics};
    pub use crate::protocol::{
        CommunicationChannel, Connection, ConnectionState, HandshakeOutcome, ProtocolError,
        SetupConfig, TriggerCode, ValidationError,
    };
    pub use crate::simulator::{SimulatedDevice, SimulatedDeviceConfig};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
