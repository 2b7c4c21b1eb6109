//! Serial Protocol Communication
//!
//! Implements the MarkStim serial protocol: a probe/ready-line handshake,
//! ASCII-framed setup, three-byte trigger frames and a one-byte reset.

pub mod channel;
pub mod commands;
mod connection;
mod error;
pub mod handshake;
pub mod serial;

pub use channel::{CommunicationChannel, SerialChannel};
pub use commands::{SetupConfig, TriggerCode};
pub use connection::{Connection, ConnectionState};
pub use error::{ProtocolError, ValidationError};
pub use handshake::{handshake, reset, HandshakeOutcome, HandshakeParams};
pub use serial::{configure_port, default_port_name, open_channel, open_port};

/// Default baud rate for device communication
pub const DEFAULT_BAUD_RATE: u32 = 57600;

/// Default handshake window in milliseconds
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 50;

/// Delay before probing so the board can finish its boot/reset sequence
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2000;

/// Delay between writing the reset symbol and closing the port.
/// Closing right after the write can drop the byte on some drivers.
pub const DEFAULT_RESET_SETTLE_MS: u64 = 100;

/// Default handshake probe symbol
pub const DEFAULT_PROBE_SYMBOL: u8 = b'!';

/// Default software reset symbol
pub const DEFAULT_RESET_SYMBOL: u8 = b'`';

/// Ready lines the firmware sends back once it accepts the probe
pub const READY_RESPONSES: [&str; 4] = [
    "Teensy ready",
    "Arduino ready",
    "Serial input device ready",
    "Serial output device ready",
];
