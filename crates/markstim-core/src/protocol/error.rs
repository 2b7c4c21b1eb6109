//! Protocol errors

use std::time::Duration;
use thiserror::Error;

/// Caller input rejected before anything touches the channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Trigger code does not fit in one byte
    #[error("trigger() accepts integers ranging from 0 to 255, got {code}")]
    OutOfRange {
        /// The rejected value
        code: i64,
    },
}

/// Errors that can occur during device communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Out-of-range trigger code or similar caller error
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No accepted ready line arrived within the handshake window
    #[error(
        "Failed establishing serial communication with {device} (took longer than {:.2} sec)",
        .timeout.as_secs_f64()
    )]
    HandshakeTimeout {
        /// Device name used in the message
        device: String,
        /// Configured handshake timeout
        timeout: Duration,
        /// Time spent probing before giving up
        elapsed: Duration,
        /// Probe symbols written before giving up
        probes: u64,
        /// Ready lines that would have been accepted
        expected: Vec<String>,
    },

    /// Opening or configuring the serial port failed
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// The channel has already been released
    #[error("Not connected to device")]
    NotConnected,

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Read/write/flush/close failure on the channel
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// True for errors raised before any I/O because of bad caller input
    pub fn is_validation(&self) -> bool {
        matches!(self, ProtocolError::Validation(_))
    }

    /// True when the handshake window elapsed without a ready line
    pub fn is_handshake_timeout(&self) -> bool {
        matches!(self, ProtocolError::HandshakeTimeout { .. })
    }
}

impl From<serialport::Error> for ProtocolError {
    fn from(e: serialport::Error) -> Self {
        ProtocolError::SerialError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_timeout_message_names_device_and_timeout() {
        let err = ProtocolError::HandshakeTimeout {
            device: "MarkStim".to_string(),
            timeout: Duration::from_millis(50),
            elapsed: Duration::from_millis(51),
            probes: 2550,
            expected: vec!["Teensy ready".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Failed establishing serial communication with MarkStim (took longer than 0.05 sec)"
        );
        assert!(err.is_handshake_timeout());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_validation_error_is_distinct_from_io() {
        let err: ProtocolError = ValidationError::OutOfRange { code: 256 }.into();
        assert!(err.is_validation());
        assert!(err.to_string().contains("256"));

        let io: ProtocolError = std::io::Error::other("boom").into();
        assert!(!io.is_validation());
        assert!(matches!(io, ProtocolError::Io(_)));
    }
}
