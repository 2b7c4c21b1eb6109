//! Device configuration
//!
//! Typed settings for one MarkStim device. Stored as JSON when persisted by
//! the caller; every field has a default so partial files are accepted.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::{
    default_port_name, HandshakeParams, DEFAULT_BAUD_RATE, DEFAULT_HANDSHAKE_TIMEOUT_MS,
    DEFAULT_PROBE_SYMBOL, DEFAULT_RESET_SETTLE_MS, DEFAULT_RESET_SYMBOL, DEFAULT_SETTLE_DELAY_MS,
    READY_RESPONSES,
};

/// Errors raised while loading a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading the file failed
    #[error("Failed to read config: {0}")]
    Io(#[from] io::Error),

    /// The file is not valid JSON for [`DeviceConfig`]
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of its allowed range
    #[error("Invalid config: {0}")]
    Invalid(String),
}

fn default_device_name() -> String {
    "MarkStim".to_string()
}

fn default_accepted_responses() -> Vec<String> {
    READY_RESPONSES.iter().map(|s| s.to_string()).collect()
}

/// Connection and protocol settings for a MarkStim device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Name used in log lines and error messages
    pub device_name: String,
    /// Serial port name (e.g. "/dev/ttyACM0" or "COM5")
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout in milliseconds, `None` blocks indefinitely
    pub read_timeout_ms: Option<u64>,
    /// Write timeout in milliseconds, `None` blocks indefinitely
    pub write_timeout_ms: Option<u64>,
    /// Handshake window in milliseconds, measured after the settle delay
    pub handshake_timeout_ms: u64,
    /// Wait before the first probe, in milliseconds
    pub settle_delay_ms: u64,
    /// Wait between the reset symbol and closing the port, in milliseconds
    pub reset_settle_ms: u64,
    /// Handshake probe symbol
    pub probe_symbol: char,
    /// Software reset symbol
    pub reset_symbol: char,
    /// Ready lines that complete the handshake (line terminators excluded)
    pub accepted_responses: Vec<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            port_name: default_port_name().to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: None,
            write_timeout_ms: None,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            reset_settle_ms: DEFAULT_RESET_SETTLE_MS,
            probe_symbol: DEFAULT_PROBE_SYMBOL as char,
            reset_symbol: DEFAULT_RESET_SYMBOL as char,
            accepted_responses: default_accepted_responses(),
        }
    }
}

impl DeviceConfig {
    /// Default configuration for the given port
    pub fn for_port(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON document and validate it
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: DeviceConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Serialize to pretty JSON
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check value ranges the device protocol relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be non-zero".into()));
        }
        if self.port_name.is_empty() {
            return Err(ConfigError::Invalid("port_name must not be empty".into()));
        }
        symbol_byte("probe_symbol", self.probe_symbol)?;
        symbol_byte("reset_symbol", self.reset_symbol)?;
        if self.accepted_responses.is_empty() {
            return Err(ConfigError::Invalid(
                "accepted_responses must list at least one ready line".into(),
            ));
        }
        Ok(())
    }

    /// Read timeout, `None` meaning block indefinitely
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    /// Write timeout, `None` meaning block indefinitely
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    /// Handshake window
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Wait before the first handshake probe
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Wait between the reset symbol and closing the port
    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms)
    }

    /// Probe symbol as the raw byte put on the wire
    pub fn probe_byte(&self) -> Result<u8, ConfigError> {
        symbol_byte("probe_symbol", self.probe_symbol)
    }

    /// Reset symbol as the raw byte put on the wire
    pub fn reset_byte(&self) -> Result<u8, ConfigError> {
        symbol_byte("reset_symbol", self.reset_symbol)
    }

    /// Handshake parameters derived from this config
    pub fn handshake_params(&self) -> Result<HandshakeParams, ConfigError> {
        Ok(HandshakeParams {
            device_name: self.device_name.clone(),
            timeout: self.handshake_timeout(),
            settle_delay: self.settle_delay(),
            probe_symbol: self.probe_byte()?,
            accepted_responses: self.accepted_responses.clone(),
        })
    }
}

/// Symbols go out as a single latin-1 byte
fn symbol_byte(field: &str, symbol: char) -> Result<u8, ConfigError> {
    u8::try_from(u32::from(symbol)).map_err(|_| {
        ConfigError::Invalid(format!(
            "{field} {symbol:?} does not encode to a single byte"
        ))
    })
}
