//! Protocol commands
//!
//! Frame encodings for the messages the host sends to the device.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

/// Opening byte of a trigger frame
pub const TRIGGER_FRAME_START: u8 = b'[';
/// Closing byte of a trigger frame
pub const TRIGGER_FRAME_END: u8 = b']';
/// Opening byte of a setup message
pub const SETUP_FRAME_START: u8 = b'<';
/// Closing byte of a setup message
pub const SETUP_FRAME_END: u8 = b'>';

/// Event marker sent with a trigger, always in 0..=255
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TriggerCode(u8);

impl TriggerCode {
    /// Validate an integer trigger code
    pub fn new(code: i64) -> Result<Self, ValidationError> {
        u8::try_from(code)
            .map(Self)
            .map_err(|_| ValidationError::OutOfRange { code })
    }

    /// Raw code byte
    pub fn value(self) -> u8 {
        self.0
    }

    /// Three-byte frame `[`, code, `]`
    pub fn frame(self) -> [u8; 3] {
        [TRIGGER_FRAME_START, self.0, TRIGGER_FRAME_END]
    }
}

impl From<u8> for TriggerCode {
    fn from(code: u8) -> Self {
        Self(code)
    }
}

impl TryFrom<i64> for TriggerCode {
    type Error = ValidationError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Self::new(code)
    }
}

impl TryFrom<i32> for TriggerCode {
    type Error = ValidationError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::new(i64::from(code))
    }
}

impl fmt::Display for TriggerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// TTL output settings sent with a setup message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupConfig {
    /// Emit a TTL pulse on trigger
    pub ttl_enabled: bool,
    /// TTL pulse width in microseconds
    pub pulse_width_us: u32,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            ttl_enabled: true,
            pulse_width_us: 1000,
        }
    }
}

impl SetupConfig {
    /// Create a setup message
    pub fn new(ttl_enabled: bool, pulse_width_us: u32) -> Self {
        Self {
            ttl_enabled,
            pulse_width_us,
        }
    }

    /// ASCII frame `<{0|1},{pulse_width}>`
    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "{}{},{}{}",
            SETUP_FRAME_START as char,
            u8::from(self.ttl_enabled),
            self.pulse_width_us,
            SETUP_FRAME_END as char
        )
        .into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_trigger_code_bounds() {
        assert_eq!(TriggerCode::new(0).unwrap().value(), 0);
        assert_eq!(TriggerCode::new(255).unwrap().value(), 255);
        assert_eq!(
            TriggerCode::new(256),
            Err(ValidationError::OutOfRange { code: 256 })
        );
        assert_eq!(
            TriggerCode::new(-1),
            Err(ValidationError::OutOfRange { code: -1 })
        );
        assert!(TriggerCode::try_from(i32::MIN).is_err());
        assert!(TriggerCode::try_from(i64::MAX).is_err());
    }

    #[test]
    fn test_trigger_frame() {
        assert_eq!(TriggerCode::from(255).frame(), [b'[', 0xFF, b']']);
        assert_eq!(TriggerCode::from(b']').frame(), [b'[', b']', b']']);
    }

    #[test]
    fn test_setup_frame() {
        assert_eq!(SetupConfig::new(true, 1000).to_bytes(), b"<1,1000>".to_vec());
        assert_eq!(SetupConfig::new(false, 0).to_bytes(), b"<0,0>".to_vec());
        assert_eq!(
            SetupConfig::new(true, u32::MAX).to_bytes(),
            b"<1,4294967295>".to_vec()
        );
        assert_eq!(SetupConfig::default(), SetupConfig::new(true, 1000));
    }
}
