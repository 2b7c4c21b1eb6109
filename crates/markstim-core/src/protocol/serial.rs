//! Serial port handling
//!
//! Provides low-level serial port access for device communication.

use serialport::SerialPort;
use std::time::Duration;

use super::{CommunicationChannel, ProtocolError, SerialChannel};
use crate::config::DeviceConfig;

/// Timeout handed to the driver when the config asks to block indefinitely.
/// serialport has no "no timeout" setting.
pub const INDEFINITE_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24);

/// Port the device usually enumerates as on this platform
pub fn default_port_name() -> &'static str {
    if cfg!(target_os = "macos") {
        "/dev/tty.usbmodem12341"
    } else if cfg!(target_os = "windows") {
        "COM5"
    } else {
        "/dev/ttyACM0"
    }
}

/// Driver timeout for a config.
///
/// serialport applies one timeout to both directions, so the shorter of the
/// two configured timeouts wins.
pub fn port_timeout(config: &DeviceConfig) -> Duration {
    match (config.read_timeout(), config.write_timeout()) {
        (Some(r), Some(w)) => r.min(w),
        (Some(t), None) | (None, Some(t)) => t,
        (None, None) => INDEFINITE_TIMEOUT,
    }
}

/// Open a serial port with the configured baud rate and timeout
pub fn open_port(config: &DeviceConfig) -> Result<Box<dyn SerialPort>, ProtocolError> {
    let timeout = port_timeout(config);
    tracing::debug!(
        port = %config.port_name,
        baud = config.baud_rate,
        timeout_ms = timeout.as_millis() as u64,
        "opening serial port"
    );
    serialport::new(&config.port_name, config.baud_rate)
        .timeout(timeout)
        .open()
        .map_err(|e| {
            ProtocolError::SerialError(format!("failed to open '{}': {}", config.port_name, e))
        })
}

/// Configure a serial port for device communication
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    // Standard 8N1 configuration
    port.set_data_bits(serialport::DataBits::Eight)?;
    port.set_parity(serialport::Parity::None)?;
    port.set_stop_bits(serialport::StopBits::One)?;
    port.set_flow_control(serialport::FlowControl::None)?;
    Ok(())
}

/// Open, configure and wrap the port named in `config`
pub fn open_channel(config: &DeviceConfig) -> Result<Box<dyn CommunicationChannel>, ProtocolError> {
    config
        .validate()
        .map_err(|e| ProtocolError::InvalidConfig(e.to_string()))?;
    let mut port = open_port(config)?;
    configure_port(port.as_mut())?;
    Ok(Box::new(SerialChannel::new(port)))
}
