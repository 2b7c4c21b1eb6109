//! Connection management
//!
//! Owns the channel to one device and exposes the protocol operations in
//! the order an experiment uses them: handshake, optional setup, any number
//! of triggers, reset.

use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::sync::Arc;

use super::{
    handshake::{self, HandshakeOutcome},
    open_channel, CommunicationChannel, ProtocolError, SetupConfig, TriggerCode,
};
use crate::clock::{Clock, SystemClock};
use crate::config::DeviceConfig;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Channel released (after reset/disconnect) or never attached
    Disconnected,
    /// Channel attached, handshake not completed yet
    Connecting,
    /// Handshake completed, setup and triggers may be sent
    Ready,
    /// Handshake failed
    Error,
}

/// Channel view that adds every byte actually moved to the connection's
/// tx/rx counters. Reads issued by [`CommunicationChannel::read_line`] go
/// through [`Read::read`] and are counted too.
struct Metered<'a> {
    inner: &'a mut dyn CommunicationChannel,
    tx_bytes: &'a mut u64,
    rx_bytes: &'a mut u64,
}

impl Read for Metered<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        *self.rx_bytes = self.rx_bytes.saturating_add(n as u64);
        Ok(n)
    }
}

impl Write for Metered<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        *self.tx_bytes = self.tx_bytes.saturating_add(n as u64);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl CommunicationChannel for Metered<'_> {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.inner.bytes_to_read()
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.inner.clear_input_buffer()
    }

    fn clear_output_buffer(&mut self) -> io::Result<()> {
        self.inner.clear_output_buffer()
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner.close()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

/// A MarkStim device connection.
///
/// The connection exclusively owns its channel. [`Connection::handshake`]
/// must succeed before [`Connection::setup`] and [`Connection::trigger`] are
/// meaningful to the device; calling them earlier is not refused, only
/// logged, since the bytes are still well-formed.
pub struct Connection {
    /// Channel handle, `None` once released
    channel: Option<Box<dyn CommunicationChannel>>,
    /// Current connection state
    state: ConnectionState,
    /// Connection configuration
    config: DeviceConfig,
    /// Time source for the handshake and the reset settle delay
    clock: Arc<dyn Clock>,
    /// Result of the last successful handshake
    handshake: Option<HandshakeOutcome>,
    /// Cumulative bytes sent / received
    tx_bytes: u64,
    rx_bytes: u64,
}

impl Connection {
    /// Open the serial port named in `config`
    pub fn open(config: DeviceConfig) -> Result<Self, ProtocolError> {
        let channel = open_channel(&config)?;
        Ok(Self::with_channel(
            config,
            channel,
            Arc::new(SystemClock::new()),
        ))
    }

    /// Attach an already opened channel
    pub fn with_channel(
        config: DeviceConfig,
        channel: Box<dyn CommunicationChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            channel: Some(channel),
            state: ConnectionState::Connecting,
            config,
            clock,
            handshake: None,
            tx_bytes: 0,
            rx_bytes: 0,
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connection configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Result of the last successful handshake
    pub fn handshake_outcome(&self) -> Option<&HandshakeOutcome> {
        self.handshake.as_ref()
    }

    /// Whether the channel is still held
    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Get cumulative tx/rx byte counters
    pub fn counters(&self) -> (u64, u64) {
        (self.tx_bytes, self.rx_bytes)
    }

    fn channel(&mut self) -> Result<Metered<'_>, ProtocolError> {
        let inner = self
            .channel
            .as_deref_mut()
            .ok_or(ProtocolError::NotConnected)?;
        Ok(Metered {
            inner,
            tx_bytes: &mut self.tx_bytes,
            rx_bytes: &mut self.rx_bytes,
        })
    }

    fn warn_if_not_ready(&self, op: &str) {
        if self.state != ConnectionState::Ready {
            tracing::warn!(
                device = %self.config.device_name,
                state = ?self.state,
                "{} issued before a successful handshake",
                op
            );
        }
    }

    /// Probe the device until it reports ready.
    ///
    /// Fails with [`ProtocolError::HandshakeTimeout`] when no accepted ready
    /// line arrives within the configured window; the experiment should not
    /// go on in that case.
    pub fn handshake(&mut self) -> Result<HandshakeOutcome, ProtocolError> {
        let params = self
            .config
            .handshake_params()
            .map_err(|e| ProtocolError::InvalidConfig(e.to_string()))?;
        let clock = Arc::clone(&self.clock);
        let mut channel = self.channel()?;

        match handshake::handshake(&mut channel, clock.as_ref(), &params) {
            Ok(outcome) => {
                self.state = ConnectionState::Ready;
                self.handshake = Some(outcome.clone());
                Ok(outcome)
            }
            Err(e) => {
                self.state = ConnectionState::Error;
                Err(e)
            }
        }
    }

    /// Send TTL settings. The device does not acknowledge them.
    pub fn setup(&mut self, setup: SetupConfig) -> Result<(), ProtocolError> {
        self.warn_if_not_ready("setup");
        let bytes = setup.to_bytes();
        tracing::debug!(frame = %String::from_utf8_lossy(&bytes), "setup");
        self.channel()?.write_all(&bytes)?;
        Ok(())
    }

    /// Send a trigger code in 0..=255.
    ///
    /// Out-of-range codes fail with [`ProtocolError::Validation`] before any
    /// byte is written.
    pub fn trigger(&mut self, code: i64) -> Result<(), ProtocolError> {
        let code = TriggerCode::new(code)?;
        self.send_trigger(code)
    }

    /// Send an already validated trigger code.
    ///
    /// The frame goes straight to the channel in one write with no flush or
    /// read-back; this is the timing-critical path.
    pub fn send_trigger(&mut self, code: TriggerCode) -> Result<(), ProtocolError> {
        let frame = code.frame();
        self.channel()?.write_all(&frame)?;
        self.warn_if_not_ready("trigger");
        tracing::trace!(code = code.value(), "trigger");
        Ok(())
    }

    /// Return the device to idle and release the channel.
    ///
    /// Best-effort: never fails, and is a no-op once the channel has been
    /// released.
    pub fn reset(&mut self) {
        let Some(mut channel) = self.channel.take() else {
            tracing::debug!("reset: already released");
            return;
        };
        let symbol = match self.config.reset_byte() {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!(error = %e, "reset: falling back to default symbol");
                super::DEFAULT_RESET_SYMBOL
            }
        };
        let mut metered = Metered {
            inner: channel.as_mut(),
            tx_bytes: &mut self.tx_bytes,
            rx_bytes: &mut self.rx_bytes,
        };
        let sent = handshake::reset(
            &mut metered,
            self.clock.as_ref(),
            symbol,
            self.config.reset_settle(),
        );
        tracing::debug!(sent, "reset: channel released");
        self.state = ConnectionState::Disconnected;
        self.handshake = None;
    }

    /// Release the channel without resetting the device
    pub fn disconnect(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close() {
                tracing::debug!(error = %e, "disconnect: ignoring failure on close");
            }
        }
        self.state = ConnectionState::Disconnected;
        self.handshake = None;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}
