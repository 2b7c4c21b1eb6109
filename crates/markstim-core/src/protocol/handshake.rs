//! Handshake and reset protocols
//!
//! Both work on any [`CommunicationChannel`] and take their time source as a
//! [`Clock`], so they can be driven by a simulated device in virtual time.

use std::io;
use std::time::Duration;

use super::{
    CommunicationChannel, ProtocolError, DEFAULT_HANDSHAKE_TIMEOUT_MS, DEFAULT_PROBE_SYMBOL,
    DEFAULT_SETTLE_DELAY_MS, READY_RESPONSES,
};
use crate::clock::Clock;

/// Inputs of the handshake loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeParams {
    /// Name used in log lines and in the timeout error
    pub device_name: String,
    /// Wall-clock window for a ready line, counted after the settle delay
    pub timeout: Duration,
    /// Wait before the first probe so the board can finish booting
    pub settle_delay: Duration,
    /// Byte written on every poll iteration
    pub probe_symbol: u8,
    /// Ready lines that complete the handshake, without line terminators
    pub accepted_responses: Vec<String>,
}

impl Default for HandshakeParams {
    fn default() -> Self {
        Self {
            device_name: "MarkStim".to_string(),
            timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            probe_symbol: DEFAULT_PROBE_SYMBOL,
            accepted_responses: READY_RESPONSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl HandshakeParams {
    /// Whether a received line (terminators already stripped) is a ready line
    pub fn accepts(&self, line: &str) -> bool {
        self.accepted_responses.iter().any(|r| r == line)
    }
}

/// Successful handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    /// Time from the first probe to the matching ready line
    pub elapsed: Duration,
    /// The ready line the device sent, without line terminators
    pub response: String,
    /// Probe symbols written, one per poll iteration
    pub probes: u64,
    /// Bytes read off the channel, terminators and ignored lines included
    pub bytes_read: u64,
}

/// Probe the device until it answers with a ready line.
///
/// Flushes both buffers, sleeps `settle_delay`, then writes the probe symbol
/// in a tight loop. Whenever bytes are waiting one line is read and compared
/// against the accepted set. The deadline is checked on every iteration that
/// does not end in a match, including iterations that read a line that was
/// not accepted, so a chatty device cannot keep the loop alive forever.
///
/// The loop busy-polls on purpose: detection latency matters more than CPU
/// time during the few milliseconds it runs. Individual reads and writes
/// still block according to the channel's own timeout.
pub fn handshake(
    channel: &mut dyn CommunicationChannel,
    clock: &dyn Clock,
    params: &HandshakeParams,
) -> Result<HandshakeOutcome, ProtocolError> {
    channel.clear_input_buffer()?;
    channel.clear_output_buffer()?;
    clock.sleep(params.settle_delay);

    let probe = [params.probe_symbol];
    let t0 = clock.now();
    let mut probes: u64 = 0;
    let mut bytes_read: u64 = 0;

    loop {
        channel.write_all(&probe)?;
        probes += 1;

        if channel.bytes_to_read()? > 0 {
            let raw = channel.read_line()?;
            bytes_read += raw.len() as u64;
            let decoded = String::from_utf8_lossy(&raw);
            let line = decoded.trim_end_matches(['\r', '\n']);
            if params.accepts(line) {
                let elapsed = clock.since(t0);
                tracing::info!(
                    device = %params.device_name,
                    response = line,
                    probes,
                    "Establishing serial communication with {} took {:.4} sec",
                    params.device_name,
                    elapsed.as_secs_f64()
                );
                return Ok(HandshakeOutcome {
                    elapsed,
                    response: line.to_string(),
                    probes,
                    bytes_read,
                });
            }
            tracing::debug!(line = %decoded.escape_debug(), "handshake: ignoring unexpected line");
        }

        let elapsed = clock.since(t0);
        if elapsed > params.timeout {
            tracing::debug!(probes, "handshake: no ready line within window");
            return Err(ProtocolError::HandshakeTimeout {
                device: params.device_name.clone(),
                timeout: params.timeout,
                elapsed,
                probes,
                expected: params.accepted_responses.clone(),
            });
        }
    }
}

/// Send the software reset symbol and close the channel.
///
/// Best-effort: every failure is logged and dropped. Returns whether the
/// symbol was written; no error is surfaced because this runs during
/// teardown, where it would mask the failure that triggered the teardown.
/// The channel is closed even when an earlier step failed. The settle delay after the write is only taken if
/// the write went through; closing immediately after the write can truncate
/// it on some drivers.
pub fn reset(
    channel: &mut dyn CommunicationChannel,
    clock: &dyn Clock,
    reset_symbol: u8,
    settle: Duration,
) -> bool {
    if !channel.is_open() {
        tracing::debug!("reset: channel already closed");
        return false;
    }

    let sent = (|| -> io::Result<()> {
        channel.clear_input_buffer()?;
        channel.clear_output_buffer()?;
        channel.write_all(&[reset_symbol])
    })();

    let written = match sent {
        Ok(()) => {
            clock.sleep(settle);
            true
        }
        Err(e) => {
            tracing::debug!(error = %e, "reset: ignoring failure before close");
            false
        }
    };

    if let Err(e) = channel.close() {
        tracing::debug!(error = %e, "reset: ignoring failure on close");
    }
    written
}
