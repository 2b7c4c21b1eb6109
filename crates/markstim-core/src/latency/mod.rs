//! Serial latency probe
//!
//! Measures raw round-trip timing of the channel, bypassing the protocol
//! framing. The host writes one probe byte, waits for the firmware to echo
//! a byte back, and repeats. Write and read durations are recorded per
//! trial.

mod report;

pub use report::{LatencyReport, Statistics};

use chrono::Utc;
use std::io;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::config::DeviceConfig;
use crate::protocol::{open_channel, CommunicationChannel, ProtocolError};

/// Default number of round trips
pub const DEFAULT_TRIALS: usize = 1000;

/// Byte written on every trial
pub const DEFAULT_PROBE_BYTE: u8 = b'.';

/// Where the probe is within a trial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeState {
    /// Next step writes the probe byte
    Writing,
    /// Waiting for the echo; `since` is when the wait started
    Reading { since: Duration },
}

/// Round-trip latency measurement over a raw channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyProbe {
    trials: usize,
    probe_byte: u8,
}

impl Default for LatencyProbe {
    fn default() -> Self {
        Self::new(DEFAULT_TRIALS)
    }
}

impl LatencyProbe {
    /// Probe with `trials` round trips
    pub fn new(trials: usize) -> Self {
        Self {
            trials,
            probe_byte: DEFAULT_PROBE_BYTE,
        }
    }

    /// Use a different probe byte
    pub fn with_probe_byte(mut self, probe_byte: u8) -> Self {
        self.probe_byte = probe_byte;
        self
    }

    /// Number of round trips per run
    pub fn trials(&self) -> usize {
        self.trials
    }

    /// Run the write/read cycle until `trials` round trips completed.
    ///
    /// A read that returns no data (zero bytes, or a timeout on a channel
    /// configured with a short read timeout) leaves the probe waiting for
    /// the same echo. Any other I/O error aborts the run.
    ///
    /// The first round trip includes whatever time the board still needs to
    /// become ready for serial communication.
    pub fn run(
        &self,
        channel: &mut dyn CommunicationChannel,
        clock: &dyn Clock,
    ) -> Result<LatencyReport, ProtocolError> {
        if self.trials == 0 {
            return Err(ProtocolError::InvalidConfig(
                "latency probe needs at least one trial".into(),
            ));
        }

        let started_at = Utc::now();
        let mut write_samples = Vec::with_capacity(self.trials);
        let mut read_samples = Vec::with_capacity(self.trials);
        let probe = [self.probe_byte];
        let mut echo = [0u8; 1];
        let mut state = ProbeState::Writing;
        let mut trial = 1;
        let t0 = clock.now();

        while trial <= self.trials {
            state = match state {
                ProbeState::Writing => {
                    let start = clock.now();
                    channel.write_all(&probe)?;
                    write_samples.push(clock.since(start));
                    ProbeState::Reading { since: clock.now() }
                }
                ProbeState::Reading { since } => match channel.read(&mut echo) {
                    Ok(0) => state,
                    Ok(_) => {
                        let elapsed = clock.since(since);
                        read_samples.push(elapsed);
                        tracing::trace!(
                            trial,
                            echo = echo[0],
                            read_us = elapsed.as_micros() as u64,
                            "latency: round trip complete"
                        );
                        trial += 1;
                        ProbeState::Writing
                    }
                    Err(ref e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::TimedOut
                                | io::ErrorKind::WouldBlock
                                | io::ErrorKind::Interrupted
                        ) =>
                    {
                        state
                    }
                    Err(e) => return Err(e.into()),
                },
            };
        }

        let total = clock.since(t0);
        tracing::info!(
            trials = self.trials,
            "{} trials experiment took {:.6} sec",
            self.trials,
            total.as_secs_f64()
        );

        Ok(LatencyReport {
            started_at,
            probe_byte: self.probe_byte,
            read_samples,
            write_samples,
            total,
        })
    }

    /// Open the port in `config`, run the probe on wall-clock time, then
    /// close the port
    pub fn run_on_port(&self, config: &DeviceConfig) -> Result<LatencyReport, ProtocolError> {
        let mut channel = open_channel(config)?;
        let result = self.run(channel.as_mut(), &SystemClock::new());
        if let Err(e) = channel.close() {
            tracing::debug!(error = %e, "latency: ignoring failure on close");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::simulator::{SimulatedDevice, SimulatedDeviceConfig};

    #[test]
    fn test_zero_trials_rejected() {
        let clock = ManualClock::new();
        let mut device = SimulatedDevice::new(clock.clone(), SimulatedDeviceConfig::default());
        let err = LatencyProbe::new(0).run(&mut device, &clock).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidConfig(_)));
        assert!(device.log().written.is_empty());
    }

    #[test]
    fn test_single_trial_blocking() {
        let clock = ManualClock::new();
        let mut device = SimulatedDevice::new(
            clock.clone(),
            SimulatedDeviceConfig {
                blocking_reads: true,
                ..SimulatedDeviceConfig::echo(Duration::from_millis(4))
            },
        );
        let report = LatencyProbe::new(1).run(&mut device, &clock).unwrap();
        assert_eq!(report.read_samples, vec![Duration::from_millis(4)]);
        assert_eq!(report.write_samples, vec![Duration::ZERO]);
        assert_eq!(report.total, Duration::from_millis(4));
        assert_eq!(device.log().written, b".".to_vec());
    }

    #[test]
    fn test_write_cost_lands_in_write_samples() {
        let clock = ManualClock::new();
        let mut device = SimulatedDevice::new(
            clock.clone(),
            SimulatedDeviceConfig {
                blocking_reads: true,
                write_cost: Duration::from_micros(174),
                ..SimulatedDeviceConfig::echo(Duration::from_millis(1))
            },
        );
        let report = LatencyProbe::new(3).run(&mut device, &clock).unwrap();
        assert!(report
            .write_samples
            .iter()
            .all(|&w| w == Duration::from_micros(174)));
        assert!(report
            .read_samples
            .iter()
            .all(|&r| r == Duration::from_millis(1)));
    }

    #[test]
    fn test_custom_probe_byte_is_sent() {
        let clock = ManualClock::new();
        let mut device = SimulatedDevice::new(
            clock.clone(),
            SimulatedDeviceConfig {
                echo_symbol: Some(b'x'),
                blocking_reads: true,
                ..SimulatedDeviceConfig::echo(Duration::from_millis(1))
            },
        );
        let report = LatencyProbe::new(2)
            .with_probe_byte(b'x')
            .run(&mut device, &clock)
            .unwrap();
        assert_eq!(report.probe_byte, b'x');
        assert_eq!(device.log().written, b"xx".to_vec());
    }

    #[test]
    fn test_hard_read_error_aborts() {
        let clock = ManualClock::new();
        let mut device = SimulatedDevice::new(clock.clone(), SimulatedDeviceConfig::default());
        device.close().unwrap();
        let err = LatencyProbe::new(5).run(&mut device, &clock).unwrap_err();
        assert!(matches!(err, ProtocolError::Io(_)));
    }
}
