//! Simulated device
//!
//! A [`CommunicationChannel`] that behaves like a board running the MarkStim
//! firmware, on a [`ManualClock`] timeline. Lets the protocol and the
//! latency probe run without hardware and with deterministic timing.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::clock::{Clock, ManualClock};
use crate::protocol::{CommunicationChannel, DEFAULT_PROBE_SYMBOL};

/// Byte the latency benchmark firmware echoes back
pub const ECHO_SYMBOL: u8 = b'.';

/// Behavior of a [`SimulatedDevice`]
#[derive(Debug, Clone)]
pub struct SimulatedDeviceConfig {
    /// Virtual time from which handshake probes are answered, `None` never answers
    pub ready_at: Option<Duration>,
    /// Line sent in answer to a handshake probe
    pub ready_line: Vec<u8>,
    /// Answer every probe instead of only the first one after `ready_at`
    pub answer_every_probe: bool,
    /// Byte treated as a handshake probe
    pub handshake_symbol: u8,
    /// Delay before an answer line becomes readable
    pub response_delay: Duration,
    /// Byte echoed back for the latency probe, `None` disables the echo
    pub echo_symbol: Option<u8>,
    /// Round-trip delay of the echo
    pub echo_delay: Duration,
    /// Upper bound of uniformly distributed extra echo delay
    pub echo_jitter: Duration,
    /// Seed for the jitter generator
    pub seed: u64,
    /// Virtual time consumed per written byte
    pub write_cost: Duration,
    /// Virtual time consumed per `bytes_to_read` call or empty read
    pub poll_cost: Duration,
    /// Reads wait for the next pending byte instead of returning empty
    pub blocking_reads: bool,
}

impl Default for SimulatedDeviceConfig {
    fn default() -> Self {
        Self {
            ready_at: Some(Duration::ZERO),
            ready_line: b"Teensy ready\r\n".to_vec(),
            answer_every_probe: false,
            handshake_symbol: DEFAULT_PROBE_SYMBOL,
            response_delay: Duration::ZERO,
            echo_symbol: Some(ECHO_SYMBOL),
            echo_delay: Duration::from_millis(4),
            echo_jitter: Duration::ZERO,
            seed: 0,
            write_cost: Duration::ZERO,
            poll_cost: Duration::from_micros(20),
            blocking_reads: false,
        }
    }
}

impl SimulatedDeviceConfig {
    /// A device that never answers the handshake
    pub fn silent() -> Self {
        Self {
            ready_at: None,
            ..Self::default()
        }
    }

    /// An echo-only device with a fixed round trip, for the latency probe
    pub fn echo(delay: Duration) -> Self {
        Self {
            ready_at: None,
            echo_delay: delay,
            ..Self::default()
        }
    }
}

/// What the host did to the simulated device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceLog {
    /// Every byte written, in order
    pub written: Vec<u8>,
    /// Number of `close` calls that actually closed the channel
    pub closes: u32,
    /// Number of input buffer clears
    pub input_clears: u32,
    /// Number of output buffer clears
    pub output_clears: u32,
}

#[derive(Debug, Default)]
struct Shared {
    log: DeviceLog,
    fail_writes: bool,
    fail_reads: bool,
}

/// Handle for observing a [`SimulatedDevice`] after it has been moved
#[derive(Debug, Clone, Default)]
pub struct DeviceMonitor {
    shared: Arc<Mutex<Shared>>,
}

impl DeviceMonitor {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the device log
    pub fn log(&self) -> DeviceLog {
        self.lock().log.clone()
    }

    /// Forget the bytes written so far
    pub fn clear_written(&self) {
        self.lock().log.written.clear();
    }

    /// Make every following write fail with a broken pipe
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Make every following read fail with a broken pipe
    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }
}

/// In-memory stand-in for the MarkStim board
pub struct SimulatedDevice {
    clock: ManualClock,
    config: SimulatedDeviceConfig,
    /// Pending bytes with the virtual time they become readable
    rx: VecDeque<(Duration, u8)>,
    answered: bool,
    open: bool,
    rng: StdRng,
    monitor: DeviceMonitor,
}

impl SimulatedDevice {
    /// Create a device on the given timeline
    pub fn new(clock: ManualClock, config: SimulatedDeviceConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            clock,
            config,
            rx: VecDeque::new(),
            answered: false,
            open: true,
            rng,
            monitor: DeviceMonitor::default(),
        }
    }

    /// Handle that stays valid after the device is boxed into a connection
    pub fn monitor(&self) -> DeviceMonitor {
        self.monitor.clone()
    }

    /// Snapshot of the device log
    pub fn log(&self) -> DeviceLog {
        self.monitor.log()
    }

    /// Make every following write fail
    pub fn fail_writes(&mut self, fail: bool) {
        self.monitor.fail_writes(fail);
    }

    /// Make every following read fail
    pub fn fail_reads(&mut self, fail: bool) {
        self.monitor.fail_reads(fail);
    }

    fn check_open(&self) -> io::Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "simulated device is closed",
            ))
        }
    }

    fn due_count(&self) -> usize {
        let now = self.clock.now();
        self.rx.iter().take_while(|(due, _)| *due <= now).count()
    }

    fn is_ready(&self) -> bool {
        match self.config.ready_at {
            Some(at) => self.clock.now() >= at,
            None => false,
        }
    }

    /// Firmware reaction to one received byte
    fn receive(&mut self, byte: u8) {
        let now = self.clock.now();
        if byte == self.config.handshake_symbol
            && self.is_ready()
            && (self.config.answer_every_probe || !self.answered)
        {
            self.answered = true;
            let due = now + self.config.response_delay;
            self.rx
                .extend(self.config.ready_line.iter().map(|&b| (due, b)));
        }
        if self.config.echo_symbol == Some(byte) {
            let mut delay = self.config.echo_delay;
            if !self.config.echo_jitter.is_zero() {
                let max = self.config.echo_jitter.as_nanos() as u64;
                delay += Duration::from_nanos(self.rng.gen_range(0..=max));
            }
            self.rx.push_back((now + delay, byte));
        }
    }
}

impl Read for SimulatedDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_open()?;
        if self.monitor.lock().fail_reads {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated read failure",
            ));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        if self.due_count() == 0 {
            let next_due = self.rx.iter().map(|(due, _)| *due).min();
            match (self.config.blocking_reads, next_due) {
                (true, Some(due)) => self.clock.advance_to(due),
                (true, None) => {
                    self.clock.advance(self.config.poll_cost);
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "simulated read timed out",
                    ));
                }
                (false, _) => {
                    self.clock.advance(self.config.poll_cost);
                    return Ok(0);
                }
            }
        }

        let now = self.clock.now();
        let mut n = 0;
        while n < buf.len() {
            match self.rx.front() {
                Some(&(due, byte)) if due <= now => {
                    buf[n] = byte;
                    self.rx.pop_front();
                    n += 1;
                }
                _ => break,
            }
        }
        Ok(n)
    }
}

impl Write for SimulatedDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_open()?;
        if self.monitor.lock().fail_writes {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated write failure",
            ));
        }
        for &byte in buf {
            self.monitor.lock().log.written.push(byte);
            self.clock.advance(self.config.write_cost);
            self.receive(byte);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_open()
    }
}

impl CommunicationChannel for SimulatedDevice {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.check_open()?;
        self.clock.advance(self.config.poll_cost);
        Ok(self.due_count() as u32)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.check_open()?;
        self.rx.clear();
        self.monitor.lock().log.input_clears += 1;
        Ok(())
    }

    fn clear_output_buffer(&mut self) -> io::Result<()> {
        self.check_open()?;
        self.monitor.lock().log.output_clears += 1;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if self.open {
            self.open = false;
            self.rx.clear();
            self.monitor.lock().log.closes += 1;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
