//! Time sources
//!
//! The handshake loop and the latency probe measure elapsed time and sleep
//! through a [`Clock`] so they can run against virtual time in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source used by the protocol and the latency probe
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);

    /// Time elapsed since an earlier reading of [`Clock::now`]
    fn since(&self, earlier: Duration) -> Duration {
        self.now().saturating_sub(earlier)
    }
}

/// Wall-clock time backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is the current instant
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Virtual time that only moves when told to.
///
/// Clones share the same counter, so a simulated device and the code under
/// test observe one timeline. `sleep` advances the counter instead of
/// blocking.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward
    pub fn advance(&self, duration: Duration) {
        self.nanos
            .fetch_add(duration_to_nanos(duration), Ordering::SeqCst);
    }

    /// Move the clock forward to `target` if it is still behind it
    pub fn advance_to(&self, target: Duration) {
        self.nanos
            .fetch_max(duration_to_nanos(target), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_millis(5));
        assert_eq!(other.now(), Duration::from_millis(5));
    }

    #[test]
    fn test_manual_clock_sleep_advances() {
        let clock = ManualClock::new();
        clock.sleep(Duration::from_secs(2));
        assert_eq!(clock.now(), Duration::from_secs(2));
        assert_eq!(clock.since(Duration::from_millis(500)), Duration::from_millis(1500));
    }

    #[test]
    fn test_manual_clock_advance_to_never_goes_back() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_millis(10));
        clock.advance_to(Duration::from_millis(4));
        assert_eq!(clock.now(), Duration::from_millis(10));
        clock.advance_to(Duration::from_millis(12));
        assert_eq!(clock.now(), Duration::from_millis(12));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert_eq!(clock.since(b + Duration::from_secs(60)), Duration::ZERO);
    }
}
