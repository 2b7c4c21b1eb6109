use markstim_core::clock::{Clock, ManualClock};
use markstim_core::latency::{LatencyProbe, LatencyReport};
use markstim_core::simulator::{SimulatedDevice, SimulatedDeviceConfig};
use std::time::Duration;

const ROUND_TRIP: Duration = Duration::from_millis(4);

fn run(config: SimulatedDeviceConfig, trials: usize) -> (LatencyReport, ManualClock) {
    let clock = ManualClock::new();
    let mut device = SimulatedDevice::new(clock.clone(), config);
    let report = LatencyProbe::new(trials).run(&mut device, &clock).unwrap();
    assert_eq!(device.log().written.len(), trials);
    (report, clock)
}

#[test]
fn test_blocking_channel_fixed_delay() {
    let (report, clock) = run(
        SimulatedDeviceConfig {
            blocking_reads: true,
            ..SimulatedDeviceConfig::echo(ROUND_TRIP)
        },
        1000,
    );
    assert_eq!(report.read_samples.len(), 1000);
    assert_eq!(report.write_samples.len(), 1000);
    assert!(report.read_samples.iter().all(|&r| r == ROUND_TRIP));
    assert!(report.write_samples.iter().all(|w| w.is_zero()));
    assert_eq!(report.total, ROUND_TRIP * 1000);
    assert_eq!(clock.now(), report.total);
}

#[test]
fn test_nonblocking_channel_retries_until_echo() {
    let poll = Duration::from_micros(20);
    let (report, _) = run(
        SimulatedDeviceConfig {
            blocking_reads: false,
            poll_cost: poll,
            ..SimulatedDeviceConfig::echo(ROUND_TRIP)
        },
        1000,
    );
    assert_eq!(report.trials(), 1000);
    assert_eq!(report.write_samples.len(), 1000);
    for &r in &report.read_samples {
        assert!(r >= ROUND_TRIP && r <= ROUND_TRIP + poll, "read sample {r:?}");
    }
    assert!(report.write_samples.iter().all(|w| w.is_zero()));
}

#[test]
fn test_jittered_channel_statistics() {
    let jitter = Duration::from_millis(2);
    let (report, _) = run(
        SimulatedDeviceConfig {
            blocking_reads: true,
            echo_jitter: jitter,
            seed: 42,
            ..SimulatedDeviceConfig::echo(ROUND_TRIP)
        },
        500,
    );
    let stats = report.read_stats().unwrap();
    assert_eq!(stats.count, 500);
    assert!(stats.min >= ROUND_TRIP);
    assert!(stats.max <= ROUND_TRIP + jitter);
    assert!(stats.mean > ROUND_TRIP && stats.mean < ROUND_TRIP + jitter);
    assert!(stats.p95 >= stats.median);
    assert!(!stats.std_dev.is_zero());
}

#[test]
fn test_rows_are_index_aligned_from_one() {
    let (report, _) = run(
        SimulatedDeviceConfig {
            blocking_reads: true,
            ..SimulatedDeviceConfig::echo(ROUND_TRIP)
        },
        10,
    );
    let rows: Vec<_> = report.rows().collect();
    assert_eq!(rows.len(), 10);
    assert_eq!(rows.first().map(|r| r.0), Some(1));
    assert_eq!(rows.last().map(|r| r.0), Some(10));
}

#[test]
fn test_report_json_has_both_series() {
    let (report, _) = run(
        SimulatedDeviceConfig {
            blocking_reads: true,
            ..SimulatedDeviceConfig::echo(ROUND_TRIP)
        },
        3,
    );
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["read_ms"], serde_json::json!([4.0, 4.0, 4.0]));
    assert_eq!(json["write_ms"], serde_json::json!([0.0, 0.0, 0.0]));
    assert_eq!(json["read_stats"]["mean"], 4.0);
    assert_eq!(json["total_ms"], 12.0);
}
