//! Latency probe results

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::time::Duration;

fn millis(d: &Duration) -> f64 {
    d.as_nanos() as f64 / 1e6
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(millis(d))
}

#[allow(clippy::ptr_arg)]
fn as_millis_seq<S: Serializer>(samples: &Vec<Duration>, s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(samples.iter().map(millis))
}

/// Summary of one sample series. Durations serialize as milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Number of samples
    pub count: usize,
    /// Smallest sample
    #[serde(serialize_with = "as_millis")]
    pub min: Duration,
    /// Largest sample
    #[serde(serialize_with = "as_millis")]
    pub max: Duration,
    /// Arithmetic mean
    #[serde(serialize_with = "as_millis")]
    pub mean: Duration,
    /// Median (lower middle for even counts)
    #[serde(serialize_with = "as_millis")]
    pub median: Duration,
    /// 95th percentile, nearest rank
    #[serde(serialize_with = "as_millis")]
    pub p95: Duration,
    /// Population standard deviation
    #[serde(serialize_with = "as_millis")]
    pub std_dev: Duration,
}

impl Statistics {
    /// Summarize `samples`, `None` when empty
    pub fn from_samples(samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let count = sorted.len();
        let total: Duration = sorted.iter().sum();
        let mean = total / count as u32;

        let mean_s = mean.as_secs_f64();
        let variance = sorted
            .iter()
            .map(|d| {
                let diff = d.as_secs_f64() - mean_s;
                diff * diff
            })
            .sum::<f64>()
            / count as f64;

        Some(Self {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            mean,
            median: sorted[(count - 1) / 2],
            p95: percentile(&sorted, 95),
            std_dev: Duration::from_secs_f64(variance.sqrt()),
        })
    }
}

/// Nearest-rank percentile of an ascending, non-empty slice
fn percentile(sorted: &[Duration], pct: usize) -> Duration {
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

/// Result of one latency probe run.
///
/// `read_samples[i]` and `write_samples[i]` belong to trial `i + 1`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyReport {
    /// Wall-clock time the run started
    pub started_at: DateTime<Utc>,
    /// Byte written on every trial
    pub probe_byte: u8,
    /// Time from the end of each write to the echo arriving
    #[serde(rename = "read_ms", serialize_with = "as_millis_seq")]
    pub read_samples: Vec<Duration>,
    /// Time each write call took
    #[serde(rename = "write_ms", serialize_with = "as_millis_seq")]
    pub write_samples: Vec<Duration>,
    /// Elapsed time of the whole run
    #[serde(rename = "total_ms", serialize_with = "as_millis")]
    pub total: Duration,
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    trials: usize,
    #[serde(flatten)]
    report: &'a LatencyReport,
    read_stats: Option<Statistics>,
    write_stats: Option<Statistics>,
}

impl LatencyReport {
    /// Number of completed round trips
    pub fn trials(&self) -> usize {
        self.read_samples.len()
    }

    /// Statistics of the read series
    pub fn read_stats(&self) -> Option<Statistics> {
        Statistics::from_samples(&self.read_samples)
    }

    /// Statistics of the write series
    pub fn write_stats(&self) -> Option<Statistics> {
        Statistics::from_samples(&self.write_samples)
    }

    /// `(trial number, read, write)` rows, trial numbers starting at 1
    pub fn rows(&self) -> impl Iterator<Item = (usize, Duration, Duration)> + '_ {
        self.read_samples
            .iter()
            .zip(&self.write_samples)
            .enumerate()
            .map(|(i, (&r, &w))| (i + 1, r, w))
    }

    /// JSON document with samples and summary statistics in milliseconds
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&ReportDocument {
            trials: self.trials(),
            report: self,
            read_stats: self.read_stats(),
            write_stats: self.write_stats(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_statistics_empty() {
        assert_eq!(Statistics::from_samples(&[]), None);
    }

    #[test]
    fn test_statistics_basic() {
        let samples: Vec<Duration> = (1..=20).map(ms).collect();
        let stats = Statistics::from_samples(&samples).unwrap();
        assert_eq!(stats.count, 20);
        assert_eq!(stats.min, ms(1));
        assert_eq!(stats.max, ms(20));
        assert_eq!(stats.mean, Duration::from_micros(10_500));
        assert_eq!(stats.median, ms(10));
        assert_eq!(stats.p95, ms(19));
        let sd = stats.std_dev.as_secs_f64() * 1e3;
        assert!((sd - 5.766).abs() < 0.01, "std dev {sd}");
    }

    #[test]
    fn test_statistics_constant_series() {
        let stats = Statistics::from_samples(&[ms(4); 5]).unwrap();
        assert_eq!(stats.std_dev, Duration::ZERO);
        assert_eq!(stats.p95, ms(4));
        assert_eq!(stats.median, ms(4));
    }

    #[test]
    fn test_percentile_single() {
        assert_eq!(percentile(&[ms(7)], 95), ms(7));
    }

    #[test]
    fn test_rows_and_json() {
        let report = LatencyReport {
            started_at: Utc::now(),
            probe_byte: b'.',
            read_samples: vec![ms(4), ms(5)],
            write_samples: vec![Duration::ZERO, ms(1)],
            total: ms(10),
        };
        let rows: Vec<_> = report.rows().collect();
        assert_eq!(rows, vec![(1, ms(4), Duration::ZERO), (2, ms(5), ms(1))]);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["trials"], 2);
        assert_eq!(json["probe_byte"], 46);
        assert_eq!(json["read_ms"], serde_json::json!([4.0, 5.0]));
        assert_eq!(json["total_ms"], 10.0);
        assert_eq!(json["read_stats"]["max"], 5.0);
        assert!(json["started_at"].is_string());
    }
}
