//! Serial Latency Benchmark
//!
//! Measures the serial round trip between the host and a board running the
//! echo firmware, then prints summary statistics.
//!
//! Usage:
//!   cargo run --example latency_benchmark -- [OPTIONS] [PORT]
//!
//! Options:
//!   --trials N        Number of round trips (default: 1000)
//!   --baud RATE       Baud rate (default: 57600)
//!   --timeout MS      Read/write timeout in ms (default: block)
//!   --json            Print the full report as JSON
//!   --simulate        Run against a simulated 4ms echo device

use anyhow::Context;
use markstim_core::clock::ManualClock;
use markstim_core::config::DeviceConfig;
use markstim_core::latency::{LatencyProbe, LatencyReport, Statistics, DEFAULT_TRIALS};
use markstim_core::simulator::{SimulatedDevice, SimulatedDeviceConfig};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut config = DeviceConfig::default();
    let mut trials = DEFAULT_TRIALS;
    let mut json = false;
    let mut simulate = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--trials" | "-n" => {
                i += 1;
                trials = args.get(i).context("--trials needs a value")?.parse()?;
            }
            "--baud" | "-b" => {
                i += 1;
                config.baud_rate = args.get(i).context("--baud needs a value")?.parse()?;
            }
            "--timeout" | "-t" => {
                i += 1;
                let ms: u64 = args.get(i).context("--timeout needs a value")?.parse()?;
                config.read_timeout_ms = Some(ms);
                config.write_timeout_ms = Some(ms);
            }
            "--json" => {
                json = true;
            }
            "--simulate" => {
                simulate = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            arg if !arg.starts_with('-') => {
                config.port_name = arg.to_string();
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
            }
        }
        i += 1;
    }

    let probe = LatencyProbe::new(trials);
    let report = if simulate {
        let clock = ManualClock::new();
        let mut device = SimulatedDevice::new(
            clock.clone(),
            SimulatedDeviceConfig {
                blocking_reads: true,
                echo_jitter: Duration::from_micros(500),
                ..SimulatedDeviceConfig::echo(Duration::from_millis(4))
            },
        );
        probe.run(&mut device, &clock)?
    } else {
        probe
            .run_on_port(&config)
            .with_context(|| format!("benchmarking {}", config.port_name))?
    };

    if json {
        println!("{}", report.to_json()?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &LatencyReport) {
    println!(
        "{} trials took {:.6} sec",
        report.trials(),
        report.total.as_secs_f64()
    );
    print_stats("Read", report.read_stats());
    print_stats("Write", report.write_stats());
}

fn print_stats(label: &str, stats: Option<Statistics>) {
    let ms = |d: Duration| d.as_secs_f64() * 1e3;
    match stats {
        Some(s) => println!(
            "  {:<6} min {:.3} ms  median {:.3} ms  mean {:.3} ms  p95 {:.3} ms  max {:.3} ms  sd {:.3} ms",
            label,
            ms(s.min),
            ms(s.median),
            ms(s.mean),
            ms(s.p95),
            ms(s.max),
            ms(s.std_dev)
        ),
        None => println!("  {:<6} no samples", label),
    }
}

fn print_help() {
    println!("Serial Latency Benchmark");
    println!();
    println!("Usage: latency_benchmark [OPTIONS] [PORT]");
    println!();
    println!("Options:");
    println!("  --trials N      Number of round trips (default: 1000)");
    println!("  --baud RATE     Baud rate (default: 57600)");
    println!("  --timeout MS    Read/write timeout in ms (default: block)");
    println!("  --json          Print the full report as JSON");
    println!("  --simulate      Run against a simulated 4ms echo device");
}
