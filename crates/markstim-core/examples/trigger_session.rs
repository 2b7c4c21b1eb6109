//! MarkStim Trigger Session
//!
//! Walks through one experiment session: handshake, setup, a trigger, reset.
//!
//! Usage:
//!   cargo run --example trigger_session -- [OPTIONS] [PORT]
//!
//! Options:
//!   --config FILE     Load a DeviceConfig JSON file
//!   --code N          Trigger code to send (default: 255)
//!   --pulse US        TTL pulse width in microseconds (default: 1000)
//!   --no-ttl          Disable the TTL output
//!   --simulate        Talk to a simulated device instead of a serial port
//!
//! Set RUST_LOG=markstim_core=debug to see the frames.

use anyhow::Context;
use markstim_core::clock::ManualClock;
use markstim_core::config::DeviceConfig;
use markstim_core::protocol::{Connection, SetupConfig};
use markstim_core::simulator::{SimulatedDevice, SimulatedDeviceConfig};
use std::sync::Arc;
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
    let mut code: i64 = 255;
    let mut setup = SetupConfig::default();
    let mut simulate = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                let path = args.get(i).context("--config needs a file")?;
                config = DeviceConfig::load(path)
                    .with_context(|| format!("loading config from {}", path))?;
            }
            "--code" => {
                i += 1;
                code = args.get(i).context("--code needs a value")?.parse()?;
            }
            "--pulse" => {
                i += 1;
                setup.pulse_width_us = args.get(i).context("--pulse needs a value")?.parse()?;
            }
            "--no-ttl" => {
                setup.ttl_enabled = false;
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

    let mut conn = if simulate {
        let clock = ManualClock::new();
        let device = SimulatedDevice::new(
            clock.clone(),
            SimulatedDeviceConfig {
                ready_at: Some(config.settle_delay() + Duration::from_millis(10)),
                ..SimulatedDeviceConfig::default()
            },
        );
        Connection::with_channel(config.clone(), Box::new(device), Arc::new(clock))
    } else {
        Connection::open(config.clone())
            .with_context(|| format!("opening {}", config.port_name))?
    };

    // The board's orange LED goes off after a successful handshake
    let outcome = match conn.handshake() {
        Ok(outcome) => outcome,
        Err(e) => {
            conn.reset();
            return Err(e.into());
        }
    };
    println!(
        "Device answered {:?} after {:.4} sec",
        outcome.response,
        outcome.elapsed.as_secs_f64()
    );

    conn.setup(setup)?;
    println!(
        "Setup sent: TTL {}, pulse width {} us",
        if setup.ttl_enabled { "on" } else { "off" },
        setup.pulse_width_us
    );

    let sent = conn.trigger(code);
    // Back to idle (orange LED on) whether or not the trigger went out
    conn.reset();
    sent?;
    println!("Trigger {} sent, device reset", code);

    Ok(())
}

fn print_help() {
    println!("MarkStim Trigger Session");
    println!();
    println!("Usage: trigger_session [OPTIONS] [PORT]");
    println!();
    println!("  .handshake() to start talking to the device");
    println!("  .setup() to setup (normally not required)");
    println!("  .trigger(num) to trigger");
    println!("  .reset() to reset the device");
    println!();
    println!("Options:");
    println!("  --config FILE   Load a DeviceConfig JSON file");
    println!("  --code N        Trigger code, 0-255 (default: 255)");
    println!("  --pulse US      TTL pulse width in microseconds (default: 1000)");
    println!("  --no-ttl        Disable the TTL output");
    println!("  --simulate      Use a simulated device");
}
