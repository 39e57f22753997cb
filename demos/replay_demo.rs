//! Demonstration of the sleep lock control loop.
//!
//! This example shows how to:
//! 1. Build a monitor with a dry-run actuator
//! 2. Feed it a scripted night of samples
//! 3. Watch state transitions and the scheduled lock
//!
//! Run with: cargo run --example replay_demo

use std::sync::Arc;
use std::time::Duration;

use sleep_lock_agent::{
    collector::SyntheticProfile, Config, DryRunActuator, LockEvent, SleepMonitor,
};

fn main() {
    println!("Sleep Lock Agent - Replay Demo");
    println!("==============================");
    println!();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            return;
        }
    };

    // Short delay so the lock fires during the demo
    let mut config = Config::default();
    config.lock_delay = Duration::from_secs(3);

    let mut monitor =
        match SleepMonitor::new(&config, Arc::new(DryRunActuator), runtime.handle().clone()) {
            Ok(monitor) => monitor,
            Err(e) => {
                eprintln!("Error: {e}");
                return;
            }
        };
    let events = monitor.lock_events();

    let profile = SyntheticProfile::default();
    let samples = profile.samples(chrono::Utc::now(), Duration::from_secs(1));
    println!("Replaying {} samples (one per simulated second)...", samples.len());
    println!();

    for (i, sample) in samples.into_iter().enumerate() {
        if let Some(state) = monitor.ingest(sample) {
            println!("  sample {:>3}: now {}", i + 1, state);
            if let Some(stats) = monitor.stats() {
                println!(
                    "              mean HR {:.1}, HR range {}, mean accel {:.3}",
                    stats.mean_heart_rate, stats.heart_rate_range, stats.mean_acceleration
                );
            }
        }
    }

    println!();
    println!(
        "Waiting {}s for the scheduled lock...",
        config.lock_delay.as_secs()
    );
    match events.recv_timeout(config.lock_delay + Duration::from_secs(2)) {
        Ok(LockEvent::Armed { .. }) => {}
        Ok(other) => println!("Unexpected event: {other:?}"),
        Err(_) => println!("No lock was scheduled"),
    }
    match events.recv_timeout(config.lock_delay + Duration::from_secs(2)) {
        Ok(LockEvent::Performed { at }) => println!("Locked at {}", at.format("%H:%M:%S")),
        Ok(other) => println!("Unexpected event: {other:?}"),
        Err(_) => println!("Lock did not fire"),
    }

    monitor.shutdown();
}
