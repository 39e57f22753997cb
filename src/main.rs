//! Sleep Lock Agent CLI
//!
//! Locks the device once the wearer falls asleep.

use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use sleep_lock_agent::{
    collector::{ReplayCollector, ReplayInput, SampleSource, SyntheticCollector, SyntheticProfile},
    config::Config,
    lock::{DryRunActuator, LockActuator, LockEvent, SequencedActuator},
    monitor::SleepMonitor,
    transparency::{create_shared_log_with_persistence, read_persisted, SharedTransparencyLog},
    VERSION,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sleep-lock")]
#[command(version = VERSION)]
#[command(about = "Locks the device once the wearer falls asleep", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring samples and locking on sleep
    Start {
        /// JSON Lines sample file, or `-` for stdin
        #[arg(long, default_value = "-")]
        input: String,

        /// Play a scripted night instead of reading samples
        #[arg(long)]
        synthetic: bool,

        /// Pause between samples in milliseconds (0 = as fast as possible)
        #[arg(long, default_value = "0")]
        interval_ms: u64,

        /// Log lock attempts instead of running lock commands
        #[arg(long)]
        dry_run: bool,

        /// Override the configured lock delay
        #[arg(long)]
        lock_delay_secs: Option<u64>,
    },

    /// Pause monitoring
    Pause,

    /// Resume monitoring
    Resume,

    /// Show current status
    Status,

    /// Show configuration
    Config,

    /// Run the lock sequence right now
    TestLock {
        /// Log instead of running lock commands
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            input,
            synthetic,
            interval_ms,
            dry_run,
            lock_delay_secs,
        } => {
            cmd_start(&input, synthetic, interval_ms, dry_run, lock_delay_secs);
        }
        Commands::Pause => {
            cmd_pause();
        }
        Commands::Resume => {
            cmd_resume();
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Config => {
            cmd_config();
        }
        Commands::TestLock { dry_run } => {
            cmd_test_lock(dry_run);
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_actuator(config: &Config, dry_run: bool) -> Arc<dyn LockActuator> {
    if dry_run {
        Arc::new(DryRunActuator)
    } else {
        Arc::new(SequencedActuator::from_config(&config.actuator))
    }
}

fn build_runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .thread_name("sleep-lock-timer")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting timer runtime: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_start(
    input: &str,
    synthetic: bool,
    interval_ms: u64,
    dry_run: bool,
    lock_delay_secs: Option<u64>,
) {
    println!("Sleep Lock Agent v{VERSION}");
    println!();

    // Load or create configuration
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config, using defaults: {e}");
        Config::default()
    });
    if let Some(secs) = lock_delay_secs {
        config.lock_delay = Duration::from_secs(secs);
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let runtime = build_runtime();
    let mut monitor = match SleepMonitor::new(
        &config,
        build_actuator(&config, dry_run),
        runtime.handle().clone(),
    ) {
        Ok(monitor) => monitor,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let lock_events = monitor.lock_events();

    let interval = Duration::from_millis(interval_ms);
    let mut source: Box<dyn SampleSource> = if synthetic {
        Box::new(SyntheticCollector::new(SyntheticProfile::default(), interval))
    } else {
        Box::new(ReplayCollector::new(
            ReplayInput::from_arg(input),
            (!interval.is_zero()).then_some(interval),
        ))
    };

    println!("Starting monitoring...");
    println!(
        "  Source: {}",
        if synthetic { "synthetic night" } else { input }
    );
    if let Some(ref device) = config.device {
        println!("  Wearable: {} ({})", device.name, device.address);
    }
    println!(
        "  Window: {} samples, classify after {}",
        config.classifier.window_capacity, config.classifier.min_samples
    );
    println!("  Lock delay: {}s", config.lock_delay.as_secs());
    println!("  Lock mode: {}", if dry_run { "dry run" } else { "live" });
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    // Set up transparency log
    let transparency_log = create_shared_log_with_persistence(config.stats_path());

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    if let Err(e) = source.start() {
        eprintln!("Error starting sample source: {e}");
        std::process::exit(1);
    }

    // Support pause/resume from another process by polling the config file.
    let mut paused = config.paused;
    if paused {
        println!("Monitoring is currently paused.");
        println!("Run `sleep-lock resume` to start monitoring.");
        println!();
    }
    let mut last_config_check = std::time::Instant::now();
    let mut source_done = false;
    let receiver = source.receiver().clone();

    while running.load(Ordering::SeqCst) && (!source_done || monitor.is_lock_pending()) {
        if last_config_check.elapsed() >= Duration::from_secs(1) {
            if let Ok(cfg) = Config::load() {
                if cfg.paused != paused {
                    paused = cfg.paused;
                    if paused {
                        println!();
                        println!("Pausing monitoring...");
                        monitor.reset();
                    } else {
                        println!();
                        println!("Resuming monitoring...");
                    }
                }
            }
            last_config_check = std::time::Instant::now();
        }

        drain_lock_events(&lock_events, &transparency_log);

        if source_done {
            thread::sleep(Duration::from_millis(100));
            continue;
        }

        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(sample) => {
                if paused {
                    // Samples keep flowing while paused; they are dropped.
                    continue;
                }
                transparency_log.record_sample();
                if let Some(state) = monitor.ingest(sample) {
                    transparency_log.record_transition();
                    println!(
                        "[{}] Sleep state: {}",
                        sample.timestamp.format("%H:%M:%S"),
                        state
                    );
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                source_done = true;
                if monitor.is_lock_pending() {
                    println!("Sample source finished, waiting for pending lock...");
                } else {
                    println!("Sample source finished");
                }
            }
        }
    }

    // Stop monitoring
    println!();
    println!("Stopping monitoring...");
    monitor.shutdown();
    source.stop();
    drain_lock_events(&lock_events, &transparency_log);

    // Save transparency log
    if let Err(e) = transparency_log.save() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }

    // Final stats
    println!();
    println!("{}", transparency_log.summary());
}

fn drain_lock_events(
    events: &crossbeam_channel::Receiver<LockEvent>,
    transparency_log: &SharedTransparencyLog,
) {
    for event in events.try_iter() {
        transparency_log.record_lock_event(&event);
        match event {
            LockEvent::Armed { at } => {
                println!("[{}] Asleep: lock scheduled", at.format("%H:%M:%S"));
            }
            LockEvent::Cancelled => println!("Lock cancelled"),
            LockEvent::Performed { at } => {
                println!("[{}] Device locked", at.format("%H:%M:%S"));
            }
            LockEvent::Failed(e) => eprintln!("Warning: Lock incomplete: {e}"),
        }
    }
}

fn cmd_pause() {
    let mut config = Config::load().unwrap_or_default();
    config.paused = true;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Monitoring paused. Use 'sleep-lock resume' to continue.");
}

fn cmd_resume() {
    let mut config = Config::load().unwrap_or_default();
    config.paused = false;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Monitoring resumed.");
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Sleep Lock Agent Status");
    println!("=======================");
    println!();

    println!("Configuration:");
    match config.device {
        Some(ref device) => println!(
            "  Wearable: {} ({}){}",
            device.name,
            device.address,
            if device.is_connected { ", connected" } else { "" }
        ),
        None => println!("  Wearable: none paired"),
    }
    println!("  Window capacity: {}", config.classifier.window_capacity);
    println!("  Minimum samples: {}", config.classifier.min_samples);
    println!("  Lock delay: {}s", config.lock_delay.as_secs());
    println!("  Paused: {}", config.paused);
    if let Err(e) = config.validate() {
        println!("  Problem: {e}");
    }
    println!();

    // Load and show transparency stats if available
    let stats_path = config.stats_path();
    if stats_path.exists() {
        match read_persisted(&stats_path) {
            Ok(stats) => {
                println!("Cumulative Statistics:");
                println!("  Samples ingested: {}", stats.samples_ingested);
                println!("  Sleep state changes: {}", stats.state_transitions);
                println!("  Locks armed: {}", stats.locks_armed);
                println!("  Locks cancelled: {}", stats.locks_cancelled);
                println!("  Locks performed: {}", stats.locks_performed);
                println!("  Lock failures: {}", stats.lock_failures);
                println!(
                    "  Last lock: {}",
                    stats
                        .last_lock_at
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                        .unwrap_or_else(|| "never".to_string())
                );
            }
            Err(e) => eprintln!("Warning: Could not read statistics: {e}"),
        }
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_test_lock(dry_run: bool) {
    let config = Config::load().unwrap_or_default();
    let runtime = build_runtime();
    let monitor = match SleepMonitor::new(
        &config,
        build_actuator(&config, dry_run),
        runtime.handle().clone(),
    ) {
        Ok(monitor) => monitor,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let transparency_log = create_shared_log_with_persistence(config.stats_path());
    let lock_events = monitor.lock_events();

    println!("Running lock sequence...");
    monitor.lock_now();
    drain_lock_events(&lock_events, &transparency_log);

    if let Err(e) = transparency_log.save() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}
