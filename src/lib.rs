//! Sleep Lock Agent - locks the device once the wearer falls asleep.
//!
//! Heart-rate and motion samples from a wearable are classified over a
//! sliding window into awake, light sleep or asleep. Once the wearer is
//! asleep a lock is scheduled after a grace delay; waking up before the
//! delay elapses cancels it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Sleep Lock Agent                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────┐       │
//! │  │  Collector  │──▶│  Classifier  │──▶│  Scheduler   │       │
//! │  │ (wearable)  │   │ (300 window) │   │ (2 min delay)│       │
//! │  └─────────────┘   └──────────────┘   └──────────────┘       │
//! │                           │                  │               │
//! │                           ▼                  ▼               │
//! │                    ┌─────────────┐    ┌─────────────┐        │
//! │                    │Transparency │    │  Actuator   │        │
//! │                    │    Log      │    │ (lock, etc) │        │
//! │                    └─────────────┘    └─────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sleep_lock_agent::{Config, DryRunActuator, SensorSample, SleepMonitor};
//!
//! let runtime = tokio::runtime::Runtime::new().expect("Failed to start runtime");
//! let mut monitor = SleepMonitor::new(
//!     &Config::default(),
//!     Arc::new(DryRunActuator),
//!     runtime.handle().clone(),
//! )
//! .expect("Invalid configuration");
//!
//! if let Some(state) = monitor.ingest(SensorSample::new(55, 0.0, 0.01, 0.0)) {
//!     println!("Now {state}");
//! }
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod lock;
pub mod monitor;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use collector::{
    CollectorError, ReplayCollector, ReplayInput, SampleSource, SensorSample, SyntheticCollector,
    SyntheticProfile, WearableDevice,
};
pub use config::{Config, ConfigError};
pub use core::{ClassifierConfig, SleepClassifier, SleepState, SleepTier, WindowStats};
pub use lock::{
    ActuatorConfig, ActuatorError, DryRunActuator, LockActuator, LockEvent, LockScheduler,
    SequencedActuator,
};
pub use monitor::SleepMonitor;
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
