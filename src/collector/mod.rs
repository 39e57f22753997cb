//! Sample sources for the sleep monitor.
//!
//! A source pushes [`SensorSample`]s, in arrival order, into a bounded
//! channel that the control loop drains. Delivery cadence is up to the
//! source and may be irregular.

pub mod replay;
pub mod synthetic;
pub mod types;

use crossbeam_channel::Receiver;

// Re-export commonly used types
pub use replay::{ReplayCollector, ReplayInput};
pub use synthetic::{ProfilePhase, SyntheticCollector, SyntheticProfile};
pub use types::{SensorSample, WearableDevice};

/// Capacity of the channel between a source thread and the control loop.
pub(crate) const CHANNEL_CAPACITY: usize = 10_000;

/// Errors that can occur while starting a sample source.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Collector is already running")]
    AlreadyRunning,

    #[error("Collector cannot be restarted once stopped")]
    Exhausted,

    #[error("Failed to open sample input: {0}")]
    Io(#[from] std::io::Error),
}

/// A push source of sensor samples.
pub trait SampleSource: Send {
    /// Start delivering samples on a background thread.
    fn start(&mut self) -> Result<(), CollectorError>;

    /// Ask the background thread to stop.
    fn stop(&mut self);

    /// Whether the background thread is still delivering.
    fn is_running(&self) -> bool;

    /// Receiver the control loop drains. Disconnects once the source is done.
    fn receiver(&self) -> &Receiver<SensorSample>;
}
