//! Core functionality for the sleep lock agent.
//!
//! This module contains:
//! - The fixed-capacity sample window
//! - Sleep state classification over the most recent samples

pub mod classifier;
pub mod window;

// Re-export commonly used types
pub use classifier::{ClassifierConfig, SleepClassifier, SleepState, SleepTier, WindowStats};
pub use window::SampleWindow;
