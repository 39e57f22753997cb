//! Transparency module for the sleep lock agent.
//!
//! Tracks what the agent observed and which locks it armed, cancelled and
//! performed, so the user can audit its behaviour.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, read_persisted, PersistedStats,
    SharedTransparencyLog, TransparencyLog, TransparencyStats,
};
