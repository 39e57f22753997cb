//! Activity log for the sleep lock agent.
//!
//! Keeps counters of what the agent saw and did, so the user can check how
//! often it locked the device and whether any lock attempt failed. Nothing
//! about the raw samples is stored beyond counts.

use crate::lock::LockEvent;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Sentinel for "never locked".
const NO_LOCK: i64 = i64::MIN;

/// Counters for the current and previous sessions.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Number of samples ingested
    samples_ingested: AtomicU64,
    /// Number of sleep state transitions
    state_transitions: AtomicU64,
    /// Number of times a lock was armed
    locks_armed: AtomicU64,
    /// Number of pending locks cancelled
    locks_cancelled: AtomicU64,
    /// Number of successful locks
    locks_performed: AtomicU64,
    /// Number of lock attempts with failed steps
    lock_failures: AtomicU64,
    /// Milliseconds since the epoch of the last successful lock
    last_lock_ms: AtomicI64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            samples_ingested: AtomicU64::new(0),
            state_transitions: AtomicU64::new(0),
            locks_armed: AtomicU64::new(0),
            locks_cancelled: AtomicU64::new(0),
            locks_performed: AtomicU64::new(0),
            lock_failures: AtomicU64::new(0),
            last_lock_ms: AtomicI64::new(NO_LOCK),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a transparency log with persistence.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        // Try to load existing stats
        if let Err(e) = log.load() {
            tracing::warn!("Could not load previous transparency stats: {e}");
        }

        log
    }

    /// Record an ingested sample.
    pub fn record_sample(&self) {
        self.samples_ingested.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a classifier transition.
    pub fn record_transition(&self) {
        self.state_transitions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a scheduler notification.
    pub fn record_lock_event(&self, event: &LockEvent) {
        match event {
            LockEvent::Armed { .. } => {
                self.locks_armed.fetch_add(1, Ordering::Relaxed);
            }
            LockEvent::Cancelled => {
                self.locks_cancelled.fetch_add(1, Ordering::Relaxed);
            }
            LockEvent::Performed { at } => {
                self.locks_performed.fetch_add(1, Ordering::Relaxed);
                self.last_lock_ms
                    .store(at.timestamp_millis(), Ordering::Relaxed);
            }
            LockEvent::Failed(_) => {
                self.lock_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            samples_ingested: self.samples_ingested.load(Ordering::Relaxed),
            state_transitions: self.state_transitions.load(Ordering::Relaxed),
            locks_armed: self.locks_armed.load(Ordering::Relaxed),
            locks_cancelled: self.locks_cancelled.load(Ordering::Relaxed),
            locks_performed: self.locks_performed.load(Ordering::Relaxed),
            lock_failures: self.lock_failures.load(Ordering::Relaxed),
            last_lock_at: millis_to_time(self.last_lock_ms.load(Ordering::Relaxed)),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds() as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        let last_lock = stats
            .last_lock_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        format!(
            "Session Statistics:\n\
             - Samples ingested: {}\n\
             - Sleep state changes: {}\n\
             - Locks armed: {}\n\
             - Locks cancelled: {}\n\
             - Locks performed: {}\n\
             - Lock failures: {}\n\
             - Last lock: {}\n\
             - Session duration: {} seconds",
            stats.samples_ingested,
            stats.state_transitions,
            stats.locks_armed,
            stats.locks_cancelled,
            stats.locks_performed,
            stats.lock_failures,
            last_lock,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                samples_ingested: stats.samples_ingested,
                state_transitions: stats.state_transitions,
                locks_armed: stats.locks_armed,
                locks_cancelled: stats.locks_cancelled,
                locks_performed: stats.locks_performed,
                lock_failures: stats.lock_failures,
                last_lock_at: stats.last_lock_at,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let persisted = read_persisted(path)?;

                self.samples_ingested
                    .store(persisted.samples_ingested, Ordering::Relaxed);
                self.state_transitions
                    .store(persisted.state_transitions, Ordering::Relaxed);
                self.locks_armed
                    .store(persisted.locks_armed, Ordering::Relaxed);
                self.locks_cancelled
                    .store(persisted.locks_cancelled, Ordering::Relaxed);
                self.locks_performed
                    .store(persisted.locks_performed, Ordering::Relaxed);
                self.lock_failures
                    .store(persisted.lock_failures, Ordering::Relaxed);
                self.last_lock_ms.store(
                    persisted
                        .last_lock_at
                        .map(|t| t.timestamp_millis())
                        .unwrap_or(NO_LOCK),
                    Ordering::Relaxed,
                );
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.samples_ingested.store(0, Ordering::Relaxed);
        self.state_transitions.store(0, Ordering::Relaxed);
        self.locks_armed.store(0, Ordering::Relaxed);
        self.locks_cancelled.store(0, Ordering::Relaxed);
        self.locks_performed.store(0, Ordering::Relaxed);
        self.lock_failures.store(0, Ordering::Relaxed);
        self.last_lock_ms.store(NO_LOCK, Ordering::Relaxed);
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

fn millis_to_time(ms: i64) -> Option<DateTime<Utc>> {
    if ms == NO_LOCK {
        None
    } else {
        Utc.timestamp_millis_opt(ms).single()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub samples_ingested: u64,
    pub state_transitions: u64,
    pub locks_armed: u64,
    pub locks_cancelled: u64,
    pub locks_performed: u64,
    pub lock_failures: u64,
    pub last_lock_at: Option<DateTime<Utc>>,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedStats {
    #[serde(default)]
    pub samples_ingested: u64,
    #[serde(default)]
    pub state_transitions: u64,
    #[serde(default)]
    pub locks_armed: u64,
    #[serde(default)]
    pub locks_cancelled: u64,
    #[serde(default)]
    pub locks_performed: u64,
    #[serde(default)]
    pub lock_failures: u64,
    #[serde(default)]
    pub last_lock_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

/// Read stats persisted by a previous session.
pub fn read_persisted(path: &std::path::Path) -> Result<PersistedStats, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(std::io::Error::other)
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
