//! Sensor-to-lock control loop.
//!
//! [`SleepMonitor`] owns the classifier and the lock scheduler. Samples go
//! in one at a time; each transition the classifier reports is published on
//! the state observation point and handed to the scheduler before the next
//! sample is processed, so the scheduler sees transitions in ingestion order.

use crate::collector::types::SensorSample;
use crate::config::{Config, ConfigError};
use crate::core::{SleepClassifier, SleepState, WindowStats};
use crate::lock::{LockActuator, LockEvent, LockScheduler};
use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Classifier and scheduler wired together.
pub struct SleepMonitor {
    classifier: SleepClassifier,
    scheduler: LockScheduler,
    state: watch::Sender<SleepState>,
}

impl SleepMonitor {
    /// Build a monitor from a validated configuration.
    pub fn new(
        config: &Config,
        actuator: Arc<dyn LockActuator>,
        runtime: Handle,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let classifier = SleepClassifier::new(config.classifier.clone())?;
        let scheduler = LockScheduler::new(config.lock_delay, actuator, runtime)?;
        let (state, _) = watch::channel(classifier.current_state());
        Ok(Self {
            classifier,
            scheduler,
            state,
        })
    }

    /// Feed one sample. Returns the new state when it changed.
    pub fn ingest(&mut self, sample: SensorSample) -> Option<SleepState> {
        let transition = self.classifier.ingest(sample)?;
        self.state.send_replace(transition);
        self.scheduler.on_state_change(transition);
        Some(transition)
    }

    /// Start over: empty window, `Awake`, nothing pending.
    pub fn reset(&mut self) {
        self.classifier.reset();
        self.scheduler.cancel();
        self.state.send_replace(SleepState::Awake);
    }

    /// Cancel any pending lock and stop arming new ones.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Lock immediately, outside the debounce logic.
    pub fn lock_now(&self) {
        self.scheduler.lock_now();
    }

    pub fn current_state(&self) -> SleepState {
        self.classifier.current_state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SleepState> {
        self.state.subscribe()
    }

    pub fn last_lock_time(&self) -> Option<DateTime<Utc>> {
        self.scheduler.last_lock_time()
    }

    pub fn subscribe_last_lock(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.scheduler.subscribe_last_lock()
    }

    /// Subscribe to lock notifications. Events before subscribing are not kept.
    pub fn lock_events(&self) -> Receiver<LockEvent> {
        self.scheduler.events()
    }

    pub fn is_lock_pending(&self) -> bool {
        self.scheduler.is_armed()
    }

    pub fn window_len(&self) -> usize {
        self.classifier.window_len()
    }

    /// Stats over the current analysis slice.
    pub fn stats(&self) -> Option<WindowStats> {
        self.classifier.analyze()
    }
}
