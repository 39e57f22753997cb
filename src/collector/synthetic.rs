//! Scripted wearer profile for demos and dry runs.
//!
//! Produces a deterministic night: a stretch of wakefulness, a settling
//! period, then deep sleep. Heart rate wobbles around each phase's baseline
//! with a fixed pattern so runs are reproducible.

use crate::collector::types::SensorSample;
use crate::collector::{CollectorError, SampleSource, CHANNEL_CAPACITY};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Heart-rate offsets cycled through within a phase.
const WOBBLE: [i32; 4] = [0, 1, 0, -1];

/// One phase of a scripted profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePhase {
    /// Number of samples emitted in this phase
    pub samples: usize,
    /// Baseline heart rate
    pub heart_rate: u32,
    /// Amplitude multiplier applied to the wobble pattern
    pub heart_rate_spread: u32,
    /// Acceleration magnitude, emitted on the X axis
    pub acceleration: f64,
}

/// Ordered list of phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticProfile {
    pub phases: Vec<ProfilePhase>,
}

impl Default for SyntheticProfile {
    fn default() -> Self {
        Self {
            phases: vec![
                // Reading in bed
                ProfilePhase {
                    samples: 90,
                    heart_rate: 78,
                    heart_rate_spread: 4,
                    acceleration: 0.3,
                },
                // Dozing off
                ProfilePhase {
                    samples: 90,
                    heart_rate: 65,
                    heart_rate_spread: 2,
                    acceleration: 0.07,
                },
                // Asleep
                ProfilePhase {
                    samples: 600,
                    heart_rate: 55,
                    heart_rate_spread: 1,
                    acceleration: 0.01,
                },
            ],
        }
    }
}

impl SyntheticProfile {
    /// Total number of samples across all phases.
    pub fn len(&self) -> usize {
        self.phases.iter().map(|p| p.samples).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materialize the profile, one sample per `step` starting at `start`.
    pub fn samples(&self, start: DateTime<Utc>, step: Duration) -> Vec<SensorSample> {
        let step = chrono::Duration::from_std(step).unwrap_or_else(|_| chrono::Duration::seconds(1));
        let mut samples = Vec::with_capacity(self.len());
        let mut timestamp = start;

        for phase in &self.phases {
            for i in 0..phase.samples {
                let offset = WOBBLE[i % WOBBLE.len()] * phase.heart_rate_spread as i32;
                let heart_rate = (phase.heart_rate as i32 + offset).max(0) as u32;
                samples.push(SensorSample::at(
                    timestamp,
                    heart_rate,
                    phase.acceleration,
                    0.0,
                    0.0,
                ));
                timestamp += step;
            }
        }
        samples
    }
}

/// Collector that plays a [`SyntheticProfile`] at a fixed cadence.
pub struct SyntheticCollector {
    profile: SyntheticProfile,
    interval: Duration,
    sender: Option<Sender<SensorSample>>,
    receiver: Receiver<SensorSample>,
    running: Arc<AtomicBool>,
    _worker: Option<JoinHandle<()>>,
}

impl SyntheticCollector {
    /// Create a new synthetic collector. A zero interval emits without pausing,
    /// while timestamps still advance one second per sample.
    pub fn new(profile: SyntheticProfile, interval: Duration) -> Self {
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        Self {
            profile,
            interval,
            sender: Some(sender),
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            _worker: None,
        }
    }
}

impl SampleSource for SyntheticCollector {
    fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        let sender = self.sender.take().ok_or(CollectorError::Exhausted)?;
        let step = if self.interval.is_zero() {
            Duration::from_secs(1)
        } else {
            self.interval
        };
        let samples = self.profile.samples(Utc::now(), step);
        let interval = self.interval;

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();

        self._worker = Some(thread::spawn(move || {
            for sample in samples {
                if !running.load(Ordering::SeqCst) || sender.send(sample).is_err() {
                    break;
                }
                if !interval.is_zero() {
                    thread::sleep(interval);
                }
            }
            running.store(false, Ordering::SeqCst);
        }));
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn receiver(&self) -> &Receiver<SensorSample> {
        &self.receiver
    }
}
