//! Sliding-window sleep classification.
//!
//! A simplified Cole-Kripke style heuristic over the most recent minute of
//! samples: mean heart rate, heart-rate range and mean acceleration magnitude
//! are checked against tiered thresholds, deepest sleep first.

use crate::collector::types::SensorSample;
use crate::config::ConfigError;
use crate::core::window::SampleWindow;
use serde::{Deserialize, Deserializer, Serialize};

/// Discrete wearer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepState {
    Awake,
    LightSleep,
    Asleep,
}

impl SleepState {
    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            SleepState::Awake => "awake",
            SleepState::LightSleep => "light sleep",
            SleepState::Asleep => "asleep",
        }
    }
}

impl std::fmt::Display for SleepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Upper bounds a window must stay strictly below to qualify for a state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SleepTier {
    /// Mean heart rate (bpm)
    pub max_mean_heart_rate: f64,
    /// Max minus min heart rate over the slice (bpm)
    pub max_heart_rate_range: u32,
    /// Mean acceleration magnitude
    pub max_mean_acceleration: f64,
}

impl SleepTier {
    /// Default deep sleep thresholds.
    pub const ASLEEP: SleepTier = SleepTier {
        max_mean_heart_rate: 60.0,
        max_heart_rate_range: 5,
        max_mean_acceleration: 0.05,
    };

    /// Default light sleep thresholds.
    pub const LIGHT_SLEEP: SleepTier = SleepTier {
        max_mean_heart_rate: 70.0,
        max_heart_rate_range: 10,
        max_mean_acceleration: 0.1,
    };

    fn admits(&self, stats: &WindowStats) -> bool {
        stats.mean_heart_rate < self.max_mean_heart_rate
            && stats.heart_rate_range < self.max_heart_rate_range
            && stats.mean_acceleration < self.max_mean_acceleration
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if !(self.max_mean_heart_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "{name} tier mean heart rate must be positive"
            )));
        }
        if self.max_heart_rate_range == 0 {
            return Err(ConfigError::Invalid(format!(
                "{name} tier heart rate range must be positive"
            )));
        }
        if !(self.max_mean_acceleration > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "{name} tier mean acceleration must be positive"
            )));
        }
        Ok(())
    }
}

/// Classifier parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Maximum number of samples retained (5 minutes at 1 Hz)
    pub window_capacity: usize,
    /// Samples required before any classification happens
    pub min_samples: usize,
    /// Number of most recent samples each classification looks at
    pub analysis_len: usize,
    /// Thresholds for deep sleep
    #[serde(deserialize_with = "asleep_tier")]
    pub asleep: SleepTier,
    /// Thresholds for light sleep
    #[serde(deserialize_with = "light_sleep_tier")]
    pub light_sleep: SleepTier,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            window_capacity: 300,
            min_samples: 60,
            analysis_len: 60,
            asleep: SleepTier::ASLEEP,
            light_sleep: SleepTier::LIGHT_SLEEP,
        }
    }
}

/// A tier as written in the config file; absent cutoffs keep the tier's default.
#[derive(Deserialize)]
struct TierOverrides {
    max_mean_heart_rate: Option<f64>,
    max_heart_rate_range: Option<u32>,
    max_mean_acceleration: Option<f64>,
}

impl TierOverrides {
    fn apply(self, base: SleepTier) -> SleepTier {
        SleepTier {
            max_mean_heart_rate: self.max_mean_heart_rate.unwrap_or(base.max_mean_heart_rate),
            max_heart_rate_range: self.max_heart_rate_range.unwrap_or(base.max_heart_rate_range),
            max_mean_acceleration: self
                .max_mean_acceleration
                .unwrap_or(base.max_mean_acceleration),
        }
    }
}

fn asleep_tier<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SleepTier, D::Error> {
    TierOverrides::deserialize(deserializer).map(|o| o.apply(SleepTier::ASLEEP))
}

fn light_sleep_tier<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SleepTier, D::Error> {
    TierOverrides::deserialize(deserializer).map(|o| o.apply(SleepTier::LIGHT_SLEEP))
}

impl ClassifierConfig {
    /// Reject non-positive sizes and thresholds, and tiers that are out of order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_capacity == 0 {
            return Err(ConfigError::Invalid("window capacity must be positive".into()));
        }
        if self.min_samples == 0 {
            return Err(ConfigError::Invalid("minimum samples must be positive".into()));
        }
        if self.analysis_len == 0 {
            return Err(ConfigError::Invalid("analysis length must be positive".into()));
        }
        if self.min_samples > self.window_capacity {
            return Err(ConfigError::Invalid(format!(
                "minimum samples ({}) exceeds window capacity ({})",
                self.min_samples, self.window_capacity
            )));
        }
        if self.analysis_len > self.window_capacity {
            return Err(ConfigError::Invalid(format!(
                "analysis length ({}) exceeds window capacity ({})",
                self.analysis_len, self.window_capacity
            )));
        }
        self.asleep.validate("asleep")?;
        self.light_sleep.validate("light sleep")?;

        // The asleep tier is checked first and must be the stricter one.
        if self.asleep.max_mean_heart_rate > self.light_sleep.max_mean_heart_rate
            || self.asleep.max_heart_rate_range > self.light_sleep.max_heart_rate_range
            || self.asleep.max_mean_acceleration > self.light_sleep.max_mean_acceleration
        {
            return Err(ConfigError::Invalid(
                "asleep thresholds must not be looser than light sleep thresholds".into(),
            ));
        }
        Ok(())
    }
}

/// Aggregates over an analysis slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub mean_heart_rate: f64,
    /// Zero when the slice has fewer than two samples
    pub heart_rate_range: u32,
    pub mean_acceleration: f64,
    pub sample_count: usize,
}

impl WindowStats {
    /// Compute stats over a slice. Returns `None` for an empty slice.
    ///
    /// Walks the slice once per aggregate without buffering it.
    pub fn compute<'a, I>(samples: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a SensorSample>,
        I::IntoIter: Clone,
    {
        use statrs::statistics::Statistics;

        let samples = samples.into_iter();
        let sample_count = samples.clone().count();
        if sample_count == 0 {
            return None;
        }

        let heart_rates = samples.clone().map(|s| s.heart_rate);
        let (min_hr, max_hr) = heart_rates.fold((u32::MAX, 0), |(min, max), hr| {
            (min.min(hr), max.max(hr))
        });

        Some(Self {
            mean_heart_rate: samples.clone().map(|s| s.heart_rate as f64).mean(),
            heart_rate_range: if sample_count > 1 { max_hr - min_hr } else { 0 },
            mean_acceleration: samples.map(|s| s.acceleration_magnitude()).mean(),
            sample_count,
        })
    }
}

/// Turns a stream of samples into discrete state transitions.
#[derive(Debug, Clone)]
pub struct SleepClassifier {
    config: ClassifierConfig,
    window: SampleWindow,
    current_state: SleepState,
}

impl SleepClassifier {
    /// Create a classifier in the `Awake` state with an empty window.
    pub fn new(config: ClassifierConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            window: SampleWindow::new(config.window_capacity),
            config,
            current_state: SleepState::Awake,
        })
    }

    /// Add a sample and report a transition, if one happened.
    ///
    /// Returns `None` both while the window is below the minimum threshold and
    /// when classification ran but the state did not change.
    pub fn ingest(&mut self, sample: SensorSample) -> Option<SleepState> {
        self.window.push(sample);

        let stats = self.analyze()?;
        let candidate = self.classify(&stats);
        tracing::debug!(
            mean_hr = stats.mean_heart_rate,
            hr_range = stats.heart_rate_range,
            mean_accel = stats.mean_acceleration,
            state = %candidate,
            "Classified window"
        );

        if candidate == self.current_state {
            return None;
        }
        tracing::info!(from = %self.current_state, to = %candidate, "Sleep state changed");
        self.current_state = candidate;
        Some(candidate)
    }

    /// Stats over the current analysis slice, `None` while data is insufficient.
    pub fn analyze(&self) -> Option<WindowStats> {
        if self.window.len() < self.config.min_samples {
            return None;
        }
        WindowStats::compute(self.window.recent(self.config.analysis_len))
    }

    /// Apply the tiers, deepest first.
    pub fn classify(&self, stats: &WindowStats) -> SleepState {
        if self.config.asleep.admits(stats) {
            SleepState::Asleep
        } else if self.config.light_sleep.admits(stats) {
            SleepState::LightSleep
        } else {
            SleepState::Awake
        }
    }

    /// Clear the window and force `Awake`. Emits nothing.
    pub fn reset(&mut self) {
        self.window.clear();
        self.current_state = SleepState::Awake;
    }

    pub fn current_state(&self) -> SleepState {
        self.current_state
    }

    /// Number of samples currently retained.
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }
}
