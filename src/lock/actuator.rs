//! Device lock side effects.
//!
//! Locking is an ordered sequence of independent steps: pause media, lock
//! the screen, then an optional haptic cue. Each step is a list of
//! alternative capabilities tried in order until one succeeds. A failed
//! step never prevents the following steps from being attempted.

use serde::{Deserialize, Serialize};
use std::process::Command;

/// Something that can lock the device.
pub trait LockActuator: Send + Sync {
    /// Attempt every lock step. Errors describe the steps that failed.
    fn perform_lock(&self) -> Result<(), ActuatorError>;
}

/// A failed lock step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step: String,
    pub reason: String,
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.step, self.reason)
    }
}

/// Errors reported by [`LockActuator::perform_lock`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActuatorError {
    #[error("lock steps failed: {}", describe(.0))]
    StepsFailed(Vec<StepFailure>),
}

impl ActuatorError {
    pub fn failures(&self) -> &[StepFailure] {
        match self {
            ActuatorError::StepsFailed(failures) => failures,
        }
    }
}

fn describe(failures: &[StepFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// One way of carrying out a step.
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    fn attempt(&self) -> Result<(), String>;
}

/// Runs an external program; a non-zero exit status is a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCapability {
    program: String,
    args: Vec<String>,
    label: String,
}

impl CommandCapability {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        let label = std::iter::once(program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            program,
            args,
            label,
        }
    }

    /// Build from an argv list. Returns `None` for an empty list.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

impl Capability for CommandCapability {
    fn name(&self) -> &str {
        &self.label
    }

    fn attempt(&self) -> Result<(), String> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .map_err(|e| format!("failed to run: {e}"))?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("exited with {status}"))
        }
    }
}

/// A named step with alternatives tried in order.
pub struct LayeredStep {
    name: String,
    attempts: Vec<Box<dyn Capability>>,
}

impl LayeredStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attempts: Vec::new(),
        }
    }

    /// Append a fallback capability.
    pub fn with(mut self, capability: impl Capability + 'static) -> Self {
        self.attempts.push(Box::new(capability));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Try each capability until one succeeds. A step with nothing
    /// configured is skipped.
    pub fn run(&self) -> Result<(), StepFailure> {
        if self.attempts.is_empty() {
            tracing::debug!(step = %self.name, "No capability configured, skipping");
            return Ok(());
        }

        let mut reasons = Vec::with_capacity(self.attempts.len());
        for capability in &self.attempts {
            match capability.attempt() {
                Ok(()) => {
                    tracing::debug!(step = %self.name, via = capability.name(), "Lock step done");
                    return Ok(());
                }
                Err(reason) => {
                    tracing::debug!(step = %self.name, via = capability.name(), %reason, "Lock step attempt failed");
                    reasons.push(format!("{} ({reason})", capability.name()));
                }
            }
        }

        Err(StepFailure {
            step: self.name.clone(),
            reason: reasons.join(", "),
        })
    }
}

/// Runs every step in order and collects failures.
#[derive(Default)]
pub struct SequencedActuator {
    steps: Vec<LayeredStep>,
}

impl SequencedActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: LayeredStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Build the pause, lock and vibrate steps from configured commands.
    pub fn from_config(config: &ActuatorConfig) -> Self {
        let build = |name: &str, commands: &[Vec<String>]| {
            commands
                .iter()
                .filter_map(|command| CommandCapability::from_argv(command))
                .fold(LayeredStep::new(name), |step, capability| step.with(capability))
        };

        Self::new()
            .step(build("pause media", &config.pause_media))
            .step(build("lock device", &config.lock))
            .step(build("vibrate", &config.vibrate))
    }

    pub fn steps(&self) -> &[LayeredStep] {
        &self.steps
    }
}

impl LockActuator for SequencedActuator {
    fn perform_lock(&self) -> Result<(), ActuatorError> {
        let failures: Vec<StepFailure> = self
            .steps
            .iter()
            .filter_map(|step| step.run().err())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ActuatorError::StepsFailed(failures))
        }
    }
}

/// Logs instead of locking.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunActuator;

impl LockActuator for DryRunActuator {
    fn perform_lock(&self) -> Result<(), ActuatorError> {
        tracing::info!("Dry run: device would be locked now");
        Ok(())
    }
}

/// Commands used for each lock step. Each entry is an argv; entries are
/// alternatives tried in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorConfig {
    #[serde(default)]
    pub pause_media: Vec<Vec<String>>,
    #[serde(default)]
    pub lock: Vec<Vec<String>>,
    #[serde(default)]
    pub vibrate: Vec<Vec<String>>,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[cfg(target_os = "macos")]
impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            pause_media: vec![
                argv(&["nowplaying-cli", "pause"]),
                argv(&["osascript", "-e", "tell application \"Music\" to pause"]),
            ],
            lock: vec![argv(&["pmset", "displaysleepnow"])],
            vibrate: Vec::new(),
        }
    }
}

#[cfg(not(target_os = "macos"))]
impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            pause_media: vec![
                argv(&["playerctl", "--all-players", "pause"]),
                argv(&["xdotool", "key", "XF86AudioPause"]),
            ],
            lock: vec![
                argv(&["loginctl", "lock-session"]),
                argv(&["xdg-screensaver", "lock"]),
            ],
            vibrate: Vec::new(),
        }
    }
}
