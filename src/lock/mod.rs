//! Device locking: the actuator boundary and the debounce scheduler.

pub mod actuator;
pub mod scheduler;

// Re-export commonly used types
pub use actuator::{
    ActuatorConfig, ActuatorError, Capability, CommandCapability, DryRunActuator, LayeredStep,
    LockActuator, SequencedActuator, StepFailure,
};
pub use scheduler::{LockEvent, LockScheduler};
