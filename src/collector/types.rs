//! Sample types delivered by a wearable to the sleep monitor.
//!
//! A sample is a single reading: heart rate plus the raw three-axis
//! acceleration vector. Only the magnitude of the acceleration is used for
//! classification and it is derived on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One reading from the wearable.
///
/// Samples are immutable once built. Arrival order is treated as time order;
/// duplicate or out-of-order timestamps are accepted as-is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    /// Heart rate in beats per minute
    pub heart_rate: u32,
    /// Acceleration along the X axis
    pub accel_x: f64,
    /// Acceleration along the Y axis
    pub accel_y: f64,
    /// Acceleration along the Z axis
    pub accel_z: f64,
    /// When the reading was taken
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl SensorSample {
    /// Create a sample stamped with the current time.
    pub fn new(heart_rate: u32, accel_x: f64, accel_y: f64, accel_z: f64) -> Self {
        Self::at(Utc::now(), heart_rate, accel_x, accel_y, accel_z)
    }

    /// Create a sample with an explicit timestamp.
    pub fn at(
        timestamp: DateTime<Utc>,
        heart_rate: u32,
        accel_x: f64,
        accel_y: f64,
        accel_z: f64,
    ) -> Self {
        Self {
            heart_rate,
            accel_x,
            accel_y,
            accel_z,
            timestamp,
        }
    }

    /// Euclidean norm of the acceleration vector.
    pub fn acceleration_magnitude(&self) -> f64 {
        (self.accel_x * self.accel_x + self.accel_y * self.accel_y + self.accel_z * self.accel_z)
            .sqrt()
    }
}

/// A paired wearable.
///
/// Pairing and connection management happen outside the agent; this only
/// records which device the samples are expected to come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WearableDevice {
    /// Advertised device name
    pub name: String,
    /// Hardware address
    pub address: String,
    /// Whether the device was connected when last seen
    #[serde(default)]
    pub is_connected: bool,
}

impl WearableDevice {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            is_connected: false,
        }
    }
}
