//! Configuration for the prediction module

use crate::{PredictError, PredictResult};
use serde::{Deserialize, Serialize};

/// Tuning for one constant-velocity filter
///
/// Units follow the signal the filter tracks: meters for GPS on the local
/// tangent plane, degrees for vision offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// White-noise acceleration spectral density
    pub process_noise: f64,
    /// Measurement variance used when a sample carries none of its own
    pub measurement_noise: f64,
    /// Longest gap between samples across which velocity is still trusted
    pub max_gap_secs: f64,
    /// Velocity variance for a freshly started track
    pub initial_velocity_variance: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self::gps()
    }
}

impl PredictorConfig {
    /// Tuning for wearable GPS fixes at roughly 1 Hz (meters)
    pub fn gps() -> Self {
        Self {
            process_noise: 0.5,
            measurement_noise: 4.0,
            max_gap_secs: 3.0,
            initial_velocity_variance: 1000.0,
        }
    }

    /// Tuning for camera detections at 15+ Hz (degrees)
    pub fn vision() -> Self {
        Self {
            process_noise: 20.0,
            measurement_noise: 0.25,
            max_gap_secs: 0.5,
            initial_velocity_variance: 1000.0,
        }
    }

    /// Reject values that would make the filter diverge or divide by zero
    pub fn validate(&self) -> PredictResult<()> {
        let fields = [
            ("process_noise", self.process_noise),
            ("measurement_noise", self.measurement_noise),
            ("max_gap_secs", self.max_gap_secs),
            ("initial_velocity_variance", self.initial_velocity_variance),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(PredictError::invalid_config(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        Ok(())
    }
}
