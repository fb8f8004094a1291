//! Step commands for the gimbal motors
//!
//! Converts a fusion result into a relative move. The serial protocol that
//! carries the command to the controller lives elsewhere.

use crate::error::{TrackerError, TrackerResult};
use gimbal_core::{FusionResult, TrackingMode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Actuation tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuationConfig {
    /// Offsets smaller than this (degrees) are not corrected
    pub dead_zone_deg: f64,
    /// Motor steps per degree of pan
    pub pan_steps_per_deg: f64,
    /// Motor steps per degree of tilt
    pub tilt_steps_per_deg: f64,
    /// Largest move in one command, per axis
    pub max_step: i32,
    /// Results below this confidence do not move the gimbal
    pub min_confidence: f64,
    /// Blend the predicted angle into the offset while GPS-assisted
    pub prediction_enabled: bool,
    /// Share of the predicted angle in the blend
    pub prediction_blend: f64,
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            dead_zone_deg: 2.0,
            pan_steps_per_deg: 1.3,
            tilt_steps_per_deg: 1.3,
            max_step: 150,
            min_confidence: 0.1,
            prediction_enabled: true,
            prediction_blend: 0.3,
        }
    }
}

impl ActuationConfig {
    pub fn validate(&self) -> TrackerResult<()> {
        if !self.dead_zone_deg.is_finite() || self.dead_zone_deg < 0.0 {
            return Err(TrackerError::invalid_settings("dead_zone_deg must be non-negative"));
        }
        for (name, gain) in [
            ("pan_steps_per_deg", self.pan_steps_per_deg),
            ("tilt_steps_per_deg", self.tilt_steps_per_deg),
        ] {
            if !gain.is_finite() || gain <= 0.0 {
                return Err(TrackerError::invalid_settings(format!(
                    "{name} must be positive, got {gain}"
                )));
            }
        }
        if self.max_step <= 0 {
            return Err(TrackerError::invalid_settings("max_step must be positive"));
        }
        for (name, value) in [
            ("min_confidence", self.min_confidence),
            ("prediction_blend", self.prediction_blend),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TrackerError::invalid_settings(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Relative move in motor steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCommand {
    pub pan_steps: i32,
    pub tilt_steps: i32,
}

impl StepCommand {
    pub fn is_zero(&self) -> bool {
        self.pan_steps == 0 && self.tilt_steps == 0
    }
}

impl fmt::Display for StepCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pan {:+} tilt {:+}", self.pan_steps, self.tilt_steps)
    }
}

/// Turns fusion results into step commands
#[derive(Debug, Clone)]
pub struct Actuator {
    config: ActuationConfig,
}

impl Actuator {
    pub fn new(config: ActuationConfig) -> Self {
        Self { config }
    }

    /// Step command for `result`, zero when the gimbal should hold
    pub fn command(&self, result: &FusionResult) -> StepCommand {
        if result.mode == TrackingMode::Idle || result.confidence < self.config.min_confidence {
            return StepCommand::default();
        }

        let (mut pan, mut tilt) = (result.pan_offset_deg, result.tilt_offset_deg);
        if self.config.prediction_enabled && result.mode == TrackingMode::GpsAssisted {
            let blend = self.config.prediction_blend;
            if let (Some(p_pan), Some(p_tilt)) = (result.predicted_pan_deg, result.predicted_tilt_deg) {
                pan = (1.0 - blend) * pan + blend * p_pan;
                tilt = (1.0 - blend) * tilt + blend * p_tilt;
            }
        }

        StepCommand {
            pan_steps: self.axis(pan, self.config.pan_steps_per_deg),
            tilt_steps: self.axis(tilt, self.config.tilt_steps_per_deg),
        }
    }

    /// Degrees a command moves each axis, the inverse of `command` up to
    /// step truncation
    pub fn degrees(&self, command: StepCommand) -> (f64, f64) {
        (
            command.pan_steps as f64 / self.config.pan_steps_per_deg,
            command.tilt_steps as f64 / self.config.tilt_steps_per_deg,
        )
    }

    fn axis(&self, offset_deg: f64, steps_per_deg: f64) -> i32 {
        if !offset_deg.is_finite() || offset_deg.abs() <= self.config.dead_zone_deg {
            return 0;
        }
        let max = self.config.max_step as f64;
        // Truncates toward zero
        (offset_deg * steps_per_deg).clamp(-max, max) as i32
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn result(mode: TrackingMode, pan: f64, tilt: f64, confidence: f64) -> FusionResult {
        let mut result = FusionResult::hold(mode);
        result.pan_offset_deg = pan;
        result.tilt_offset_deg = tilt;
        result.confidence = confidence;
        result
    }

    #[test]
    fn test_low_confidence_holds() {
        let actuator = Actuator::new(ActuationConfig::default());
        let cmd = actuator.command(&result(TrackingMode::Visual, 20.0, 10.0, 0.05));
        assert!(cmd.is_zero());
    }

    #[test]
    fn test_idle_holds() {
        let actuator = Actuator::new(ActuationConfig::default());
        let cmd = actuator.command(&result(TrackingMode::Idle, 20.0, 10.0, 1.0));
        assert!(cmd.is_zero());
    }

    #[test]
    fn test_dead_zone() {
        let actuator = Actuator::new(ActuationConfig::default());
        let cmd = actuator.command(&result(TrackingMode::Visual, 1.5, -10.0, 0.9));
        assert_eq!(cmd.pan_steps, 0);
        assert_eq!(cmd.tilt_steps, -13);
    }

    #[test]
    fn test_clamped_to_max_step() {
        let actuator = Actuator::new(ActuationConfig::default());
        let cmd = actuator.command(&result(TrackingMode::GpsPrimary, -170.0, 80.0, 0.5));
        assert_eq!(cmd.pan_steps, -150);
        assert_eq!(cmd.tilt_steps, 104);
    }

    #[test]
    fn test_prediction_blend_only_when_assisted() {
        let actuator = Actuator::new(ActuationConfig::default());

        let mut assisted = result(TrackingMode::GpsAssisted, 10.0, 0.0, 1.0);
        assisted.predicted_pan_deg = Some(20.0);
        assisted.predicted_tilt_deg = Some(0.0);
        // 0.7 * 10 + 0.3 * 20 = 13 degrees
        assert_eq!(actuator.command(&assisted).pan_steps, 16);

        let mut visual = assisted.clone();
        visual.mode = TrackingMode::Visual;
        assert_eq!(actuator.command(&visual).pan_steps, 13);
    }

    #[test]
    fn test_degrees_inverts_command() {
        let actuator = Actuator::new(ActuationConfig::default());
        let (pan, tilt) = actuator.degrees(StepCommand {
            pan_steps: 13,
            tilt_steps: -26,
        });
        assert!((pan - 10.0).abs() < 1e-9);
        assert!((tilt + 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_config_validation() {
        assert!(ActuationConfig::default().validate().is_ok());
        let config = ActuationConfig {
            max_step: 0,
            ..ActuationConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
