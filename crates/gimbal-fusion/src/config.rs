//! Configuration for the fusion engine

use crate::{FusionError, FusionOutcome};
use gimbal_core::TargetId;
use gimbal_predict::PredictorConfig;
use serde::{Deserialize, Serialize};

/// Configuration for the fusion engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Vision is fresh while its age is at most this
    pub visual_timeout_secs: f64,
    /// GPS is fresh while the remote fix age is at most this
    pub gps_timeout_secs: f64,
    /// Latency estimate the GPS solution is extrapolated over
    pub prediction_horizon_secs: f64,
    /// Detections below this still count for freshness but are not blended
    pub min_vision_confidence: f64,
    /// Camera field of view
    pub horizontal_fov_deg: f64,
    pub vertical_fov_deg: f64,
    /// Confidence reported while pointing from GPS alone
    pub gps_primary_confidence: f64,
    /// Mounting heights above ground, folded into the GPS tilt
    pub gimbal_height_m: f64,
    pub target_height_m: f64,
    /// Minimum remote speed for its course to be trusted as a velocity hint
    pub course_speed_threshold: f64,
    /// Silence after which predictor state is dropped
    pub search_timeout_secs: f64,
    /// Pinhole model for the expected subject height diagnostic
    pub focal_length_px: f64,
    pub frame_height_px: f64,
    /// Identity both predictors key the subject under
    pub target_id: TargetId,
    /// GPS track tuning (meters)
    pub gps_predictor: PredictorConfig,
    /// Vision track tuning (degrees)
    pub vision_predictor: PredictorConfig,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            visual_timeout_secs: 1.0,
            gps_timeout_secs: 5.0,
            prediction_horizon_secs: 0.5,
            min_vision_confidence: 0.3,
            horizontal_fov_deg: 60.0,
            vertical_fov_deg: 45.0,
            gps_primary_confidence: 0.5,
            gimbal_height_m: 1.0,
            target_height_m: 1.7,
            course_speed_threshold: 0.5,
            search_timeout_secs: 30.0,
            focal_length_px: 500.0,
            frame_height_px: 480.0,
            target_id: TargetId::default(),
            gps_predictor: PredictorConfig::gps(),
            vision_predictor: PredictorConfig::vision(),
        }
    }
}

impl FusionConfig {
    /// Fail fast on values the engine cannot work with
    pub fn validate(&self) -> FusionOutcome<()> {
        let positive = [
            ("visual_timeout_secs", self.visual_timeout_secs),
            ("gps_timeout_secs", self.gps_timeout_secs),
            ("search_timeout_secs", self.search_timeout_secs),
            ("focal_length_px", self.focal_length_px),
            ("frame_height_px", self.frame_height_px),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(FusionError::configuration(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        let non_negative = [
            ("prediction_horizon_secs", self.prediction_horizon_secs),
            ("gimbal_height_m", self.gimbal_height_m),
            ("target_height_m", self.target_height_m),
            ("course_speed_threshold", self.course_speed_threshold),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(FusionError::configuration(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }

        for (name, value) in [
            ("min_vision_confidence", self.min_vision_confidence),
            ("gps_primary_confidence", self.gps_primary_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(FusionError::configuration(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        for (name, value) in [
            ("horizontal_fov_deg", self.horizontal_fov_deg),
            ("vertical_fov_deg", self.vertical_fov_deg),
        ] {
            if !value.is_finite() || value <= 0.0 || value >= 180.0 {
                return Err(FusionError::configuration(format!(
                    "{name} must be within (0, 180), got {value}"
                )));
            }
        }

        if self.target_id.as_str().is_empty() {
            return Err(FusionError::configuration("target_id must not be empty"));
        }

        self.gps_predictor.validate()?;
        self.vision_predictor.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = FusionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.visual_timeout_secs, 1.0);
        assert_eq!(config.gps_timeout_secs, 5.0);
        assert_eq!(config.gps_primary_confidence, 0.5);
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = FusionConfig {
            horizontal_fov_deg: 0.0,
            ..FusionConfig::default()
        };
        assert!(matches!(config.validate(), Err(FusionError::Configuration(_))));

        let config = FusionConfig {
            min_vision_confidence: 1.5,
            ..FusionConfig::default()
        };
        assert!(config.validate().is_err());

        let config = FusionConfig {
            gps_timeout_secs: f64::NAN,
            ..FusionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_predictor_tuning() {
        let mut config = FusionConfig::default();
        config.vision_predictor.process_noise = 0.0;
        assert!(matches!(config.validate(), Err(FusionError::Predictor(_))));
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: FusionConfig =
            serde_json::from_str(r#"{"visual_timeout_secs": 0.5, "target_id": "rider"}"#).unwrap();
        assert_eq!(config.visual_timeout_secs, 0.5);
        assert_eq!(config.gps_timeout_secs, 5.0);
        assert_eq!(config.target_id.as_str(), "rider");
    }
}
