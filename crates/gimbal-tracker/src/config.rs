//! Tracker settings
//!
//! Layered as: built-in defaults, then an optional `gimbal-tracker.toml`,
//! then `GIMBAL__`-prefixed environment variables (`.env` is read first).
//! Nested keys use `__`, e.g. `GIMBAL__FUSION__VISUAL_TIMEOUT_SECS=0.8`.

use crate::actuation::ActuationConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::simulation::SimulationConfig;
use config::{Config, Environment, File};
use gimbal_fusion::FusionConfig;
use serde::{Deserialize, Serialize};

/// Default settings file, looked up relative to the working directory
pub const SETTINGS_FILE: &str = "gimbal-tracker";

/// Tracker binary configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// Actuation loop rate
    pub output_rate_hz: f64,
    /// Simulated camera frame rate
    pub vision_rate_hz: f64,
    /// Simulated relay fix rate
    pub gps_rate_hz: f64,
    /// How often the metrics exposition is logged at debug
    pub metrics_log_interval_secs: u64,
    pub fusion: FusionConfig,
    pub actuation: ActuationConfig,
    pub simulation: SimulationConfig,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            output_rate_hz: 30.0,
            vision_rate_hz: 15.0,
            gps_rate_hz: 1.0,
            metrics_log_interval_secs: 30,
            fusion: FusionConfig::default(),
            actuation: ActuationConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl TrackerSettings {
    /// Load settings from the default file and the environment
    pub fn load() -> TrackerResult<Self> {
        dotenvy::dotenv().ok();
        Self::load_from(SETTINGS_FILE)
    }

    /// Load settings with `path` (extension optional) as the file layer
    pub fn load_from(path: &str) -> TrackerResult<Self> {
        let settings: Self = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("GIMBAL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> TrackerResult<()> {
        for (name, rate) in [
            ("output_rate_hz", self.output_rate_hz),
            ("vision_rate_hz", self.vision_rate_hz),
            ("gps_rate_hz", self.gps_rate_hz),
        ] {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(TrackerError::invalid_settings(format!(
                    "{name} must be positive, got {rate}"
                )));
            }
        }
        if self.metrics_log_interval_secs == 0 {
            return Err(TrackerError::invalid_settings(
                "metrics_log_interval_secs must be at least 1",
            ));
        }

        self.fusion.validate()?;
        self.actuation.validate()?;
        self.simulation.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = TrackerSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.output_rate_hz, 30.0);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let settings = TrackerSettings::load_from("does-not-exist/gimbal-tracker").unwrap();
        assert_eq!(settings.fusion.gps_timeout_secs, 5.0);
        assert_eq!(settings.actuation.max_step, 150);
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let settings = TrackerSettings {
            output_rate_hz: 0.0,
            ..TrackerSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(TrackerError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_fusion_errors_propagate() {
        let mut settings = TrackerSettings::default();
        settings.fusion.horizontal_fov_deg = 500.0;
        assert!(matches!(settings.validate(), Err(TrackerError::Fusion(_))));
    }
}
