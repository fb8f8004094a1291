//! Tracker error types

use gimbal_fusion::FusionError;
use thiserror::Error;

/// Startup and wiring errors for the tracker binary
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Fusion error: {0}")]
    Fusion(#[from] FusionError),
}

impl TrackerError {
    pub fn invalid_settings(msg: impl Into<String>) -> Self {
        Self::InvalidSettings(msg.into())
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
