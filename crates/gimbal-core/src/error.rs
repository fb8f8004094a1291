//! Error types for the gimbal fusion tracker

use thiserror::Error;

/// Core error type shared by the domain model and geodesy helpers
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid coordinate: latitude={lat}, longitude={lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },

    #[error("Invalid observation: {0}")]
    InvalidObservation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn invalid_coordinate(lat: f64, lng: f64) -> Self {
        Self::InvalidCoordinate { lat, lng }
    }

    pub fn invalid_observation(msg: impl Into<String>) -> Self {
        Self::InvalidObservation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
