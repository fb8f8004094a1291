//! Error types for the fusion engine

use gimbal_core::CoreError;
use gimbal_predict::PredictError;
use thiserror::Error;

/// Errors returned by the fusion engine
///
/// `InvalidObservation` is non-fatal: the offending observation was discarded
/// and engine state is unchanged. The other variants only occur at
/// construction.
#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid observation: {source}")]
    InvalidObservation {
        #[from]
        source: CoreError,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Predictor error: {0}")]
    Predictor(#[from] PredictError),
}

impl FusionError {
    pub fn invalid_observation(msg: impl Into<String>) -> Self {
        Self::InvalidObservation {
            source: CoreError::invalid_observation(msg),
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn is_invalid_observation(&self) -> bool {
        matches!(self, Self::InvalidObservation { .. })
    }
}

pub type FusionOutcome<T> = Result<T, FusionError>;
