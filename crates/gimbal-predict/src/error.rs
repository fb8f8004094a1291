//! Error types for the prediction module

use thiserror::Error;

/// Errors that can occur while configuring or running the predictor
#[derive(Error, Debug)]
pub enum PredictError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PredictError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

pub type PredictResult<T> = Result<T, PredictError>;
