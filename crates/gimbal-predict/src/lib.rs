//! # Gimbal Predict - Motion Prediction Module
//!
//! Constant-velocity Kalman filtering for the fusion engine.
//! Features:
//! - 2D position/velocity filter with a variable time step
//! - Per-sample measurement variance (GPS horizontal accuracy)
//! - Identity-keyed tracks with gap detection
//! - Side-effect-free extrapolation over a latency horizon
//!
//! The same predictor is used for two signals with separate tuning: GPS in
//! meters on a local tangent plane, and vision offsets in degrees.

pub mod config;
pub mod error;
pub mod kalman;
pub mod predictor;

pub use config::PredictorConfig;
pub use error::{PredictError, PredictResult};
pub use kalman::KalmanTracker;
pub use predictor::{PositionSample, Predictor, TrackSummary};
