//! Identity-keyed motion prediction
//!
//! Holds one Kalman track per subject. Samples arrive with their capture
//! time; the track keeps its own clock so gaps and out-of-order stamps are
//! handled without the caller tracking elapsed time.

use crate::{KalmanTracker, PredictResult, PredictorConfig};
use chrono::{DateTime, Utc};
use gimbal_core::{TargetId, seconds_between};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

/// One position measurement handed to the predictor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub x: f64,
    pub y: f64,
    /// Velocity known from another source (e.g. GPS course over ground)
    pub velocity_hint: Option<(f64, f64)>,
    /// Measurement variance; the configured noise is used when absent
    pub variance: Option<f64>,
}

impl PositionSample {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            velocity_hint: None,
            variance: None,
        }
    }

    pub fn with_velocity_hint(mut self, vx: f64, vy: f64) -> Self {
        self.velocity_hint = Some((vx, vy));
        self
    }

    pub fn with_variance(mut self, variance: f64) -> Self {
        self.variance = Some(variance);
        self
    }
}

/// Read-only view of one track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub position: (f64, f64),
    pub velocity: (f64, f64),
    /// Mean position variance, in squared track units
    pub position_variance: f64,
    /// Measurements absorbed since the track was (re)initialized
    pub updates: u64,
    pub last_update: DateTime<Utc>,
}

/// Constant-velocity predictor over any number of subjects
#[derive(Debug, Clone)]
pub struct Predictor {
    config: PredictorConfig,
    tracks: HashMap<TargetId, TrackState>,
}

#[derive(Debug, Clone)]
struct TrackState {
    kalman: KalmanTracker,
    last_update: DateTime<Utc>,
}

impl Predictor {
    /// Create a predictor, failing on unusable noise constants
    pub fn new(config: PredictorConfig) -> PredictResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            tracks: HashMap::new(),
        })
    }

    /// Incorporate a new sample for `target`
    ///
    /// A gap longer than `max_gap_secs` restarts the track at the sample, so
    /// velocity learned before the gap is dropped (or replaced by the hint).
    pub fn update(&mut self, target: &TargetId, sample: PositionSample, timestamp: DateTime<Utc>) {
        let variance = sample
            .variance
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(self.config.measurement_noise);
        let max_gap = self.config.max_gap_secs;

        match self.tracks.get_mut(target) {
            Some(track) => {
                let dt = seconds_between(track.last_update, timestamp);
                if dt > max_gap {
                    debug!("Track {} restarted after {:.2}s gap", target, dt);
                    track
                        .kalman
                        .initialize(sample.x, sample.y, sample.velocity_hint, variance);
                } else {
                    track
                        .kalman
                        .update_with_noise(sample.x, sample.y, dt, variance);
                }
                if timestamp > track.last_update {
                    track.last_update = timestamp;
                }
            }
            None => {
                let mut kalman = KalmanTracker::from_config(&self.config);
                kalman.initialize(sample.x, sample.y, sample.velocity_hint, variance);
                debug!("Track {} started at ({:.2}, {:.2})", target, sample.x, sample.y);
                self.tracks.insert(
                    target.clone(),
                    TrackState {
                        kalman,
                        last_update: timestamp,
                    },
                );
            }
        }

        trace!("Track {} updated at {}", target, timestamp);
    }

    /// Position of `target` extrapolated `horizon_secs` past its last update
    pub fn predict(&self, target: &TargetId, horizon_secs: f64) -> Option<(f64, f64)> {
        self.tracks
            .get(target)
            .map(|track| track.kalman.extrapolate(horizon_secs))
    }

    /// Filtered position at the last update
    pub fn position(&self, target: &TargetId) -> Option<(f64, f64)> {
        self.tracks.get(target).map(|track| track.kalman.position())
    }

    pub fn velocity(&self, target: &TargetId) -> Option<(f64, f64)> {
        self.tracks.get(target).map(|track| track.kalman.velocity())
    }

    pub fn summary(&self, target: &TargetId) -> Option<TrackSummary> {
        self.tracks.get(target).map(|track| TrackSummary {
            position: track.kalman.position(),
            velocity: track.kalman.velocity(),
            position_variance: track.kalman.position_variance(),
            updates: track.kalman.update_count(),
            last_update: track.last_update,
        })
    }

    pub fn contains(&self, target: &TargetId) -> bool {
        self.tracks.contains_key(target)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Drop every track
    pub fn reset(&mut self) {
        if !self.tracks.is_empty() {
            debug!("Clearing {} predictor tracks", self.tracks.len());
        }
        self.tracks.clear();
    }

    /// Drop one track, returning whether it existed
    pub fn reset_target(&mut self, target: &TargetId) -> bool {
        self.tracks.remove(target).is_some()
    }
}

// ============================================================================
// TESTS
// ============================================================================
