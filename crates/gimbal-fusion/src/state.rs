//! Fusion state and snapshots

use crate::{FusionConfig, FusionOutcome, ModeSelector};
use chrono::{DateTime, Utc};
use gimbal_core::{
    GeoPoint, LocalFrame, RelativePosition, TargetId, TrackingMode, VisionObservation,
    seconds_between,
};
use gimbal_predict::{Predictor, TrackSummary};
use serde::{Deserialize, Serialize};

/// Everything the engine knows, owned behind the engine lock
#[derive(Debug, Clone)]
pub struct FusionState {
    pub(crate) selector: ModeSelector,
    pub(crate) last_vision: Option<VisionObservation>,
    pub(crate) last_base: Option<GeoPoint>,
    pub(crate) last_remote: Option<GeoPoint>,
    pub(crate) last_relative: Option<RelativePosition>,
    /// Tangent plane anchored at the first base fix since reset
    pub(crate) local_frame: Option<LocalFrame>,
    /// Key of the subject in both predictors
    pub(crate) target_id: TargetId,
    pub(crate) gps_predictor: Predictor,
    pub(crate) vision_predictor: Predictor,
    pub(crate) stats: FusionStats,
}

impl FusionState {
    pub fn new(config: &FusionConfig) -> FusionOutcome<Self> {
        Ok(Self {
            selector: ModeSelector::new(config.visual_timeout_secs, config.gps_timeout_secs),
            last_vision: None,
            last_base: None,
            last_remote: None,
            last_relative: None,
            local_frame: None,
            target_id: config.target_id.clone(),
            gps_predictor: Predictor::new(config.gps_predictor.clone())?,
            vision_predictor: Predictor::new(config.vision_predictor.clone())?,
            stats: FusionStats::default(),
        })
    }

    pub fn mode(&self) -> TrackingMode {
        self.selector.current()
    }

    /// Capture time of the newest observation of any kind
    pub(crate) fn latest_observation(&self) -> Option<DateTime<Utc>> {
        let vision = self.last_vision.as_ref().map(|v| v.captured_at);
        let gps = self.last_remote.as_ref().map(|r| r.captured_at);
        vision.max(gps)
    }

    /// Age of the last vision observation at `now`, infinite if none
    pub(crate) fn vision_age(&self, now: DateTime<Utc>) -> f64 {
        self.last_vision
            .as_ref()
            .map_or(f64::INFINITY, |v| seconds_between(v.captured_at, now))
    }

    /// Age of the last remote fix at `now`; infinite unless both ends of the
    /// geometry are known
    pub(crate) fn gps_age(&self, now: DateTime<Utc>) -> f64 {
        match (&self.last_base, &self.last_remote) {
            (Some(_), Some(remote)) => seconds_between(remote.captured_at, now),
            _ => f64::INFINITY,
        }
    }

    /// Drop every motion estimate
    pub(crate) fn clear_predictors(&mut self) {
        self.gps_predictor.reset();
        self.vision_predictor.reset();
    }

    /// Back to the startup state, keeping counters
    pub(crate) fn clear(&mut self) {
        self.selector.reset();
        self.last_vision = None;
        self.last_base = None;
        self.last_remote = None;
        self.last_relative = None;
        self.local_frame = None;
        self.clear_predictors();
    }

    pub fn snapshot(&self, taken_at: DateTime<Utc>) -> FusionSnapshot {
        FusionSnapshot {
            mode: self.mode(),
            last_vision: self.last_vision.clone(),
            last_base: self.last_base.clone(),
            last_remote: self.last_remote.clone(),
            last_relative: self.last_relative,
            gps_tracks: self.gps_predictor.track_count(),
            vision_tracks: self.vision_predictor.track_count(),
            gps_track: self.gps_predictor.summary(&self.target_id),
            vision_track: self.vision_predictor.summary(&self.target_id),
            stats: self.stats.clone(),
            taken_at,
        }
    }
}

/// Serializable view of the engine state
///
/// Predictor internals are summarized as track counts; filter covariance is
/// not part of the persisted view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionSnapshot {
    pub mode: TrackingMode,
    pub last_vision: Option<VisionObservation>,
    pub last_base: Option<GeoPoint>,
    pub last_remote: Option<GeoPoint>,
    pub last_relative: Option<RelativePosition>,
    pub gps_tracks: usize,
    pub vision_tracks: usize,
    /// Subject track in local east/north meters
    pub gps_track: Option<TrackSummary>,
    /// Subject track in gimbal-relative degrees
    pub vision_track: Option<TrackSummary>,
    pub stats: FusionStats,
    pub taken_at: DateTime<Utc>,
}

/// Engine counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionStats {
    pub vision_accepted: u64,
    pub vision_rejected: u64,
    pub gps_accepted: u64,
    pub gps_rejected: u64,
    pub computes: u64,
    pub mode_changes: u64,
    pub search_timeouts: u64,
    pub resets: u64,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_empty_state() {
        let state = FusionState::new(&FusionConfig::default()).unwrap();
        let now = Utc::now();

        assert_eq!(state.mode(), TrackingMode::Idle);
        assert_eq!(state.vision_age(now), f64::INFINITY);
        assert_eq!(state.gps_age(now), f64::INFINITY);
        assert_eq!(state.latest_observation(), None);
    }

    #[test]
    fn test_gps_age_needs_both_roles() {
        let mut state = FusionState::new(&FusionConfig::default()).unwrap();
        let t0 = Utc::now();
        state.last_remote = Some(GeoPoint::new(37.0, -122.0, t0));
        assert_eq!(state.gps_age(t0), f64::INFINITY);

        state.last_base = Some(GeoPoint::new(37.0, -122.001, t0));
        let age = state.gps_age(t0 + Duration::seconds(2));
        assert!((age - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut state = FusionState::new(&FusionConfig::default()).unwrap();
        let now = Utc::now();
        state.last_vision = Some(VisionObservation::new(0.1, 0.2, 0.9, now));
        state.stats.vision_accepted = 1;

        let snapshot = state.snapshot(now);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"mode\":\"IDLE\""));

        let back: FusionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.mode, TrackingMode::Idle);
        assert_eq!(back.stats, snapshot.stats);
        assert!(back.last_vision.is_some());
        assert!(back.gps_track.is_none());
    }

    #[test]
    fn test_snapshot_summarizes_subject_tracks() {
        let config = FusionConfig::default();
        let mut state = FusionState::new(&config).unwrap();
        let t0 = Utc::now();
        state.vision_predictor.update(
            &config.target_id,
            gimbal_predict::PositionSample::new(3.0, -1.0),
            t0,
        );

        let snapshot = state.snapshot(t0);
        let track = snapshot.vision_track.unwrap();
        assert_eq!(track.updates, 1);
        assert_eq!(track.last_update, t0);
        assert_eq!(track.velocity, (0.0, 0.0));
        assert!(track.position_variance > 0.0);
        assert!(snapshot.gps_track.is_none());
    }
}
