//! # Gimbal Core
//!
//! Core domain models and types for the gimbal fusion tracker.
//! This crate provides the types shared by the predictor, the fusion
//! engine and the tracker binary, plus the geodesy they all rely on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod error;
pub mod events;
pub mod fix;
pub mod geo;

pub use error::{CoreError, CoreResult};
pub use events::*;
pub use fix::{FixRole, LocationFix};
pub use geo::*;

// ============================================================================
// TARGET IDENTITY
// ============================================================================

/// Identity of a tracked subject
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId(pub String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new("subject")
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TargetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// VISION
// ============================================================================

/// One detection from the camera pipeline
///
/// Offsets are the bounding-box center relative to the frame center,
/// normalized to [-1, 1]: `offset_x` is positive right of center and
/// `offset_y` is positive below center (image rows grow downward).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionObservation {
    pub offset_x: f64,
    pub offset_y: f64,
    /// Detector confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Normalized bounding-box width, when the detector reports it
    pub width: Option<f64>,
    /// Normalized bounding-box height
    pub height: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

impl VisionObservation {
    pub fn new(offset_x: f64, offset_y: f64, confidence: f64, captured_at: DateTime<Utc>) -> Self {
        Self {
            offset_x,
            offset_y,
            confidence,
            width: None,
            height: None,
            captured_at,
        }
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Reject offsets outside [-1, 1], confidences outside [0, 1] and
    /// anything non-finite
    pub fn validate(&self) -> CoreResult<()> {
        let offset_ok = |v: f64| v.is_finite() && (-1.0..=1.0).contains(&v);
        if !offset_ok(self.offset_x) || !offset_ok(self.offset_y) {
            return Err(CoreError::invalid_observation(format!(
                "vision offset ({}, {}) outside [-1, 1]",
                self.offset_x, self.offset_y
            )));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(CoreError::invalid_observation(format!(
                "vision confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        for size in [self.width, self.height].into_iter().flatten() {
            if !size.is_finite() || !(0.0..=1.0).contains(&size) {
                return Err(CoreError::invalid_observation(format!(
                    "vision box size {size} outside [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// TRACKING MODE
// ============================================================================

/// Which sensors the engine currently trusts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingMode {
    /// Nothing acquired since start or since the last reset
    Idle,
    /// Vision only
    Visual,
    /// Vision primary, GPS blended in
    GpsAssisted,
    /// Target lost visually, pointing from GPS
    GpsPrimary,
    /// Both sensors stale after having tracked
    Searching,
}

impl TrackingMode {
    pub const ALL: [TrackingMode; 5] = [
        TrackingMode::Idle,
        TrackingMode::Visual,
        TrackingMode::GpsAssisted,
        TrackingMode::GpsPrimary,
        TrackingMode::Searching,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingMode::Idle => "IDLE",
            TrackingMode::Visual => "VISUAL",
            TrackingMode::GpsAssisted => "GPS_ASSISTED",
            TrackingMode::GpsPrimary => "GPS_PRIMARY",
            TrackingMode::Searching => "SEARCHING",
        }
    }

    /// Whether the mode produces a pointing command
    pub fn is_tracking(&self) -> bool {
        matches!(
            self,
            TrackingMode::Visual | TrackingMode::GpsAssisted | TrackingMode::GpsPrimary
        )
    }
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for TrackingMode {
    fn default() -> Self {
        Self::Idle
    }
}

// ============================================================================
// FUSION OUTPUT
// ============================================================================

/// Output of one fusion cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub mode: TrackingMode,
    /// Pan delta in degrees, positive to the right
    pub pan_offset_deg: f64,
    /// Tilt delta in degrees, positive up
    pub tilt_offset_deg: f64,
    /// Combined confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Capture time of the freshest observation that contributed
    pub timestamp: Option<DateTime<Utc>>,
    /// Distance to the subject from the last GPS geometry
    pub gps_distance_m: Option<f64>,
    /// Absolute bearing to the subject from the last GPS geometry
    pub gps_bearing_deg: Option<f64>,
    /// Pan extrapolated over the prediction horizon
    pub predicted_pan_deg: Option<f64>,
    /// Tilt extrapolated over the prediction horizon
    pub predicted_tilt_deg: Option<f64>,
    /// Expected subject height in pixels at the GPS distance
    pub expected_target_height_px: Option<f64>,
}

impl FusionResult {
    /// Zero offset, zero confidence: hold the last commanded position
    pub fn hold(mode: TrackingMode) -> Self {
        Self {
            mode,
            pan_offset_deg: 0.0,
            tilt_offset_deg: 0.0,
            confidence: 0.0,
            timestamp: None,
            gps_distance_m: None,
            gps_bearing_deg: None,
            predicted_pan_deg: None,
            predicted_tilt_deg: None,
            expected_target_height_px: None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.mode.is_tracking() && self.confidence > 0.0
    }
}

/// Seconds elapsed from `earlier` to `later`, never negative
///
/// Observations stamped slightly in the future (clock skew between devices)
/// count as age 0.
pub fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    match later.signed_duration_since(earlier).num_microseconds() {
        Some(us) => (us as f64 / 1_000_000.0).max(0.0),
        None => f64::INFINITY,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_vision_validation() {
        let now = Utc::now();
        assert!(VisionObservation::new(0.2, -0.4, 0.9, now).validate().is_ok());
        assert!(VisionObservation::new(1.0, -1.0, 0.0, now).validate().is_ok());

        assert!(VisionObservation::new(1.2, 0.0, 0.9, now).validate().is_err());
        assert!(VisionObservation::new(0.0, f64::NAN, 0.9, now).validate().is_err());
        assert!(VisionObservation::new(0.0, 0.0, 1.5, now).validate().is_err());
        assert!(
            VisionObservation::new(0.0, 0.0, 0.5, now)
                .with_size(2.0, 0.1)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_tracking_mode_display() {
        assert_eq!(TrackingMode::GpsAssisted.to_string(), "GPS_ASSISTED");
        assert_eq!(TrackingMode::default(), TrackingMode::Idle);
        assert!(!TrackingMode::Searching.is_tracking());
        assert!(TrackingMode::GpsPrimary.is_tracking());
    }

    #[test]
    fn test_hold_result() {
        let result = FusionResult::hold(TrackingMode::Searching);
        assert_eq!(result.pan_offset_deg, 0.0);
        assert_eq!(result.tilt_offset_deg, 0.0);
        assert_eq!(result.confidence, 0.0);
        assert!(!result.is_tracking());
    }

    #[test]
    fn test_seconds_between() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::milliseconds(1500);

        assert!((seconds_between(t0, t1) - 1.5).abs() < 1e-9);
        assert_eq!(seconds_between(t1, t0), 0.0);
    }

    #[test]
    fn test_target_id() {
        let id = TargetId::from("runner");
        assert_eq!(id.as_str(), "runner");
        assert_eq!(TargetId::default().to_string(), "subject");
    }
}
