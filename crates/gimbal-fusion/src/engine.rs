//! Pointing solution for each tracking mode
//!
//! Everything here reads engine state and returns a value; the caller holds
//! the lock and records the mode.

use crate::{FusionConfig, FusionState};
use chrono::{DateTime, Utc};
use gimbal_core::{
    FusionResult, GeoPoint, RelativePosition, TrackingMode, VisionObservation,
    expected_target_height_px, relative_position, tilt_angle,
};
use tracing::{trace, warn};

/// Pan/tilt in degrees
pub type Offset = (f64, f64);

/// Vision offset scaled to degrees by half the field of view
///
/// Positive tilt is up, so the image-row offset is negated.
pub fn vision_offset(observation: &VisionObservation, config: &FusionConfig) -> Offset {
    (
        observation.offset_x * config.horizontal_fov_deg / 2.0,
        -observation.offset_y * config.vertical_fov_deg / 2.0,
    )
}

/// Gimbal-relative pan/tilt toward the remote
///
/// The tilt aims at the subject's center of mass, so the mounting heights
/// are folded into the altitude difference.
pub fn gps_offset(relative: &RelativePosition, config: &FusionConfig) -> Offset {
    let height_delta =
        relative.altitude_delta_m + (config.target_height_m - config.gimbal_height_m);
    (
        relative.relative_bearing_deg,
        tilt_angle(height_delta, relative.distance_m),
    )
}

/// Weighted average, `weight` applied to `primary`
pub fn blend(primary: Offset, secondary: Offset, weight: f64) -> Offset {
    (
        weight * primary.0 + (1.0 - weight) * secondary.0,
        weight * primary.1 + (1.0 - weight) * secondary.1,
    )
}

/// GPS offset toward where the remote will be after the prediction horizon
fn predicted_gps_offset(state: &FusionState, config: &FusionConfig) -> Option<Offset> {
    let base = state.last_base.as_ref()?;
    let remote = state.last_remote.as_ref()?;
    let frame = state.local_frame?;

    let (east, north) = state
        .gps_predictor
        .predict(&config.target_id, config.prediction_horizon_secs)?;
    let (latitude, longitude) = frame.to_geodetic(east, north);
    let predicted = GeoPoint {
        latitude,
        longitude,
        ..remote.clone()
    };

    let relative = relative_position(base, &predicted).ok()?;
    trace!(
        "Predicted remote at ({:.6}, {:.6}), {:.1}m away",
        latitude, longitude, relative.distance_m
    );
    Some(gps_offset(&relative, config))
}

/// Compute the pointing result for `mode`
pub(crate) fn solve(state: &FusionState, config: &FusionConfig, mode: TrackingMode) -> FusionResult {
    let horizon = config.prediction_horizon_secs;

    let vision = state.last_vision.as_ref();
    let vision_now = vision.map(|v| vision_offset(v, config));
    let vision_ahead = state
        .vision_predictor
        .predict(&config.target_id, horizon)
        .or(vision_now);

    let gps_now = state.last_relative.as_ref().map(|r| gps_offset(r, config));
    let gps_ahead = predicted_gps_offset(state, config).or(gps_now);
    let gps_time = state.last_remote.as_ref().map(|r| r.captured_at);

    let solution = match mode {
        TrackingMode::Idle | TrackingMode::Searching => return FusionResult::hold(mode),
        TrackingMode::Visual => match (vision, vision_now) {
            (Some(v), Some(offset)) => {
                Some((offset, v.confidence, vision_ahead, Some(v.captured_at)))
            }
            _ => None,
        },
        TrackingMode::GpsPrimary => gps_ahead.map(|offset| {
            (offset, config.gps_primary_confidence, Some(offset), gps_time)
        }),
        TrackingMode::GpsAssisted => match (vision, vision_now, gps_ahead) {
            (Some(v), Some(v_offset), Some(g_offset)) => {
                let weight = if v.confidence >= config.min_vision_confidence {
                    v.confidence
                } else {
                    0.0
                };
                let ahead = vision_ahead.map(|va| blend(va, g_offset, weight));
                let freshest: Option<DateTime<Utc>> = Some(v.captured_at).max(gps_time);
                Some((blend(v_offset, g_offset, weight), 1.0, ahead, freshest))
            }
            _ => None,
        },
    };

    let Some(((pan, tilt), confidence, predicted, timestamp)) = solution else {
        warn!("No usable observation for {} mode, holding", mode);
        return FusionResult::hold(TrackingMode::Searching);
    };

    let mut result = FusionResult {
        mode,
        pan_offset_deg: pan,
        tilt_offset_deg: tilt,
        confidence,
        timestamp,
        gps_distance_m: None,
        gps_bearing_deg: None,
        predicted_pan_deg: predicted.map(|p| p.0),
        predicted_tilt_deg: predicted.map(|p| p.1),
        expected_target_height_px: None,
    };

    if let Some(relative) = state.last_relative.as_ref() {
        result.gps_distance_m = Some(relative.distance_m);
        result.gps_bearing_deg = Some(relative.bearing_deg);
        result.expected_target_height_px = Some(expected_target_height_px(
            relative.distance_m,
            config.target_height_m,
            config.focal_length_px,
            config.frame_height_px,
        ));
    }

    sanitize(result)
}

/// Keep NaN/Inf away from the caller and clamp to the gimbal's range
fn sanitize(mut result: FusionResult) -> FusionResult {
    if !result.pan_offset_deg.is_finite()
        || !result.tilt_offset_deg.is_finite()
        || !result.confidence.is_finite()
    {
        warn!(
            "Non-finite {} solution (pan {}, tilt {}), degrading to SEARCHING",
            result.mode, result.pan_offset_deg, result.tilt_offset_deg
        );
        return FusionResult::hold(TrackingMode::Searching);
    }

    result.pan_offset_deg = result.pan_offset_deg.clamp(-180.0, 180.0);
    result.tilt_offset_deg = result.tilt_offset_deg.clamp(-90.0, 90.0);
    result.confidence = result.confidence.clamp(0.0, 1.0);

    let finite = |v: Option<f64>| v.filter(|x| x.is_finite());
    result.predicted_pan_deg = finite(result.predicted_pan_deg).map(|p| p.clamp(-180.0, 180.0));
    result.predicted_tilt_deg = finite(result.predicted_tilt_deg).map(|t| t.clamp(-90.0, 90.0));
    result.gps_distance_m = finite(result.gps_distance_m);
    result.gps_bearing_deg = finite(result.gps_bearing_deg);
    result.expected_target_height_px = finite(result.expected_target_height_px);
    result
}

// ============================================================================
// TESTS
// ============================================================================
