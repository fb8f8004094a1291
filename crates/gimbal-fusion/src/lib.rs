//! # Gimbal Fusion - Tracking Orchestration
//!
//! Fuses camera detections and GPS fixes into a single pan/tilt command.
//!
//! ## Features
//! - Five-state tracking mode machine driven by observation freshness
//! - Vision/GPS blending with latency-compensated GPS prediction
//! - Boundary validation; a bad observation never touches state
//! - Event bus for mode changes, rejections and resets
//!
//! The engine does no I/O and runs no background task. Producers call the
//! `ingest_*` methods from any thread; the actuation loop polls `compute`.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod mode;
pub mod state;

pub use config::FusionConfig;
pub use error::{FusionError, FusionOutcome};
pub use events::EventBus;
pub use mode::{Freshness, ModeSelector};
pub use state::{FusionSnapshot, FusionState, FusionStats};

use gimbal_core::{
    CoreError, CoreResult, FusionEvent, FusionResult, GeoPoint, LocalFrame, ObservationSource,
    RelativePosition, TrackingMode, VisionObservation, relative_position, seconds_between,
    velocity_from_course,
};
use gimbal_predict::PositionSample;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Handle to the fusion engine
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct FusionCore {
    config: Arc<FusionConfig>,
    state: Arc<RwLock<FusionState>>,
    events: EventBus,
}

impl FusionCore {
    /// Create an engine in IDLE, failing on invalid configuration
    pub fn new(config: FusionConfig) -> FusionOutcome<Self> {
        config.validate()?;
        let state = FusionState::new(&config)?;

        info!(
            "Fusion core ready: visual timeout {}s, gps timeout {}s, horizon {}s",
            config.visual_timeout_secs, config.gps_timeout_secs, config.prediction_horizon_secs
        );

        Ok(Self {
            config: Arc::new(config),
            state: Arc::new(RwLock::new(state)),
            events: EventBus::default(),
        })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<FusionEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ------------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------------

    /// Store a detection and feed the vision predictor
    ///
    /// Detections below `min_vision_confidence` refresh the vision age but
    /// do not move the predictor.
    pub fn ingest_vision(&self, observation: VisionObservation) -> FusionOutcome<()> {
        let mut state = self.state.write();
        match self.apply_vision(&mut state, observation) {
            Ok(expired) => {
                state.stats.vision_accepted += 1;
                drop(state);
                if let Some(event) = expired {
                    self.events.publish(event);
                }
                Ok(())
            }
            Err(error) => {
                state.stats.vision_rejected += 1;
                drop(state);
                Err(self.rejected(ObservationSource::Vision, error))
            }
        }
    }

    /// Store a base/remote pair, feed the GPS predictor and return the
    /// current geometry from base to remote
    pub fn ingest_gps(&self, base: GeoPoint, remote: GeoPoint) -> FusionOutcome<RelativePosition> {
        let mut state = self.state.write();
        match self.apply_gps(&mut state, base, remote) {
            Ok((relative, expired)) => {
                state.stats.gps_accepted += 1;
                drop(state);
                if let Some(event) = expired {
                    self.events.publish(event);
                }
                Ok(relative)
            }
            Err(error) => {
                state.stats.gps_rejected += 1;
                drop(state);
                Err(self.rejected(ObservationSource::Gps, error))
            }
        }
    }

    fn apply_vision(
        &self,
        state: &mut FusionState,
        observation: VisionObservation,
    ) -> CoreResult<Option<FusionEvent>> {
        observation.validate()?;
        let clock_reset = match state.last_vision.as_ref() {
            Some(last) if observation.captured_at < last.captured_at => {
                // A jump back further than the search timeout is a camera
                // clock reset, not a late frame
                let behind = seconds_between(observation.captured_at, last.captured_at);
                if behind <= self.config.search_timeout_secs {
                    return Err(CoreError::invalid_observation(format!(
                        "vision frame at {} is older than the last one at {}",
                        observation.captured_at, last.captured_at
                    )));
                }
                Some(behind)
            }
            _ => None,
        };

        let at = observation.captured_at;
        let expired = self.search_expired(state, at);
        let event = expired.map(|idle| self.expire(state, idle, at));
        if let Some(behind) = clock_reset {
            info!("Vision clock moved back {:.1}s, restarting the vision track", behind);
            state.vision_predictor.reset_target(&self.config.target_id);
        }

        if observation.confidence >= self.config.min_vision_confidence {
            let (pan, tilt) = engine::vision_offset(&observation, &self.config);
            state
                .vision_predictor
                .update(&self.config.target_id, PositionSample::new(pan, tilt), at);
        }

        debug!(
            "Vision ({:.3}, {:.3}) conf {:.2}",
            observation.offset_x, observation.offset_y, observation.confidence
        );
        state.last_vision = Some(observation);
        Ok(event)
    }

    fn apply_gps(
        &self,
        state: &mut FusionState,
        base: GeoPoint,
        remote: GeoPoint,
    ) -> CoreResult<(RelativePosition, Option<FusionEvent>)> {
        base.validate()?;
        remote.validate()?;
        let base_restarted = check_sequence("base", state.last_base.as_ref(), &base, false)?;
        let remote_restarted = check_sequence("remote", state.last_remote.as_ref(), &remote, true)?;

        let relative = relative_position(&base, &remote)?;

        let at = remote.captured_at;
        let expired = self.search_expired(state, at);
        let frame = match (state.local_frame, expired) {
            (Some(frame), None) => frame,
            _ => LocalFrame::new(&base)?,
        };
        let (east, north) = frame.to_local(&remote)?;

        // Validation done; commit
        let event = expired.map(|idle| self.expire(state, idle, at));
        if base_restarted || remote_restarted {
            info!(
                "Relay sequence restarted (base #{}, remote #{})",
                base.sequence, remote.sequence
            );
        }
        if state.local_frame.is_none() {
            debug!("Local frame anchored at ({:.6}, {:.6})", base.latitude, base.longitude);
        }
        state.local_frame = Some(frame);

        let mut sample = PositionSample::new(east, north);
        if let Some(course) = remote.course_over_ground(self.config.course_speed_threshold) {
            let speed = remote.speed.unwrap_or(0.0);
            let (ve, vn) = velocity_from_course(speed, course);
            sample = sample.with_velocity_hint(ve, vn);
        }
        if let Some(accuracy) = remote.horizontal_accuracy {
            sample = sample.with_variance(accuracy * accuracy);
        }
        state.gps_predictor.update(&self.config.target_id, sample, at);

        debug!(
            "GPS remote #{} at {:.1}m bearing {:.1} (relative {:.1})",
            remote.sequence, relative.distance_m, relative.bearing_deg, relative.relative_bearing_deg
        );

        state.last_base = Some(base);
        state.last_remote = Some(remote);
        state.last_relative = Some(relative);
        Ok((relative, event))
    }

    /// Seconds of silence before `at`, if longer than the search timeout
    fn search_expired(&self, state: &FusionState, at: DateTime<Utc>) -> Option<f64> {
        state
            .latest_observation()
            .map(|latest| seconds_between(latest, at))
            .filter(|idle| *idle > self.config.search_timeout_secs)
    }

    fn expire(&self, state: &mut FusionState, idle_secs: f64, at: DateTime<Utc>) -> FusionEvent {
        info!("No observation for {:.1}s, dropping motion estimates", idle_secs);
        state.clear_predictors();
        state.local_frame = None;
        state.stats.search_timeouts += 1;
        FusionEvent::search_timed_out(at, idle_secs)
    }

    fn rejected(&self, source: ObservationSource, error: CoreError) -> FusionError {
        warn!("Rejected {} observation: {}", source.as_str(), error);
        self.events.publish(FusionEvent::observation_rejected(
            Utc::now(),
            source,
            error.to_string(),
        ));
        FusionError::from(error)
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    /// Select the mode for `now` and compute the pointing offset
    ///
    /// The selected mode is recorded. Calling again with the same `now` and
    /// no ingestion in between returns the same result.
    pub fn compute(&self, now: DateTime<Utc>) -> FusionResult {
        let mut state = self.state.write();
        state.stats.computes += 1;

        let freshness = Freshness::new(state.vision_age(now), state.gps_age(now));
        let changed = state.selector.advance(freshness);
        let mode = state.selector.current();

        let event = changed.map(|from| {
            state.stats.mode_changes += 1;
            info!("Tracking mode {} -> {}", from, mode);
            FusionEvent::mode_changed(now, from, mode)
        });
        if mode == TrackingMode::Searching {
            debug!(
                "Both sources stale (vision {:.1}s, gps {:.1}s)",
                freshness.vision_age_secs, freshness.gps_age_secs
            );
        }

        let result = engine::solve(&state, &self.config, mode);
        drop(state);

        if let Some(event) = event {
            self.events.publish(event);
        }
        result
    }

    /// Forget the target: clear all observations and predictors, force IDLE
    pub fn reset(&self) {
        {
            let mut state = self.state.write();
            state.clear();
            state.stats.resets += 1;
        }
        info!("Tracking reset, mode forced to IDLE");
        self.events.publish(FusionEvent::tracking_reset(Utc::now()));
    }

    /// Mode recorded by the last `compute` (or reset)
    pub fn mode(&self) -> TrackingMode {
        self.state.read().mode()
    }

    pub fn snapshot(&self) -> FusionSnapshot {
        self.state.read().snapshot(Utc::now())
    }

    pub fn stats(&self) -> FusionStats {
        self.state.read().stats.clone()
    }
}

/// Sequence numbers must move forward per role
///
/// 0 marks an unsequenced fix and is not checked. The remote must strictly
/// advance; the base may repeat, since one base fix can be paired with
/// several remote fixes. A lower sequence on a fix captured after the last
/// one is a relay restart and is accepted; `Ok(true)` reports it.
fn check_sequence(
    role: &str,
    last: Option<&GeoPoint>,
    next: &GeoPoint,
    strict: bool,
) -> CoreResult<bool> {
    let Some(last) = last else {
        return Ok(false);
    };
    if next.sequence == 0 || last.sequence == 0 {
        return Ok(false);
    }
    if next.sequence < last.sequence && next.captured_at > last.captured_at {
        return Ok(true);
    }
    let ok = if strict {
        next.sequence > last.sequence
    } else {
        next.sequence >= last.sequence
    };
    if ok {
        Ok(false)
    } else {
        Err(CoreError::invalid_observation(format!(
            "{role} sequence {} does not follow {}",
            next.sequence, last.sequence
        )))
    }
}

// ============================================================================
// TESTS
// ============================================================================
