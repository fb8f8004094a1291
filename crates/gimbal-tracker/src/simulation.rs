//! Simulated subject, camera and GPS relay
//!
//! The subject walks a circle around a fixed base. The camera sees it
//! relative to where the simulated gimbal currently points, so step
//! commands from the actuation loop close the loop.

use crate::error::{TrackerError, TrackerResult};
use chrono::{DateTime, Utc};
use gimbal_core::{
    CoreResult, FixRole, GeoPoint, LocationFix, VisionObservation, destination, normalize_angle,
    relative_position, tilt_angle,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// Simulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub base_latitude: f64,
    pub base_longitude: f64,
    pub base_altitude_m: f64,
    /// Compass heading of the gimbal's forward direction
    pub base_heading_deg: f64,
    /// Radius of the subject's walk around the base
    pub orbit_radius_m: f64,
    pub subject_speed_mps: f64,
    /// Fraction of frames with no detection
    pub vision_dropout: f64,
    /// Amplitude of GPS position noise
    pub gps_noise_m: f64,
    /// Reported horizontal accuracy of the wearable
    pub gps_accuracy_m: f64,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            base_latitude: 37.7748,
            base_longitude: -122.4195,
            base_altitude_m: 10.0,
            base_heading_deg: 90.0,
            orbit_radius_m: 25.0,
            subject_speed_mps: 1.5,
            vision_dropout: 0.15,
            gps_noise_m: 2.0,
            gps_accuracy_m: 5.0,
            seed: 0x5eed,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> TrackerResult<()> {
        gimbal_core::check_coordinates(self.base_latitude, self.base_longitude)
            .map_err(|e| TrackerError::invalid_settings(e.to_string()))?;
        if !self.orbit_radius_m.is_finite() || self.orbit_radius_m <= 0.0 {
            return Err(TrackerError::invalid_settings("orbit_radius_m must be positive"));
        }
        if !(0.0..1.0).contains(&self.vision_dropout) {
            return Err(TrackerError::invalid_settings("vision_dropout must be within [0, 1)"));
        }
        if !self.subject_speed_mps.is_finite() || self.subject_speed_mps < 0.0 {
            return Err(TrackerError::invalid_settings("subject_speed_mps must be non-negative"));
        }
        Ok(())
    }
}

/// Small deterministic noise source (xorshift64*)
#[derive(Debug, Clone)]
pub struct Jitter {
    state: u64,
}

impl Jitter {
    pub fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    /// Uniform in [0, 1)
    pub fn next_unit(&mut self) -> f64 {
        self.state ^= self.state >> 12;
        self.state ^= self.state << 25;
        self.state ^= self.state >> 27;
        let bits = self.state.wrapping_mul(0x2545_f491_4f6c_dd1d);
        (bits >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Where the simulated gimbal points, relative to the base heading
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GimbalPose {
    pub pan_deg: f64,
    pub tilt_deg: f64,
}

/// Shared simulated world
#[derive(Clone)]
pub struct SimulatedWorld {
    config: Arc<SimulationConfig>,
    pose: Arc<RwLock<GimbalPose>>,
    camera_fov: (f64, f64),
    mounting: (f64, f64),
}

impl SimulatedWorld {
    /// `fov` is (horizontal, vertical) degrees; `mounting` is (gimbal, target)
    /// height above ground in meters
    pub fn new(config: SimulationConfig, fov: (f64, f64), mounting: (f64, f64)) -> Self {
        Self {
            config: Arc::new(config),
            pose: Arc::new(RwLock::new(GimbalPose::default())),
            camera_fov: fov,
            mounting,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn base(&self, at: DateTime<Utc>) -> GeoPoint {
        GeoPoint::new(self.config.base_latitude, self.config.base_longitude, at)
            .with_altitude(self.config.base_altitude_m)
            .with_heading(self.config.base_heading_deg)
    }

    /// True subject position `elapsed_secs` into the run
    pub fn subject(&self, elapsed_secs: f64, at: DateTime<Utc>) -> CoreResult<GeoPoint> {
        let radius = self.config.orbit_radius_m;
        let angular_deg = (self.config.subject_speed_mps / radius).to_degrees();
        let bearing = (angular_deg * elapsed_secs).rem_euclid(360.0);

        let base = self.base(at);
        let point = destination(&base, radius, bearing)?;
        let course = (bearing + 90.0).rem_euclid(360.0);
        Ok(GeoPoint {
            heading: None,
            ..point.with_motion(self.config.subject_speed_mps, course)
        })
    }

    pub fn pose(&self) -> GimbalPose {
        *self.pose.read()
    }

    /// Apply a relative move in degrees
    pub fn move_gimbal(&self, pan_deg: f64, tilt_deg: f64) {
        let mut pose = self.pose.write();
        pose.pan_deg = normalize_angle(pose.pan_deg + pan_deg);
        pose.tilt_deg = (pose.tilt_deg + tilt_deg).clamp(-90.0, 90.0);
        trace!("Gimbal pose pan {:.1} tilt {:.1}", pose.pan_deg, pose.tilt_deg);
    }

    /// What the camera sees of the subject, if anything
    pub fn camera_frame(
        &self,
        elapsed_secs: f64,
        at: DateTime<Utc>,
        jitter: &mut Jitter,
    ) -> CoreResult<Option<VisionObservation>> {
        if jitter.next_unit() < self.config.vision_dropout {
            return Ok(None);
        }

        let subject = self.subject(elapsed_secs, at)?;
        let relative = relative_position(&self.base(at), &subject)?;
        let (gimbal_height, target_height) = self.mounting;
        let elevation = tilt_angle(target_height - gimbal_height, relative.distance_m);

        let pose = self.pose();
        let (hfov, vfov) = self.camera_fov;
        let offset_x = normalize_angle(relative.relative_bearing_deg - pose.pan_deg) / (hfov / 2.0);
        let offset_y = -(elevation - pose.tilt_deg) / (vfov / 2.0);
        if offset_x.abs() > 1.0 || offset_y.abs() > 1.0 {
            return Ok(None);
        }

        let confidence = 0.6 + jitter.next_unit() * 0.35;
        Ok(Some(VisionObservation::new(offset_x, offset_y, confidence, at)))
    }

    /// One relay message per role, serialized as the relay sends them
    pub fn relay_messages(
        &self,
        elapsed_secs: f64,
        at: DateTime<Utc>,
        sequence: u64,
        jitter: &mut Jitter,
    ) -> CoreResult<(String, String)> {
        let base = self.base(at).with_sequence(sequence);

        let truth = self.subject(elapsed_secs, at)?;
        let noise_bearing = jitter.next_unit() * 360.0;
        let noise_m = jitter.next_unit() * self.config.gps_noise_m;
        let remote = destination(&truth, noise_m, noise_bearing)?
            .with_accuracy(self.config.gps_accuracy_m, self.config.gps_accuracy_m * 1.5)
            .with_sequence(sequence);

        Ok((
            LocationFix::from_point(FixRole::Base, &base).to_json()?,
            LocationFix::from_point(FixRole::Remote, &remote).to_json()?,
        ))
    }
}

/// Parse a relay message back into a point, as a live relay adapter would
pub fn parse_relay_message(text: &str) -> CoreResult<(FixRole, GeoPoint)> {
    let fix = LocationFix::from_json(text)?;
    let role = fix.role().ok_or_else(|| {
        gimbal_core::CoreError::invalid_observation(format!("unknown relay source {}", fix.source))
    })?;
    Ok((role, GeoPoint::try_from(fix)?))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> SimulatedWorld {
        SimulatedWorld::new(SimulationConfig::default(), (60.0, 45.0), (1.0, 1.7))
    }

    #[test]
    fn test_jitter_is_deterministic_and_bounded() {
        let mut a = Jitter::new(7);
        let mut b = Jitter::new(7);
        for _ in 0..1000 {
            let x = a.next_unit();
            assert_eq!(x, b.next_unit());
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn test_subject_stays_on_orbit() {
        let world = world();
        let now = Utc::now();
        for t in [0.0, 10.0, 57.3, 300.0] {
            let subject = world.subject(t, now).unwrap();
            let d = gimbal_core::distance(&world.base(now), &subject).unwrap();
            assert!((d - 25.0).abs() < 0.5, "distance {d} at {t}s");
            assert_eq!(subject.speed, Some(1.5));
        }
    }

    #[test]
    fn test_relay_round_trip() {
        let world = world();
        let mut jitter = Jitter::new(1);
        let (base_json, remote_json) = world.relay_messages(3.0, Utc::now(), 4, &mut jitter).unwrap();

        let (role, base) = parse_relay_message(&base_json).unwrap();
        assert_eq!(role, FixRole::Base);
        assert_eq!(base.heading, Some(90.0));

        let (role, remote) = parse_relay_message(&remote_json).unwrap();
        assert_eq!(role, FixRole::Remote);
        assert_eq!(remote.sequence, 4);
        assert_eq!(remote.horizontal_accuracy, Some(5.0));
    }

    #[test]
    fn test_camera_sees_subject_when_pointed_at_it() {
        let world = world();
        let now = Utc::now();
        let relative = relative_position(&world.base(now), &world.subject(0.0, now).unwrap()).unwrap();
        world.move_gimbal(relative.relative_bearing_deg, 0.0);

        let mut jitter = Jitter::new(3);
        let seen = (0..50)
            .filter_map(|_| world.camera_frame(0.0, now, &mut jitter).unwrap())
            .collect::<Vec<_>>();
        assert!(!seen.is_empty());
        for obs in seen {
            assert!(obs.offset_x.abs() < 0.05);
            assert!(obs.validate().is_ok());
        }
    }

    #[test]
    fn test_camera_blind_when_pointed_away() {
        let world = world();
        let now = Utc::now();
        let relative = relative_position(&world.base(now), &world.subject(0.0, now).unwrap()).unwrap();
        world.move_gimbal(relative.relative_bearing_deg + 180.0, 0.0);

        let mut jitter = Jitter::new(3);
        for _ in 0..20 {
            assert!(world.camera_frame(0.0, now, &mut jitter).unwrap().is_none());
        }
    }
}
