//! Geographic types and calculations for gimbal pointing
//!
//! Everything here is pure: no shared state, deterministic for identical
//! inputs. Coordinates outside the valid latitude/longitude ranges are
//! rejected with [`CoreError::InvalidCoordinate`] instead of being clamped.

use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A single geodetic sample from either the base or the remote device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees (-90 to 90)
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180)
    pub longitude: f64,
    /// Altitude in meters above sea level
    pub altitude: Option<f64>,
    /// Compass heading of the source device, degrees from true north
    pub heading: Option<f64>,
    /// Ground speed in m/s
    pub speed: Option<f64>,
    /// Course over ground, degrees from true north
    pub course: Option<f64>,
    /// Horizontal accuracy radius in meters
    pub horizontal_accuracy: Option<f64>,
    /// Vertical accuracy in meters
    pub vertical_accuracy: Option<f64>,
    /// Per-device sequence number, strictly increasing
    pub sequence: u64,
    /// When the fix was captured on the device
    pub captured_at: DateTime<Utc>,
}

impl GeoPoint {
    /// Create a new geodetic sample with no optional fields set
    pub fn new(latitude: f64, longitude: f64, captured_at: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            heading: None,
            speed: None,
            course: None,
            horizontal_accuracy: None,
            vertical_accuracy: None,
            sequence: 0,
            captured_at,
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    /// Attach ground speed (m/s) and course over ground (degrees)
    pub fn with_motion(mut self, speed: f64, course: f64) -> Self {
        self.speed = Some(speed);
        self.course = Some(course);
        self
    }

    pub fn with_accuracy(mut self, horizontal: f64, vertical: f64) -> Self {
        self.horizontal_accuracy = Some(horizontal);
        self.vertical_accuracy = Some(vertical);
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Validate coordinates and every optional numeric field
    pub fn validate(&self) -> CoreResult<()> {
        check_coordinates(self.latitude, self.longitude)?;

        let optional = [
            ("altitude", self.altitude),
            ("heading", self.heading),
            ("speed", self.speed),
            ("course", self.course),
            ("horizontal_accuracy", self.horizontal_accuracy),
            ("vertical_accuracy", self.vertical_accuracy),
        ];
        for (name, value) in optional {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(CoreError::invalid_observation(format!(
                        "{name} is not finite"
                    )));
                }
            }
        }
        if matches!(self.speed, Some(s) if s < 0.0) {
            return Err(CoreError::invalid_observation("speed is negative"));
        }
        Ok(())
    }

    /// Check if this position is valid
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Course over ground, only when the device is moving faster than
    /// `speed_threshold` m/s. Below that, GPS course is noise.
    pub fn course_over_ground(&self, speed_threshold: f64) -> Option<f64> {
        match (self.speed, self.course) {
            (Some(speed), Some(course)) if speed > speed_threshold => Some(course),
            _ => None,
        }
    }

    fn same_position(&self, other: &GeoPoint) -> bool {
        self.latitude == other.latitude && self.longitude == other.longitude
    }
}

/// Reject out-of-range or non-finite coordinates
pub fn check_coordinates(lat: f64, lng: f64) -> CoreResult<()> {
    let lat_ok = lat.is_finite() && (-90.0..=90.0).contains(&lat);
    let lng_ok = lng.is_finite() && (-180.0..=180.0).contains(&lng);
    if lat_ok && lng_ok {
        Ok(())
    } else {
        Err(CoreError::invalid_coordinate(lat, lng))
    }
}

/// Great-circle initial bearing from `from` to `to`
///
/// Returns degrees in [0, 360). Coincident points return 0: the bearing is
/// undefined there, and 0 is the documented choice, not an error.
pub fn bearing(from: &GeoPoint, to: &GeoPoint) -> CoreResult<f64> {
    check_coordinates(from.latitude, from.longitude)?;
    check_coordinates(to.latitude, to.longitude)?;

    if from.same_position(to) {
        return Ok(0.0);
    }

    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let delta_lng = (to.longitude - from.longitude).to_radians();

    let y = delta_lng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lng.cos();

    let bearing = y.atan2(x).to_degrees().rem_euclid(360.0);
    // rem_euclid rounds tiny negative values up to exactly 360.0
    Ok(if bearing >= 360.0 { 0.0 } else { bearing })
}

/// Haversine great-circle distance in meters
pub fn distance(from: &GeoPoint, to: &GeoPoint) -> CoreResult<f64> {
    check_coordinates(from.latitude, from.longitude)?;
    check_coordinates(to.latitude, to.longitude)?;

    if from.same_position(to) {
        return Ok(0.0);
    }

    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let delta_lat = (to.latitude - from.latitude).to_radians();
    let delta_lng = (to.longitude - from.longitude).to_radians();

    let a = ((delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2))
    .clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    Ok(EARTH_RADIUS_M * c)
}

/// Wrap an angle into (-180, 180]
pub fn normalize_angle(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Gimbal-relative pan angle for a geodetic bearing, given the heading the
/// gimbal's forward direction points at. Result is in (-180, 180].
pub fn pan_angle(bearing_deg: f64, base_heading_deg: f64) -> f64 {
    normalize_angle(bearing_deg - base_heading_deg)
}

/// Elevation angle in degrees for a height difference over a ground distance
///
/// Zero distance is degenerate: returns 0 when the height difference is
/// also 0, and ±90 (straight up / straight down) otherwise.
pub fn tilt_angle(altitude_delta_m: f64, distance_m: f64) -> f64 {
    let distance_m = distance_m.max(0.0);
    if distance_m == 0.0 {
        return if altitude_delta_m > 0.0 {
            90.0
        } else if altitude_delta_m < 0.0 {
            -90.0
        } else {
            0.0
        };
    }
    altitude_delta_m.atan2(distance_m).to_degrees()
}

/// Calculate the point reached by travelling `distance_m` along
/// `bearing_deg` from `from`. All non-positional fields are carried over.
pub fn destination(from: &GeoPoint, distance_m: f64, bearing_deg: f64) -> CoreResult<GeoPoint> {
    check_coordinates(from.latitude, from.longitude)?;

    let lat1 = from.latitude.to_radians();
    let lng1 = from.longitude.to_radians();
    let bearing = bearing_deg.to_radians();
    let angular_distance = distance_m / EARTH_RADIUS_M;

    let lat2 = (lat1.sin() * angular_distance.cos()
        + lat1.cos() * angular_distance.sin() * bearing.cos())
    .asin();

    let lng2 = lng1
        + (bearing.sin() * angular_distance.sin() * lat1.cos())
            .atan2(angular_distance.cos() - lat1.sin() * lat2.sin());

    let mut point = from.clone();
    point.latitude = lat2.to_degrees();
    point.longitude = normalize_angle(lng2.to_degrees());
    Ok(point)
}

/// East/north velocity (m/s) from a speed and a course over ground
pub fn velocity_from_course(speed_mps: f64, course_deg: f64) -> (f64, f64) {
    let course = course_deg.to_radians();
    (speed_mps * course.sin(), speed_mps * course.cos())
}

/// Pinhole estimate of how tall a subject appears in the frame
pub fn expected_target_height_px(
    distance_m: f64,
    target_height_m: f64,
    focal_length_px: f64,
    frame_height_px: f64,
) -> f64 {
    if distance_m < 1.0 {
        return frame_height_px;
    }
    (focal_length_px * target_height_m / distance_m).min(frame_height_px)
}

/// Remote position expressed relative to the base
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativePosition {
    /// Absolute bearing from base to remote, degrees [0, 360)
    pub bearing_deg: f64,
    /// Ground distance in meters
    pub distance_m: f64,
    /// Remote altitude minus base altitude (0 when either is unknown)
    pub altitude_delta_m: f64,
    /// Bearing relative to the base heading, (-180, 180]. Equal to the
    /// absolute bearing (normalized) when the base reports no heading.
    pub relative_bearing_deg: f64,
}

/// Bearing, distance and height difference from base to remote
pub fn relative_position(base: &GeoPoint, remote: &GeoPoint) -> CoreResult<RelativePosition> {
    let bearing_deg = bearing(base, remote)?;
    let distance_m = distance(base, remote)?;

    let altitude_delta_m = match (base.altitude, remote.altitude) {
        (Some(b), Some(r)) => r - b,
        _ => 0.0,
    };

    let relative_bearing_deg = pan_angle(bearing_deg, base.heading.unwrap_or(0.0));

    Ok(RelativePosition {
        bearing_deg,
        distance_m,
        altitude_delta_m,
        relative_bearing_deg,
    })
}

/// Local tangent plane anchored at a fixed geodetic origin
///
/// Uses an equirectangular projection, which is accurate to well under a
/// meter over the few hundred meters a tracking gimbal works with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalFrame {
    origin_lat: f64,
    origin_lng: f64,
    cos_lat: f64,
}

impl LocalFrame {
    /// Anchor a frame at `origin`
    pub fn new(origin: &GeoPoint) -> CoreResult<Self> {
        check_coordinates(origin.latitude, origin.longitude)?;
        Ok(Self {
            origin_lat: origin.latitude,
            origin_lng: origin.longitude,
            // Guard the poles, where longitude collapses
            cos_lat: origin.latitude.to_radians().cos().max(1e-6),
        })
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.origin_lat, self.origin_lng)
    }

    /// Project a point to (east, north) meters from the origin
    pub fn to_local(&self, point: &GeoPoint) -> CoreResult<(f64, f64)> {
        check_coordinates(point.latitude, point.longitude)?;
        let delta_lat = (point.latitude - self.origin_lat).to_radians();
        let delta_lng = normalize_angle(point.longitude - self.origin_lng).to_radians();
        Ok((
            delta_lng * EARTH_RADIUS_M * self.cos_lat,
            delta_lat * EARTH_RADIUS_M,
        ))
    }

    /// Inverse projection: (east, north) meters back to (latitude, longitude)
    pub fn to_geodetic(&self, east_m: f64, north_m: f64) -> (f64, f64) {
        let lat = self.origin_lat + (north_m / EARTH_RADIUS_M).to_degrees();
        let lng = self.origin_lng + (east_m / (EARTH_RADIUS_M * self.cos_lat)).to_degrees();
        (lat.clamp(-90.0, 90.0), normalize_angle(lng))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint::new(lat, lng, Utc::now())
    }

    #[test]
    fn test_distance_calculation() {
        // San Francisco to Oakland, roughly 13 km
        let sf = point(37.7749, -122.4194);
        let oakland = point(37.8044, -122.2712);

        let d = distance(&sf, &oakland).unwrap();
        assert!(d > 12_000.0 && d < 14_500.0);
    }

    #[test]
    fn test_distance_zero_for_coincident_points() {
        let p = point(37.7749, -122.4194);
        assert_eq!(distance(&p, &p).unwrap(), 0.0);
    }

    #[test]
    fn test_distance_antipodal_is_finite() {
        let a = point(0.0, 0.0);
        let b = point(0.0, 180.0);
        let d = distance(&a, &b).unwrap();
        assert!(d.is_finite());
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);
        assert!(bearing(&a, &b).unwrap().is_finite());
    }

    #[test]
    fn test_bearing_calculation() {
        let origin = point(0.0, 0.0);
        let north = point(1.0, 0.0);
        let east = point(0.0, 1.0);
        let west = point(0.0, -1.0);

        assert!((bearing(&origin, &north).unwrap() - 0.0).abs() < 1.0);
        assert!((bearing(&origin, &east).unwrap() - 90.0).abs() < 1.0);
        assert!((bearing(&origin, &west).unwrap() - 270.0).abs() < 1.0);
    }

    #[test]
    fn test_bearing_range_and_degenerate_case() {
        let base = point(37.7748, -122.4195);
        assert_eq!(bearing(&base, &base).unwrap(), 0.0);

        for (lat, lng) in [(37.78, -122.41), (37.77, -122.43), (-33.9, 151.2), (89.9, 0.0)] {
            let b = bearing(&base, &point(lat, lng)).unwrap();
            assert!((0.0..360.0).contains(&b), "bearing {b} out of range");
        }
    }

    #[test]
    fn test_northeast_target_pans_left_of_east_heading() {
        let base = point(37.7748, -122.4195).with_heading(90.0);
        let remote = point(37.7749, -122.4194);

        let b = bearing(&base, &remote).unwrap();
        assert!(b > 30.0 && b < 50.0, "bearing {b} is not northeast");

        let pan = pan_angle(b, 90.0);
        assert!(pan < -40.0 && pan > -60.0, "pan {pan}");
        assert!((pan - (b - 90.0)).abs() < 1e-9);
    }

    #[test]
    fn test_pan_angle_wraps() {
        assert!((pan_angle(350.0, 10.0) - -20.0).abs() < 1e-9);
        assert!((pan_angle(10.0, 350.0) - 20.0).abs() < 1e-9);
        assert_eq!(pan_angle(180.0, 0.0), 180.0);
        assert_eq!(pan_angle(0.0, 180.0), 180.0);

        // Continuous across the 0/360 seam
        let before = pan_angle(359.9, 0.0);
        let after = pan_angle(0.1, 0.0);
        assert!((after - before - 0.2).abs() < 1e-9);
        assert_eq!(pan_angle(1.0, 1.0), pan_angle(361.0 % 360.0, 1.0));

        for b in [0.0, 90.0, 179.9, 180.0, 180.1, 359.0, 720.5, -540.0] {
            let p = pan_angle(b, 0.0);
            assert!(p > -180.0 && p <= 180.0, "pan {p} out of range for {b}");
        }
    }

    #[test]
    fn test_tilt_angle() {
        assert!((tilt_angle(10.0, 10.0) - 45.0).abs() < 1e-9);
        assert!((tilt_angle(-10.0, 10.0) + 45.0).abs() < 1e-9);
        assert_eq!(tilt_angle(0.0, 0.0), 0.0);
        assert_eq!(tilt_angle(5.0, 0.0), 90.0);
        assert_eq!(tilt_angle(-5.0, 0.0), -90.0);
    }

    #[test]
    fn test_invalid_coordinates_rejected() {
        let valid = point(45.0, 90.0);
        let bad_lat = point(200.0, 0.0);
        let bad_lng = point(0.0, -181.0);
        let nan = point(f64::NAN, 0.0);

        assert!(matches!(
            bearing(&valid, &bad_lat),
            Err(CoreError::InvalidCoordinate { .. })
        ));
        assert!(distance(&bad_lng, &valid).is_err());
        assert!(distance(&nan, &valid).is_err());
        assert!(valid.is_valid());
        assert!(!bad_lat.is_valid());
    }

    #[test]
    fn test_validate_rejects_non_finite_optional_fields() {
        let p = point(10.0, 10.0).with_heading(f64::INFINITY);
        assert!(matches!(p.validate(), Err(CoreError::InvalidObservation(_))));

        let p = point(10.0, 10.0).with_motion(-1.0, 0.0);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_course_over_ground_threshold() {
        let slow = point(0.0, 0.0).with_motion(0.2, 45.0);
        let moving = point(0.0, 0.0).with_motion(2.0, 45.0);

        assert_eq!(slow.course_over_ground(0.5), None);
        assert_eq!(moving.course_over_ground(0.5), Some(45.0));
    }

    #[test]
    fn test_destination_round_trip() {
        let start = point(37.7749, -122.4194);
        let end = destination(&start, 1000.0, 90.0).unwrap();

        assert!((distance(&start, &end).unwrap() - 1000.0).abs() < 1.0);
        assert!((bearing(&start, &end).unwrap() - 90.0).abs() < 0.1);
    }

    #[test]
    fn test_relative_position_without_heading_uses_absolute_bearing() {
        let base = point(0.0, 0.0).with_altitude(10.0);
        let remote = point(0.0, 0.001).with_altitude(12.0);

        let rel = relative_position(&base, &remote).unwrap();
        assert!((rel.bearing_deg - 90.0).abs() < 0.01);
        assert!((rel.relative_bearing_deg - 90.0).abs() < 0.01);
        assert!((rel.altitude_delta_m - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_local_frame_projection() {
        let origin = point(37.7748, -122.4195);
        let frame = LocalFrame::new(&origin).unwrap();

        let east = destination(&origin, 100.0, 90.0).unwrap();
        let (e, n) = frame.to_local(&east).unwrap();
        assert!((e - 100.0).abs() < 0.5);
        assert!(n.abs() < 0.5);

        let (lat, lng) = frame.to_geodetic(e, n);
        assert!((lat - east.latitude).abs() < 1e-6);
        assert!((lng - east.longitude).abs() < 1e-6);
    }

    #[test]
    fn test_velocity_from_course() {
        let (ve, vn) = velocity_from_course(2.0, 90.0);
        assert!((ve - 2.0).abs() < 1e-9);
        assert!(vn.abs() < 1e-9);
    }

    #[test]
    fn test_expected_target_height() {
        assert_eq!(expected_target_height_px(0.5, 1.7, 500.0, 480.0), 480.0);
        assert!((expected_target_height_px(50.0, 1.7, 500.0, 480.0) - 17.0).abs() < 1e-9);
    }
}
