//! Location fixes as delivered by the phone/watch GPS relay
//!
//! Only the fields the fusion core consumes are modelled. Unknown fields in
//! the JSON are ignored.

use crate::{CoreError, CoreResult, GeoPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which role a relayed fix plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixRole {
    /// The gimbal's own position (phone mounted with the gimbal)
    Base,
    /// The tracked subject (wearable)
    Remote,
}

impl FixRole {
    /// Map a relay `source` tag to a role
    pub fn from_source(source: &str) -> Option<Self> {
        match source {
            "iOS" => Some(Self::Base),
            "watchOS" => Some(Self::Remote),
            _ => None,
        }
    }

    pub fn source_tag(&self) -> &'static str {
        match self {
            Self::Base => "iOS",
            Self::Remote => "watchOS",
        }
    }
}

/// One relay message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub source: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub alt_m: Option<f64>,
    #[serde(default)]
    pub heading_deg: Option<f64>,
    #[serde(default)]
    pub speed_mps: Option<f64>,
    #[serde(default)]
    pub course_deg: Option<f64>,
    #[serde(default)]
    pub h_accuracy_m: Option<f64>,
    #[serde(default)]
    pub v_accuracy_m: Option<f64>,
    #[serde(default)]
    pub seq: u64,
    pub ts_unix_ms: i64,
}

impl LocationFix {
    /// Parse a single relay message
    pub fn from_json(text: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn role(&self) -> Option<FixRole> {
        FixRole::from_source(&self.source)
    }

    /// Build a relay message from a point, the inverse of the `TryFrom` below
    pub fn from_point(role: FixRole, point: &GeoPoint) -> Self {
        Self {
            source: role.source_tag().to_string(),
            lat: point.latitude,
            lon: point.longitude,
            alt_m: point.altitude,
            heading_deg: point.heading,
            speed_mps: point.speed,
            course_deg: point.course,
            h_accuracy_m: point.horizontal_accuracy,
            v_accuracy_m: point.vertical_accuracy,
            seq: point.sequence,
            ts_unix_ms: point.captured_at.timestamp_millis(),
        }
    }
}

impl TryFrom<LocationFix> for GeoPoint {
    type Error = CoreError;

    fn try_from(fix: LocationFix) -> CoreResult<Self> {
        let captured_at = DateTime::<Utc>::from_timestamp_millis(fix.ts_unix_ms).ok_or_else(
            || CoreError::invalid_observation(format!("timestamp {} out of range", fix.ts_unix_ms)),
        )?;

        let point = GeoPoint {
            latitude: fix.lat,
            longitude: fix.lon,
            altitude: fix.alt_m,
            heading: fix.heading_deg,
            speed: fix.speed_mps,
            course: fix.course_deg,
            horizontal_accuracy: fix.h_accuracy_m,
            vertical_accuracy: fix.v_accuracy_m,
            sequence: fix.seq,
            captured_at,
        };
        point.validate()?;
        Ok(point)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch_fix() {
        let text = r#"{
            "source": "watchOS",
            "lat": 37.7749,
            "lon": -122.4194,
            "alt_m": 12.5,
            "speed_mps": 1.4,
            "course_deg": 270.0,
            "h_accuracy_m": 4.0,
            "seq": 42,
            "ts_unix_ms": 1700000000123,
            "battery": 0.8
        }"#;

        let fix = LocationFix::from_json(text).unwrap();
        assert_eq!(fix.role(), Some(FixRole::Remote));

        let point = GeoPoint::try_from(fix).unwrap();
        assert_eq!(point.sequence, 42);
        assert_eq!(point.altitude, Some(12.5));
        assert_eq!(point.heading, None);
        assert_eq!(point.captured_at.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_malformed_json_is_serialization_error() {
        let err = LocationFix::from_json("{\"lat\": 1.0").unwrap_err();
        assert!(matches!(err, CoreError::Serialization(_)));
    }

    #[test]
    fn test_out_of_range_fix_rejected() {
        let text = r#"{"source": "iOS", "lat": 200.0, "lon": 0.0, "ts_unix_ms": 0}"#;
        let fix = LocationFix::from_json(text).unwrap();
        assert!(matches!(
            GeoPoint::try_from(fix),
            Err(CoreError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn test_unknown_source_has_no_role() {
        assert_eq!(FixRole::from_source("android"), None);
        assert_eq!(FixRole::from_source("iOS"), Some(FixRole::Base));
    }
}
