//! Event types emitted by the fusion engine
//!
//! Events are informational: the engine publishes them without waiting for
//! anyone to listen. Consumers use them for logging, metrics and operator
//! displays.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TrackingMode;

/// Event envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub payload: EventPayload,
}

impl FusionEvent {
    pub fn new(timestamp: DateTime<Utc>, event_type: EventType, payload: EventPayload) -> Self {
        Self {
            timestamp,
            event_type,
            payload,
        }
    }

    pub fn mode_changed(at: DateTime<Utc>, from: TrackingMode, to: TrackingMode) -> Self {
        Self::new(
            at,
            EventType::ModeChanged,
            EventPayload::ModeChange(ModeChangeEvent { from, to }),
        )
    }

    pub fn observation_rejected(
        at: DateTime<Utc>,
        source: ObservationSource,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(
            at,
            EventType::ObservationRejected,
            EventPayload::Rejection(RejectionEvent {
                source,
                reason: reason.into(),
            }),
        )
    }

    pub fn search_timed_out(at: DateTime<Utc>, idle_secs: f64) -> Self {
        Self::new(
            at,
            EventType::SearchTimedOut,
            EventPayload::SearchTimeout(SearchTimeoutEvent { idle_secs }),
        )
    }

    pub fn tracking_reset(at: DateTime<Utc>) -> Self {
        Self::new(at, EventType::TrackingReset, EventPayload::Reset)
    }
}

/// Type of event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    ModeChanged,
    ObservationRejected,
    SearchTimedOut,
    TrackingReset,
}

/// Sensor stream an observation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationSource {
    Vision,
    Gps,
}

impl ObservationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vision => "vision",
            Self::Gps => "gps",
        }
    }
}

/// Event payload variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    ModeChange(ModeChangeEvent),
    Rejection(RejectionEvent),
    SearchTimeout(SearchTimeoutEvent),
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeChangeEvent {
    pub from: TrackingMode,
    pub to: TrackingMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionEvent {
    pub source: ObservationSource,
    pub reason: String,
}

/// Both sensors were silent longer than the search timeout
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchTimeoutEvent {
    pub idle_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_change_serialization() {
        let event = FusionEvent::mode_changed(Utc::now(), TrackingMode::Visual, TrackingMode::GpsPrimary);
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains("MODE_CHANGED"));
        assert!(json.contains("GPS_PRIMARY"));

        let back: FusionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
