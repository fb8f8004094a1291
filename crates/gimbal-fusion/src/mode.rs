//! Tracking-mode state machine
//!
//! Mode selection is a pure function of the current mode and how old the
//! latest observation of each kind is. Nothing here reads a clock, so the
//! whole table can be exercised with synthetic ages.

use gimbal_core::TrackingMode;
use serde::{Deserialize, Serialize};

/// Age in seconds of the latest observation of each kind
///
/// `f64::INFINITY` means "never received".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Freshness {
    pub vision_age_secs: f64,
    pub gps_age_secs: f64,
}

impl Freshness {
    pub fn new(vision_age_secs: f64, gps_age_secs: f64) -> Self {
        Self {
            vision_age_secs,
            gps_age_secs,
        }
    }

    /// Nothing ever received
    pub fn unknown() -> Self {
        Self::new(f64::INFINITY, f64::INFINITY)
    }
}

/// Holds the current mode and the timeouts that drive it
#[derive(Debug, Clone)]
pub struct ModeSelector {
    visual_timeout_secs: f64,
    gps_timeout_secs: f64,
    current: TrackingMode,
}

impl ModeSelector {
    pub fn new(visual_timeout_secs: f64, gps_timeout_secs: f64) -> Self {
        Self {
            visual_timeout_secs,
            gps_timeout_secs,
            current: TrackingMode::Idle,
        }
    }

    /// Next mode given the current one and observation ages
    ///
    /// An age equal to its timeout still counts as fresh. IDLE holds only
    /// while nothing has ever been received; any stale observation means
    /// SEARCHING. IDLE is never re-entered from here.
    pub fn transition(
        current: TrackingMode,
        freshness: Freshness,
        visual_timeout_secs: f64,
        gps_timeout_secs: f64,
    ) -> TrackingMode {
        let vision_fresh = freshness.vision_age_secs <= visual_timeout_secs;
        let gps_fresh = freshness.gps_age_secs <= gps_timeout_secs;

        match (vision_fresh, gps_fresh) {
            (true, true) => TrackingMode::GpsAssisted,
            (true, false) => TrackingMode::Visual,
            (false, true) => TrackingMode::GpsPrimary,
            (false, false)
                if current == TrackingMode::Idle
                    && freshness.vision_age_secs == f64::INFINITY
                    && freshness.gps_age_secs == f64::INFINITY =>
            {
                TrackingMode::Idle
            }
            (false, false) => TrackingMode::Searching,
        }
    }

    /// Mode this selector would move to, without recording it
    pub fn evaluate(&self, freshness: Freshness) -> TrackingMode {
        Self::transition(
            self.current,
            freshness,
            self.visual_timeout_secs,
            self.gps_timeout_secs,
        )
    }

    /// Evaluate and record, returning the previous mode when it changed
    pub fn advance(&mut self, freshness: Freshness) -> Option<TrackingMode> {
        let next = self.evaluate(freshness);
        if next == self.current {
            return None;
        }
        let previous = self.current;
        self.current = next;
        Some(previous)
    }

    pub fn current(&self) -> TrackingMode {
        self.current
    }

    /// Force IDLE regardless of freshness
    pub fn reset(&mut self) {
        self.current = TrackingMode::Idle;
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use gimbal_core::TrackingMode::*;

    const INF: f64 = f64::INFINITY;

    #[test]
    fn test_transition_table() {
        // (current, vision age, gps age, expected)
        let cases = [
            (Idle, INF, INF, Idle),
            (Idle, 0.1, INF, Visual),
            (Idle, INF, 0.5, GpsPrimary),
            (Idle, 0.1, 0.5, GpsAssisted),
            (Idle, 2.0, 6.0, Searching),
            (Idle, 2.0, INF, Searching),
            (Idle, INF, 6.0, Searching),
            (Visual, 0.2, INF, Visual),
            (Visual, 1.5, 2.0, GpsPrimary),
            (Visual, 2.0, 6.0, Searching),
            (GpsAssisted, 0.3, 4.0, GpsAssisted),
            (GpsAssisted, 0.3, 5.5, Visual),
            (GpsAssisted, 1.1, 4.0, GpsPrimary),
            (GpsPrimary, 3.0, 7.0, Searching),
            (GpsPrimary, 0.0, 1.0, GpsAssisted),
            (Searching, INF, INF, Searching),
            (Searching, 0.05, INF, Visual),
            (Searching, INF, 0.2, GpsPrimary),
            (Searching, 0.05, 0.2, GpsAssisted),
        ];

        for (current, vision_age, gps_age, expected) in cases {
            let next = ModeSelector::transition(current, Freshness::new(vision_age, gps_age), 1.0, 5.0);
            assert_eq!(
                next, expected,
                "from {current} with vision {vision_age}s, gps {gps_age}s"
            );
        }
    }

    #[test]
    fn test_timeout_boundary_is_fresh() {
        let at_limit = Freshness::new(1.0, 5.0);
        assert_eq!(ModeSelector::transition(Visual, at_limit, 1.0, 5.0), GpsAssisted);

        let just_over = Freshness::new(1.0 + 1e-9, 5.0 + 1e-9);
        assert_eq!(ModeSelector::transition(Visual, just_over, 1.0, 5.0), Searching);
    }

    #[test]
    fn test_nan_age_counts_as_stale() {
        let freshness = Freshness::new(f64::NAN, 0.5);
        assert_eq!(ModeSelector::transition(Visual, freshness, 1.0, 5.0), GpsPrimary);
    }

    #[test]
    fn test_advance_reports_change_once() {
        let mut selector = ModeSelector::new(1.0, 5.0);
        assert_eq!(selector.current(), Idle);

        assert_eq!(selector.advance(Freshness::new(0.1, INF)), Some(Idle));
        assert_eq!(selector.current(), Visual);
        assert_eq!(selector.advance(Freshness::new(0.1, INF)), None);

        assert_eq!(selector.advance(Freshness::new(3.0, INF)), Some(Visual));
        assert_eq!(selector.current(), Searching);
    }

    #[test]
    fn test_searching_never_returns_to_idle_without_reset() {
        let mut selector = ModeSelector::new(1.0, 5.0);
        selector.advance(Freshness::new(0.0, INF));
        selector.advance(Freshness::unknown());
        assert_eq!(selector.current(), Searching);

        for _ in 0..10 {
            selector.advance(Freshness::unknown());
        }
        assert_eq!(selector.current(), Searching);

        selector.reset();
        assert_eq!(selector.current(), Idle);
        assert_eq!(selector.evaluate(Freshness::unknown()), Idle);
    }
}
