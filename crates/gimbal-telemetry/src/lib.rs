//! # Gimbal Telemetry - Metrics & Observability
//!
//! Prometheus metrics for the fusion engine.
//! Provides real-time metrics for:
//! - Current tracking mode and mode churn
//! - Commanded pan/tilt and confidence
//! - Observation intake and rejections per source
//! - Fusion compute latency

use gimbal_core::{FusionResult, ObservationSource, TrackingMode};
use prometheus::{
    Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
};
use tracing::info;

/// Metrics collector for the fusion engine
pub struct FusionMetrics {
    registry: Registry,

    mode: IntGaugeVec,
    confidence: Gauge,
    pan_degrees: Gauge,
    tilt_degrees: Gauge,

    observations_total: IntCounterVec,
    observations_rejected: IntCounterVec,
    mode_changes: IntCounter,

    compute_seconds: Histogram,
}

impl FusionMetrics {
    /// Create a new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let mode = IntGaugeVec::new(
            Opts::new("gimbal_fusion_mode", "Current tracking mode (1 = active)"),
            &["mode"],
        )?;
        registry.register(Box::new(mode.clone()))?;

        let confidence = Gauge::new("gimbal_fusion_confidence", "Confidence of the last result")?;
        registry.register(Box::new(confidence.clone()))?;

        let pan_degrees = Gauge::new("gimbal_fusion_pan_degrees", "Last commanded pan offset")?;
        registry.register(Box::new(pan_degrees.clone()))?;

        let tilt_degrees =
            Gauge::new("gimbal_fusion_tilt_degrees", "Last commanded tilt offset")?;
        registry.register(Box::new(tilt_degrees.clone()))?;

        let observations_total = IntCounterVec::new(
            Opts::new("gimbal_fusion_observations_total", "Observations accepted"),
            &["source"],
        )?;
        registry.register(Box::new(observations_total.clone()))?;

        let observations_rejected = IntCounterVec::new(
            Opts::new(
                "gimbal_fusion_observations_rejected_total",
                "Observations rejected at ingestion",
            ),
            &["source"],
        )?;
        registry.register(Box::new(observations_rejected.clone()))?;

        let mode_changes = IntCounter::new(
            "gimbal_fusion_mode_changes_total",
            "Tracking mode transitions",
        )?;
        registry.register(Box::new(mode_changes.clone()))?;

        let compute_seconds = Histogram::with_opts(
            HistogramOpts::new("gimbal_fusion_compute_seconds", "Fusion compute time")
                .buckets(vec![0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01]),
        )?;
        registry.register(Box::new(compute_seconds.clone()))?;

        // Every mode is exported from the start, not only once visited
        for m in TrackingMode::ALL {
            mode.with_label_values(&[m.as_str()]).set(0);
        }
        mode.with_label_values(&[TrackingMode::Idle.as_str()]).set(1);

        info!("Metrics collector initialized");

        Ok(Self {
            registry,
            mode,
            confidence,
            pan_degrees,
            tilt_degrees,
            observations_total,
            observations_rejected,
            mode_changes,
            compute_seconds,
        })
    }

    /// Get Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> prometheus::Result<String> {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Record one fusion output
    pub fn record_result(&self, result: &FusionResult) {
        self.set_mode(result.mode);
        self.confidence.set(result.confidence);
        self.pan_degrees.set(result.pan_offset_deg);
        self.tilt_degrees.set(result.tilt_offset_deg);
    }

    fn set_mode(&self, current: TrackingMode) {
        for m in TrackingMode::ALL {
            self.mode
                .with_label_values(&[m.as_str()])
                .set(i64::from(m == current));
        }
    }

    /// Record an ingestion attempt
    pub fn record_ingest(&self, source: ObservationSource, accepted: bool) {
        let counter = if accepted {
            &self.observations_total
        } else {
            &self.observations_rejected
        };
        counter.with_label_values(&[source.as_str()]).inc();
    }

    pub fn record_mode_change(&self) {
        self.mode_changes.inc();
    }

    /// Record how long one `compute` took
    pub fn observe_compute(&self, seconds: f64) {
        self.compute_seconds.observe(seconds);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = FusionMetrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_metrics_export() {
        let metrics = FusionMetrics::new().unwrap();

        metrics.record_ingest(ObservationSource::Vision, true);
        metrics.record_ingest(ObservationSource::Gps, false);
        metrics.record_mode_change();
        metrics.observe_compute(0.0002);

        let export = metrics.export().unwrap();
        assert!(export.contains("gimbal_fusion_observations_total{source=\"vision\"} 1"));
        assert!(export.contains("gimbal_fusion_observations_rejected_total{source=\"gps\"} 1"));
        assert!(export.contains("gimbal_fusion_mode_changes_total 1"));
        assert!(export.contains("gimbal_fusion_compute_seconds_count 1"));
    }

    #[test]
    fn test_record_result_sets_single_mode() {
        let metrics = FusionMetrics::new().unwrap();

        let mut result = FusionResult::hold(TrackingMode::GpsPrimary);
        result.confidence = 0.5;
        result.pan_offset_deg = -12.5;
        metrics.record_result(&result);

        let export = metrics.export().unwrap();
        assert!(export.contains("gimbal_fusion_mode{mode=\"GPS_PRIMARY\"} 1"));
        assert!(export.contains("gimbal_fusion_mode{mode=\"IDLE\"} 0"));
        assert!(export.contains("gimbal_fusion_confidence 0.5"));
        assert!(export.contains("gimbal_fusion_pan_degrees -12.5"));
    }
}
