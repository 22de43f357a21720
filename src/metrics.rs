use prometheus::{
    CounterVec, Encoder, HistogramVec, IntGauge, Registry, TextEncoder, histogram_opts, opts,
};
use std::time::Duration;

use crate::model::ZoneKind;

/// Prometheus metrics registry and collectors for validation and publishing
pub struct ZoneMetrics {
    registry: Registry,

    // Validation metrics
    validations_total: CounterVec,
    checker_duration: HistogramVec,

    // Publish metrics
    published_files_total: CounterVec,
    publish_runs_total: CounterVec,
    last_publish_files: IntGauge,
}

impl ZoneMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let validations_total = CounterVec::new(
            opts!(
                "zonekeeper_validations_total",
                "Total number of zone validations by outcome"
            ),
            &["kind", "status"],
        )?;

        let checker_duration = HistogramVec::new(
            histogram_opts!(
                "zonekeeper_checker_duration_seconds",
                "External zone checker run time in seconds",
                vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
            ),
            &["status"],
        )?;

        let published_files_total = CounterVec::new(
            opts!(
                "zonekeeper_published_files_total",
                "Total number of zone files handled by publish runs"
            ),
            &["kind", "status"],
        )?;

        let publish_runs_total = CounterVec::new(
            opts!(
                "zonekeeper_publish_runs_total",
                "Total number of publish runs by overall result"
            ),
            &["result"],
        )?;

        let last_publish_files = IntGauge::with_opts(opts!(
            "zonekeeper_last_publish_files",
            "Number of distinct files handled by the most recent publish run"
        ))?;

        registry.register(Box::new(validations_total.clone()))?;
        registry.register(Box::new(checker_duration.clone()))?;
        registry.register(Box::new(published_files_total.clone()))?;
        registry.register(Box::new(publish_runs_total.clone()))?;
        registry.register(Box::new(last_publish_files.clone()))?;

        Ok(Self {
            registry,
            validations_total,
            checker_duration,
            published_files_total,
            publish_runs_total,
            last_publish_files,
        })
    }

    /// Record a validation verdict
    pub fn record_validation(&self, kind: ZoneKind, status: &str) {
        self.validations_total
            .with_label_values(&[kind.as_str(), status])
            .inc();
    }

    /// Record how long one checker invocation took
    pub fn record_checker_run(&self, status: &str, duration: Duration) {
        self.checker_duration
            .with_label_values(&[status])
            .observe(duration.as_secs_f64());
    }

    /// Record the outcome of one file in a publish run
    pub fn record_published_file(&self, kind: ZoneKind, status: &str) {
        self.published_files_total
            .with_label_values(&[kind.as_str(), status])
            .inc();
    }

    pub fn record_publish_run(&self, success: bool, total_files: usize) {
        self.publish_runs_total
            .with_label_values(&[if success { "success" } else { "partial" }])
            .inc();
        self.last_publish_files.set(total_files as i64);
    }

    /// Export metrics in Prometheus format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

impl Default for ZoneMetrics {
    fn default() -> Self {
        Self::new().expect("Failed to create zone metrics")
    }
}
