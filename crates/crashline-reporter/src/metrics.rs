//! Prometheus metrics registry for crash processing
//!
//! Counts what happens to crash records as they move through the
//! lifecycle, and how each processing cycle ends.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Outcome label values for `records_total`.
pub mod outcome {
    pub const QUEUED: &str = "queued";
    pub const DELIVERED: &str = "delivered";
    pub const DISCARDED: &str = "discarded";
    pub const DROPPED_UNREADABLE: &str = "dropped_unreadable";
    pub const DROPPED_FORMAT: &str = "dropped_format";
    pub const VETOED: &str = "vetoed";
}

/// Result label values for `cycles_total`.
pub mod cycle {
    pub const COMPLETED: &str = "completed";
    pub const ABORTED_BACKGROUND: &str = "aborted_background";
    pub const SKIPPED_BUSY: &str = "skipped_busy";
    pub const EMPTY: &str = "empty";
}

/// Central metrics registry holding the reporter's Prometheus metrics.
pub struct MetricsRegistry {
    registry: Registry,
    /// Counter: crash records by outcome
    pub records_total: IntCounterVec,
    /// Gauge: crash files currently queued on disk
    pub queue_depth: IntGauge,
    /// Counter: processing cycles by result
    pub cycles_total: IntCounterVec,
    /// Histogram: time spent formatting one dump, in seconds
    pub format_duration_seconds: Histogram,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("crashline".to_string()), None)?;

        let records_total = IntCounterVec::new(
            Opts::new("records_total", "Crash records by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(records_total.clone()))?;

        let queue_depth = IntGauge::new("queue_depth", "Crash files queued on disk")?;
        registry.register(Box::new(queue_depth.clone()))?;

        let cycles_total = IntCounterVec::new(
            Opts::new("cycles_total", "Processing cycles by result"),
            &["result"],
        )?;
        registry.register(Box::new(cycles_total.clone()))?;

        let format_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("format_duration_seconds", "Dump formatting duration in seconds")
                .buckets(vec![0.001, 0.01, 0.1, 1.0, f64::INFINITY]),
        )?;
        registry.register(Box::new(format_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            records_total,
            queue_depth,
            cycles_total,
            format_duration_seconds,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    pub fn record_outcome(&self, outcome: &str) {
        self.records_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_cycle(&self, result: &str) {
        self.cycles_total.with_label_values(&[result]).inc();
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as i64);
    }

    pub fn observe_format_duration(&self, duration_secs: f64) {
        self.format_duration_seconds.observe(duration_secs);
    }

    /// Current count for one outcome label.
    pub fn outcome_count(&self, outcome: &str) -> u64 {
        self.records_total.with_label_values(&[outcome]).get()
    }

    /// Current count for one cycle result label.
    pub fn cycle_count(&self, result: &str) -> u64 {
        self.cycles_total.with_label_values(&[result]).get()
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
