//! Prometheus metrics for the sighting pipeline
//!
//! This module provides metrics tracking for:
//! - Collectors: runs by result, items produced, health status
//! - Pipeline: outcomes by status, skipped items, cycle duration
//! - Transport: retries by reason
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge_vec, register_histogram, Counter,
    CounterVec, Encoder, GaugeVec, Histogram, TextEncoder,
};
use std::sync::OnceLock;

use crate::models::OutcomeStatus;
use crate::registry::HealthStatus;

/// Container for all pipeline metrics
struct PipelineMetrics {
    collector_runs: CounterVec,
    collector_items: CounterVec,
    collector_health: GaugeVec,
    outcomes: CounterVec,
    skipped_items: Counter,
    cycle_duration: Histogram,
    transport_retries: CounterVec,
}

static METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// Subsequent calls are no-ops.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = PipelineMetrics {
        collector_runs: register_counter_vec!(
            "avspotter_collector_runs_total",
            "Collector runs by collector and result",
            &["collector", "result"]
        )?,
        collector_items: register_counter_vec!(
            "avspotter_collector_items_total",
            "Items produced by collector",
            &["collector"]
        )?,
        collector_health: register_gauge_vec!(
            "avspotter_collector_health",
            "Collector health (0 = healthy, 1 = degraded, 2 = failed)",
            &["collector"]
        )?,
        outcomes: register_counter_vec!(
            "avspotter_item_outcomes_total",
            "Processed items by outcome",
            &["outcome"]
        )?,
        skipped_items: register_counter!(
            "avspotter_items_skipped_total",
            "Items skipped because an outcome was already recorded"
        )?,
        cycle_duration: register_histogram!(
            "avspotter_cycle_duration_seconds",
            "Wall time of a full scrape cycle in seconds",
            vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0]
        )?,
        transport_retries: register_counter_vec!(
            "avspotter_transport_retries_total",
            "Transport retries by reason",
            &["reason"]
        )?,
    };

    METRICS
        .set(metrics)
        .map_err(|_| "Pipeline metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    METRICS.get().is_some()
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record one collector run
pub fn record_collector_run(collector: &str, success: bool, items: usize) {
    let Some(m) = METRICS.get() else {
        return;
    };

    let result = if success { "success" } else { "failure" };
    m.collector_runs
        .with_label_values(&[collector, result])
        .inc();

    if items > 0 {
        m.collector_items
            .with_label_values(&[collector])
            .inc_by(items as f64);
    }
}

/// Publish a collector's current health status
pub fn update_collector_health(collector: &str, status: HealthStatus) {
    if let Some(m) = METRICS.get() {
        let value = match status {
            HealthStatus::Healthy => 0.0,
            HealthStatus::Degraded => 1.0,
            HealthStatus::Failed => 2.0,
        };
        m.collector_health.with_label_values(&[collector]).set(value);
    }
}

/// Record the terminal outcome of one item
pub fn record_outcome(status: OutcomeStatus) {
    if let Some(m) = METRICS.get() {
        m.outcomes.with_label_values(&[status.as_str()]).inc();
    }
}

/// Record an item skipped by the idempotency check
pub fn record_skipped() {
    if let Some(m) = METRICS.get() {
        m.skipped_items.inc();
    }
}

/// Record a transport retry
pub fn record_transport_retry(reason: &str) {
    if let Some(m) = METRICS.get() {
        m.transport_retries.with_label_values(&[reason]).inc();
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a cycle timer
pub fn start_cycle_timer() -> MetricsTimer {
    MetricsTimer {
        timer: METRICS.get().map(|m| m.cycle_duration.start_timer()),
    }
}
