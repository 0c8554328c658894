//! Metrics and observability utilities
//!
//! Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all ShortHub metrics
pub const METRICS_PREFIX: &str = "shorthub";

/// SLO-aligned histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms - P99 target
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

/// Buckets for storage transfers (uploads can take minutes)
pub const TRANSFER_BUCKETS: &[f64] = &[0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_work_item_transitions_total", METRICS_PREFIX),
        Unit::Count,
        "Work item status transitions by destination status"
    );

    describe_counter!(
        format!("{}_notifications_sent_total", METRICS_PREFIX),
        Unit::Count,
        "Notification deliveries by channel and outcome"
    );

    describe_counter!(
        format!("{}_storage_operations_total", METRICS_PREFIX),
        Unit::Count,
        "External storage operations by operation and outcome"
    );

    describe_histogram!(
        format!("{}_storage_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "External storage operation latency in seconds"
    );

    describe_counter!(
        format!("{}_job_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Periodic job runs by job and outcome"
    );

    tracing::info!("Metrics registered");
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

pub fn record_transition(status: &str) {
    counter!(
        format!("{}_work_item_transitions_total", METRICS_PREFIX),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Channel is one of platform, email, whatsapp
pub fn record_notification(channel: &str, success: bool) {
    counter!(
        format!("{}_notifications_sent_total", METRICS_PREFIX),
        "channel" => channel.to_string(),
        "outcome" => outcome(success)
    )
    .increment(1);
}

pub fn record_storage(operation: &str, duration_secs: f64, success: bool) {
    counter!(
        format!("{}_storage_operations_total", METRICS_PREFIX),
        "operation" => operation.to_string(),
        "outcome" => outcome(success)
    )
    .increment(1);

    histogram!(
        format!("{}_storage_duration_seconds", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

pub fn record_job(job: &str, success: bool) {
    counter!(
        format!("{}_job_runs_total", METRICS_PREFIX),
        "job" => job.to_string(),
        "outcome" => outcome(success)
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, TRANSFER_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: calls must be no-ops
        RequestMetrics::start("GET", "/api/items").finish(200);
        record_transition("COMPLETED");
        record_notification("email", false);
        record_storage("upload", 1.5, true);
        record_job("deadline_reminder", true);
    }
}
