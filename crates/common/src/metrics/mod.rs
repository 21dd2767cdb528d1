//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram,
    gauge, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all FunFood metrics
pub const METRICS_PREFIX: &str = "funfood";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 50ms, P99 < 150ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - P50 target
    0.075,  // 75ms
    0.100,  // 100ms
    0.150,  // 150ms - P99 target
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
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

    // Query engine metrics
    describe_counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of collection queries"
    );

    describe_histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Collection query latency in seconds"
    );

    describe_gauge!(
        format!("{}_query_results", METRICS_PREFIX),
        Unit::Count,
        "Number of records matched by the last query"
    );

    // Store metrics
    describe_counter!(
        format!("{}_store_writes_total", METRICS_PREFIX),
        Unit::Count,
        "Total store mutations"
    );

    // Import metrics
    describe_counter!(
        format!("{}_import_rows_total", METRICS_PREFIX),
        Unit::Count,
        "Total rows processed by imports"
    );

    tracing::info!("Metrics registered");
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

/// Helper to record query engine metrics
pub fn record_query(duration_secs: f64, collection: &str, total: usize) {
    counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        "collection" => collection.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        "collection" => collection.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_query_results", METRICS_PREFIX),
        "collection" => collection.to_string()
    )
    .set(total as f64);
}

/// Helper to record store mutations
pub fn record_store_write(collection: &str, op: &str) {
    counter!(
        format!("{}_store_writes_total", METRICS_PREFIX),
        "collection" => collection.to_string(),
        "op" => op.to_string()
    )
    .increment(1);
}

/// Helper to record import outcomes
pub fn record_import(collection: &str, succeeded: usize, failed: usize) {
    counter!(
        format!("{}_import_rows_total", METRICS_PREFIX),
        "collection" => collection.to_string(),
        "outcome" => "success"
    )
    .increment(succeeded as u64);

    counter!(
        format!("{}_import_rows_total", METRICS_PREFIX),
        "collection" => collection.to_string(),
        "outcome" => "failed"
    )
    .increment(failed as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        // Verify buckets are sorted and contain SLO targets
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }

        assert!(LATENCY_BUCKETS.contains(&0.050));
        assert!(LATENCY_BUCKETS.contains(&0.150));
    }

    #[test]
    fn test_recorders_without_exporter() {
        let metrics = RequestMetrics::start("GET", "/api/products");
        metrics.finish(200);
        record_query(0.002, "products", 25);
        record_store_write("products", "insert");
        record_import("products", 3, 1);
    }
}
