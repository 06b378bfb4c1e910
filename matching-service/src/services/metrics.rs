//! Prometheus metrics for matching-service.

use once_cell::sync::Lazy;
use prometheus::{
    CounterVec, Encoder, HistogramVec, TextEncoder, register_counter_vec,
    register_histogram_vec,
};

/// Counter for engine operations by operation and outcome.
pub static ENGINE_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "matching_engine_operations_total",
        "Total number of matching engine operations",
        &["operation", "status"]
    )
    .expect("Failed to register ENGINE_OPERATIONS")
});

/// Histogram for database query duration by operation.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "matching_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for candidates retained per match tier.
pub static TIER_MATCHES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "matching_tier_matches_total",
        "Total number of candidates retained, by match tier",
        &["tier"]
    )
    .expect("Failed to register TIER_MATCHES")
});

/// Counter for Tier-3 extraction calls.
pub static EXTRACTIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "matching_extractions_total",
        "Total number of free-text extraction calls",
        &["status"]
    )
    .expect("Failed to register EXTRACTIONS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&ENGINE_OPERATIONS);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&TIER_MATCHES);
    Lazy::force(&EXTRACTIONS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Record an engine operation outcome.
pub fn record_engine_operation(operation: &str, status: &str) {
    ENGINE_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
}

/// Record candidates retained by a tier.
pub fn record_tier_matches(tier: &str, count: usize) {
    TIER_MATCHES.with_label_values(&[tier]).inc_by(count as f64);
}

/// Record an extraction call.
pub fn record_extraction(status: &str) {
    EXTRACTIONS.with_label_values(&[status]).inc();
}
