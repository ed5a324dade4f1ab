//! Prometheus metrics for the cache reprocessing service
//!
//! Provides centralized metrics collection for monitoring:
//! - Manifest validation and record streaming
//! - Inbound notification outcomes
//! - Cache backend latency and slow requests
//! - Outbound publishing and retries

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, TextEncoder, opts, register_histogram_vec,
    register_int_counter, register_int_counter_vec,
};

// ============================================================================
// Record Metrics
// ============================================================================

/// Records confirmed present in the cache during validation
pub static RECORDS_VALIDATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "reprocess_records_validated_total",
        "Total number of manifest records confirmed present in the cache"
    ))
    .expect("Failed to register RECORDS_VALIDATED_TOTAL metric")
});

/// Records fed into the cache lookup stage
pub static RECORDS_STREAMED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "reprocess_records_streamed_total",
        "Total number of records fed into the cache lookup stage"
    ))
    .expect("Failed to register RECORDS_STREAMED_TOTAL metric")
});

/// Inbound notifications by outcome (accepted / rejected)
pub static NOTIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "reprocess_notifications_total",
            "Inbound notifications processed, by outcome"
        ),
        &["outcome"]
    )
    .expect("Failed to register NOTIFICATIONS_TOTAL metric")
});

// ============================================================================
// Cache Metrics
// ============================================================================

/// Cache request duration in seconds (histogram)
pub static CACHE_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "reprocess_cache_request_duration_seconds",
        "Cache backend request duration in seconds",
        &["backend", "operation"]
    )
    .expect("Failed to register CACHE_REQUEST_DURATION_SECONDS metric")
});

/// Cache requests at or above the slow request threshold
pub static CACHE_SLOW_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "reprocess_cache_slow_requests_total",
            "Cache backend requests at or above the slow request threshold"
        ),
        &["backend", "operation"]
    )
    .expect("Failed to register CACHE_SLOW_REQUESTS_TOTAL metric")
});

/// Cache entries dropped because a required field was missing
pub static CACHE_ENTRIES_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "reprocess_cache_entries_dropped_total",
            "Cache entries dropped for a missing or empty field"
        ),
        &["field"]
    )
    .expect("Failed to register CACHE_ENTRIES_DROPPED_TOTAL metric")
});

// ============================================================================
// Delivery Metrics
// ============================================================================

/// Messages accepted by the outbound queue
pub static MESSAGES_PUBLISHED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "reprocess_messages_published_total",
        "Total number of messages accepted by the outbound queue"
    ))
    .expect("Failed to register MESSAGES_PUBLISHED_TOTAL metric")
});

/// Publish retries of a rejected subset
pub static PUBLISH_RETRIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "reprocess_publish_retries_total",
        "Total number of retries of partially rejected publish batches"
    ))
    .expect("Failed to register PUBLISH_RETRIES_TOTAL metric")
});

/// Payloads moved to the message bucket because they were too large
pub static OVERSIZE_PAYLOADS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "reprocess_oversize_payloads_total",
        "Total number of payloads offloaded to the message bucket"
    ))
    .expect("Failed to register OVERSIZE_PAYLOADS_TOTAL metric")
});

// ============================================================================
// Metrics Collection
// ============================================================================

/// Gather all registered metrics and encode as Prometheus text format
pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_metrics() {
        // Increment a counter to ensure metrics are registered
        MESSAGES_PUBLISHED_TOTAL.inc();
        NOTIFICATIONS_TOTAL.with_label_values(&["accepted"]).inc();

        let metrics_text = gather_metrics().unwrap();
        assert!(metrics_text.contains("reprocess_messages_published_total"));
        assert!(metrics_text.contains("reprocess_notifications_total{outcome=\"accepted\"}"));
    }
}
