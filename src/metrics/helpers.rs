//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    CREDENTIAL_REFRESH_TOTAL, PUSH_ATTEMPTS_TOTAL, PUSH_FAILED_TOTAL, PUSH_SUCCESS_TOTAL,
    REQUESTS_PROCESSED_TOTAL, RETRIES_EXHAUSTED_TOTAL, RETRIES_SCHEDULED_TOTAL,
    UNSUBSCRIBES_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording push metrics
pub struct PushMetrics;

impl PushMetrics {
    /// Record a processed request by dispatch path
    pub fn record_request(path: &str) {
        REQUESTS_PROCESSED_TOTAL.with_label_values(&[path]).inc();
    }

    pub fn record_attempt() {
        PUSH_ATTEMPTS_TOTAL.inc();
    }

    pub fn record_success() {
        PUSH_SUCCESS_TOTAL.inc();
    }

    /// Record a failure: "storage", "no_device", or a `ClassifiedOutcome::label`
    pub fn record_failed(reason: &str) {
        PUSH_FAILED_TOTAL.with_label_values(&[reason]).inc();
    }
}

/// Helper struct for recording recovery metrics
pub struct RecoveryMetrics;

impl RecoveryMetrics {
    pub fn record_retry_scheduled() {
        RETRIES_SCHEDULED_TOTAL.inc();
    }

    pub fn record_retry_exhausted() {
        RETRIES_EXHAUSTED_TOTAL.inc();
    }

    pub fn record_provider_refreshed() {
        CREDENTIAL_REFRESH_TOTAL.with_label_values(&["provider"]).inc();
    }

    pub fn record_target_refreshed() {
        CREDENTIAL_REFRESH_TOTAL.with_label_values(&["target"]).inc();
    }

    pub fn record_unsubscribe_emitted() {
        UNSUBSCRIBES_TOTAL.with_label_values(&["emitted"]).inc();
    }

    pub fn record_unsubscribe_applied() {
        UNSUBSCRIBES_TOTAL.with_label_values(&["applied"]).inc();
    }
}
