//! Prometheus metrics for the push dispatch core.
//!
//! - Request metrics (requests processed by dispatch path)
//! - Push metrics (attempts, successes, failures by reason)
//! - Recovery metrics (retries, credential refreshes, unsubscribes)

mod helpers;

pub use helpers::{encode_metrics, PushMetrics, RecoveryMetrics};

use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "ara_push";

lazy_static! {
    // ============================================================================
    // Request Metrics
    // ============================================================================

    /// Requests processed, labelled by dispatch path
    pub static ref REQUESTS_PROCESSED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_requests_processed_total", METRIC_PREFIX),
        "Total requests processed",
        &["path"]
    ).unwrap();

    // ============================================================================
    // Push Metrics
    // ============================================================================

    /// Push attempts handed to a backend
    pub static ref PUSH_ATTEMPTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_attempts_total", METRIC_PREFIX),
        "Total push attempts"
    ).unwrap();

    /// Successful pushes
    pub static ref PUSH_SUCCESS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_success_total", METRIC_PREFIX),
        "Total successful pushes"
    ).unwrap();

    /// Failed pushes and resolutions, labelled by reason
    pub static ref PUSH_FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_failed_total", METRIC_PREFIX),
        "Total failed pushes",
        &["reason"]
    ).unwrap();

    // ============================================================================
    // Recovery Metrics
    // ============================================================================

    /// Retries scheduled after a transient failure
    pub static ref RETRIES_SCHEDULED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_retries_scheduled_total", METRIC_PREFIX),
        "Total retries scheduled"
    ).unwrap();

    /// Transient failures dropped because the retry budget was spent
    pub static ref RETRIES_EXHAUSTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_retries_exhausted_total", METRIC_PREFIX),
        "Total delivery chains that ran out of retries"
    ).unwrap();

    /// Refreshed credentials persisted, labelled by kind
    pub static ref CREDENTIAL_REFRESH_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_credential_refresh_total", METRIC_PREFIX),
        "Total refreshed credentials persisted",
        &["kind"]
    ).unwrap();

    /// Unsubscribe requests, labelled by stage (emitted / applied)
    pub static ref UNSUBSCRIBES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_unsubscribes_total", METRIC_PREFIX),
        "Total unsubscribe requests",
        &["stage"]
    ).unwrap();
}
