//! # Metrics & Health
//!
//! Prometheus metrics for sync cycles plus the `/metrics` and `/health`
//! routes. Recording goes through the `metrics` facade, so the cycle loop
//! and the HTTP listener never share anything but the recorder.
//!
//! ## Metric Names
//! ```text
//! counter  db_schema_sync_apply_total
//! counter  db_schema_sync_apply_success_total
//! counter  db_schema_sync_apply_error_total
//! counter  db_schema_sync_s3_fetch_total
//! counter  db_schema_sync_s3_fetch_error_total
//! gauge    db_schema_sync_consecutive_failures
//! gauge    db_schema_sync_last_apply_timestamp_seconds
//! gauge    db_schema_sync_process_start_time_seconds
//! gauge    db_schema_sync_last_applied_version_info{version}
//! ```

use std::sync::OnceLock;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::{SyncError, SyncResult};

// ============================================================================
// Metric Names
// ============================================================================

pub const APPLY_TOTAL: &str = "db_schema_sync_apply_total";
pub const APPLY_SUCCESS_TOTAL: &str = "db_schema_sync_apply_success_total";
pub const APPLY_ERROR_TOTAL: &str = "db_schema_sync_apply_error_total";
pub const S3_FETCH_TOTAL: &str = "db_schema_sync_s3_fetch_total";
pub const S3_FETCH_ERROR_TOTAL: &str = "db_schema_sync_s3_fetch_error_total";
pub const CONSECUTIVE_FAILURES: &str = "db_schema_sync_consecutive_failures";
pub const LAST_APPLY_TIMESTAMP: &str = "db_schema_sync_last_apply_timestamp_seconds";
pub const PROCESS_START_TIME: &str = "db_schema_sync_process_start_time_seconds";
pub const LAST_APPLIED_VERSION_INFO: &str = "db_schema_sync_last_applied_version_info";

// ============================================================================
// Prometheus Recorder
// ============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder and stamps the process start time.
///
/// Safe to call more than once; later calls return the existing handle.
pub fn init_metrics() -> SyncResult<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| SyncError::InvalidConfig(format!("failed to install metrics recorder: {e}")))?;

    describe_metrics();
    gauge!(PROCESS_START_TIME).set(chrono::Utc::now().timestamp() as f64);

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

fn describe_metrics() {
    describe_counter!(APPLY_TOTAL, "Total number of schema apply attempts");
    describe_counter!(APPLY_SUCCESS_TOTAL, "Total number of successful schema applies");
    describe_counter!(APPLY_ERROR_TOTAL, "Total number of failed schema applies");
    describe_counter!(S3_FETCH_TOTAL, "Total number of S3 fetch attempts");
    describe_counter!(S3_FETCH_ERROR_TOTAL, "Total number of S3 fetch errors");
    describe_gauge!(CONSECUTIVE_FAILURES, "Current number of consecutive failures");
    describe_gauge!(
        LAST_APPLY_TIMESTAMP,
        "Unix timestamp of the last successful schema apply"
    );
    describe_gauge!(PROCESS_START_TIME, "Unix timestamp when the process started");
    describe_gauge!(
        LAST_APPLIED_VERSION_INFO,
        "Information about the last applied schema version"
    );
}

/// Returns the global Prometheus handle, if initialized.
pub fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// ============================================================================
// HTTP Endpoints
// ============================================================================

/// Handler for the `/metrics` endpoint.
pub async fn serve_metrics() -> impl IntoResponse {
    match prometheus_handle() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain; charset=utf-8")],
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Handler for the `/health` endpoint.
pub async fn serve_health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Routes for the metrics listener.
pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(serve_metrics))
        .route("/health", get(serve_health))
}

// ============================================================================
// Metric Recording
// ============================================================================

/// Records the start of a fetch (listing) attempt.
pub fn record_fetch_attempt() {
    counter!(S3_FETCH_TOTAL).increment(1);
}

/// Records a failed listing or download.
pub fn record_fetch_error() {
    counter!(S3_FETCH_ERROR_TOTAL).increment(1);
}

pub fn record_consecutive_failures(count: u32) {
    gauge!(CONSECUTIVE_FAILURES).set(f64::from(count));
}

pub fn record_apply_attempt() {
    counter!(APPLY_TOTAL).increment(1);
}

pub fn record_apply_error() {
    counter!(APPLY_ERROR_TOTAL).increment(1);
}

/// Records a successful apply of `version`.
///
/// `previous` must be the label this process last set through this
/// function, never a version learned from a marker. Its info gauge drops
/// to 0 so only the current version reads 1. The recorder facade cannot
/// remove a series, so the old label stays exported at 0.
pub fn record_apply_success(version: &str, previous: Option<&str>) {
    counter!(APPLY_SUCCESS_TOTAL).increment(1);
    gauge!(LAST_APPLY_TIMESTAMP).set(chrono::Utc::now().timestamp() as f64);

    if let Some(previous) = previous.filter(|p| *p != version) {
        gauge!(LAST_APPLIED_VERSION_INFO, "version" => previous.to_string()).set(0.0);
    }
    gauge!(LAST_APPLIED_VERSION_INFO, "version" => version.to_string()).set(1.0);
}
