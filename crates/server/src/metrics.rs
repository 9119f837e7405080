//! Prometheus metrics.
//!
//! All metrics live in a dedicated [`REGISTRY`] and are exposed at `/metrics`
//! when `server.metrics_enabled` is set. The endpoint is unauthenticated;
//! restrict it to scrapers at the network level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static UPLOAD_SESSIONS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "resumable_upload_sessions_created_total",
        "Total upload sessions created",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_SESSIONS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "resumable_upload_sessions_completed_total",
        "Total upload sessions marked complete",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_SESSIONS_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "resumable_upload_sessions_deleted_total",
        "Total upload sessions deleted",
    )
    .expect("metric creation failed")
});

pub static BYTES_APPENDED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "resumable_bytes_appended_total",
        "Total bytes durably appended to upload storage",
    )
    .expect("metric creation failed")
});

pub static OFFSET_CONFLICTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "resumable_offset_conflicts_total",
        "Appends rejected because the client offset did not match",
    )
    .expect("metric creation failed")
});

pub static API_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("resumable_api_errors_total", "API errors by error code"),
        &["code"],
    )
    .expect("metric creation failed")
});

pub static APPEND_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "resumable_append_duration_seconds",
            "Time spent handling a single append, including body copy",
        )
        .buckets(vec![0.005, 0.05, 0.25, 1.0, 5.0, 30.0, 120.0, 600.0]),
    )
    .expect("metric creation failed")
});

static REGISTER: Once = Once::new();

/// Register all metrics with the registry. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(UPLOAD_SESSIONS_CREATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_SESSIONS_COMPLETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_SESSIONS_DELETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_APPENDED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(OFFSET_CONFLICTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(API_ERRORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(APPEND_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Count an API error by its code.
pub fn record_api_error(code: &str) {
    API_ERRORS.with_label_values(&[code]).inc();
}
