use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::{AppState, WorkerState};

pub mod channels;
pub mod health;
pub mod metrics;
pub mod tasks;

/// Routes of the submission-facing server.
pub fn server_router(state: AppState, max_payload_bytes: usize) -> Router {
    Router::new()
        .route(
            "/",
            post(tasks::submit_task).get(tasks::await_task_legacy),
        )
        .route("/health", get(health::server_health))
        .route("/api/v1/tasks", post(tasks::submit_task))
        .route("/api/v1/tasks/{task_id}", get(tasks::await_task))
        .route("/ws/results", get(channels::results_channel))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::disable())
        // Multipart framing on top of the crop itself.
        .layer(RequestBodyLimitLayer::new(max_payload_bytes + 64 * 1024))
}

/// Routes of the worker process.
pub fn worker_router(state: WorkerState) -> Router {
    Router::new()
        .route("/health", get(health::worker_health))
        .route("/ws/tasks", get(channels::tasks_channel))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Prometheus scrape endpoint, merged into either router.
pub fn metrics_router(handle: Arc<PrometheusHandle>) -> Router {
    Router::new().route("/metrics", get(metrics::prometheus_metrics).with_state(handle))
}
