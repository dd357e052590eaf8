use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::{AppState, WorkerState};
use crate::services::delivery::DeliveryState;

#[derive(Serialize)]
pub struct ServerHealth {
    pub status: String,
    pub version: String,
    pub worker_link: String,
    pub submission_queue: usize,
    pub pending_tasks: usize,
    pub completed_tasks: usize,
    pub layouts: usize,
}

#[derive(Serialize)]
pub struct WorkerHealth {
    pub status: String,
    pub version: String,
    pub server_link: String,
    pub dispatcher_connected: bool,
    pub processing_queue: usize,
    pub result_queue: usize,
}

fn link_is_up(state: DeliveryState) -> bool {
    matches!(state, DeliveryState::Connected | DeliveryState::Sending)
}

fn status_of(healthy: bool) -> (StatusCode, String) {
    if healthy {
        (StatusCode::OK, "ok".to_string())
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded".to_string())
    }
}

/// GET /health (server) — queue depths and worker link status.
pub async fn server_health(State(state): State<AppState>) -> (StatusCode, Json<ServerHealth>) {
    let link = *state.dispatch_link.borrow();
    let (code, status) = status_of(link_is_up(link));

    let response = ServerHealth {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        worker_link: link.to_string(),
        submission_queue: state.submissions.queued(),
        pending_tasks: state.registry.pending_count(),
        completed_tasks: state.registry.completed_count(),
        layouts: state.submissions.layouts().len(),
    };

    (code, Json(response))
}

/// GET /health (worker) — queue depths and server link status.
pub async fn worker_health(State(state): State<WorkerState>) -> (StatusCode, Json<WorkerHealth>) {
    let link = *state.result_link.borrow();
    let (code, status) = status_of(link_is_up(link));

    let response = WorkerHealth {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        server_link: link.to_string(),
        dispatcher_connected: state.intake_gate.is_occupied(),
        processing_queue: state.jobs.len(),
        result_queue: state.results.len(),
    };

    (code, Json(response))
}
