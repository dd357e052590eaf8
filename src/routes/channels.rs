use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;

use crate::app_state::{AppState, WorkerState};
use crate::error::ApiError;
use crate::services::intake;

/// GET /ws/results (server) — the worker's result channel.
pub async fn results_channel(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        tracing::info!("Worker result channel connected");
        let (_sink, stream) = socket.split();
        tokio::select! {
            _ = state.shutdown.cancelled() => {}
            _ = intake::receive_results(stream, &state.registry) => {}
        }
    })
}

/// GET /ws/tasks (worker) — the dispatcher's job channel.
///
/// Only one dispatcher may be connected; a second one is refused with 409
/// until the first disconnects.
pub async fn tasks_channel(ws: WebSocketUpgrade, State(state): State<WorkerState>) -> Response {
    let Some(permit) = state.intake_gate.try_enter() else {
        tracing::warn!("Refusing second dispatcher connection");
        return ApiError::Conflict("a dispatcher is already connected".to_string())
            .into_response();
    };

    ws.max_message_size(state.max_frame_bytes)
        .on_upgrade(move |socket| async move {
            let _permit = permit;
            tracing::info!("Dispatcher connected");
            let (_sink, stream) = socket.split();
            tokio::select! {
                _ = state.shutdown.cancelled() => {}
                _ = intake::receive_jobs(stream, &state.jobs) => {}
            }
        })
}
