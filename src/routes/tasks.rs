use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::job::TaskId;
use crate::models::task::{PendingResponse, SubmitQuery, SubmitResponse, TaskQuery};
use crate::services::registry::Lookup;

/// Multipart field carrying the crop bytes.
const PAYLOAD_FIELD: &str = "file";

/// POST /api/v1/tasks — upload a crop for registration against a layout.
pub async fn submit_task(
    State(state): State<AppState>,
    query: Result<Query<SubmitQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<SubmitResponse>> {
    let Query(query) = query.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    query.validate()?;
    let mut multipart = multipart.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

    let mut payload: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidRequest(e.body_text()))?
    {
        if field.name() == Some(PAYLOAD_FIELD) {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
            payload = Some(data.to_vec());
        }
    }

    let payload = payload.ok_or_else(|| {
        ApiError::InvalidRequest(format!("missing multipart field `{PAYLOAD_FIELD}`"))
    })?;

    let task_id = state
        .submissions
        .submit(&query.layout_name, payload, query.shape())?;

    Ok(Json(SubmitResponse { task_id }))
}

/// GET /api/v1/tasks/{task_id} — wait for a task's result and consume it.
pub async fn await_task(
    State(state): State<AppState>,
    task_id: Result<Path<TaskId>, PathRejection>,
) -> ApiResult<Response> {
    let Path(task_id) = task_id.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    lookup(&state, task_id).await
}

/// GET /?task_id=... — poll form used by older clients.
pub async fn await_task_legacy(
    State(state): State<AppState>,
    query: Result<Query<TaskQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    lookup(&state, query.task_id).await
}

async fn lookup(state: &AppState, task_id: TaskId) -> ApiResult<Response> {
    let lookup = tokio::select! {
        _ = state.shutdown.cancelled() => return Err(ApiError::ShuttingDown),
        lookup = state.submissions.await_result_timeout(task_id, state.result_wait) => lookup,
    };

    match lookup {
        Lookup::Ready(result) => Ok(Json(result).into_response()),
        Lookup::NotFound => Err(ApiError::NotFound(task_id)),
        Lookup::StillPending => Ok((
            StatusCode::ACCEPTED,
            Json(PendingResponse {
                task_id,
                status: "pending".to_string(),
            }),
        )
            .into_response()),
    }
}
