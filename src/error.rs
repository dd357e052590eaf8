use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::models::job::TaskId;
use crate::services::submission::SubmitError;

/// Errors surfaced to HTTP clients as `{"error", "code"}` JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or malformed payload, shape or layout name.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The task id was never dispatched or its result was already taken.
    #[error("Task {0} not found")]
    NotFound(TaskId),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service is shutting down")]
    ShuttingDown,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        ApiError::InvalidRequest(e.to_string())
    }
}

impl From<garde::Report> for ApiError {
    fn from(report: garde::Report) -> Self {
        ApiError::InvalidRequest(report.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, "SHUTTING_DOWN"),
        };

        let body = json!({
            "error": self.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
