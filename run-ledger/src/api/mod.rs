//! HTTP API for the run ledger.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use shared_types::{ApiError, ErrorResponse};
use tracing::error;

use crate::error::LedgerError;
use crate::AppState;

pub mod runs;
pub mod tasks;

/// Configure all API routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/scopes/{scope}/tasks", post(tasks::create_task))
        .route("/scopes/{scope}/tasks/{task_id}", get(tasks::get_task))
        .route(
            "/scopes/{scope}/tasks/{task_id}/messages",
            get(tasks::list_messages).post(tasks::post_message),
        )
        .route(
            "/scopes/{scope}/tasks/{task_id}/status",
            patch(tasks::update_status),
        )
        .route(
            "/scopes/{scope}/tasks/{task_id}/approve",
            post(tasks::approve_task),
        )
        .route(
            "/scopes/{scope}/tasks/{task_id}/activities",
            get(tasks::list_activities),
        )
        .route(
            "/scopes/{scope}/tasks/{task_id}/artifacts",
            get(tasks::list_artifacts),
        )
        .route(
            "/scopes/{scope}/tasks/{task_id}/runs",
            get(runs::list_runs).post(runs::execute_run),
        )
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "run-ledger",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

#[derive(Debug, Deserialize)]
pub struct TaskPath {
    pub scope: String,
    pub task_id: String,
}

/// JSON request body. Malformed or mistyped bodies are answered with the
/// same error shape as every other failure.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiFailure))]
pub struct ApiJson<T>(pub T);

/// Error codes for machine-readable error responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidRequest,
    TaskNotFound,
    RunFailed,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::TaskNotFound => "TASK_NOT_FOUND",
            ErrorCode::RunFailed => "RUN_FAILED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCode::TaskNotFound => StatusCode::NOT_FOUND,
            ErrorCode::RunFailed | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A [`LedgerError`] on its way out of a handler. Internal details are
/// logged here and never sent to the client.
#[derive(Debug)]
pub struct ApiFailure {
    code: ErrorCode,
    message: String,
}

impl ApiFailure {
    /// Failure of the run endpoint: any mid-run error collapses to
    /// `RUN_FAILED`.
    pub fn from_run(err: LedgerError) -> Self {
        if err.is_run_failure() {
            error!(error = %err, "run aborted");
            return Self {
                code: ErrorCode::RunFailed,
                message: "run failed; no changes were applied".to_string(),
            };
        }
        Self::from(err)
    }
}

impl From<LedgerError> for ApiFailure {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::TaskNotFound { .. } => Self {
                code: ErrorCode::TaskNotFound,
                message: "task not found".to_string(),
            },
            LedgerError::InvalidRequest(message) => Self {
                code: ErrorCode::InvalidRequest,
                message,
            },
            other => {
                error!(error = %other, "request failed");
                Self {
                    code: ErrorCode::InternalError,
                    message: "internal error".to_string(),
                }
            }
        }
    }
}

impl From<JsonRejection> for ApiFailure {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            code: ErrorCode::InvalidRequest,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            ok: false,
            error: ApiError {
                code: self.code.as_str().to_string(),
                message: self.message,
            },
        };
        (self.code.status_code(), Json(body)).into_response()
    }
}
