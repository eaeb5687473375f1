use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use shared_types::{ExecutedRun, RunRequest, RunResponse, SkipReason, SkippedRun, TaskStatus};

use super::{ApiFailure, ApiJson, TaskPath};
use crate::ledger::{RunCommand, RunOutcome};
use crate::AppState;

impl From<RunOutcome> for RunResponse {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Skipped {
                run_key,
                artifact_id,
                comment_message_id,
            } => RunResponse::Skipped(SkippedRun {
                ok: true,
                skipped: true,
                reason: SkipReason::AlreadyRan,
                run_key,
                artifact_id,
                comment_message_id,
            }),
            RunOutcome::Executed {
                run_key,
                artifact_id,
                comment_message_id,
                resolved_status,
                messages_in_window,
                relevant_messages,
                total_messages,
            } => RunResponse::Executed(ExecutedRun {
                ok: true,
                skipped: false,
                run_key,
                artifact_id,
                comment_message_id,
                resolved_status,
                messages_in_window,
                relevant_messages,
                total_messages,
            }),
        }
    }
}

/// POST /scopes/{scope}/tasks/{task_id}/runs
pub async fn execute_run(
    State(state): State<Arc<AppState>>,
    Path(p): Path<TaskPath>,
    ApiJson(body): ApiJson<RunRequest>,
) -> Response {
    let cmd = RunCommand::new(p.scope, p.task_id, body.executor_identity)
        .run_key(
            body.run_key
                .unwrap_or_else(|| state.defaults.run_key.clone()),
        )
        .window_size(body.window_size.unwrap_or(state.defaults.window_size))
        .requested_status(body.requested_status.unwrap_or(TaskStatus::Review));

    match state.ledger.execute(cmd).await {
        Ok(outcome) => Json(RunResponse::from(outcome)).into_response(),
        Err(e) => ApiFailure::from_run(e).into_response(),
    }
}

/// GET /scopes/{scope}/tasks/{task_id}/runs
pub async fn list_runs(State(state): State<Arc<AppState>>, Path(p): Path<TaskPath>) -> Response {
    match state.ledger.list_runs(&p.scope, &p.task_id).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => ApiFailure::from(e).into_response(),
    }
}
