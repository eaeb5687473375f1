use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared_types::{ApproveRequest, CreateTaskRequest, PostMessageRequest, UpdateStatusRequest};

use super::{ApiFailure, ApiJson, TaskPath};
use crate::AppState;

/// POST /scopes/{scope}/tasks
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Path(scope): Path<String>,
    ApiJson(body): ApiJson<CreateTaskRequest>,
) -> Response {
    match state.tasks.create_task(&scope, body).await {
        Ok(task) => (StatusCode::CREATED, Json(task)).into_response(),
        Err(e) => ApiFailure::from(e).into_response(),
    }
}

/// GET /scopes/{scope}/tasks/{task_id}
pub async fn get_task(State(state): State<Arc<AppState>>, Path(p): Path<TaskPath>) -> Response {
    match state.tasks.get_task(&p.scope, &p.task_id).await {
        Ok(task) => Json(task).into_response(),
        Err(e) => ApiFailure::from(e).into_response(),
    }
}

/// POST /scopes/{scope}/tasks/{task_id}/messages
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Path(p): Path<TaskPath>,
    ApiJson(body): ApiJson<PostMessageRequest>,
) -> Response {
    match state
        .tasks
        .post_message(&p.scope, &p.task_id, &body.author, &body.content)
        .await
    {
        Ok(message) => (StatusCode::CREATED, Json(message)).into_response(),
        Err(e) => ApiFailure::from(e).into_response(),
    }
}

/// GET /scopes/{scope}/tasks/{task_id}/messages
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(p): Path<TaskPath>,
) -> Response {
    match state.tasks.list_messages(&p.scope, &p.task_id).await {
        Ok(messages) => Json(messages).into_response(),
        Err(e) => ApiFailure::from(e).into_response(),
    }
}

/// PATCH /scopes/{scope}/tasks/{task_id}/status (`done` lands on `review`)
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(p): Path<TaskPath>,
    ApiJson(body): ApiJson<UpdateStatusRequest>,
) -> Response {
    match state
        .tasks
        .update_status(&p.scope, &p.task_id, &body.actor, body.status)
        .await
    {
        Ok(task) => Json(task).into_response(),
        Err(e) => ApiFailure::from(e).into_response(),
    }
}

/// POST /scopes/{scope}/tasks/{task_id}/approve
pub async fn approve_task(
    State(state): State<Arc<AppState>>,
    Path(p): Path<TaskPath>,
    ApiJson(body): ApiJson<ApproveRequest>,
) -> Response {
    match state.tasks.approve(&p.scope, &p.task_id, &body.actor).await {
        Ok(task) => Json(task).into_response(),
        Err(e) => ApiFailure::from(e).into_response(),
    }
}

/// GET /scopes/{scope}/tasks/{task_id}/activities
pub async fn list_activities(
    State(state): State<Arc<AppState>>,
    Path(p): Path<TaskPath>,
) -> Response {
    match state.tasks.list_activities(&p.scope, &p.task_id).await {
        Ok(activities) => Json(activities).into_response(),
        Err(e) => ApiFailure::from(e).into_response(),
    }
}

/// GET /scopes/{scope}/tasks/{task_id}/artifacts
pub async fn list_artifacts(
    State(state): State<Arc<AppState>>,
    Path(p): Path<TaskPath>,
) -> Response {
    match state.tasks.list_artifacts(&p.scope, &p.task_id).await {
        Ok(artifacts) => Json(artifacts).into_response(),
        Err(e) => ApiFailure::from(e).into_response(),
    }
}
