//! Run ledger HTTP API integration tests

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use run_ledger::generator::TemplateGenerator;
use run_ledger::store::SqliteStore;
use run_ledger::{db, AppState, RunDefaults};

async fn setup_test_app() -> (axum::Router, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("api.db");
    let pool = db::connect(&format!("sqlite:{}", db_path.display()))
        .await
        .expect("Failed to open database");

    let state = Arc::new(AppState::new(
        Arc::new(SqliteStore::new(pool)),
        Arc::new(TemplateGenerator),
        RunDefaults::default(),
    ));
    (run_ledger::app(state), temp_dir)
}

async fn json_response(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.expect("Request failed");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    let value: Value = serde_json::from_slice(&body).expect("Invalid JSON response");
    (status, value)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn create_task(app: &axum::Router, scope: &str) -> String {
    let (status, body) = json_response(
        app,
        json_request(
            "POST",
            &format!("/scopes/{scope}/tasks"),
            json!({ "title": "Launch checklist", "description": "Collect sign-offs" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "inbox");
    body["id"].as_str().expect("task id").to_string()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _temp_dir) = setup_test_app().await;

    let (status, body) = json_response(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_run_twice_with_same_key_skips() {
    let (app, _temp_dir) = setup_test_app().await;
    let task_id = create_task(&app, "ops").await;
    let uri = format!("/scopes/ops/tasks/{task_id}/runs");

    let (status, first) = json_response(
        &app,
        json_request(
            "POST",
            &uri,
            json!({ "executorIdentity": "agent:developer:main", "runKey": "v1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["ok"], true);
    assert_eq!(first["skipped"], false);
    assert_eq!(first["runKey"], "v1");
    assert_eq!(first["resolvedStatus"], "review");

    let (status, second) = json_response(
        &app,
        json_request(
            "POST",
            &uri,
            json!({ "executorIdentity": "agent:developer:main", "runKey": "v1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["skipped"], true);
    assert_eq!(second["reason"], "already_ran");
    assert_eq!(second["artifactId"], first["artifactId"]);
    assert_eq!(second["commentMessageId"], first["commentMessageId"]);

    let (_, runs) = json_response(&app, get(&uri)).await;
    assert_eq!(runs.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_run_uses_default_run_key() {
    let (app, _temp_dir) = setup_test_app().await;
    let task_id = create_task(&app, "ops").await;

    let (status, body) = json_response(
        &app,
        json_request(
            "POST",
            &format!("/scopes/ops/tasks/{task_id}/runs"),
            json!({ "executorIdentity": "agent:developer:main" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["runKey"], shared_types::DEFAULT_RUN_KEY);
}

#[tokio::test]
async fn test_run_requesting_done_lands_on_review() {
    let (app, _temp_dir) = setup_test_app().await;
    let task_id = create_task(&app, "ops").await;

    let (status, body) = json_response(
        &app,
        json_request(
            "POST",
            &format!("/scopes/ops/tasks/{task_id}/runs"),
            json!({ "executorIdentity": "agent:developer:main", "requestedStatus": "done" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resolvedStatus"], "review");

    let (_, task) = json_response(&app, get(&format!("/scopes/ops/tasks/{task_id}"))).await;
    assert_eq!(task["status"], "review");
}

#[tokio::test]
async fn test_run_in_foreign_scope_is_not_found() {
    let (app, _temp_dir) = setup_test_app().await;
    let task_id = create_task(&app, "ops").await;

    let (status, body) = json_response(
        &app,
        json_request(
            "POST",
            &format!("/scopes/finance/tasks/{task_id}/runs"),
            json!({ "executorIdentity": "agent:developer:main" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"]["code"], "TASK_NOT_FOUND");

    let (_, artifacts) =
        json_response(&app, get(&format!("/scopes/ops/tasks/{task_id}/artifacts"))).await;
    assert!(artifacts.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_run_with_blank_executor_is_invalid() {
    let (app, _temp_dir) = setup_test_app().await;
    let task_id = create_task(&app, "ops").await;

    let (status, body) = json_response(
        &app,
        json_request(
            "POST",
            &format!("/scopes/ops/tasks/{task_id}/runs"),
            json!({ "executorIdentity": "" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_thread_counts_reported_by_run() {
    let (app, _temp_dir) = setup_test_app().await;
    let task_id = create_task(&app, "ops").await;
    let messages_uri = format!("/scopes/ops/tasks/{task_id}/messages");

    for (author, content) in [
        ("human1", "Vendor confirmed"),
        ("executorX", "Drafting now"),
        ("human2", "Legal approved"),
    ] {
        let (status, _) = json_response(
            &app,
            json_request(
                "POST",
                &messages_uri,
                json!({ "author": author, "content": content }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, body) = json_response(
        &app,
        json_request(
            "POST",
            &format!("/scopes/ops/tasks/{task_id}/runs"),
            json!({ "executorIdentity": "executorX" }),
        ),
    )
    .await;
    assert_eq!(body["messagesInWindow"], 3);
    assert_eq!(body["relevantMessages"], 2);
    assert_eq!(body["totalMessages"], 3);

    let (_, thread) = json_response(&app, get(&messages_uri)).await;
    let thread = thread.as_array().unwrap();
    assert_eq!(thread.len(), 4);
    assert_eq!(thread[3]["id"], body["commentMessageId"]);
}

#[tokio::test]
async fn test_status_patch_done_becomes_review() {
    let (app, _temp_dir) = setup_test_app().await;
    let task_id = create_task(&app, "ops").await;

    let (status, body) = json_response(
        &app,
        json_request(
            "PATCH",
            &format!("/scopes/ops/tasks/{task_id}/status"),
            json!({ "actor": "human1", "status": "done" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "review");

    let (_, activities) =
        json_response(&app, get(&format!("/scopes/ops/tasks/{task_id}/activities"))).await;
    let activities = activities.as_array().unwrap();
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0]["kind"], "status_changed");
    assert_eq!(activities[0]["actor"], "human1");
}

#[tokio::test]
async fn test_approve_sets_done() {
    let (app, _temp_dir) = setup_test_app().await;
    let task_id = create_task(&app, "ops").await;

    let (status, body) = json_response(
        &app,
        json_request(
            "POST",
            &format!("/scopes/ops/tasks/{task_id}/approve"),
            json!({ "actor": "lead" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "done");

    let (_, activities) =
        json_response(&app, get(&format!("/scopes/ops/tasks/{task_id}/activities"))).await;
    let kinds: Vec<&str> = activities
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["status_changed", "task_approved"]);
}

#[tokio::test]
async fn test_create_task_requires_title() {
    let (app, _temp_dir) = setup_test_app().await;

    let (status, body) = json_response(
        &app,
        json_request("POST", "/scopes/ops/tasks", json!({ "title": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_get_unknown_task_is_not_found() {
    let (app, _temp_dir) = setup_test_app().await;

    let (status, body) = json_response(&app, get("/scopes/ops/tasks/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "TASK_NOT_FOUND");
}

#[tokio::test]
async fn test_unreadable_bodies_use_error_shape() {
    let (app, _temp_dir) = setup_test_app().await;
    let task_id = create_task(&app, "ops").await;
    let runs_uri = format!("/scopes/ops/tasks/{task_id}/runs");

    let malformed = Request::builder()
        .method("POST")
        .uri(&runs_uri)
        .header("content-type", "application/json")
        .body(Body::from("{\"executorIdentity\":"))
        .unwrap();
    let (status, body) = json_response(&app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");

    let (status, body) = json_response(
        &app,
        json_request(
            "POST",
            &runs_uri,
            json!({ "executorIdentity": "agent:developer:main", "requestedStatus": "shipped" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");

    // Nothing ran.
    let (_, runs) = json_response(&app, get(&runs_uri)).await;
    assert_eq!(runs.as_array().map(Vec::len), Some(0));
}
