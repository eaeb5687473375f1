//! Shared types between the run ledger server and its clients
//!
//! These types are used by both:
//! - the `run-ledger` HTTP server (storage rows, request/response bodies)
//! - the `flow-client` state machine and its HTTP client
//!
//! Serializable with serde for JSON over HTTP

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Run key used when the caller does not supply one.
pub const DEFAULT_RUN_KEY: &str = "deliverable-v1";

/// Number of trailing thread messages fed to a run when unspecified.
pub const DEFAULT_WINDOW_SIZE: usize = 100;

/// Content prefix marking messages posted by the automated reader.
pub const READER_MARKER: &str = "[auto:reader]";

/// Content prefix marking messages posted by an automated executor run.
pub const EXECUTOR_MARKER: &str = "[auto:executor]";

/// Every reserved system-marker prefix. Messages starting with one of these
/// are never treated as human evidence.
pub const SYSTEM_MARKERS: &[&str] = &[READER_MARKER, EXECUTOR_MARKER];

/// Generate a new sortable identifier (ULID).
pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

// ============================================================================
// Task lifecycle
// ============================================================================

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Inbox,
    Assigned,
    InProgress,
    Review,
    Done,
    Blocked,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Inbox,
        TaskStatus::Assigned,
        TaskStatus::InProgress,
        TaskStatus::Review,
        TaskStatus::Done,
        TaskStatus::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Inbox => "inbox",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown task status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

// ============================================================================
// Persisted entities
// ============================================================================

/// A unit of work owned by one scope (tenant/department).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub scope: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub assignees: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Immutable thread message attached to a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub scope: String,
    pub task_id: String,
    /// Session key of the author (human, automated reader or executor)
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// True when the content starts with one of the reserved system markers.
    pub fn is_system_marked(&self) -> bool {
        let content = self.content.trim_start();
        SYSTEM_MARKERS
            .iter()
            .any(|marker| content.starts_with(marker))
    }
}

/// Deliverable produced by a successful run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub scope: String,
    pub task_id: String,
    pub title: String,
    pub content: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Durable proof that `(scope, task_id, run_key)` has executed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: String,
    pub scope: String,
    pub task_id: String,
    pub executor: String,
    pub run_key: String,
    pub artifact_id: String,
    pub comment_message_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    ArtifactCreated,
    StatusChanged,
    TaskApproved,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::ArtifactCreated => "artifact_created",
            ActivityKind::StatusChanged => "status_changed",
            ActivityKind::TaskApproved => "task_approved",
        }
    }
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "artifact_created" => Ok(ActivityKind::ArtifactCreated),
            "status_changed" => Ok(ActivityKind::StatusChanged),
            "task_approved" => Ok(ActivityKind::TaskApproved),
            other => Err(format!("unknown activity kind '{other}'")),
        }
    }
}

/// Append-only audit entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: String,
    pub scope: String,
    pub kind: ActivityKind,
    pub message: String,
    pub actor: String,
    pub task_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// HTTP contracts
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub assignees: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageRequest {
    pub author: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub actor: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub actor: String,
}

/// Body of `POST /scopes/{scope}/tasks/{task_id}/runs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    /// e.g. `agent:developer:main`
    pub executor_identity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size: Option<usize>,
    /// `done` is accepted but always resolves to `review`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_key: Option<String>,
}

impl RunRequest {
    pub fn new(executor_identity: impl Into<String>) -> Self {
        Self {
            executor_identity: executor_identity.into(),
            window_size: None,
            requested_status: None,
            run_key: None,
        }
    }

    pub fn with_run_key(mut self, run_key: impl Into<String>) -> Self {
        self.run_key = Some(run_key.into());
        self
    }
}

/// Why a run was not executed again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyRan,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRun {
    pub ok: bool,
    pub skipped: bool,
    pub reason: SkipReason,
    pub run_key: String,
    pub artifact_id: String,
    pub comment_message_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedRun {
    pub ok: bool,
    pub skipped: bool,
    pub run_key: String,
    pub artifact_id: String,
    pub comment_message_id: String,
    pub resolved_status: TaskStatus,
    pub messages_in_window: usize,
    pub relevant_messages: usize,
    pub total_messages: usize,
}

/// Successful response of the run endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RunResponse {
    Skipped(SkippedRun),
    Executed(ExecutedRun),
}

impl RunResponse {
    pub fn is_skipped(&self) -> bool {
        matches!(self, RunResponse::Skipped(_))
    }

    pub fn artifact_id(&self) -> &str {
        match self {
            RunResponse::Skipped(run) => &run.artifact_id,
            RunResponse::Executed(run) => &run.artifact_id,
        }
    }

    pub fn comment_message_id(&self) -> &str {
        match self {
            RunResponse::Skipped(run) => &run.comment_message_id,
            RunResponse::Executed(run) => &run.comment_message_id,
        }
    }
}

/// Machine-readable error body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: ApiError,
}

// ============================================================================
// Flow state (client side)
// ============================================================================

/// User-facing state of one action flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    #[default]
    Confirmed,
    InProgress,
    Completed,
    NeedsAttention,
}

/// Lifecycle signals a flow reports to its analytics sink.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlowEventKind {
    Trigger,
    Repeat,
    EnteredAttention,
    Resolved,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowEvent {
    pub kind: FlowEventKind,
    pub flow_id: Option<String>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>(), Ok(status));
        }
        assert!("archived".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn test_system_marker_detection() {
        let mut message = Message {
            id: new_id(),
            scope: "dept-1".to_string(),
            task_id: "task-1".to_string(),
            author: "human".to_string(),
            content: format!("  {READER_MARKER} digest"),
            created_at: Utc::now(),
        };
        assert!(message.is_system_marked());

        message.content = "please mention [auto:reader] later".to_string();
        assert!(!message.is_system_marked());
    }

    #[test]
    fn test_run_request_defaults() {
        let req: RunRequest =
            serde_json::from_str(r#"{"executorIdentity":"agent:developer:main"}"#).unwrap();
        assert_eq!(req.executor_identity, "agent:developer:main");
        assert!(req.run_key.is_none());
        assert!(req.window_size.is_none());
        assert!(req.requested_status.is_none());
    }

    #[test]
    fn test_run_response_shapes() {
        let skipped = RunResponse::Skipped(SkippedRun {
            ok: true,
            skipped: true,
            reason: SkipReason::AlreadyRan,
            run_key: "v1".to_string(),
            artifact_id: "a1".to_string(),
            comment_message_id: "m1".to_string(),
        });
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["reason"], "already_ran");
        assert_eq!(json["commentMessageId"], "m1");

        let executed = RunResponse::Executed(ExecutedRun {
            ok: true,
            skipped: false,
            run_key: "v1".to_string(),
            artifact_id: "a1".to_string(),
            comment_message_id: "m1".to_string(),
            resolved_status: TaskStatus::Review,
            messages_in_window: 3,
            relevant_messages: 2,
            total_messages: 3,
        });
        let text = serde_json::to_string(&executed).unwrap();
        let back: RunResponse = serde_json::from_str(&text).unwrap();
        assert!(!back.is_skipped());
        assert_eq!(back, executed);
    }

    #[test]
    fn test_flow_state_serialization() {
        let json = serde_json::to_string(&FlowState::NeedsAttention).unwrap();
        assert_eq!(json, "\"NEEDS_ATTENTION\"");
        assert_eq!(FlowState::default(), FlowState::Confirmed);
    }
}
