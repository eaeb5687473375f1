//! Audit recorder
//!
//! Builds the human-readable activity entries written alongside every
//! state-changing operation. Entries are append-only.

use chrono::Utc;
use shared_types::{Activity, ActivityKind, Artifact, Task};

use crate::error::StoreError;
use crate::status::StatusChange;
use crate::store::AuditRepo;

pub struct AuditRecorder;

impl AuditRecorder {
    pub fn artifact_created(task: &Task, artifact: &Artifact, run_key: &str) -> AuditEntry {
        AuditEntry::new(
            task,
            ActivityKind::ArtifactCreated,
            &artifact.created_by,
            format!(
                "{} created deliverable \"{}\" for task \"{}\" (run {run_key})",
                artifact.created_by, artifact.title, task.title
            ),
        )
    }

    pub fn status_changed(task: &Task, change: StatusChange, actor: &str) -> AuditEntry {
        AuditEntry::new(
            task,
            ActivityKind::StatusChanged,
            actor,
            format!(
                "{actor} moved task \"{}\" from {} to {}",
                task.title, change.from, change.to
            ),
        )
    }

    pub fn task_approved(task: &Task, actor: &str) -> AuditEntry {
        AuditEntry::new(
            task,
            ActivityKind::TaskApproved,
            actor,
            format!("{actor} approved task \"{}\"", task.title),
        )
    }
}

/// An activity that has been built but not yet written.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    activity: Activity,
}

impl AuditEntry {
    fn new(task: &Task, kind: ActivityKind, actor: &str, message: String) -> Self {
        Self {
            activity: Activity {
                id: shared_types::new_id(),
                scope: task.scope.clone(),
                kind,
                message,
                actor: actor.to_string(),
                task_id: Some(task.id.clone()),
                created_at: Utc::now(),
            },
        }
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    pub async fn record<R>(self, repo: &mut R) -> Result<Activity, StoreError>
    where
        R: AuditRepo + ?Sized,
    {
        repo.append_activity(&self.activity).await?;
        Ok(self.activity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::TaskStatus;

    fn task() -> Task {
        Task {
            id: "task-1".to_string(),
            scope: "dept-1".to_string(),
            title: "Quarterly report".to_string(),
            description: String::new(),
            status: TaskStatus::InProgress,
            assignees: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_changed_message() {
        let change = StatusChange {
            from: TaskStatus::InProgress,
            to: TaskStatus::Review,
        };
        let entry = AuditRecorder::status_changed(&task(), change, "agent:developer:main");
        let activity = entry.activity();

        assert_eq!(activity.kind, ActivityKind::StatusChanged);
        assert_eq!(activity.scope, "dept-1");
        assert_eq!(activity.task_id.as_deref(), Some("task-1"));
        assert_eq!(
            activity.message,
            "agent:developer:main moved task \"Quarterly report\" from in_progress to review"
        );
    }

    #[test]
    fn test_artifact_created_names_run_key() {
        let task = task();
        let artifact = Artifact {
            id: "art-1".to_string(),
            scope: task.scope.clone(),
            task_id: task.id.clone(),
            title: "Deliverable: Quarterly report".to_string(),
            content: "body".to_string(),
            created_by: "agent:developer:main".to_string(),
            created_at: Utc::now(),
        };

        let entry = AuditRecorder::artifact_created(&task, &artifact, "deliverable-v1");

        assert_eq!(entry.activity().kind, ActivityKind::ArtifactCreated);
        assert_eq!(entry.activity().actor, "agent:developer:main");
        assert!(entry.activity().message.contains("run deliverable-v1"));
    }
}
