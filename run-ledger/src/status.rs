//! Status transition authority
//!
//! The only code that writes a task's status. Automated paths may request
//! any status but never close a task: `done` is downgraded to `review`.
//! Closing happens through [`approve`], which shares the same persistence
//! primitive so audit entries stay consistent.

use shared_types::{Task, TaskStatus};

use crate::audit::AuditRecorder;
use crate::error::StoreError;
use crate::store::{AuditRepo, TaskRepo};

/// Map a requested status to the status that is actually persisted.
pub fn resolve_next_status(requested: TaskStatus) -> TaskStatus {
    match requested {
        TaskStatus::Done => TaskStatus::Review,
        other => other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// Persist `target` for `task` and record the `status_changed` activity.
///
/// `target` is written as given; callers resolve it first. A change to the
/// current status is still recorded.
pub async fn apply_status_change<U>(
    uow: &mut U,
    task: &Task,
    target: TaskStatus,
    actor: &str,
) -> Result<StatusChange, StoreError>
where
    U: TaskRepo + AuditRepo + ?Sized,
{
    let change = StatusChange {
        from: task.status,
        to: target,
    };
    uow.set_task_status(&task.scope, &task.id, target).await?;
    AuditRecorder::status_changed(task, change, actor)
        .record(&mut *uow)
        .await?;
    tracing::debug!(
        scope = %task.scope,
        task_id = %task.id,
        from = %change.from,
        to = %change.to,
        "task status changed"
    );
    Ok(change)
}

/// Requested transition from a non-approval path.
pub async fn request_status<U>(
    uow: &mut U,
    task: &Task,
    requested: TaskStatus,
    actor: &str,
) -> Result<StatusChange, StoreError>
where
    U: TaskRepo + AuditRepo + ?Sized,
{
    apply_status_change(uow, task, resolve_next_status(requested), actor).await
}

/// Explicit approval: the one path that persists `done`.
pub async fn approve<U>(uow: &mut U, task: &Task, actor: &str) -> Result<StatusChange, StoreError>
where
    U: TaskRepo + AuditRepo + ?Sized,
{
    let change = apply_status_change(&mut *uow, task, TaskStatus::Done, actor).await?;
    AuditRecorder::task_approved(task, actor).record(uow).await?;
    Ok(change)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_is_downgraded_to_review() {
        assert_eq!(resolve_next_status(TaskStatus::Done), TaskStatus::Review);
    }

    #[test]
    fn test_other_statuses_pass_through() {
        for status in TaskStatus::ALL {
            if status == TaskStatus::Done {
                continue;
            }
            assert_eq!(resolve_next_status(status), status);
        }
    }

    #[test]
    fn test_resolution_never_yields_done() {
        assert!(TaskStatus::ALL
            .iter()
            .all(|status| resolve_next_status(*status) != TaskStatus::Done));
    }
}
