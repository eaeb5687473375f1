//! Task, thread and audit operations around the ledger.
//!
//! Task creation and thread posting stand in for the external task-management
//! collaborator. Status writes go through [`crate::status`].

use std::sync::Arc;

use chrono::Utc;
use shared_types::{Activity, Artifact, CreateTaskRequest, Message, Task, TaskStatus};

use crate::error::LedgerError;
use crate::ledger::load_scoped_task;
use crate::status;
use crate::store::{NewMessage, RunStore};

#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn RunStore>,
}

impl TaskService {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store }
    }

    pub async fn create_task(
        &self,
        scope: &str,
        req: CreateTaskRequest,
    ) -> Result<Task, LedgerError> {
        let title = req.title.trim();
        if title.is_empty() {
            return Err(LedgerError::InvalidRequest("title required".to_string()));
        }

        let task = Task {
            id: shared_types::new_id(),
            scope: scope.to_string(),
            title: title.to_string(),
            description: req.description,
            status: req.status.unwrap_or(TaskStatus::Inbox),
            assignees: req.assignees,
            created_at: Utc::now(),
        };

        let mut uow = self.store.begin().await?;
        uow.insert_task(&task).await?;
        uow.commit().await?;
        Ok(task)
    }

    pub async fn get_task(&self, scope: &str, task_id: &str) -> Result<Task, LedgerError> {
        let mut uow = self.store.read().await?;
        load_scoped_task(uow.as_mut(), scope, task_id).await
    }

    pub async fn post_message(
        &self,
        scope: &str,
        task_id: &str,
        author: &str,
        content: &str,
    ) -> Result<Message, LedgerError> {
        if author.trim().is_empty() {
            return Err(LedgerError::InvalidRequest("author required".to_string()));
        }

        let mut uow = self.store.begin().await?;
        load_scoped_task(uow.as_mut(), scope, task_id).await?;
        let message = uow
            .append_message(NewMessage {
                scope: scope.to_string(),
                task_id: task_id.to_string(),
                author: author.to_string(),
                content: content.to_string(),
            })
            .await?;
        uow.commit().await?;
        Ok(message)
    }

    pub async fn list_messages(
        &self,
        scope: &str,
        task_id: &str,
    ) -> Result<Vec<Message>, LedgerError> {
        let mut uow = self.store.read().await?;
        load_scoped_task(uow.as_mut(), scope, task_id).await?;
        Ok(uow.list_messages(scope, task_id).await?)
    }

    /// Move a task to `requested` as resolved by the status authority; a
    /// request for `done` lands on `review`.
    pub async fn update_status(
        &self,
        scope: &str,
        task_id: &str,
        actor: &str,
        requested: TaskStatus,
    ) -> Result<Task, LedgerError> {
        if actor.trim().is_empty() {
            return Err(LedgerError::InvalidRequest("actor required".to_string()));
        }

        let mut uow = self.store.begin().await?;
        let mut task = load_scoped_task(uow.as_mut(), scope, task_id).await?;
        let change = status::request_status(uow.as_mut(), &task, requested, actor).await?;
        uow.commit().await?;

        task.status = change.to;
        Ok(task)
    }

    /// Close a task. The only path that persists `done`.
    pub async fn approve(&self, scope: &str, task_id: &str, actor: &str) -> Result<Task, LedgerError> {
        if actor.trim().is_empty() {
            return Err(LedgerError::InvalidRequest("actor required".to_string()));
        }

        let mut uow = self.store.begin().await?;
        let mut task = load_scoped_task(uow.as_mut(), scope, task_id).await?;
        let change = status::approve(uow.as_mut(), &task, actor).await?;
        uow.commit().await?;

        tracing::info!(scope, task_id, actor, "task approved");
        task.status = change.to;
        Ok(task)
    }

    pub async fn list_activities(
        &self,
        scope: &str,
        task_id: &str,
    ) -> Result<Vec<Activity>, LedgerError> {
        let mut uow = self.store.read().await?;
        load_scoped_task(uow.as_mut(), scope, task_id).await?;
        Ok(uow.list_activities(scope, task_id).await?)
    }

    pub async fn list_artifacts(
        &self,
        scope: &str,
        task_id: &str,
    ) -> Result<Vec<Artifact>, LedgerError> {
        let mut uow = self.store.read().await?;
        load_scoped_task(uow.as_mut(), scope, task_id).await?;
        Ok(uow.list_artifacts(scope, task_id).await?)
    }
}
