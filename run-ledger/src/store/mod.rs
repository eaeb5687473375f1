//! Repository interfaces for the run ledger.
//!
//! Every read and write goes through a [`UnitOfWork`] obtained from a
//! [`RunStore`]. A unit of work is one storage transaction: nothing it writes
//! is visible until [`UnitOfWork::commit`] succeeds, and dropping it without
//! committing discards all of its writes. Read-only callers use
//! [`RunStore::read`], which does not compete with writers.

use async_trait::async_trait;
use shared_types::{Activity, Artifact, LedgerEntry, Message, Task, TaskStatus};

use crate::error::StoreError;

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Message to append to a task thread. Identifier and timestamp are assigned
/// by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub scope: String,
    pub task_id: String,
    pub author: String,
    pub content: String,
}

#[async_trait]
pub trait TaskRepo: Send {
    async fn insert_task(&mut self, task: &Task) -> Result<(), StoreError>;

    /// Look a task up by id regardless of scope; callers enforce scope.
    async fn find_task(&mut self, task_id: &str) -> Result<Option<Task>, StoreError>;

    async fn set_task_status(
        &mut self,
        scope: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait MessageRepo: Send {
    /// Append to the thread. `created_at` never goes backwards within a task.
    async fn append_message(&mut self, message: NewMessage) -> Result<Message, StoreError>;

    /// Whole thread, oldest first.
    async fn list_messages(&mut self, scope: &str, task_id: &str)
        -> Result<Vec<Message>, StoreError>;
}

#[async_trait]
pub trait ArtifactRepo: Send {
    async fn insert_artifact(&mut self, artifact: &Artifact) -> Result<(), StoreError>;

    async fn list_artifacts(
        &mut self,
        scope: &str,
        task_id: &str,
    ) -> Result<Vec<Artifact>, StoreError>;
}

#[async_trait]
pub trait LedgerRepo: Send {
    async fn find_entry(
        &mut self,
        scope: &str,
        task_id: &str,
        run_key: &str,
    ) -> Result<Option<LedgerEntry>, StoreError>;

    /// Fails with [`StoreError::DuplicateRun`] when the key is already taken.
    async fn insert_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError>;

    async fn list_entries(
        &mut self,
        scope: &str,
        task_id: &str,
    ) -> Result<Vec<LedgerEntry>, StoreError>;
}

#[async_trait]
pub trait AuditRepo: Send {
    async fn append_activity(&mut self, activity: &Activity) -> Result<(), StoreError>;

    /// Oldest first.
    async fn list_activities(
        &mut self,
        scope: &str,
        task_id: &str,
    ) -> Result<Vec<Activity>, StoreError>;
}

/// One atomic transaction over all repositories.
#[async_trait]
pub trait UnitOfWork: TaskRepo + MessageRepo + ArtifactRepo + LedgerRepo + AuditRepo {
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Unit of work that may write.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    /// Unit of work for reads only. Writing through it is not serialized
    /// against other writers.
    async fn read(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        self.begin().await
    }
}
