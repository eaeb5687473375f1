use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::{Activity, Artifact, LedgerEntry, Message, Task, TaskStatus};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    ArtifactRepo, AuditRepo, LedgerRepo, MessageRepo, NewMessage, RunStore, TaskRepo, UnitOfWork,
};
use crate::error::StoreError;

/// SQLite-backed store. Schema lives in `migrations/` and is applied by
/// [`crate::db::connect`].
///
/// SQLite admits one writer at a time, and a deferred transaction that read
/// an older snapshot cannot upgrade to a writer. Writing units of work are
/// therefore serialized in-process; readers take a WAL snapshot and never
/// wait on them. Other processes are arbitrated by the busy timeout and the
/// ledger's unique index.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            writer: Arc::new(Mutex::new(())),
        }
    }
}

#[async_trait]
impl RunStore for SqliteStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let writer = Arc::clone(&self.writer).lock_owned().await;
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteUnitOfWork {
            tx,
            _writer: Some(writer),
        }))
    }

    async fn read(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteUnitOfWork { tx, _writer: None }))
    }
}

/// A single SQLite transaction. Dropping it rolls back.
pub struct SqliteUnitOfWork {
    // Declared first so the rollback-on-drop happens before the writer slot
    // is released.
    tx: Transaction<'static, Sqlite>,
    _writer: Option<OwnedMutexGuard<()>>,
}

// ── Row mapping ─────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    scope: String,
    title: String,
    description: String,
    status: String,
    assignees: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<TaskStatus>()
            .map_err(|e| StoreError::Decode(format!("task {}: {e}", row.id)))?;
        let assignees: Vec<String> = serde_json::from_str(&row.assignees)
            .map_err(|e| StoreError::Decode(format!("task {} assignees: {e}", row.id)))?;
        Ok(Task {
            id: row.id,
            scope: row.scope,
            title: row.title,
            description: row.description,
            status,
            assignees,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    scope: String,
    task_id: String,
    author: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            scope: row.scope,
            task_id: row.task_id,
            author: row.author,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ArtifactRow {
    id: String,
    scope: String,
    task_id: String,
    title: String,
    content: String,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl From<ArtifactRow> for Artifact {
    fn from(row: ArtifactRow) -> Self {
        Artifact {
            id: row.id,
            scope: row.scope,
            task_id: row.task_id,
            title: row.title,
            content: row.content,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LedgerRow {
    id: String,
    scope: String,
    task_id: String,
    executor: String,
    run_key: String,
    artifact_id: String,
    comment_message_id: String,
    created_at: DateTime<Utc>,
}

impl From<LedgerRow> for LedgerEntry {
    fn from(row: LedgerRow) -> Self {
        LedgerEntry {
            id: row.id,
            scope: row.scope,
            task_id: row.task_id,
            executor: row.executor,
            run_key: row.run_key,
            artifact_id: row.artifact_id,
            comment_message_id: row.comment_message_id,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: String,
    scope: String,
    kind: String,
    message: String,
    actor: String,
    task_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ActivityRow> for Activity {
    type Error = StoreError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        let kind = row.kind.parse().map_err(StoreError::Decode)?;
        Ok(Activity {
            id: row.id,
            scope: row.scope,
            kind,
            message: row.message,
            actor: row.actor,
            task_id: row.task_id,
            created_at: row.created_at,
        })
    }
}

// ── Repositories ────────────────────────────────────────────────────────────

#[async_trait]
impl TaskRepo for SqliteUnitOfWork {
    async fn insert_task(&mut self, task: &Task) -> Result<(), StoreError> {
        let assignees = serde_json::to_string(&task.assignees)
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        sqlx::query(
            "INSERT INTO tasks (id, scope, title, description, status, assignees, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&task.id)
        .bind(&task.scope)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(assignees)
        .bind(task.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_task(&mut self, task_id: &str) -> Result<Option<Task>, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as(
            "SELECT id, scope, title, description, status, assignees, created_at
             FROM tasks WHERE id = ?",
        )
        .bind(task_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn set_task_status(
        &mut self,
        scope: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE tasks SET status = ? WHERE scope = ? AND id = ?")
            .bind(status.as_str())
            .bind(scope)
            .bind(task_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageRepo for SqliteUnitOfWork {
    async fn append_message(&mut self, message: NewMessage) -> Result<Message, StoreError> {
        let latest: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT created_at FROM messages WHERE scope = ? AND task_id = ?
             ORDER BY seq DESC LIMIT 1",
        )
        .bind(&message.scope)
        .bind(&message.task_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        // Clock skew must not reorder the thread.
        let now = Utc::now();
        let created_at = match latest {
            Some(previous) if previous > now => previous,
            _ => now,
        };

        let stored = Message {
            id: shared_types::new_id(),
            scope: message.scope,
            task_id: message.task_id,
            author: message.author,
            content: message.content,
            created_at,
        };

        sqlx::query(
            "INSERT INTO messages (id, scope, task_id, author, content, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&stored.id)
        .bind(&stored.scope)
        .bind(&stored.task_id)
        .bind(&stored.author)
        .bind(&stored.content)
        .bind(stored.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(stored)
    }

    async fn list_messages(
        &mut self,
        scope: &str,
        task_id: &str,
    ) -> Result<Vec<Message>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, scope, task_id, author, content, created_at
             FROM messages WHERE scope = ? AND task_id = ?
             ORDER BY created_at ASC, seq ASC",
        )
        .bind(scope)
        .bind(task_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }
}

#[async_trait]
impl ArtifactRepo for SqliteUnitOfWork {
    async fn insert_artifact(&mut self, artifact: &Artifact) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO artifacts (id, scope, task_id, title, content, created_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&artifact.id)
        .bind(&artifact.scope)
        .bind(&artifact.task_id)
        .bind(&artifact.title)
        .bind(&artifact.content)
        .bind(&artifact.created_by)
        .bind(artifact.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn list_artifacts(
        &mut self,
        scope: &str,
        task_id: &str,
    ) -> Result<Vec<Artifact>, StoreError> {
        let rows: Vec<ArtifactRow> = sqlx::query_as(
            "SELECT id, scope, task_id, title, content, created_by, created_at
             FROM artifacts WHERE scope = ? AND task_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(scope)
        .bind(task_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Artifact::from).collect())
    }
}

#[async_trait]
impl LedgerRepo for SqliteUnitOfWork {
    async fn find_entry(
        &mut self,
        scope: &str,
        task_id: &str,
        run_key: &str,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let row: Option<LedgerRow> = sqlx::query_as(
            "SELECT id, scope, task_id, executor, run_key, artifact_id, comment_message_id, created_at
             FROM ledger_entries WHERE scope = ? AND task_id = ? AND run_key = ?",
        )
        .bind(scope)
        .bind(task_id)
        .bind(run_key)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(LedgerEntry::from))
    }

    async fn insert_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO ledger_entries
                (id, scope, task_id, executor, run_key, artifact_id, comment_message_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.scope)
        .bind(&entry.task_id)
        .bind(&entry.executor)
        .bind(&entry.run_key)
        .bind(&entry.artifact_id)
        .bind(&entry.comment_message_id)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateRun {
                task_id: entry.task_id.clone(),
                run_key: entry.run_key.clone(),
            },
            other => StoreError::Database(other),
        })?;
        Ok(())
    }

    async fn list_entries(
        &mut self,
        scope: &str,
        task_id: &str,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows: Vec<LedgerRow> = sqlx::query_as(
            "SELECT id, scope, task_id, executor, run_key, artifact_id, comment_message_id, created_at
             FROM ledger_entries WHERE scope = ? AND task_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(scope)
        .bind(task_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(LedgerEntry::from).collect())
    }
}

#[async_trait]
impl AuditRepo for SqliteUnitOfWork {
    async fn append_activity(&mut self, activity: &Activity) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO activities (id, scope, kind, message, actor, task_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&activity.id)
        .bind(&activity.scope)
        .bind(activity.kind.as_str())
        .bind(&activity.message)
        .bind(&activity.actor)
        .bind(&activity.task_id)
        .bind(activity.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn list_activities(
        &mut self,
        scope: &str,
        task_id: &str,
    ) -> Result<Vec<Activity>, StoreError> {
        let rows: Vec<ActivityRow> = sqlx::query_as(
            "SELECT id, scope, kind, message, actor, task_id, created_at
             FROM activities WHERE scope = ? AND task_id = ?
             ORDER BY seq ASC",
        )
        .bind(scope)
        .bind(task_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(Activity::try_from).collect()
    }
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
