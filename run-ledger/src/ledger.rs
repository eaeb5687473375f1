//! Run ledger
//!
//! Executes a named run against a task at most once. A run is keyed by
//! `(scope, task_id, run_key)`; replays of a recorded key return the stored
//! identifiers without touching anything.
//!
//! # Guarantees
//!
//! - All effects of a run (artifact, thread comment, status change, two
//!   activities, ledger entry) commit in one transaction or not at all.
//! - The thread is read and the generator runs before the write transaction
//!   opens, so a slow generator holds no storage lock.
//! - Concurrent callers with one key inside this process are serialized on a
//!   keyed lock; the loser waits and then observes the winner's entry.
//! - Across processes the unique index on the ledger table decides; a loser
//!   rolls back and re-reads the entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use shared_types::{
    Artifact, LedgerEntry, Task, TaskStatus, DEFAULT_RUN_KEY, DEFAULT_WINDOW_SIZE,
    EXECUTOR_MARKER,
};
use tracing::{debug, info, warn};

use crate::audit::AuditRecorder;
use crate::error::{LedgerError, StoreError};
use crate::generator::{
    ArtifactGenerator, GeneratedArtifact, GenerationRequest, GeneratorError,
};
use crate::sanitizer::sanitize;
use crate::status::{request_status, resolve_next_status};
use crate::store::{NewMessage, RunStore, UnitOfWork};

/// A request to run `run_key` against a task.
#[derive(Debug, Clone)]
pub struct RunCommand {
    pub scope: String,
    pub task_id: String,
    pub executor: String,
    pub run_key: String,
    pub window_size: usize,
    pub requested_status: TaskStatus,
}

impl RunCommand {
    pub fn new(
        scope: impl Into<String>,
        task_id: impl Into<String>,
        executor: impl Into<String>,
    ) -> Self {
        Self {
            scope: scope.into(),
            task_id: task_id.into(),
            executor: executor.into(),
            run_key: DEFAULT_RUN_KEY.to_string(),
            window_size: DEFAULT_WINDOW_SIZE,
            requested_status: TaskStatus::Review,
        }
    }

    pub fn run_key(mut self, run_key: impl Into<String>) -> Self {
        self.run_key = run_key.into();
        self
    }

    pub fn window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn requested_status(mut self, status: TaskStatus) -> Self {
        self.requested_status = status;
        self
    }

    fn validate(&self) -> Result<(), LedgerError> {
        for (field, value) in [
            ("scope", &self.scope),
            ("task_id", &self.task_id),
            ("executor", &self.executor),
            ("run_key", &self.run_key),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::InvalidRequest(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }

    fn lock_key(&self) -> String {
        format!("{}\u{1f}{}\u{1f}{}", self.scope, self.task_id, self.run_key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The key was already recorded; nothing was executed.
    Skipped {
        run_key: String,
        artifact_id: String,
        comment_message_id: String,
    },
    Executed {
        run_key: String,
        artifact_id: String,
        comment_message_id: String,
        resolved_status: TaskStatus,
        messages_in_window: usize,
        relevant_messages: usize,
        total_messages: usize,
    },
}

impl RunOutcome {
    fn skipped(entry: LedgerEntry) -> Self {
        RunOutcome::Skipped {
            run_key: entry.run_key,
            artifact_id: entry.artifact_id,
            comment_message_id: entry.comment_message_id,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RunOutcome::Skipped { .. })
    }

    pub fn artifact_id(&self) -> &str {
        match self {
            RunOutcome::Skipped { artifact_id, .. } | RunOutcome::Executed { artifact_id, .. } => {
                artifact_id
            }
        }
    }

    pub fn comment_message_id(&self) -> &str {
        match self {
            RunOutcome::Skipped {
                comment_message_id, ..
            }
            | RunOutcome::Executed {
                comment_message_id, ..
            } => comment_message_id,
        }
    }
}

/// Output of the read and generate phase, waiting to be recorded.
struct PreparedRun {
    generated: GeneratedArtifact,
    messages_in_window: usize,
    relevant_messages: usize,
    total_messages: usize,
}

#[derive(Clone)]
pub struct RunLedger {
    store: Arc<dyn RunStore>,
    generator: Arc<dyn ArtifactGenerator>,
    key_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl RunLedger {
    pub fn new(store: Arc<dyn RunStore>, generator: Arc<dyn ArtifactGenerator>) -> Self {
        Self {
            store,
            generator,
            key_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `cmd` unless its key was already recorded.
    pub async fn execute(&self, cmd: RunCommand) -> Result<RunOutcome, LedgerError> {
        cmd.validate()?;

        let key_lock = self.key_lock(&cmd.lock_key());
        let result = {
            let _guard = key_lock.lock().await;
            self.execute_serialized(&cmd).await
        };
        drop(key_lock);
        self.prune_key_locks();

        match &result {
            Ok(RunOutcome::Skipped { .. }) => debug!(
                scope = %cmd.scope,
                task_id = %cmd.task_id,
                run_key = %cmd.run_key,
                "run already recorded; skipped"
            ),
            Ok(RunOutcome::Executed { artifact_id, .. }) => info!(
                scope = %cmd.scope,
                task_id = %cmd.task_id,
                run_key = %cmd.run_key,
                artifact_id = %artifact_id,
                "run executed"
            ),
            Err(e) => warn!(
                scope = %cmd.scope,
                task_id = %cmd.task_id,
                run_key = %cmd.run_key,
                error = %e,
                "run failed"
            ),
        }
        result
    }

    /// Ledger entry for a key, if the run has happened.
    pub async fn lookup(
        &self,
        scope: &str,
        task_id: &str,
        run_key: &str,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        let mut uow = self.store.read().await?;
        load_scoped_task(uow.as_mut(), scope, task_id).await?;
        Ok(uow.find_entry(scope, task_id, run_key).await?)
    }

    pub async fn list_runs(
        &self,
        scope: &str,
        task_id: &str,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut uow = self.store.read().await?;
        load_scoped_task(uow.as_mut(), scope, task_id).await?;
        Ok(uow.list_entries(scope, task_id).await?)
    }

    async fn execute_serialized(&self, cmd: &RunCommand) -> Result<RunOutcome, LedgerError> {
        // 1. Thread and sanitized context, read without the writer slot.
        let mut reader = self.store.read().await?;
        let task = load_scoped_task(reader.as_mut(), &cmd.scope, &cmd.task_id).await?;
        if let Some(entry) = reader
            .find_entry(&cmd.scope, &cmd.task_id, &cmd.run_key)
            .await?
        {
            return Ok(RunOutcome::skipped(entry));
        }
        let thread = reader.list_messages(&cmd.scope, &cmd.task_id).await?;
        reader.rollback().await?;

        let context = sanitize(&thread, cmd.window_size, &cmd.executor);
        if !context.has_evidence() {
            debug!(
                task_id = %cmd.task_id,
                run_key = %cmd.run_key,
                "no relevant evidence in window"
            );
        }

        // 2. Deliverable content. Nothing is locked while the generator runs.
        let generated = self
            .generator
            .generate(GenerationRequest {
                task: &task,
                context: &context,
                previous_status: task.status,
                resolved_status: resolve_next_status(cmd.requested_status),
                executor: &cmd.executor,
                run_key: &cmd.run_key,
                total_messages: thread.len(),
            })
            .await?;
        if generated.content.trim().is_empty() {
            return Err(GeneratorError::EmptyContent.into());
        }

        let run = PreparedRun {
            generated,
            messages_in_window: context.messages_in_window(),
            relevant_messages: context.relevant_count(),
            total_messages: thread.len(),
        };

        match self.record(cmd, run).await {
            Ok(outcome) => Ok(outcome),
            // Lost a race with another writer, or the storage layer refused
            // mid-run. Either way the transaction is gone; if the key is now
            // recorded the run did happen, just not here.
            Err(LedgerError::Store(err)) => {
                if matches!(err, StoreError::DuplicateRun { .. }) {
                    debug!(run_key = %cmd.run_key, "ledger insert lost a race; re-reading");
                }
                let mut reader = self.store.read().await?;
                match reader
                    .find_entry(&cmd.scope, &cmd.task_id, &cmd.run_key)
                    .await?
                {
                    Some(entry) => Ok(RunOutcome::skipped(entry)),
                    None => Err(LedgerError::Store(err)),
                }
            }
            Err(other) => Err(other),
        }
    }

    /// Steps 3-7 of a run in one unit of work. Any early return drops the
    /// unit, which rolls the whole transaction back.
    async fn record(&self, cmd: &RunCommand, run: PreparedRun) -> Result<RunOutcome, LedgerError> {
        let mut uow = self.store.begin().await?;

        // The task and ledger may have moved while the generator ran.
        let task = load_scoped_task(uow.as_mut(), &cmd.scope, &cmd.task_id).await?;
        if let Some(entry) = uow
            .find_entry(&cmd.scope, &cmd.task_id, &cmd.run_key)
            .await?
        {
            return Ok(RunOutcome::skipped(entry));
        }

        // 3. Artifact.
        let artifact = Artifact {
            id: shared_types::new_id(),
            scope: cmd.scope.clone(),
            task_id: cmd.task_id.clone(),
            title: run.generated.title,
            content: run.generated.content,
            created_by: cmd.executor.clone(),
            created_at: Utc::now(),
        };
        uow.insert_artifact(&artifact).await?;

        // 4. Thread comment, so humans can see the run happened.
        let comment = uow
            .append_message(NewMessage {
                scope: cmd.scope.clone(),
                task_id: cmd.task_id.clone(),
                author: cmd.executor.clone(),
                content: format!(
                    "{EXECUTOR_MARKER} Posted deliverable \"{}\" (artifact {}, run {})",
                    artifact.title, artifact.id, cmd.run_key
                ),
            })
            .await?;

        // 5 + 6. Activities and status, via the authority.
        AuditRecorder::artifact_created(&task, &artifact, &cmd.run_key)
            .record(uow.as_mut())
            .await?;
        let change =
            request_status(uow.as_mut(), &task, cmd.requested_status, &cmd.executor).await?;

        // 7. Ledger entry last.
        uow.insert_entry(&LedgerEntry {
            id: shared_types::new_id(),
            scope: cmd.scope.clone(),
            task_id: cmd.task_id.clone(),
            executor: cmd.executor.clone(),
            run_key: cmd.run_key.clone(),
            artifact_id: artifact.id.clone(),
            comment_message_id: comment.id.clone(),
            created_at: Utc::now(),
        })
        .await?;

        uow.commit().await?;

        Ok(RunOutcome::Executed {
            run_key: cmd.run_key.clone(),
            artifact_id: artifact.id,
            comment_message_id: comment.id,
            resolved_status: change.to,
            messages_in_window: run.messages_in_window,
            relevant_messages: run.relevant_messages,
            total_messages: run.total_messages,
        })
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .key_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    fn prune_key_locks(&self) {
        let mut locks = self
            .key_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

/// Fetch a task and enforce that it belongs to `scope`. A foreign task is
/// reported exactly like a missing one.
pub(crate) async fn load_scoped_task(
    uow: &mut dyn UnitOfWork,
    scope: &str,
    task_id: &str,
) -> Result<Task, LedgerError> {
    match uow.find_task(task_id).await? {
        Some(task) if task.scope == scope => Ok(task),
        _ => Err(LedgerError::task_not_found(scope, task_id)),
    }
}
