//! Error types for the run ledger service.

use crate::generator::GeneratorError;

/// Storage-level failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The `(scope, task_id, run_key)` uniqueness constraint rejected an insert.
    #[error("run '{run_key}' already recorded for task {task_id}")]
    DuplicateRun { task_id: String, run_key: String },

    #[error("corrupt row: {0}")]
    Decode(String),
}

/// Failure of a ledger or task operation.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Task missing, or owned by a different scope. Never retried.
    #[error("task {task_id} not found in scope {scope}")]
    TaskNotFound { scope: String, task_id: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("artifact generation failed: {0}")]
    Generation(#[from] GeneratorError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn task_not_found(scope: &str, task_id: &str) -> Self {
        LedgerError::TaskNotFound {
            scope: scope.to_string(),
            task_id: task_id.to_string(),
        }
    }

    /// True for failures that aborted a run after it started.
    pub fn is_run_failure(&self) -> bool {
        matches!(self, LedgerError::Generation(_) | LedgerError::Store(_))
    }
}
