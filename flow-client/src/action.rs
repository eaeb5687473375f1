//! Operations a flow controller can drive.

use async_trait::async_trait;
use shared_types::{RunRequest, RunResponse};
use tracing::{debug, info};

use crate::api::LedgerClient;
use crate::error::FlowError;

/// Result of one action invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionOutcome {
    /// `false` means the run finished but needs user input.
    pub ok: bool,
}

impl ActionOutcome {
    pub fn ok() -> Self {
        Self { ok: true }
    }

    pub fn needs_attention() -> Self {
        Self { ok: false }
    }
}

#[async_trait]
pub trait FlowAction: Send + Sync + 'static {
    async fn run(&self) -> Result<ActionOutcome, FlowError>;

    /// Side step performed before a retry out of `NEEDS_ATTENTION`.
    async fn resolve_attention(&self) -> Result<(), FlowError> {
        Ok(())
    }
}

/// Executes one run against the ledger. Replays count as success, so a
/// retried flow with an already recorded key completes without side effects.
#[derive(Debug, Clone)]
pub struct RunLedgerAction {
    client: LedgerClient,
    scope: String,
    task_id: String,
    request: RunRequest,
}

impl RunLedgerAction {
    pub fn new(
        client: LedgerClient,
        scope: impl Into<String>,
        task_id: impl Into<String>,
        request: RunRequest,
    ) -> Self {
        Self {
            client,
            scope: scope.into(),
            task_id: task_id.into(),
            request,
        }
    }
}

#[async_trait]
impl FlowAction for RunLedgerAction {
    async fn run(&self) -> Result<ActionOutcome, FlowError> {
        let response = self
            .client
            .execute_run(&self.scope, &self.task_id, &self.request)
            .await?;

        match &response {
            RunResponse::Skipped(run) => debug!(
                task_id = %self.task_id,
                run_key = %run.run_key,
                artifact_id = %run.artifact_id,
                "run already recorded"
            ),
            RunResponse::Executed(run) => info!(
                task_id = %self.task_id,
                run_key = %run.run_key,
                artifact_id = %run.artifact_id,
                status = %run.resolved_status,
                "run executed"
            ),
        }
        Ok(ActionOutcome::ok())
    }
}
