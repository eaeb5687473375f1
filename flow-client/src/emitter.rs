//! Lifecycle event sinks
//!
//! Emission is fire-and-forget: the controller pushes onto an [`EventQueue`]
//! and never waits. One forwarding task per queue delivers events in the
//! order they were pushed; a slow, failing or panicking sink never reaches
//! the controller.

use std::sync::Arc;

use async_trait::async_trait;
use shared_types::FlowEvent;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::FlowError;

#[async_trait]
pub trait FlowEmitter: Send + Sync + 'static {
    async fn emit(&self, event: FlowEvent) -> Result<(), FlowError>;
}

/// Writes every event to the `tracing` subscriber.
#[derive(Debug, Default, Clone)]
pub struct TracingEmitter;

#[async_trait]
impl FlowEmitter for TracingEmitter {
    async fn emit(&self, event: FlowEvent) -> Result<(), FlowError> {
        info!(
            kind = ?event.kind,
            flow_id = event.flow_id.as_deref().unwrap_or("-"),
            user_id = event.user_id.as_deref().unwrap_or("-"),
            metadata = %serde_json::Value::Object(event.metadata),
            "flow event"
        );
        Ok(())
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone)]
pub struct NoopEmitter;

#[async_trait]
impl FlowEmitter for NoopEmitter {
    async fn emit(&self, _event: FlowEvent) -> Result<(), FlowError> {
        Ok(())
    }
}

/// Ordered hand-off to a [`FlowEmitter`].
pub(crate) struct EventQueue {
    tx: mpsc::UnboundedSender<FlowEvent>,
}

impl EventQueue {
    /// Spawns the forwarding task, so this must run inside a tokio runtime.
    /// The task ends once the queue is dropped and drained.
    pub(crate) fn spawn(emitter: Arc<dyn FlowEmitter>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<FlowEvent>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let kind = event.kind;
                let emitter = Arc::clone(&emitter);
                // Each delivery runs in its own task so a panicking sink only
                // loses its own event.
                match tokio::spawn(async move { emitter.emit(event).await }).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(?kind, error = %e, "flow event dropped"),
                    Err(e) => debug!(?kind, error = %e, "flow emitter panicked"),
                }
            }
        });
        Self { tx }
    }

    pub(crate) fn push(&self, event: FlowEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!(kind = ?e.0.kind, "flow event queue closed");
        }
    }
}
