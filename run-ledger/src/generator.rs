//! Artifact generator seam
//!
//! The ledger treats deliverable content as opaque. Anything implementing
//! [`ArtifactGenerator`] can be plugged in; [`TemplateGenerator`] is the
//! built-in default and renders a plain markdown deliverable.

use async_trait::async_trait;
use shared_types::{Task, TaskStatus};

use crate::sanitizer::SanitizedContext;

/// Everything a generator may look at for one run.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub task: &'a Task,
    pub context: &'a SanitizedContext,
    pub previous_status: TaskStatus,
    pub resolved_status: TaskStatus,
    pub executor: &'a str,
    pub run_key: &'a str,
    pub total_messages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    pub title: String,
    pub content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("generator unavailable: {0}")]
    Unavailable(String),

    #[error("generator returned empty content")]
    EmptyContent,
}

#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<GeneratedArtifact, GeneratorError>;
}

#[derive(Debug, Default, Clone)]
pub struct TemplateGenerator;

#[async_trait]
impl ArtifactGenerator for TemplateGenerator {
    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<GeneratedArtifact, GeneratorError> {
        let task = request.task;
        let mut md = format!("# Deliverable: {}\n\n", task.title);

        if !task.description.trim().is_empty() {
            md.push_str("## Brief\n\n");
            md.push_str(task.description.trim());
            md.push_str("\n\n");
        }

        md.push_str(&format!(
            "## Evidence\n\n{} relevant of {} messages in window ({} in thread)\n\n",
            request.context.relevant_count(),
            request.context.messages_in_window(),
            request.total_messages,
        ));
        md.push_str(&request.context.summary_lines.join("\n"));
        md.push_str("\n\n");

        md.push_str(&format!(
            "## Status\n\n{} -> {}\n\n---\nexecutor: {} | run: {}\n",
            request.previous_status, request.resolved_status, request.executor, request.run_key
        ));

        Ok(GeneratedArtifact {
            title: format!("Deliverable: {}", task.title),
            content: md,
        })
    }
}
