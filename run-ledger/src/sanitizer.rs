//! Context sanitizer
//!
//! Derives the bounded, filtered view of a task thread that feeds a run. The
//! executor's own messages and system-marked messages never count as
//! evidence.

use shared_types::Message;

/// Most relevant messages rendered into the summary.
pub const SUMMARY_LIMIT: usize = 8;

/// Sole summary line when the window holds no relevant message.
pub const NO_RELEVANT_EVIDENCE: &str = "- (none) no relevant messages in the context window";

#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedContext {
    /// Trailing slice of the thread, oldest first.
    pub window: Vec<Message>,
    /// `window` minus self-authored and system-marked messages, order kept.
    pub relevant: Vec<Message>,
    pub summary_lines: Vec<String>,
}

impl SanitizedContext {
    pub fn messages_in_window(&self) -> usize {
        self.window.len()
    }

    pub fn relevant_count(&self) -> usize {
        self.relevant.len()
    }

    pub fn has_evidence(&self) -> bool {
        !self.relevant.is_empty()
    }
}

/// Filter `messages` (the full thread, oldest first) for a run acting as
/// `acting_identity`. A `window_size` of zero is treated as one.
pub fn sanitize(messages: &[Message], window_size: usize, acting_identity: &str) -> SanitizedContext {
    let window_size = window_size.max(1);
    let start = messages.len().saturating_sub(window_size);
    let window = messages[start..].to_vec();

    let relevant: Vec<Message> = window
        .iter()
        .filter(|m| m.author != acting_identity && !m.is_system_marked())
        .cloned()
        .collect();

    let summary_lines = if relevant.is_empty() {
        vec![NO_RELEVANT_EVIDENCE.to_string()]
    } else {
        let skip = relevant.len().saturating_sub(SUMMARY_LIMIT);
        relevant[skip..].iter().map(summary_line).collect()
    };

    SanitizedContext {
        window,
        relevant,
        summary_lines,
    }
}

fn summary_line(message: &Message) -> String {
    format!("- ({}) {}", message.author, message.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared_types::{EXECUTOR_MARKER, READER_MARKER};

    fn msg(author: &str, content: &str) -> Message {
        Message {
            id: shared_types::new_id(),
            scope: "dept-1".to_string(),
            task_id: "task-1".to_string(),
            author: author.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_excludes_self_authored_messages() {
        let thread = vec![
            msg("human1", "first"),
            msg("executorX", "my own output"),
            msg("human2", "second"),
        ];

        let ctx = sanitize(&thread, 100, "executorX");

        assert_eq!(ctx.messages_in_window(), 3);
        let authors: Vec<&str> = ctx.relevant.iter().map(|m| m.author.as_str()).collect();
        assert_eq!(authors, vec!["human1", "human2"]);
        assert_eq!(
            ctx.summary_lines,
            vec!["- (human1) first".to_string(), "- (human2) second".to_string()]
        );
    }

    #[test]
    fn test_excludes_system_marked_messages_in_order() {
        let thread = vec![
            msg("reader", &format!("{READER_MARKER} nightly digest")),
            msg("human", "a"),
            msg("reader", "plain note from reader"),
            msg("agent:other", &format!("{EXECUTOR_MARKER} deliverable posted")),
            msg("executor", "self"),
            msg("human", "b"),
        ];

        let ctx = sanitize(&thread, 100, "executor");

        let contents: Vec<&str> = ctx.relevant.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "plain note from reader", "b"]);
    }

    #[test]
    fn test_window_keeps_trailing_messages() {
        let thread: Vec<Message> = (0..10).map(|i| msg("human", &format!("m{i}"))).collect();

        let ctx = sanitize(&thread, 4, "executor");

        assert_eq!(ctx.messages_in_window(), 4);
        assert_eq!(ctx.window[0].content, "m6");
        assert_eq!(ctx.window[3].content, "m9");
    }

    #[test]
    fn test_summary_is_bounded_to_latest_relevant() {
        let thread: Vec<Message> = (0..12).map(|i| msg("human", &format!("m{i}"))).collect();

        let ctx = sanitize(&thread, 100, "executor");

        assert_eq!(ctx.relevant_count(), 12);
        assert_eq!(ctx.summary_lines.len(), SUMMARY_LIMIT);
        assert_eq!(ctx.summary_lines[0], "- (human) m4");
        assert_eq!(ctx.summary_lines[7], "- (human) m11");
    }

    #[test]
    fn test_empty_relevant_set_is_explicit() {
        let thread = vec![
            msg("executor", "self"),
            msg("reader", &format!("{READER_MARKER} digest")),
        ];

        let ctx = sanitize(&thread, 100, "executor");

        assert!(!ctx.has_evidence());
        assert_eq!(ctx.summary_lines, vec![NO_RELEVANT_EVIDENCE.to_string()]);
    }

    #[test]
    fn test_empty_thread() {
        let ctx = sanitize(&[], 100, "executor");
        assert_eq!(ctx.messages_in_window(), 0);
        assert_eq!(ctx.summary_lines.len(), 1);
    }
}
