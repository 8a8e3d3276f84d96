// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! History compaction
//!
//! When the context budget runs hot, an older prefix of the history is folded
//! into a single synthetic summary message. Only the compaction boundary is
//! decided here; producing the summary text is delegated to a [`Summarizer`].

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{ApiError, Result};
use crate::llm::message::{ContentBlock, Message, MessageContent, Role};
use crate::llm::provider::{CompletionRequest, LlmProvider};
use crate::llm::registry::ChatModelHandle;

const SUMMARY_SYSTEM_PROMPT: &str = "You compress conversations. Summarize the transcript \
you are given so the conversation can continue without it. Keep names, decisions, open \
tasks, file paths, and facts the user stated. Write plain prose, no preamble.";

const SUMMARY_MAX_TOKENS: u32 = 1024;

/// Anything that can turn a run of messages into summary text
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<String>;
}

/// Summarizer backed by a chat model
pub struct ModelSummarizer {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl ModelSummarizer {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn from_handle(handle: &ChatModelHandle) -> Self {
        Self::new(handle.provider.clone(), handle.model_name())
    }
}

#[async_trait]
impl Summarizer for ModelSummarizer {
    async fn summarize(&self, messages: &[Message]) -> Result<String> {
        let request = CompletionRequest::new(
            self.model.clone(),
            vec![Message::user(render_transcript(messages))],
        )
        .with_system(SUMMARY_SYSTEM_PROMPT)
        .with_max_tokens(SUMMARY_MAX_TOKENS);

        let response = self.provider.complete(request).await?;
        let text = response.text().trim().to_string();
        if text.is_empty() {
            return Err(ApiError::InvalidResponse("model returned an empty summary".into()).into());
        }
        Ok(text)
    }
}

/// Plain-text transcript of `messages`, one speaker turn per paragraph
pub fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let line = match (&message.role, &message.content) {
            (Role::System, _) if message.is_summary() => {
                format!("Earlier summary: {}", message.full_text())
            }
            (_, MessageContent::Text(text)) => format!("{}: {}", speaker(&message.role), text),
            (_, MessageContent::Blocks(blocks)) => blocks
                .iter()
                .map(|block| match block {
                    ContentBlock::Text { text } => format!("{}: {}", speaker(&message.role), text),
                    ContentBlock::ToolUse { name, input, .. } => {
                        format!("Assistant called tool {} with {}", name, input)
                    }
                    ContentBlock::ToolResult {
                        content, is_error, ..
                    } => {
                        if *is_error {
                            format!("Tool error: {}", content)
                        } else {
                            format!("Tool result: {}", content)
                        }
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
        };
        out.push_str(&line);
        out.push_str("\n\n");
    }
    out.trim_end().to_string()
}

fn speaker(role: &Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::Tool => "Tool",
        Role::System => "System",
    }
}

/// Outcome of a successful compaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compaction {
    /// Messages folded into the summary
    pub replaced: usize,
    /// Messages kept verbatim after the summary
    pub kept: usize,
}

/// Index where the verbatim suffix starts, or `None` if nothing can be folded.
///
/// The suffix never opens with a tool result, so a tool call and its results
/// stay on the same side of the boundary. `keep_recent == 0` folds the whole
/// history into the summary.
pub fn compaction_boundary(history: &[Message], keep_recent: usize) -> Option<usize> {
    let mut boundary = history.len().checked_sub(keep_recent)?;
    while boundary > 0 && boundary < history.len() && history[boundary].role == Role::Tool {
        boundary -= 1;
    }

    match boundary {
        0 => None,
        // Re-summarizing a lone summary gains nothing.
        1 if history[0].is_summary() => None,
        b => Some(b),
    }
}

/// Replace the older part of `history` with one summary message.
///
/// On summarizer failure the history is left exactly as it was.
pub async fn compact_history(
    history: &mut Vec<Message>,
    summarizer: &dyn Summarizer,
    keep_recent: usize,
) -> Result<Option<Compaction>> {
    let Some(boundary) = compaction_boundary(history, keep_recent) else {
        return Ok(None);
    };

    let summary = summarizer.summarize(&history[..boundary]).await?;
    history.splice(..boundary, std::iter::once(Message::summary(summary)));

    let compaction = Compaction {
        replaced: boundary,
        kept: history.len() - 1,
    };
    tracing::info!(
        target: "parley.context",
        replaced = compaction.replaced,
        kept = compaction.kept,
        "compacted history"
    );
    Ok(Some(compaction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParleyError;
    use crate::llm::mock_provider::MockProvider;
    use std::sync::Mutex;

    struct FixedSummarizer {
        seen: Mutex<Vec<usize>>,
        fail: bool,
    }

    impl FixedSummarizer {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize(&self, messages: &[Message]) -> Result<String> {
            self.seen.lock().unwrap().push(messages.len());
            if self.fail {
                return Err(ParleyError::Connectivity("down".into()));
            }
            Ok(format!("{} messages", messages.len()))
        }
    }

    fn chat(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("q{}", i))
                } else {
                    Message::assistant(format!("a{}", i))
                }
            })
            .collect()
    }

    fn tool_call(id: &str) -> Message {
        Message::assistant_blocks(vec![ContentBlock::ToolUse {
            id: id.to_string(),
            name: "search".to_string(),
            input: serde_json::json!({"q": "x"}),
        }])
    }

    #[tokio::test]
    async fn test_compacts_prefix_and_keeps_suffix() {
        let mut history = chat(10);
        let tail: Vec<_> = history[6..].to_vec();
        let summarizer = FixedSummarizer::new();

        let result = compact_history(&mut history, &summarizer, 4).await.unwrap();

        assert_eq!(result, Some(Compaction { replaced: 6, kept: 4 }));
        assert_eq!(history.len(), 5);
        assert!(history[0].is_summary());
        assert!(history[0].full_text().contains("6 messages"));
        assert_eq!(&history[1..], &tail[..]);
    }

    #[tokio::test]
    async fn test_short_history_is_left_alone() {
        let mut history = chat(3);
        let summarizer = FixedSummarizer::new();
        assert_eq!(compact_history(&mut history, &summarizer, 6).await.unwrap(), None);
        assert_eq!(history.len(), 3);
        assert!(summarizer.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_boundary_never_splits_tool_pair() {
        let history = vec![
            Message::user("find it"),
            tool_call("t1"),
            Message::tool_result("t1", "found", false),
            Message::tool_result("t1", "more", false),
            Message::assistant("here"),
        ];
        // keep_recent = 3 would start the suffix on a tool result
        assert_eq!(compaction_boundary(&history, 3), Some(1));
        assert_eq!(compaction_boundary(&history, 1), Some(4));
    }

    #[test]
    fn test_boundary_walks_to_start() {
        let history = vec![
            tool_call("t1"),
            Message::tool_result("t1", "x", false),
            Message::assistant("done"),
        ];
        assert_eq!(compaction_boundary(&history, 2), None);
    }

    #[test]
    fn test_keep_none_folds_everything() {
        let history = chat(2);
        assert_eq!(compaction_boundary(&history, 0), Some(2));
        assert_eq!(compaction_boundary(&[], 0), None);
        assert_eq!(compaction_boundary(&[Message::summary("old")], 0), None);
    }

    #[tokio::test]
    async fn test_compact_with_keep_none() {
        let mut history = vec![Message::user("a"), Message::assistant("b")];
        let summarizer = FixedSummarizer::new();

        let result = compact_history(&mut history, &summarizer, 0).await.unwrap();

        assert_eq!(result, Some(Compaction { replaced: 2, kept: 0 }));
        assert_eq!(history.len(), 1);
        assert!(history[0].is_summary());
    }

    #[test]
    fn test_lone_summary_not_recompacted() {
        let history = vec![
            Message::summary("old"),
            Message::user("a"),
            Message::assistant("b"),
        ];
        assert_eq!(compaction_boundary(&history, 2), None);
    }

    #[tokio::test]
    async fn test_failure_leaves_history_untouched() {
        let mut history = chat(8);
        let before = history.clone();
        let summarizer = FixedSummarizer {
            seen: Mutex::new(Vec::new()),
            fail: true,
        };

        assert!(compact_history(&mut history, &summarizer, 2).await.is_err());
        assert_eq!(history, before);
    }

    #[tokio::test]
    async fn test_model_summarizer_uses_provider() {
        let provider = MockProvider::new().reply("  the user asked about rust  ");
        let summarizer = ModelSummarizer::new(Arc::new(provider.clone()), "m");

        let text = summarizer.summarize(&chat(4)).await.unwrap();

        assert_eq!(text, "the user asked about rust");
        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system.as_deref(), Some(SUMMARY_SYSTEM_PROMPT));
        assert!(requests[0].messages[0].full_text().contains("User: q0"));
    }

    #[tokio::test]
    async fn test_model_summarizer_rejects_empty_summary() {
        let provider = MockProvider::new().reply("   ");
        let summarizer = ModelSummarizer::new(Arc::new(provider), "m");
        assert!(summarizer.summarize(&chat(2)).await.is_err());
    }

    #[test]
    fn test_transcript_includes_tool_activity() {
        let transcript = render_transcript(&[
            Message::user("look"),
            tool_call("t1"),
            Message::tool_result("t1", "boom", true),
        ]);
        assert!(transcript.contains("User: look"));
        assert!(transcript.contains("Assistant called tool search"));
        assert!(transcript.contains("Tool error: boom"));
    }
}
