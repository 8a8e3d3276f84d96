// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Events produced while an agent turn runs
//!
//! A turn yields zero or more `Token`, `ToolStart`, `ToolEnd` and
//! `ToolApprovalRequired` events, then exactly one `Response` on success.
//! An approval request suspends the turn until the consumer answers it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::oneshot;

use crate::llm::message::Message;

/// Marker appended to shortened previews
pub const ELLIPSIS: &str = "...";

/// One event of the agent turn protocol
#[derive(Debug)]
pub enum AgentEvent {
    /// Incremental model output
    Token(String),
    /// A tool call is about to be handled
    ToolStart {
        call_id: String,
        name: String,
        input_preview: String,
    },
    /// A tool call finished (not emitted for denied calls)
    ToolEnd {
        call_id: String,
        name: String,
        output_preview: String,
        is_error: bool,
    },
    /// The turn completed
    Response(TurnOutcome),
    /// The turn is paused until the request is answered
    ToolApprovalRequired(ApprovalRequest),
}

/// Discriminant of [`AgentEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventKind {
    Token,
    ToolStart,
    ToolEnd,
    Response,
    ToolApprovalRequired,
}

impl AgentEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentEventKind::Token => "token",
            AgentEventKind::ToolStart => "tool_start",
            AgentEventKind::ToolEnd => "tool_end",
            AgentEventKind::Response => "response",
            AgentEventKind::ToolApprovalRequired => "tool_approval_required",
        }
    }
}

impl fmt::Display for AgentEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AgentEvent {
    pub fn kind(&self) -> AgentEventKind {
        match self {
            AgentEvent::Token(_) => AgentEventKind::Token,
            AgentEvent::ToolStart { .. } => AgentEventKind::ToolStart,
            AgentEvent::ToolEnd { .. } => AgentEventKind::ToolEnd,
            AgentEvent::Response(_) => AgentEventKind::Response,
            AgentEvent::ToolApprovalRequired(_) => AgentEventKind::ToolApprovalRequired,
        }
    }
}

/// A tool call waiting for a decision
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

/// The user's answer to an approval request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    /// Approve and stop asking about this tool for the rest of the session
    ApproveForSession,
    Deny,
}

impl ApprovalDecision {
    pub fn is_approved(&self) -> bool {
        !matches!(self, ApprovalDecision::Deny)
    }
}

/// Approval request carrying the channel that resumes the turn.
///
/// Dropping the request without answering counts as a denial.
pub struct ApprovalRequest {
    call: PendingToolCall,
    responder: oneshot::Sender<ApprovalDecision>,
}

impl ApprovalRequest {
    pub fn new(call: PendingToolCall) -> (Self, oneshot::Receiver<ApprovalDecision>) {
        let (responder, receiver) = oneshot::channel();
        (Self { call, responder }, receiver)
    }

    pub fn call(&self) -> &PendingToolCall {
        &self.call
    }

    /// Answer the request and resume the turn
    pub fn decide(self, decision: ApprovalDecision) {
        if self.responder.send(decision).is_err() {
            tracing::debug!(
                target: "parley.agent",
                call_id = %self.call.call_id,
                "approval answered after the turn ended"
            );
        }
    }

    pub fn approve(self) {
        self.decide(ApprovalDecision::Approve);
    }

    pub fn deny(self) {
        self.decide(ApprovalDecision::Deny);
    }
}

impl fmt::Debug for ApprovalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalRequest")
            .field("call", &self.call)
            .finish_non_exhaustive()
    }
}

/// What a completed turn produced
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// The final assistant reply
    pub message: Message,
    /// Every message the turn appended, in order, ending with `message`
    pub new_messages: Vec<Message>,
}

impl TurnOutcome {
    pub fn text(&self) -> String {
        self.message.full_text()
    }
}

/// Shorten `text` to at most `limit` characters, marking the cut with `...`.
///
/// Counts characters rather than bytes, so it never splits a code point.
pub fn truncate_preview(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let keep = limit.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(AgentEvent::Token("x".into()).kind().as_str(), "token");
        assert_eq!(AgentEventKind::ToolStart.to_string(), "tool_start");
        assert_eq!(AgentEventKind::ToolEnd.as_str(), "tool_end");
        assert_eq!(AgentEventKind::Response.as_str(), "response");
        assert_eq!(
            AgentEventKind::ToolApprovalRequired.as_str(),
            "tool_approval_required"
        );
    }

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_preview("hello", 10), "hello");
        assert_eq!(truncate_preview("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_long_text() {
        let out = truncate_preview(&"a".repeat(300), 100);
        assert_eq!(out.chars().count(), 100);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_truncate_multibyte_is_safe() {
        let out = truncate_preview(&"日本語".repeat(50), 10);
        assert_eq!(out, format!("{}...", "日本語日本語日"));
    }

    #[test]
    fn test_truncate_tiny_limit() {
        assert_eq!(truncate_preview("abcdef", 2), "...");
    }

    #[tokio::test]
    async fn test_approval_round_trip() {
        let call = PendingToolCall {
            call_id: "c1".into(),
            name: "search".into(),
            arguments: serde_json::json!({"q": "rust"}),
        };
        let (request, receiver) = ApprovalRequest::new(call.clone());
        assert_eq!(request.call(), &call);
        request.approve();
        assert_eq!(receiver.await.unwrap(), ApprovalDecision::Approve);
    }

    #[tokio::test]
    async fn test_dropped_request_reads_as_closed() {
        let (request, receiver) = ApprovalRequest::new(PendingToolCall {
            call_id: "c1".into(),
            name: "search".into(),
            arguments: Value::Null,
        });
        drop(request);
        assert!(receiver.await.is_err());
    }

    #[test]
    fn test_decision_is_approved() {
        assert!(ApprovalDecision::Approve.is_approved());
        assert!(ApprovalDecision::ApproveForSession.is_approved());
        assert!(!ApprovalDecision::Deny.is_approved());
    }
}
