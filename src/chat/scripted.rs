// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Non-interactive frontend
//!
//! Feeds queued input lines, thread choices and approval answers to a
//! session and records everything the session shows. When a queue runs dry
//! the frontend ends input, quits the menu, or denies.
//!
//! Interrupt hooks let a host simulate Ctrl-C while a token is streaming or
//! while an approval prompt is open.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

use super::frontend::{Notice, SessionFrontend};
use crate::agent::{AgentEvent, AgentEventKind, ApprovalDecision, PendingToolCall};
use crate::error::Result;
use crate::threads::{ThreadAction, ThreadSummary};

#[derive(Debug, Default)]
pub struct ScriptedFrontend {
    inputs: VecDeque<String>,
    thread_actions: VecDeque<ThreadAction>,
    approvals: VecDeque<ApprovalDecision>,
    interrupt_on_token: Option<Arc<Notify>>,
    interrupt_on_approval: Option<Arc<Notify>>,
    events: Vec<(AgentEventKind, String)>,
    notices: Vec<Notice>,
    menus: Vec<Vec<ThreadSummary>>,
    approval_requests: Vec<PendingToolCall>,
}

impl ScriptedFrontend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, line: impl Into<String>) -> Self {
        self.inputs.push_back(line.into());
        self
    }

    pub fn thread_action(mut self, action: ThreadAction) -> Self {
        self.thread_actions.push_back(action);
        self
    }

    pub fn approval(mut self, decision: ApprovalDecision) -> Self {
        self.approvals.push_back(decision);
        self
    }

    /// Fire `notify` once, when the first token is rendered
    pub fn interrupt_on_token(mut self, notify: Arc<Notify>) -> Self {
        self.interrupt_on_token = Some(notify);
        self
    }

    /// Fire `notify` at the first approval prompt and never answer it
    pub fn interrupt_on_approval(mut self, notify: Arc<Notify>) -> Self {
        self.interrupt_on_approval = Some(notify);
        self
    }

    /// Rendered events with their text, tool name or response
    pub fn events(&self) -> &[(AgentEventKind, String)] {
        &self.events
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// Thread listings shown, one per menu visit
    pub fn menus(&self) -> &[Vec<ThreadSummary>] {
        &self.menus
    }

    pub fn approval_requests(&self) -> &[PendingToolCall] {
        &self.approval_requests
    }

    /// Final response texts, in order
    pub fn responses(&self) -> Vec<String> {
        self.events
            .iter()
            .filter(|(kind, _)| *kind == AgentEventKind::Response)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Input lines not yet consumed
    pub fn pending_inputs(&self) -> usize {
        self.inputs.len()
    }
}

#[async_trait]
impl SessionFrontend for ScriptedFrontend {
    async fn read_input(&mut self) -> Result<Option<String>> {
        Ok(self.inputs.pop_front())
    }

    async fn choose_thread(&mut self, threads: &[ThreadSummary]) -> Result<ThreadAction> {
        self.menus.push(threads.to_vec());
        Ok(self.thread_actions.pop_front().unwrap_or(ThreadAction::Quit))
    }

    async fn render(&mut self, event: &AgentEvent) -> Result<()> {
        let detail = match event {
            AgentEvent::Token(text) => {
                if let Some(notify) = self.interrupt_on_token.take() {
                    notify.notify_one();
                }
                text.clone()
            }
            AgentEvent::ToolStart { name, .. } | AgentEvent::ToolEnd { name, .. } => name.clone(),
            AgentEvent::Response(outcome) => outcome.text(),
            AgentEvent::ToolApprovalRequired(request) => request.call().name.clone(),
        };
        self.events.push((event.kind(), detail));
        Ok(())
    }

    async fn decide(&mut self, call: &PendingToolCall) -> Result<ApprovalDecision> {
        self.approval_requests.push(call.clone());
        if let Some(notify) = self.interrupt_on_approval.take() {
            notify.notify_one();
            std::future::pending::<()>().await;
        }
        Ok(self.approvals.pop_front().unwrap_or(ApprovalDecision::Deny))
    }

    fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
}
