// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Agent turn execution
//!
//! [`TurnRunner::start`] spawns one producer task per turn. The task streams
//! the model, runs requested tools (pausing for approval where the policy
//! says so), feeds results back, and repeats until the model answers without
//! tool calls. Events reach the consumer over a single-slot channel, so the
//! producer never runs ahead of what has been consumed.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::accumulator::StreamAccumulator;
use super::events::{
    truncate_preview, AgentEvent, ApprovalDecision, ApprovalRequest, PendingToolCall, TurnOutcome,
};
use crate::config::Settings;
use crate::error::{ParleyError, Result};
use crate::llm::message::{ContentBlock, Message};
use crate::llm::provider::CompletionRequest;
use crate::llm::registry::ChatModelHandle;
use crate::tools::{ApprovalPolicy, ToolOutput, ToolPolicy, ToolSet};

/// Result fed back to the model when a call is refused
pub const DENIED_MESSAGE: &str = "Tool call denied by the user";

/// Configured agent ready to run turns
#[derive(Clone)]
pub struct TurnRunner {
    handle: ChatModelHandle,
    tools: ToolSet,
    policy: ApprovalPolicy,
    input_preview_limit: usize,
    output_preview_limit: usize,
    max_tool_rounds: usize,
    system_prompt: Option<String>,
}

impl TurnRunner {
    pub fn new(handle: ChatModelHandle, tools: ToolSet) -> Self {
        let settings = Settings::default();
        Self::from_settings(handle, tools, ApprovalPolicy::default(), &settings)
    }

    pub fn from_settings(
        handle: ChatModelHandle,
        tools: ToolSet,
        policy: ApprovalPolicy,
        settings: &Settings,
    ) -> Self {
        Self {
            handle,
            tools,
            policy,
            input_preview_limit: settings.display.tool_input_limit,
            output_preview_limit: settings.display.tool_output_limit,
            max_tool_rounds: settings.tools.max_tool_rounds,
            system_prompt: None,
        }
    }

    pub fn with_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_preview_limits(mut self, input: usize, output: usize) -> Self {
        self.input_preview_limit = input;
        self.output_preview_limit = output;
        self
    }

    /// Begin a turn over `history`, whose last message is normally the new user input
    pub fn start(&self, history: Vec<Message>) -> TurnStream {
        let (tx, rx) = mpsc::channel(1);
        let runner = self.clone();

        let task = tokio::spawn(async move {
            let events = EventSender { tx };
            match runner.run(history, &events).await {
                Ok(()) => {}
                // The consumer went away; nobody is left to tell.
                Err(ParleyError::Cancelled) => {}
                Err(e) => {
                    tracing::warn!(target: "parley.agent", error = %e, "turn failed");
                    let _ = events.tx.send(Err(e)).await;
                }
            }
        });

        TurnStream { rx, task }
    }

    async fn run(&self, mut transcript: Vec<Message>, events: &EventSender) -> Result<()> {
        let start_len = transcript.len();
        let mut rounds = 0usize;

        loop {
            let blocks = self.stream_reply(&transcript, events).await?;
            let calls: Vec<PendingToolCall> = blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => Some(PendingToolCall {
                        call_id: id.clone(),
                        name: name.clone(),
                        arguments: input.clone(),
                    }),
                    _ => None,
                })
                .collect();

            if calls.is_empty() {
                let text = blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<String>();
                let message = Message::assistant(text);
                transcript.push(message.clone());
                let new_messages = transcript.split_off(start_len);

                tracing::debug!(
                    target: "parley.agent",
                    rounds,
                    appended = new_messages.len(),
                    "turn complete"
                );
                return events
                    .send(AgentEvent::Response(TurnOutcome {
                        message,
                        new_messages,
                    }))
                    .await;
            }

            if rounds >= self.max_tool_rounds {
                return Err(ParleyError::Tool(format!(
                    "model kept calling tools after {} rounds",
                    self.max_tool_rounds
                )));
            }
            rounds += 1;

            transcript.push(Message::assistant_blocks(blocks));
            for call in calls {
                let call_id = call.call_id.clone();
                let output = self.handle_call(call, events).await?;
                transcript.push(Message::tool_result(call_id, output.content, output.is_error));
            }
        }
    }

    async fn stream_reply(
        &self,
        transcript: &[Message],
        events: &EventSender,
    ) -> Result<Vec<ContentBlock>> {
        let mut request = CompletionRequest::new(self.handle.model_name(), transcript.to_vec())
            .with_tools(self.tools.definitions());
        if let Some(system) = &self.system_prompt {
            request = request.with_system(system.clone());
        }

        let mut stream = self.handle.provider.complete_stream(request).await?;
        let mut accumulator = StreamAccumulator::new();
        while let Some(event) = stream.next().await {
            if let Some(text) = accumulator.process_event(event?)? {
                if !text.is_empty() {
                    events.send(AgentEvent::Token(text)).await?;
                }
            }
        }
        Ok(accumulator.finish())
    }

    async fn handle_call(&self, call: PendingToolCall, events: &EventSender) -> Result<ToolOutput> {
        events
            .send(AgentEvent::ToolStart {
                call_id: call.call_id.clone(),
                name: call.name.clone(),
                input_preview: truncate_preview(
                    &call.arguments.to_string(),
                    self.input_preview_limit,
                ),
            })
            .await?;

        let Some(tool) = self.tools.get(&call.name) else {
            let output = ToolOutput::error(format!("Unknown tool '{}'", call.name));
            self.send_end(&call, &output, events).await?;
            return Ok(output);
        };

        match self.policy.decide(&call.name, tool.requires_approval()) {
            ToolPolicy::Allow => {}
            ToolPolicy::Deny => {
                tracing::info!(target: "parley.agent", tool = %call.name, "tool call denied by policy");
                return Ok(ToolOutput::error(DENIED_MESSAGE));
            }
            ToolPolicy::Ask => {
                let (request, decision) = ApprovalRequest::new(call.clone());
                events.send(AgentEvent::ToolApprovalRequired(request)).await?;
                match decision.await {
                    Ok(ApprovalDecision::Approve) => {}
                    Ok(ApprovalDecision::ApproveForSession) => {
                        self.policy.allow_for_session(&call.name)
                    }
                    Ok(ApprovalDecision::Deny) | Err(_) => {
                        tracing::info!(target: "parley.agent", tool = %call.name, "tool call denied by the user");
                        return Ok(ToolOutput::error(DENIED_MESSAGE));
                    }
                }
            }
        }

        let output = match tool.call(call.arguments.clone()).await {
            Ok(output) => output,
            Err(e) => ToolOutput::error(e.to_string()),
        };
        self.send_end(&call, &output, events).await?;
        Ok(output)
    }

    async fn send_end(
        &self,
        call: &PendingToolCall,
        output: &ToolOutput,
        events: &EventSender,
    ) -> Result<()> {
        events
            .send(AgentEvent::ToolEnd {
                call_id: call.call_id.clone(),
                name: call.name.clone(),
                output_preview: truncate_preview(&output.content, self.output_preview_limit),
                is_error: output.is_error,
            })
            .await
    }
}

struct EventSender {
    tx: mpsc::Sender<Result<AgentEvent>>,
}

impl EventSender {
    async fn send(&self, event: AgentEvent) -> Result<()> {
        self.tx
            .send(Ok(event))
            .await
            .map_err(|_| ParleyError::Cancelled)
    }
}

/// Consumer side of a running turn
pub struct TurnStream {
    rx: mpsc::Receiver<Result<AgentEvent>>,
    task: JoinHandle<()>,
}

impl TurnStream {
    /// Next event, or `None` once the turn has ended
    pub async fn next(&mut self) -> Option<Result<AgentEvent>> {
        self.rx.recv().await
    }

    /// Stop the producer.
    ///
    /// Generation already running on the provider side may continue; its
    /// output is discarded.
    pub fn cancel(&mut self) {
        self.task.abort();
        self.rx.close();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TurnStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}
