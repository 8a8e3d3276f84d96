// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Scripted LLM provider
//!
//! Replays a queue of prepared replies, one per model call, through the same
//! streaming event vocabulary as the HTTP providers. Used by the test suite
//! and by hosts that want a deterministic offline model.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{ApiError, ParleyError, Result};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, ContentBlockDelta, ContentBlockResponse, EventStream,
    LlmProvider, StopReason, StreamEvent, Usage,
};

/// One prepared model reply
#[derive(Clone, Debug)]
pub enum MockReply {
    /// Plain assistant text, streamed word by word
    Text(String),
    /// Optional preamble text followed by tool calls
    ToolCalls {
        text: String,
        calls: Vec<MockToolCall>,
    },
    /// The call fails with a server error
    Error(String),
}

/// A scripted tool call
#[derive(Clone, Debug)]
pub struct MockToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

impl MockToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// A scripted provider; clones share the same queue and request log
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    token_delay: Option<Duration>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            token_delay: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Queue a text reply
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(MockReply::Text(text.into()));
        self
    }

    /// Queue a reply that requests a single tool call
    pub fn tool_call(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        self.push(MockReply::ToolCalls {
            text: String::new(),
            calls: vec![MockToolCall::new(id, name, input)],
        });
        self
    }

    /// Queue a failing reply
    pub fn failure(self, message: impl Into<String>) -> Self {
        self.push(MockReply::Error(message.into()));
        self
    }

    /// Sleep between streamed events (for interrupt tests)
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = Some(delay);
        self
    }

    pub fn push(&self, reply: MockReply) {
        lock(&self.replies).push_back(reply);
    }

    /// Number of queued replies not yet consumed
    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    fn next_reply(&self, request: &CompletionRequest) -> MockReply {
        lock(&self.requests).push(request.clone());
        lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| MockReply::Text("(no scripted reply)".to_string()))
    }

    fn events_for(reply: MockReply) -> Result<Vec<StreamEvent>> {
        let (text, calls) = match reply {
            MockReply::Text(text) => (text, Vec::new()),
            MockReply::ToolCalls { text, calls } => (text, calls),
            MockReply::Error(message) => {
                return Err(ParleyError::Api(ApiError::ServerError {
                    status: 500,
                    message,
                }))
            }
        };

        let mut events = vec![StreamEvent::MessageStart {
            id: format!("mock-{}", uuid::Uuid::new_v4().simple()),
            model: "mock-model".to_string(),
        }];
        let mut index = 0;

        if !text.is_empty() {
            events.push(StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlockResponse::Text {
                    text: String::new(),
                },
            });
            for piece in text.split_inclusive(' ') {
                events.push(StreamEvent::ContentBlockDelta {
                    index,
                    delta: ContentBlockDelta::TextDelta {
                        text: piece.to_string(),
                    },
                });
            }
            events.push(StreamEvent::ContentBlockStop { index });
            index += 1;
        }

        let stop_reason = if calls.is_empty() {
            StopReason::EndTurn
        } else {
            StopReason::ToolUse
        };

        for call in calls {
            events.push(StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlockResponse::ToolUse {
                    id: call.id,
                    name: call.name,
                    input: serde_json::json!({}),
                },
            });
            events.push(StreamEvent::ContentBlockDelta {
                index,
                delta: ContentBlockDelta::InputJsonDelta {
                    partial_json: call.input.to_string(),
                },
            });
            events.push(StreamEvent::ContentBlockStop { index });
            index += 1;
        }

        events.push(StreamEvent::MessageDelta {
            stop_reason: Some(stop_reason),
            usage: Some(Usage::default()),
        });
        events.push(StreamEvent::MessageStop);
        Ok(events)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("mock provider lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request.model.clone();
        let (text, calls) = match self.next_reply(&request) {
            MockReply::Text(text) => (text, Vec::new()),
            MockReply::ToolCalls { text, calls } => (text, calls),
            MockReply::Error(message) => {
                return Err(ParleyError::Api(ApiError::ServerError {
                    status: 500,
                    message,
                }))
            }
        };

        let mut content = vec![ContentBlockResponse::Text { text }];
        let stop_reason = if calls.is_empty() {
            StopReason::EndTurn
        } else {
            StopReason::ToolUse
        };
        content.extend(calls.into_iter().map(|c| ContentBlockResponse::ToolUse {
            id: c.id,
            name: c.name,
            input: c.input,
        }));

        Ok(CompletionResponse {
            id: format!("mock-{}", uuid::Uuid::new_v4().simple()),
            model,
            content,
            stop_reason: Some(stop_reason),
            usage: Usage::default(),
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream> {
        let events = Self::events_for(self.next_reply(&request))?;
        let delay = self.token_delay;

        let stream = stream::iter(events).then(move |event| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, ParleyError>(event)
        });
        Ok(Box::pin(stream))
    }
}
