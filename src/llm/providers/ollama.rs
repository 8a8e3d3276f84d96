// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Ollama local model provider implementation
//!
//! Talks to Ollama's `/api/chat` endpoint (NDJSON streaming) and lists
//! installed models through `/api/tags`.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ParleyError, Result};
use crate::llm::message::{ContentBlock, Message, MessageContent, Role};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, ContentBlockResponse, EventStream, LlmProvider,
    StopReason, StreamEvent, ToolDefinition, Usage,
};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const NOT_RUNNING: &str = "Ollama is not reachable. Start the Ollama app or run 'ollama serve'";

/// Ollama provider
pub struct OllamaProvider {
    client: Client,
    base_url: String,
}

impl OllamaProvider {
    /// Create a new Ollama provider with default base URL (http://localhost:11434)
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_OLLAMA_URL)
    }

    /// Create with a custom base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List installed models. Every call queries the runtime afresh.
    pub async fn list_local_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if !response.status().is_success() {
            return Err(ParleyError::Api(ApiError::ServerError {
                status: response.status().as_u16(),
                message: "Failed to list models".to_string(),
            }));
        }

        let body: OllamaTagsResponse = response.json().await?;
        Ok(body.models.into_iter().map(|m| m.name).collect())
    }

    fn map_send_error(err: reqwest::Error) -> ParleyError {
        if err.is_connect() || err.is_timeout() {
            ParleyError::Connectivity(format!("{} ({})", NOT_RUNNING, err))
        } else {
            ParleyError::Http(err)
        }
    }

    /// Convert internal messages to Ollama chat messages
    fn convert_messages(messages: &[Message]) -> Vec<OllamaMessage> {
        let mut out = Vec::with_capacity(messages.len());

        for message in messages {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
                Role::System => "system",
            };

            let blocks = match &message.content {
                MessageContent::Text(text) => {
                    out.push(OllamaMessage::text(role, text.clone()));
                    continue;
                }
                MessageContent::Blocks(blocks) => blocks,
            };

            let mut text_parts = Vec::new();
            let mut tool_calls = Vec::new();
            for block in blocks {
                match block {
                    ContentBlock::Text { text } => text_parts.push(text.clone()),
                    ContentBlock::ToolUse { name, input, .. } => tool_calls.push(OllamaToolCall {
                        function: OllamaFunctionCall {
                            name: name.clone(),
                            arguments: input.clone(),
                        },
                    }),
                    // Ollama has no call ids; results are matched by order.
                    ContentBlock::ToolResult { content, .. } => text_parts.push(content.clone()),
                }
            }

            out.push(OllamaMessage {
                role: role.to_string(),
                content: text_parts.join("\n"),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            });
        }

        out
    }

    fn convert_tools(tools: &[ToolDefinition]) -> Vec<OllamaTool> {
        tools
            .iter()
            .map(|t| OllamaTool {
                tool_type: "function".to_string(),
                function: OllamaFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect()
    }

    fn build_request(request: &CompletionRequest, stream: bool) -> OllamaRequest {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(OllamaMessage::text("system", system.clone()));
        }
        messages.extend(Self::convert_messages(&request.messages));

        let options = (request.temperature.is_some() || request.max_tokens.is_some()).then(|| {
            OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens.map(i64::from),
            }
        });

        OllamaRequest {
            model: request.model.clone(),
            messages,
            stream,
            options,
            tools: (!request.tools.is_empty()).then(|| Self::convert_tools(&request.tools)),
        }
    }

    fn parse_error(status: u16, body: &str) -> ParleyError {
        let message = serde_json::from_str::<OllamaError>(body)
            .map(|e| e.error)
            .unwrap_or_else(|_| body.to_string());
        if status == 404 || (message.contains("model") && message.contains("not found")) {
            ParleyError::Api(ApiError::ModelNotFound(message))
        } else {
            ParleyError::Api(ApiError::ServerError { status, message })
        }
    }

    async fn post_chat(&self, request: &CompletionRequest, stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::build_request(request, stream);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error(status, &body));
        }
        Ok(response)
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let response = self.post_chat(&request, false).await?;
        let api_response: OllamaChatChunk = response.json().await?;
        let usage = api_response.usage();

        let mut content = Vec::new();
        if !api_response.message.content.is_empty() {
            content.push(ContentBlockResponse::Text {
                text: api_response.message.content,
            });
        }
        for tc in api_response.message.tool_calls.unwrap_or_default() {
            content.push(ContentBlockResponse::ToolUse {
                id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                name: tc.function.name,
                input: tc.function.arguments,
            });
        }

        let stop_reason = if content
            .iter()
            .any(|c| matches!(c, ContentBlockResponse::ToolUse { .. }))
        {
            StopReason::ToolUse
        } else {
            StopReason::EndTurn
        };

        Ok(CompletionResponse {
            id: format!("ollama-{}", uuid::Uuid::new_v4()),
            model: request.model,
            content,
            stop_reason: Some(stop_reason),
            usage,
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream> {
        let response = self.post_chat(&request, true).await?;
        let state = NdjsonState::new(request.model.clone());

        let event_stream = response
            .bytes_stream()
            .scan(state, |state, chunk| {
                let events = match chunk {
                    Ok(bytes) => state.feed(&String::from_utf8_lossy(&bytes)),
                    Err(e) => vec![Err(ParleyError::Api(ApiError::StreamError(e.to_string())))],
                };
                futures::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
    }
}

/// Incremental NDJSON decoder that turns Ollama chunks into provider events.
struct NdjsonState {
    buffer: String,
    message_id: String,
    model: String,
    started: bool,
    next_index: usize,
    text_index: Option<usize>,
    saw_tool_calls: bool,
}

impl NdjsonState {
    fn new(model: String) -> Self {
        Self {
            buffer: String::new(),
            message_id: format!("ollama-{}", uuid::Uuid::new_v4()),
            model,
            started: false,
            next_index: 0,
            text_index: None,
            saw_tool_calls: false,
        }
    }

    fn feed(&mut self, chunk: &str) -> Vec<Result<StreamEvent>> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<OllamaChatChunk>(line) {
                Ok(parsed) => self.on_chunk(parsed, &mut events),
                Err(e) => events.push(Err(ParleyError::Api(ApiError::InvalidResponse(
                    format!("bad NDJSON line: {}", e),
                )))),
            }
        }

        events
    }

    fn on_chunk(&mut self, chunk: OllamaChatChunk, events: &mut Vec<Result<StreamEvent>>) {
        if !self.started {
            self.started = true;
            events.push(Ok(StreamEvent::MessageStart {
                id: self.message_id.clone(),
                model: self.model.clone(),
            }));
        }

        if !chunk.message.content.is_empty() {
            let index = match self.text_index {
                Some(index) => index,
                None => {
                    let index = self.allocate_index();
                    self.text_index = Some(index);
                    events.push(Ok(StreamEvent::ContentBlockStart {
                        index,
                        content_block: ContentBlockResponse::Text {
                            text: String::new(),
                        },
                    }));
                    index
                }
            };
            events.push(Ok(StreamEvent::ContentBlockDelta {
                index,
                delta: crate::llm::provider::ContentBlockDelta::TextDelta {
                    text: chunk.message.content.clone(),
                },
            }));
        }

        // Ollama delivers tool calls whole, never as partial JSON.
        for tc in chunk.message.tool_calls.clone().unwrap_or_default() {
            self.saw_tool_calls = true;
            let index = self.allocate_index();
            events.push(Ok(StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlockResponse::ToolUse {
                    id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                    name: tc.function.name,
                    input: tc.function.arguments,
                },
            }));
            events.push(Ok(StreamEvent::ContentBlockStop { index }));
        }

        if chunk.done {
            if let Some(index) = self.text_index.take() {
                events.push(Ok(StreamEvent::ContentBlockStop { index }));
            }
            let stop_reason = if self.saw_tool_calls {
                StopReason::ToolUse
            } else {
                StopReason::EndTurn
            };
            events.push(Ok(StreamEvent::MessageDelta {
                stop_reason: Some(stop_reason),
                usage: Some(chunk.usage()),
            }));
            events.push(Ok(StreamEvent::MessageStop));
        }
    }

    fn allocate_index(&mut self) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        index
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OllamaTool>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

impl OllamaMessage {
    fn text(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content,
            tool_calls: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i64>,
}

#[derive(Debug, Serialize)]
struct OllamaTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OllamaFunction,
}

#[derive(Debug, Serialize)]
struct OllamaFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct OllamaFunctionCall {
    name: String,
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OllamaChatChunk {
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl OllamaChatChunk {
    fn usage(&self) -> Usage {
        Usage {
            input_tokens: self.prompt_eval_count.unwrap_or(0),
            output_tokens: self.eval_count.unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}
