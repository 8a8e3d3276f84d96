// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! OpenAI-compatible chat completions provider
//!
//! Serves both OpenAI and DeepSeek, which share the `/chat/completions` wire
//! format (Bearer auth, SSE streaming with `data:` lines and a `[DONE]`
//! sentinel). Only the base URL, key, and provider label differ.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ApiError, ParleyError, Result};
use crate::llm::message::{ContentBlock, Message, MessageContent, Role};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, ContentBlockDelta, ContentBlockResponse, EventStream,
    LlmProvider, StopReason, StreamEvent, ToolDefinition, Usage,
};

/// Provider for any OpenAI-compatible endpoint
pub struct OpenAiCompatProvider {
    client: Client,
    label: String,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatProvider {
    /// Create a provider. `base_url` is the API root, e.g. `https://api.openai.com/v1`.
    pub fn new(
        label: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            label: label.into(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Convert internal messages to chat-completions messages
    fn convert_messages(messages: &[Message], system: Option<&str>) -> Vec<ChatMessage> {
        let mut result = Vec::new();

        if let Some(sys) = system {
            result.push(ChatMessage::text("system", sys));
        }

        for m in messages {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
                Role::System => "system",
            };

            let blocks = match &m.content {
                MessageContent::Text(text) => {
                    result.push(ChatMessage::text(role, text));
                    continue;
                }
                MessageContent::Blocks(blocks) => blocks,
            };

            let mut text_parts = Vec::new();
            let mut tool_calls = Vec::new();

            for block in blocks {
                match block {
                    ContentBlock::Text { text } => text_parts.push(text.clone()),
                    ContentBlock::ToolUse { id, name, input } => tool_calls.push(ChatToolCall {
                        id: id.clone(),
                        call_type: "function".to_string(),
                        function: ChatFunctionCall {
                            name: name.clone(),
                            arguments: input.to_string(),
                        },
                    }),
                    // Each result is its own "tool" message keyed by call id.
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => result.push(ChatMessage {
                        role: "tool".to_string(),
                        content: Some(if *is_error {
                            format!("Error: {}", content)
                        } else {
                            content.clone()
                        }),
                        tool_calls: None,
                        tool_call_id: Some(tool_use_id.clone()),
                    }),
                }
            }

            if !text_parts.is_empty() || !tool_calls.is_empty() {
                result.push(ChatMessage {
                    role: role.to_string(),
                    content: (!text_parts.is_empty()).then(|| text_parts.join("\n")),
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                    tool_call_id: None,
                });
            }
        }

        result
    }

    fn convert_tools(tools: &[ToolDefinition]) -> Vec<ChatTool> {
        tools
            .iter()
            .map(|t| ChatTool {
                tool_type: "function".to_string(),
                function: ChatFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect()
    }

    fn build_request(request: &CompletionRequest, stream: bool) -> ChatRequest {
        ChatRequest {
            model: request.model.clone(),
            messages: Self::convert_messages(&request.messages, request.system.as_deref()),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: (!request.tools.is_empty()).then(|| Self::convert_tools(&request.tools)),
            stream,
        }
    }

    /// Map an HTTP error body to the API error taxonomy
    fn parse_error(status: u16, body: &str) -> ParleyError {
        let detail = serde_json::from_str::<ChatErrorBody>(body).ok().map(|e| e.error);
        let message = detail
            .as_ref()
            .map(|d| d.message.clone())
            .unwrap_or_else(|| body.to_string());
        let code = detail.and_then(|d| d.code).unwrap_or_default();

        let api_error = match (status, code.as_str()) {
            (401, _) | (_, "invalid_api_key") => ApiError::AuthenticationFailed,
            (429, _) | (_, "rate_limit_exceeded") => ApiError::RateLimited(60),
            (404, _) | (_, "model_not_found") => ApiError::ModelNotFound(message),
            (_, "context_length_exceeded") => {
                let (current, limit) = parse_token_counts(&message);
                ApiError::ContextTooLong { current, limit }
            }
            _ => ApiError::ServerError { status, message },
        };
        ParleyError::Api(api_error)
    }

    async fn post(&self, request: &CompletionRequest, stream: bool) -> Result<reqwest::Response> {
        let body = Self::build_request(request, stream);
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ParleyError::Connectivity(format!("{} API unreachable: {}", self.label, e))
                } else {
                    ParleyError::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error(status, &body));
        }
        Ok(response)
    }
}

/// Pull the first two integers out of an error message ("... 12000 tokens ... 8192 ...")
fn parse_token_counts(message: &str) -> (u32, u32) {
    let numbers: Vec<u32> = message
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|s| s.parse().ok())
        .collect();

    match numbers.as_slice() {
        [current, limit, ..] => (*current, *limit),
        [single] => (*single, 0),
        _ => (0, 0),
    }
}

fn stop_reason(finish_reason: &str) -> StopReason {
    match finish_reason {
        "length" => StopReason::MaxTokens,
        "tool_calls" | "function_call" => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let response = self.post(&request, false).await?;
        let api_response: ChatResponse = response.json().await?;

        let choice = api_response.choices.into_iter().next().ok_or_else(|| {
            ParleyError::Api(ApiError::InvalidResponse("response has no choices".to_string()))
        })?;

        let mut content = Vec::new();
        if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
            content.push(ContentBlockResponse::Text { text });
        }
        for tc in choice.message.tool_calls.unwrap_or_default() {
            let input = serde_json::from_str(&tc.function.arguments)
                .unwrap_or_else(|_| serde_json::json!({}));
            content.push(ContentBlockResponse::ToolUse {
                id: tc.id,
                name: tc.function.name,
                input,
            });
        }

        Ok(CompletionResponse {
            id: api_response.id,
            model: api_response.model,
            content,
            stop_reason: choice.finish_reason.as_deref().map(stop_reason),
            usage: api_response.usage.map(Usage::from).unwrap_or_default(),
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream> {
        let response = self.post(&request, true).await?;

        let event_stream = response
            .bytes_stream()
            .scan(SseState::default(), |state, chunk| {
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

/// Incremental SSE decoder for chat-completions streams.
#[derive(Default)]
struct SseState {
    buffer: String,
    started: bool,
    finished: bool,
    next_index: usize,
    text_index: Option<usize>,
    /// Wire tool-call index -> content block index
    tool_blocks: HashMap<usize, usize>,
}

impl SseState {
    fn feed(&mut self, chunk: &str) -> Vec<Result<StreamEvent>> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(line_end) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=line_end).collect();
            let line = line.trim();
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                continue;
            };

            if data == "[DONE]" {
                if !self.finished {
                    self.close_blocks(&mut events);
                    events.push(Ok(StreamEvent::MessageDelta {
                        stop_reason: Some(StopReason::EndTurn),
                        usage: None,
                    }));
                }
                events.push(Ok(StreamEvent::MessageStop));
                continue;
            }

            match serde_json::from_str::<ChatStreamChunk>(data) {
                Ok(chunk) => self.on_chunk(chunk, &mut events),
                Err(e) => events.push(Err(ParleyError::Api(ApiError::InvalidResponse(format!(
                    "bad SSE payload: {}",
                    e
                ))))),
            }
        }

        events
    }

    fn on_chunk(&mut self, chunk: ChatStreamChunk, events: &mut Vec<Result<StreamEvent>>) {
        if !self.started {
            self.started = true;
            events.push(Ok(StreamEvent::MessageStart {
                id: chunk.id.clone(),
                model: chunk.model.clone().unwrap_or_default(),
            }));
        }

        let usage = chunk.usage.map(Usage::from);
        let Some(choice) = chunk.choices.into_iter().next() else {
            // Trailing usage-only chunk.
            if usage.is_some() {
                events.push(Ok(StreamEvent::MessageDelta {
                    stop_reason: None,
                    usage,
                }));
            }
            return;
        };

        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            let index = match self.text_index {
                Some(index) => index,
                None => {
                    let index = self.allocate();
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
                delta: ContentBlockDelta::TextDelta { text },
            }));
        }

        for tc in choice.delta.tool_calls.unwrap_or_default() {
            let wire_index = tc.index.unwrap_or(0);
            let function = tc.function.unwrap_or_default();

            let index = match self.tool_blocks.get(&wire_index) {
                Some(index) => *index,
                None => {
                    let index = self.allocate();
                    self.tool_blocks.insert(wire_index, index);
                    events.push(Ok(StreamEvent::ContentBlockStart {
                        index,
                        content_block: ContentBlockResponse::ToolUse {
                            id: tc.id.unwrap_or_else(|| format!("call_{}", wire_index)),
                            name: function.name.clone().unwrap_or_default(),
                            input: serde_json::Value::Object(serde_json::Map::new()),
                        },
                    }));
                    index
                }
            };

            if let Some(args) = function.arguments.filter(|a| !a.is_empty()) {
                events.push(Ok(StreamEvent::ContentBlockDelta {
                    index,
                    delta: ContentBlockDelta::InputJsonDelta { partial_json: args },
                }));
            }
        }

        if let Some(reason) = choice.finish_reason {
            self.finished = true;
            self.close_blocks(events);
            events.push(Ok(StreamEvent::MessageDelta {
                stop_reason: Some(stop_reason(&reason)),
                usage,
            }));
        }
    }

    fn close_blocks(&mut self, events: &mut Vec<Result<StreamEvent>>) {
        let mut open: Vec<usize> = self.text_index.take().into_iter().collect();
        open.extend(self.tool_blocks.drain().map(|(_, index)| index));
        open.sort_unstable();
        for index in open {
            events.push(Ok(StreamEvent::ContentBlockStop { index }));
        }
    }

    fn allocate(&mut self) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        index
    }
}

// Chat-completions wire types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: ChatFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    id: String,
    model: String,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<ChatUsage> for Usage {
    fn from(u: ChatUsage) -> Self {
        Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatErrorBody {
    error: ChatErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ChatErrorDetail {
    message: String,
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    id: String,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChoice {
    delta: ChatStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ChatStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamToolCall {
    index: Option<usize>,
    id: Option<String>,
    function: Option<ChatStreamFunction>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn collect(events: Vec<Result<StreamEvent>>) -> Vec<StreamEvent> {
        events.into_iter().map(|e| e.unwrap()).collect()
    }

    #[test]
    fn test_convert_messages_splits_tool_results() {
        let messages = vec![
            Message::user("weather?"),
            Message::assistant_blocks(vec![ContentBlock::ToolUse {
                id: "call_a".to_string(),
                name: "weather".to_string(),
                input: serde_json::json!({"city": "Oslo"}),
            }]),
            Message::tool_result("call_a", "Tool call denied by the user", true),
        ];
        let converted = OpenAiCompatProvider::convert_messages(&messages, Some("sys"));

        assert_eq!(converted.len(), 4);
        assert_eq!(converted[0].role, "system");
        assert!(converted[2].content.is_none());
        assert_eq!(converted[2].tool_calls.as_ref().unwrap()[0].id, "call_a");
        assert_eq!(converted[3].role, "tool");
        assert_eq!(converted[3].tool_call_id.as_deref(), Some("call_a"));
        assert!(converted[3]
            .content
            .as_deref()
            .unwrap()
            .starts_with("Error: "));
    }

    #[test]
    fn test_parse_error_mapping() {
        let auth = OpenAiCompatProvider::parse_error(
            401,
            r#"{"error":{"message":"bad key","code":"invalid_api_key"}}"#,
        );
        assert!(matches!(auth, ParleyError::Api(ApiError::AuthenticationFailed)));

        let limited = OpenAiCompatProvider::parse_error(429, "slow down");
        assert!(matches!(limited, ParleyError::Api(ApiError::RateLimited(_))));

        let ctx = OpenAiCompatProvider::parse_error(
            400,
            r#"{"error":{"message":"requested 12000 tokens, limit 8192","code":"context_length_exceeded"}}"#,
        );
        assert!(matches!(
            ctx,
            ParleyError::Api(ApiError::ContextTooLong {
                current: 12000,
                limit: 8192
            })
        ));
    }

    #[test]
    fn test_sse_text_stream() {
        let mut state = SseState::default();
        let mut events = state.feed("data: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[{\"delta\":{\"content\":\"Hi\"},\"finish_reason\":null}]}\n\n");
        events.extend(state.feed("data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\" there\"},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n"));
        let events = collect(events);

        assert!(matches!(events[0], StreamEvent::MessageStart { .. }));
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ContentBlockDelta {
                    delta: ContentBlockDelta::TextDelta { text },
                    ..
                } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hi there");
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, StreamEvent::MessageDelta { .. }))
                .count(),
            1
        );
        assert!(matches!(events.last(), Some(StreamEvent::MessageStop)));
    }

    #[test]
    fn test_sse_tool_call_fragments() {
        let mut state = SseState::default();
        let events = collect(state.feed(concat!(
            "data: {\"id\":\"c\",\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"search\",\"arguments\":\"{\\\"q\\\":\"}}]}}]}\n",
            "data: {\"id\":\"c\",\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"rust\\\"}\"}}]}}]}\n",
            "data: {\"id\":\"c\",\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n",
        )));

        let starts = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::ContentBlockStart { .. }))
            .count();
        assert_eq!(starts, 1);
        let json: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ContentBlockDelta {
                    delta: ContentBlockDelta::InputJsonDelta { partial_json },
                    ..
                } => Some(partial_json.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(json, "{\"q\":\"rust\"}");
        assert!(events.iter().any(|e| matches!(
            e,
            StreamEvent::MessageDelta {
                stop_reason: Some(StopReason::ToolUse),
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_complete_sends_bearer_auth() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cmpl-1",
                "model": "deepseek-chat",
                "choices": [{"message": {"content": "ok"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 5, "completion_tokens": 1}
            })))
            .mount(&mock_server)
            .await;

        let provider = OpenAiCompatProvider::new("deepseek", "sk-test", mock_server.uri());
        let response = provider
            .complete(CompletionRequest::new("deepseek-chat", vec![Message::user("hi")]))
            .await
            .unwrap();
        assert_eq!(response.text(), "ok");
        assert_eq!(response.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(response.usage.input_tokens, 5);
    }

    #[tokio::test]
    async fn test_complete_auth_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("{}"))
            .mount(&mock_server)
            .await;

        let provider = OpenAiCompatProvider::new("openai", "bad", mock_server.uri());
        let err = provider
            .complete(CompletionRequest::new("gpt-4o", vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Api(ApiError::AuthenticationFailed)));
    }
}
