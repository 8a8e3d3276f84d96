// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming response accumulation
//!
//! Folds provider stream events into the content blocks of one assistant
//! message while handing text deltas back to the caller for display.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{ApiError, Result};
use crate::llm::message::ContentBlock;
use crate::llm::provider::{ContentBlockDelta, ContentBlockResponse, StopReason, StreamEvent};

#[derive(Debug)]
enum PartialBlock {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        input: Value,
        partial_json: String,
    },
}

/// Accumulator for one streamed model response
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    blocks: BTreeMap<usize, PartialBlock>,
    stop_reason: Option<StopReason>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Process a stream event and return any text to display
    pub fn process_event(&mut self, event: StreamEvent) -> Result<Option<String>> {
        match event {
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let block = match content_block {
                    ContentBlockResponse::Text { text } => PartialBlock::Text(text),
                    ContentBlockResponse::ToolUse { id, name, input } => PartialBlock::ToolUse {
                        id,
                        name,
                        input,
                        partial_json: String::new(),
                    },
                };
                self.blocks.insert(index, block);
                Ok(None)
            }
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                ContentBlockDelta::TextDelta { text } => {
                    match self
                        .blocks
                        .entry(index)
                        .or_insert_with(|| PartialBlock::Text(String::new()))
                    {
                        PartialBlock::Text(buffer) => buffer.push_str(&text),
                        PartialBlock::ToolUse { .. } => {
                            tracing::debug!(target: "parley.agent", index, "text delta for a tool block, ignoring");
                            return Ok(None);
                        }
                    }
                    Ok(Some(text))
                }
                ContentBlockDelta::InputJsonDelta { partial_json: piece } => {
                    if let Some(PartialBlock::ToolUse { partial_json, .. }) =
                        self.blocks.get_mut(&index)
                    {
                        partial_json.push_str(&piece);
                    }
                    Ok(None)
                }
            },
            StreamEvent::MessageDelta { stop_reason, .. } => {
                if stop_reason.is_some() {
                    self.stop_reason = stop_reason;
                }
                Ok(None)
            }
            StreamEvent::Error {
                error_type,
                message,
            } => Err(ApiError::StreamError(format!("{}: {}", error_type, message)).into()),
            StreamEvent::MessageStart { .. }
            | StreamEvent::ContentBlockStop { .. }
            | StreamEvent::MessageStop
            | StreamEvent::Ping => Ok(None),
        }
    }

    /// Consume the accumulator and return the message content in stream order
    pub fn finish(self) -> Vec<ContentBlock> {
        self.blocks
            .into_values()
            .filter_map(|block| match block {
                PartialBlock::Text(text) if text.is_empty() => None,
                PartialBlock::Text(text) => Some(ContentBlock::Text { text }),
                PartialBlock::ToolUse {
                    id,
                    name,
                    input,
                    partial_json,
                } => {
                    let input = if partial_json.trim().is_empty() {
                        input
                    } else {
                        serde_json::from_str(&partial_json).unwrap_or_else(|e| {
                            tracing::warn!(
                                target: "parley.agent",
                                tool = %name,
                                error = %e,
                                "tool arguments were not valid JSON, sending empty arguments"
                            );
                            Value::Object(Default::default())
                        })
                    };
                    Some(ContentBlock::ToolUse { id, name, input })
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParleyError;
    use serde_json::json;

    fn text_delta(index: usize, text: &str) -> StreamEvent {
        StreamEvent::ContentBlockDelta {
            index,
            delta: ContentBlockDelta::TextDelta {
                text: text.to_string(),
            },
        }
    }

    fn tool_start(index: usize, id: &str, name: &str, input: Value) -> StreamEvent {
        StreamEvent::ContentBlockStart {
            index,
            content_block: ContentBlockResponse::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input,
            },
        }
    }

    #[test]
    fn test_text_deltas_are_returned_and_joined() {
        let mut acc = StreamAccumulator::new();
        assert_eq!(acc.process_event(text_delta(0, "Hel")).unwrap().as_deref(), Some("Hel"));
        assert_eq!(acc.process_event(text_delta(0, "lo")).unwrap().as_deref(), Some("lo"));

        let blocks = acc.finish();
        assert_eq!(
            blocks,
            vec![ContentBlock::Text {
                text: "Hello".to_string()
            }]
        );
    }

    #[test]
    fn test_partial_json_is_parsed_on_finish() {
        let mut acc = StreamAccumulator::new();
        acc.process_event(tool_start(1, "t1", "search", json!({}))).unwrap();
        for piece in [r#"{"q":"#, r#""rust"}"#] {
            acc.process_event(StreamEvent::ContentBlockDelta {
                index: 1,
                delta: ContentBlockDelta::InputJsonDelta {
                    partial_json: piece.to_string(),
                },
            })
            .unwrap();
        }
        acc.process_event(StreamEvent::MessageDelta {
            stop_reason: Some(StopReason::ToolUse),
            usage: None,
        })
        .unwrap();

        assert_eq!(acc.stop_reason(), Some(StopReason::ToolUse));
        assert_eq!(
            acc.finish(),
            vec![ContentBlock::ToolUse {
                id: "t1".into(),
                name: "search".into(),
                input: json!({"q": "rust"})
            }]
        );
    }

    #[test]
    fn test_whole_tool_input_from_start_is_kept() {
        let mut acc = StreamAccumulator::new();
        acc.process_event(tool_start(0, "t1", "weather", json!({"city": "Oslo"})))
            .unwrap();
        let blocks = acc.finish();
        assert!(matches!(&blocks[0], ContentBlock::ToolUse { input, .. } if input["city"] == "Oslo"));
    }

    #[test]
    fn test_invalid_json_becomes_empty_object() {
        let mut acc = StreamAccumulator::new();
        acc.process_event(tool_start(0, "t1", "x", json!({}))).unwrap();
        acc.process_event(StreamEvent::ContentBlockDelta {
            index: 0,
            delta: ContentBlockDelta::InputJsonDelta {
                partial_json: "{not json".into(),
            },
        })
        .unwrap();
        assert!(matches!(&acc.finish()[0], ContentBlock::ToolUse { input, .. } if input == &json!({})));
    }

    #[test]
    fn test_blocks_keep_stream_order_and_skip_empty_text() {
        let mut acc = StreamAccumulator::new();
        acc.process_event(tool_start(2, "t1", "b", json!({}))).unwrap();
        acc.process_event(StreamEvent::ContentBlockStart {
            index: 0,
            content_block: ContentBlockResponse::Text {
                text: String::new(),
            },
        })
        .unwrap();
        acc.process_event(text_delta(1, "thinking")).unwrap();

        let blocks = acc.finish();
        assert_eq!(blocks.len(), 2);
        assert!(matches!(&blocks[0], ContentBlock::Text { text } if text == "thinking"));
        assert!(matches!(&blocks[1], ContentBlock::ToolUse { .. }));
    }

    #[test]
    fn test_in_band_error() {
        let mut acc = StreamAccumulator::new();
        let err = acc
            .process_event(StreamEvent::Error {
                error_type: "overloaded".into(),
                message: "try later".into(),
            })
            .unwrap_err();
        assert!(matches!(err, ParleyError::Api(ApiError::StreamError(_))));
    }
}
