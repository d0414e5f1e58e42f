//! Anthropic Messages API frame adapter.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::FrameAdapter;
use crate::error::{LlmuxError, Result};
use crate::types::{FinishReason, Frame, ReasoningFields, ToolCallDelta};

/// Decodes Messages API stream events.
///
/// Tool-use blocks are keyed by their content block index, which is unique
/// within one message.
#[derive(Debug, Default)]
pub struct AnthropicAdapter {
    /// Input bytes seen so far per open tool-use block.
    tool_blocks: HashMap<u32, usize>,
}

impl AnthropicAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn block_start(&mut self, index: u32, block: ContentBlock) -> Option<Frame> {
        match block.r#type.as_str() {
            "tool_use" => {
                self.tool_blocks.insert(index, 0);
                let mut delta = ToolCallDelta::new(index);
                delta.id = block.id;
                delta.name = block.name;
                Some(Frame::default().with_tool_call(delta))
            }
            "text" => block.text.filter(|t| !t.is_empty()).map(Frame::content),
            "thinking" => block
                .thinking
                .as_deref()
                .filter(|t| !t.is_empty())
                .map(reasoning_frame),
            _ => None,
        }
    }

    fn block_delta(&mut self, index: u32, delta: Value) -> Option<Frame> {
        let delta_type = delta.get("type").and_then(Value::as_str).unwrap_or("");
        match delta_type {
            "text_delta" => delta
                .get("text")
                .and_then(Value::as_str)
                .map(Frame::content),
            "thinking_delta" => delta
                .get("thinking")
                .and_then(Value::as_str)
                .map(reasoning_frame),
            "input_json_delta" => {
                let json = delta.get("partial_json").and_then(Value::as_str)?;
                if let Some(seen) = self.tool_blocks.get_mut(&index) {
                    *seen += json.len();
                }
                Some(Frame::default().with_tool_call(ToolCallDelta::new(index).arguments(json)))
            }
            other => {
                debug!(delta_type = other, "Ignoring Anthropic delta");
                None
            }
        }
    }

    /// A tool-use block with no input deltas still completes as `{}`.
    fn block_stop(&mut self, index: u32) -> Option<Frame> {
        match self.tool_blocks.remove(&index) {
            Some(0) => {
                Some(Frame::default().with_tool_call(ToolCallDelta::new(index).arguments("{}")))
            }
            _ => None,
        }
    }
}

impl FrameAdapter for AnthropicAdapter {
    fn provider_name(&self) -> &'static str {
        "anthropic"
    }

    fn decode_event(&mut self, data: &str) -> Result<Vec<Frame>> {
        let event = match serde_json::from_str::<AnthropicStreamEvent>(data) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "Skipping unparseable Anthropic event");
                return Ok(Vec::new());
            }
        };

        let frame = match event.r#type.as_str() {
            "content_block_start" => event
                .content_block
                .and_then(|block| self.block_start(event.index.unwrap_or_default(), block)),
            "content_block_delta" => event
                .delta
                .and_then(|delta| self.block_delta(event.index.unwrap_or_default(), delta)),
            "content_block_stop" => self.block_stop(event.index.unwrap_or_default()),
            "message_delta" => event
                .delta
                .as_ref()
                .and_then(|d| d.get("stop_reason"))
                .and_then(Value::as_str)
                .map(|reason| Frame::default().with_finish(parse_stop_reason(reason))),
            "message_stop" => Some(Frame::done()),
            "error" => {
                let message = event
                    .error
                    .as_ref()
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("Anthropic stream error");
                return Err(LlmuxError::Stream(message.to_string()));
            }
            _ => None, // message_start, ping
        };

        Ok(frame.into_iter().collect())
    }

    fn decode_response(&mut self, body: &str) -> Result<Vec<Frame>> {
        let data: AnthropicResponse = serde_json::from_str(body)?;

        let mut text = String::new();
        let mut thinking = String::new();
        let mut frame = Frame::default();

        for (i, block) in data.content.into_iter().enumerate() {
            match block.r#type.as_str() {
                "text" => text.push_str(block.text.as_deref().unwrap_or_default()),
                "thinking" => thinking.push_str(block.thinking.as_deref().unwrap_or_default()),
                "tool_use" => {
                    let input = block.input.unwrap_or_else(|| Value::Object(Default::default()));
                    frame.tool_calls.push(ToolCallDelta {
                        index: Some(i as u32),
                        id: block.id,
                        name: block.name,
                        arguments: Some(input.to_string()),
                    });
                }
                _ => {}
            }
        }

        if !text.is_empty() {
            frame.content = Some(text);
        }
        if !thinking.is_empty() {
            frame.reasoning.text = Some(thinking);
        }
        frame.finish_reason = Some(
            data.stop_reason
                .as_deref()
                .map(parse_stop_reason)
                .unwrap_or(FinishReason::Stop),
        );
        Ok(vec![frame])
    }
}

fn reasoning_frame(text: &str) -> Frame {
    Frame {
        reasoning: ReasoningFields {
            text: Some(text.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn parse_stop_reason(s: &str) -> FinishReason {
    match s {
        "end_turn" | "stop_sequence" | "pause_turn" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        other => {
            debug!(reason = other, "Unknown Anthropic stop reason, treating as stop");
            FinishReason::Stop
        }
    }
}

// Internal Anthropic wire types

#[derive(Deserialize)]
struct AnthropicStreamEvent {
    r#type: String,
    index: Option<u32>,
    content_block: Option<ContentBlock>,
    delta: Option<Value>,
    error: Option<Value>,
}

#[derive(Deserialize)]
struct ContentBlock {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}
