//! OpenAI chat-completion frame adapter.
//!
//! Also serves OpenAI-compatible backends (OpenRouter, DeepSeek, self-hosted
//! servers), which add their own reasoning fields to the same envelope.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::http::DONE_SENTINEL;
use super::{FrameAdapter, ProviderKind};
use crate::error::{LlmuxError, Result};
use crate::types::{FinishReason, Frame, ReasoningFields, ToolCallDelta};

/// Decodes `chat.completion.chunk` payloads.
#[derive(Debug)]
pub struct OpenAiAdapter {
    kind: ProviderKind,
}

impl OpenAiAdapter {
    pub fn new(kind: ProviderKind) -> Self {
        Self { kind }
    }
}

impl Default for OpenAiAdapter {
    fn default() -> Self {
        Self::new(ProviderKind::OpenAi)
    }
}

impl FrameAdapter for OpenAiAdapter {
    fn provider_name(&self) -> &'static str {
        self.kind.config_key()
    }

    fn decode_event(&mut self, data: &str) -> Result<Vec<Frame>> {
        if data == DONE_SENTINEL {
            return Ok(vec![Frame::done()]);
        }

        let chunk = match serde_json::from_str::<OpenAiStreamChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, provider = self.provider_name(), "Skipping unparseable chunk");
                return Ok(Vec::new());
            }
        };

        if let Some(error) = chunk.error {
            return Err(LlmuxError::Stream(error_message(&error)));
        }

        Ok(chunk
            .choices
            .into_iter()
            .next()
            .map(|choice| {
                let mut frame = frame_from_message(choice.delta);
                frame.finish_reason = finish_reason(choice.finish_reason.as_deref());
                frame
            })
            .into_iter()
            .collect())
    }

    fn decode_response(&mut self, body: &str) -> Result<Vec<Frame>> {
        let data: OpenAiResponse = serde_json::from_str(body)?;
        if let Some(error) = data.error {
            return Err(LlmuxError::api(200, error_message(&error)));
        }

        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmuxError::api(200, "No choices in OpenAI response"))?;

        let mut frame = frame_from_message(choice.message);
        // Whole responses always carry an index-less list in call order.
        for (i, call) in frame.tool_calls.iter_mut().enumerate() {
            call.index.get_or_insert(i as u32);
        }
        frame.finish_reason =
            Some(finish_reason(choice.finish_reason.as_deref()).unwrap_or(FinishReason::Stop));
        Ok(vec![frame])
    }
}

fn frame_from_message(message: OpenAiMessage) -> Frame {
    let (reasoning_text, opaque) = match message.reasoning {
        Some(Value::String(text)) => (Some(text), None),
        Some(Value::Null) | None => (None, None),
        Some(other) => (None, Some(other)),
    };

    Frame {
        content: message.content,
        reasoning: ReasoningFields {
            text: message.reasoning_content.or(reasoning_text),
            details: message.reasoning_details,
            opaque,
        },
        tool_calls: message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let function = tc.function.unwrap_or_default();
                ToolCallDelta {
                    index: tc.index,
                    id: tc.id,
                    name: function.name,
                    arguments: function.arguments.map(arguments_to_string),
                }
            })
            .collect(),
        ..Default::default()
    }
}

/// Arguments normally arrive as string fragments; some servers send the
/// whole object instead.
fn arguments_to_string(arguments: Value) -> String {
    match arguments {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Some compatible servers send `""` on every chunk; that is not a finish.
fn finish_reason(raw: Option<&str>) -> Option<FinishReason> {
    raw.filter(|s| !s.is_empty()).map(parse_finish_reason)
}

fn parse_finish_reason(s: &str) -> FinishReason {
    match s {
        "stop" | "end_turn" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        "error" => FinishReason::Error,
        other => {
            debug!(reason = other, "Unknown finish reason, treating as stop");
            FinishReason::Stop
        }
    }
}

fn error_message(error: &Value) -> String {
    error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string())
}

// Internal OpenAI wire types

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

/// Shared by `delta` (streaming) and `message` (whole response).
#[derive(Default, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    reasoning_content: Option<String>,
    reasoning: Option<Value>,
    reasoning_details: Option<Vec<Value>>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiToolCall {
    index: Option<u32>,
    id: Option<String>,
    function: Option<OpenAiFunction>,
}

#[derive(Default, Deserialize)]
struct OpenAiFunction {
    name: Option<String>,
    arguments: Option<Value>,
}
