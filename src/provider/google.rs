//! Google Gemini (`generateContent` / `streamGenerateContent`) frame adapter.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::FrameAdapter;
use crate::error::{LlmuxError, Result};
use crate::types::event::generate_call_id;
use crate::types::{FinishReason, Frame, ReasoningFields, ToolCallDelta};

/// Argument key under which the carried thought signature is attached.
pub const THOUGHT_SIGNATURE_KEY: &str = "__thought_signature";

/// Decodes Gemini `candidates/parts` payloads.
///
/// Gemini sends each function call whole, often without its own thought
/// signature. The most recent signature seen on any part is carried across
/// frames and attached to such calls so the caller can echo it back.
#[derive(Debug, Default)]
pub struct GeminiAdapter {
    last_signature: Option<String>,
    next_index: u32,
}

impl GeminiAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_chunk(&mut self, data: GeminiResponse) -> Result<Option<Frame>> {
        if let Some(error) = data.error {
            return Err(LlmuxError::Stream(error.message.unwrap_or_else(|| {
                format!("Gemini error (code {})", error.code.unwrap_or_default())
            })));
        }

        let Some(candidate) = data.candidates.into_iter().next() else {
            if let Some(reason) = data.prompt_feedback.and_then(|f| f.block_reason) {
                debug!(reason = %reason, "Gemini blocked the prompt");
                return Ok(Some(Frame::default().with_finish(FinishReason::ContentFilter)));
            }
            return Ok(None);
        };

        let mut frame = Frame::default();
        let mut text = String::new();
        let mut thought = String::new();

        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(sig) = part.thought_signature.as_ref().filter(|s| !s.is_empty()) {
                self.last_signature = Some(sig.clone());
            }

            if let Some(t) = part.text {
                if part.thought.unwrap_or(false) {
                    thought.push_str(&t);
                } else {
                    text.push_str(&t);
                }
            }

            if let Some(fc) = part.function_call {
                frame.tool_calls.push(self.call_delta(fc));
            }
        }

        if !text.is_empty() {
            frame.content = Some(text);
        }
        if !thought.is_empty() {
            frame.reasoning = ReasoningFields {
                text: Some(thought),
                ..Default::default()
            };
        }
        frame.finish_reason = candidate
            .finish_reason
            .as_deref()
            .filter(|r| !r.is_empty() && *r != "FINISH_REASON_UNSPECIFIED")
            .map(parse_finish_reason);

        Ok(Some(frame))
    }

    fn call_delta(&mut self, fc: GeminiFunctionCall) -> ToolCallDelta {
        let mut args = match fc.args {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => Map::new(),
            Some(other) => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        if let Some(sig) = &self.last_signature {
            args.insert(THOUGHT_SIGNATURE_KEY.to_string(), Value::String(sig.clone()));
        }

        let index = self.next_index;
        self.next_index += 1;

        ToolCallDelta {
            index: Some(index),
            id: Some(fc.id.filter(|id| !id.is_empty()).unwrap_or_else(generate_call_id)),
            name: Some(fc.name),
            arguments: Some(Value::Object(args).to_string()),
        }
    }
}

impl FrameAdapter for GeminiAdapter {
    fn provider_name(&self) -> &'static str {
        "gemini"
    }

    fn decode_event(&mut self, data: &str) -> Result<Vec<Frame>> {
        let chunk = match serde_json::from_str::<GeminiResponse>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, "Skipping unparseable Gemini chunk");
                return Ok(Vec::new());
            }
        };
        Ok(self.decode_chunk(chunk)?.into_iter().collect())
    }

    fn decode_response(&mut self, body: &str) -> Result<Vec<Frame>> {
        let data: GeminiResponse = serde_json::from_str(body)?;
        let mut frame = self
            .decode_chunk(data)?
            .ok_or_else(|| LlmuxError::api(200, "No candidates in Gemini response"))?;
        frame.finish_reason.get_or_insert(FinishReason::Stop);
        Ok(vec![frame])
    }
}

fn parse_finish_reason(s: &str) -> FinishReason {
    match s {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            FinishReason::ContentFilter
        }
        "MALFORMED_FUNCTION_CALL" => FinishReason::Error,
        other => {
            debug!(reason = other, "Unknown Gemini finish reason, treating as stop");
            FinishReason::Stop
        }
    }
}

// Internal Gemini response types

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    text: Option<String>,
    thought: Option<bool>,
    function_call: Option<GeminiFunctionCall>,
    thought_signature: Option<String>,
}

#[derive(Deserialize)]
struct GeminiFunctionCall {
    id: Option<String>,
    name: String,
    args: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiError {
    code: Option<i64>,
    message: Option<String>,
}
