//! Decoded transport frames, the input side of the normalizer.

use serde_json::Value;

use super::event::FinishReason;

/// One decoded unit of a provider stream.
///
/// Adapters fill in whichever fields the provider's envelope carries; the
/// normalizer treats every field as optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Plain content delta.
    pub content: Option<String>,
    /// Reasoning in any of the supported representations.
    pub reasoning: ReasoningFields,
    /// Structured tool-call fragments.
    pub tool_calls: Vec<ToolCallDelta>,
    /// Provider finish reason, already mapped.
    pub finish_reason: Option<FinishReason>,
    /// Explicit end-of-stream sentinel (e.g. `[DONE]`, `message_stop`).
    pub done: bool,
}

impl Frame {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn done() -> Self {
        Self {
            done: true,
            ..Default::default()
        }
    }

    pub fn with_finish(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    pub fn with_tool_call(mut self, delta: ToolCallDelta) -> Self {
        self.tool_calls.push(delta);
        self
    }

    /// Whether this frame ends the stream.
    pub fn is_terminal(&self) -> bool {
        self.done || self.finish_reason.is_some()
    }
}

/// A fragment of a structured tool call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallDelta {
    /// Provider-assigned index. `None` when the provider omitted it.
    pub index: Option<u32>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

impl ToolCallDelta {
    pub fn new(index: u32) -> Self {
        Self {
            index: Some(index),
            ..Default::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn arguments(mut self, fragment: impl Into<String>) -> Self {
        self.arguments = Some(fragment.into());
        self
    }
}

/// The reasoning representations a frame may carry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReasoningFields {
    /// Direct plain-string field (`reasoning_content`, Gemini thought text, ...).
    pub text: Option<String>,
    /// Structured detail records (`reasoning_details`).
    pub details: Option<Vec<Value>>,
    /// Free-form field of unknown shape.
    pub opaque: Option<Value>,
}

impl ReasoningFields {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.details.is_none() && self.opaque.is_none()
    }
}
