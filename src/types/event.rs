//! Canonical stream events.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One normalized event produced from a provider stream.
///
/// Events are yielded in frame-arrival order. A well-formed stream ends with
/// exactly one [`StreamEvent::Finish`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// User-visible answer text.
    TextDelta { text: String },
    /// Reasoning / thinking text.
    ReasoningDelta { text: String },
    /// A fully assembled tool invocation.
    ToolCall(ToolCall),
    /// Terminal event.
    Finish { reason: FinishReason },
}

impl StreamEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::ReasoningDelta { text: text.into() }
    }

    pub fn finish(reason: FinishReason) -> Self {
        Self::Finish { reason }
    }

    /// Text carried by a `TextDelta`, if this is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::TextDelta { text } => Some(text),
            _ => None,
        }
    }

    /// The tool call carried by this event, if any.
    pub fn as_tool_call(&self) -> Option<&ToolCall> {
        match self {
            Self::ToolCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, Self::Finish { .. })
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Id for calls whose provider did not assign one.
pub(crate) fn generate_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// Why generation finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
}
