//! Shared test helpers.

#![allow(dead_code)]

use futures::stream::{self, BoxStream, StreamExt};

use llmux::error::{LlmuxError, Result};
use llmux::types::{Frame, StreamEvent, ToolCall};

/// Render SSE `data:` payloads as a response body.
pub fn sse_body(payloads: &[&str]) -> String {
    payloads
        .iter()
        .map(|payload| format!("data: {payload}\n\n"))
        .collect()
}

/// Split `body` into a byte stream of `size`-byte chunks.
pub fn chunked(
    body: &str,
    size: usize,
) -> BoxStream<'static, std::result::Result<Vec<u8>, LlmuxError>> {
    let chunks: Vec<_> = body
        .as_bytes()
        .chunks(size.max(1))
        .map(|c| Ok(c.to_vec()))
        .collect();
    stream::iter(chunks).boxed()
}

/// One content frame per character.
pub fn char_frames(text: &str) -> Vec<Frame> {
    text.chars().map(|c| Frame::content(c.to_string())).collect()
}

/// Drain a canonical event stream, stopping at the first error.
pub async fn collect_events(
    mut events: BoxStream<'static, Result<StreamEvent>>,
) -> (Vec<StreamEvent>, Option<LlmuxError>) {
    let mut out = Vec::new();
    while let Some(item) = events.next().await {
        match item {
            Ok(event) => out.push(event),
            Err(e) => return (out, Some(e)),
        }
    }
    (out, None)
}

pub fn text_of(events: &[StreamEvent]) -> String {
    events.iter().filter_map(StreamEvent::as_text).collect()
}

pub fn calls_of(events: &[StreamEvent]) -> Vec<ToolCall> {
    events.iter().filter_map(StreamEvent::as_tool_call).cloned().collect()
}

/// `(name, arguments)` pairs, ignoring generated ids.
pub fn call_signatures(events: &[StreamEvent]) -> Vec<(String, serde_json::Value)> {
    calls_of(events)
        .into_iter()
        .map(|call| (call.name, call.arguments))
        .collect()
}

pub fn finish_of(events: &[StreamEvent]) -> Option<llmux::types::FinishReason> {
    events.iter().rev().find_map(|event| match event {
        StreamEvent::Finish { reason } => Some(*reason),
        _ => None,
    })
}
