//! Extraction of `<tool_call>…</tool_call>` blocks from accumulated text.

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::LlmuxError;
use crate::types::ToolCall;

/// Default control tag name.
pub const DEFAULT_TOOL_CALL_TAG: &str = "tool_call";

/// Finds and removes closed tag blocks, parsing each payload as a tool call.
#[derive(Debug, Clone)]
pub struct TagBlockExtractor {
    open: String,
    close: String,
    block: Regex,
}

impl TagBlockExtractor {
    /// Build an extractor for `<tag>…</tag>`.
    ///
    /// Tag names are limited to ASCII alphanumerics, `_` and `-`.
    pub fn new(tag: &str) -> Result<Self, LlmuxError> {
        if tag.is_empty()
            || !tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(LlmuxError::Configuration(format!(
                "invalid tool call tag name: {tag:?}"
            )));
        }

        let open = format!("<{tag}>");
        let close = format!("</{tag}>");
        let pattern = format!("(?s){}(.*?){}", regex::escape(&open), regex::escape(&close));
        let block = Regex::new(&pattern)
            .map_err(|e| LlmuxError::Configuration(format!("tool call tag pattern: {e}")))?;

        Ok(Self { open, close, block })
    }

    /// The opening tag, e.g. `<tool_call>`.
    pub fn open_tag(&self) -> &str {
        &self.open
    }

    pub fn close_tag(&self) -> &str {
        &self.close
    }

    /// Remove every closed block from `buffer` and return the parsed calls.
    ///
    /// Blocks whose payload is not a `{name, arguments}` record are removed
    /// as well and produce no call.
    pub fn extract(&self, buffer: &mut String) -> Vec<ToolCall> {
        if !buffer.contains(&self.close) {
            return Vec::new();
        }

        let mut calls = Vec::new();
        let mut remaining = String::with_capacity(buffer.len());
        let mut last_end = 0;

        for caps in self.block.captures_iter(buffer) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            remaining.push_str(&buffer[last_end..whole.start()]);
            last_end = whole.end();

            match parse_tool_call_payload(inner.as_str()) {
                Some(call) => calls.push(call),
                None => debug!(payload = inner.as_str(), "Dropping malformed tool call block"),
            }
        }

        if last_end > 0 {
            remaining.push_str(&buffer[last_end..]);
            *buffer = remaining;
        }

        calls
    }

    /// Whether `buffer` holds an opening tag with no closing tag after it.
    pub fn has_unclosed_open(&self, buffer: &str) -> bool {
        match buffer.rfind(&self.open) {
            Some(pos) => !buffer[pos..].contains(&self.close),
            None => false,
        }
    }

    /// Whether the number of opening and closing tags differs.
    pub fn counts_mismatch(&self, buffer: &str) -> bool {
        buffer.matches(&self.open).count() != buffer.matches(&self.close).count()
    }

    /// Split off an unclosed block at end of stream.
    ///
    /// Truncates `buffer` at the first unmatched opening tag and tries to read
    /// whatever followed it as a call.
    pub fn take_unclosed(&self, buffer: &mut String) -> Option<ToolCall> {
        if !self.has_unclosed_open(buffer) {
            return None;
        }
        let pos = buffer.find(&self.open)?;
        let tail = buffer.split_off(pos);
        let payload = tail[self.open.len()..].replace(&self.open, "");
        let call = parse_tool_call_payload(&payload);
        if call.is_none() {
            debug!(payload = %payload, "Discarding unterminated tool call block");
        }
        call
    }

    /// Remove any leftover opening or closing tags from `text`.
    pub fn strip_tags(&self, text: &str) -> String {
        text.replace(&self.close, "").replace(&self.open, "")
    }
}

/// Parse a block payload as a `{name, arguments}` record.
///
/// Accepts `parameters` as an alias for `arguments`, string-encoded
/// arguments, and payloads wrapped in a Markdown code fence.
pub fn parse_tool_call_payload(payload: &str) -> Option<ToolCall> {
    let trimmed = strip_code_fence(payload.trim());
    let Value::Object(record) = serde_json::from_str::<Value>(trimmed).ok()? else {
        return None;
    };
    tool_call_from_record(record)
}

/// Parse a JSON object found loose in answer text as a tool call.
///
/// Stricter than [`parse_tool_call_payload`]: without the tag as evidence, the
/// object must carry an `arguments` or `parameters` key, so ordinary objects
/// that merely have a `name` stay in the text.
pub fn parse_bare_tool_call(fragment: &str) -> Option<ToolCall> {
    let Value::Object(record) = serde_json::from_str::<Value>(fragment).ok()? else {
        return None;
    };
    if !record.contains_key("arguments") && !record.contains_key("parameters") {
        return None;
    }
    tool_call_from_record(record)
}

fn tool_call_from_record(mut record: Map<String, Value>) -> Option<ToolCall> {
    let name = match record.remove("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name,
        _ => return None,
    };

    let arguments = match record.remove("arguments").or_else(|| record.remove("parameters")) {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(Value::String(raw)) => parse_arguments(&raw),
        Some(value) => value,
    };

    let id = match record.remove("id") {
        Some(Value::String(id)) if !id.is_empty() => id,
        _ => crate::types::event::generate_call_id(),
    };

    Some(ToolCall {
        id,
        name,
        arguments,
    })
}

/// Parse a raw argument string, keeping it as a JSON string when it is not
/// valid JSON. Empty input becomes an empty object.
pub(crate) fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(body) = text.strip_prefix("```") else {
        return text;
    };
    let body = body.strip_suffix("```").unwrap_or(body);
    let body = body.strip_prefix("json").unwrap_or(body);
    body.trim()
}
