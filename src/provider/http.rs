//! Shared HTTP client, SSE parsing, and auth utilities.

use std::sync::OnceLock;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::LlmuxError;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Sentinel payload some providers send as the last `data:` line.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Get (or create) the shared reqwest client.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            })
    })
}

/// Build default headers for a Bearer-token API.
pub fn bearer_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, val);
    }
    headers
}

/// Build Anthropic-style headers (x-api-key).
pub fn anthropic_headers(api_key: &str, version: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(api_key) {
        headers.insert("x-api-key", val);
    }
    if let Ok(val) = HeaderValue::from_str(version) {
        headers.insert("anthropic-version", val);
    }
    headers
}

/// Build Gemini headers (key in `x-goog-api-key` rather than the query string).
pub fn gemini_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(api_key) {
        headers.insert("x-goog-api-key", val);
    }
    headers
}

/// Return the payload of an SSE `data:` line.
///
/// The space after the colon is optional. Other fields (`event:`, `id:`),
/// comments and blank lines yield `None`.
pub fn parse_sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    Some(data.trim_end())
}

/// Splits a chunked byte stream into complete lines.
///
/// Bytes are buffered until a `\n` arrives, so a multi-byte character split
/// across two network chunks is decoded intact.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, without the
    /// terminator. Blank lines are kept; they delimit events.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Take the final unterminated line at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let line = decode_line(&rest);
        (!line.is_empty()).then_some(line)
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

/// Assembles SSE events and returns their `data` payloads.
///
/// Consecutive `data:` lines of one event are joined with `\n`; a blank line
/// ends the event. A pending payload that is already a complete JSON value is
/// also dispatched when the next `data:` line starts, for servers that omit
/// the blank separator.
#[derive(Debug, Default)]
pub struct SseDecoder {
    lines: SseLineBuffer,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the payload of every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut payloads = Vec::new();
        for line in self.lines.push(chunk) {
            self.handle_line(&line, &mut payloads);
        }
        payloads
    }

    /// Flush the last event at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let mut payloads = Vec::new();
        if let Some(line) = self.lines.finish() {
            self.handle_line(&line, &mut payloads);
        }
        self.dispatch(&mut payloads);
        payloads.pop()
    }

    fn handle_line(&mut self, line: &str, payloads: &mut Vec<String>) {
        if line.is_empty() {
            self.dispatch(payloads);
            return;
        }
        if line.starts_with(':') {
            return;
        }
        if let Some(data) = parse_sse_data(line) {
            if self.pending_is_complete() {
                self.dispatch(payloads);
            }
            self.data.push(data.to_string());
        }
    }

    fn pending_is_complete(&self) -> bool {
        match self.data.as_slice() {
            [] => false,
            [only] if only == DONE_SENTINEL => true,
            _ => serde_json::from_str::<serde::de::IgnoredAny>(&self.data.join("\n")).is_ok(),
        }
    }

    fn dispatch(&mut self, payloads: &mut Vec<String>) {
        if !self.data.is_empty() {
            payloads.push(std::mem::take(&mut self.data).join("\n"));
        }
    }
}

/// Extract a retryable error from an HTTP status code.
pub fn status_to_error(status: u16, body: &str) -> LlmuxError {
    match status {
        401 | 403 => LlmuxError::Authentication(body.to_string()),
        429 => LlmuxError::RateLimited {
            retry_after_ms: extract_retry_after(body),
        },
        _ => LlmuxError::api(status, body),
    }
}

fn extract_retry_after(body: &str) -> Option<u64> {
    // Try to parse retry-after from JSON error body
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|r| r.as_f64())
                .map(|s| (s * 1000.0) as u64)
        })
}
