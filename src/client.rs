//! Thin HTTP client posting caller-built request bodies.
//!
//! Request construction (messages, tools, sampling settings) is left to the
//! caller; this only adds the model, the stream flag and auth headers.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::debug;

use crate::config::{LlmuxConfig, StreamOptions};
use crate::error::{LlmuxError, Result};
use crate::provider::http::{
    anthropic_headers, bearer_headers, gemini_headers, shared_client, status_to_error,
};
use crate::provider::{self, adapter_for, ProviderKind};
use crate::stream_transform::EventStream;
use crate::types::StreamEvent;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anything that can turn a request body into a canonical event stream.
#[async_trait]
pub trait StreamingBackend: Send + Sync {
    /// Provider this backend talks to.
    fn kind(&self) -> ProviderKind;

    /// Start a streaming request.
    async fn stream(&self, model: &str, body: Value) -> Result<EventStream>;

    /// Run a non-streaming request and decode it into the same event model.
    async fn generate(&self, model: &str, body: Value) -> Result<Vec<StreamEvent>>;
}

/// HTTP backend for one provider.
#[derive(Debug, Clone)]
pub struct StreamClient {
    kind: ProviderKind,
    api_key: String,
    base_url: String,
    options: StreamOptions,
}

impl StreamClient {
    /// Resolve credentials and endpoint for `kind` from `config`.
    pub fn new(kind: ProviderKind, config: &LlmuxConfig) -> Result<Self> {
        let key = kind.config_key();
        let api_key = config
            .get_api_key(key)
            .ok_or_else(|| LlmuxError::Authentication(format!("Missing API key for '{key}'")))?;
        let base_url = config
            .get_base_url(key)
            .or_else(|| kind.default_base_url().map(str::to_string))
            .ok_or_else(|| LlmuxError::Configuration(format!("Missing base URL for '{key}'")))?;

        Ok(Self {
            kind,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            options: config.stream_options(),
        })
    }

    /// Create a client for the global config.
    pub fn from_global(kind: ProviderKind) -> Result<Self> {
        Self::new(kind, LlmuxConfig::global())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self) -> HeaderMap {
        match self.kind {
            ProviderKind::Gemini => gemini_headers(&self.api_key),
            ProviderKind::Anthropic => anthropic_headers(&self.api_key, ANTHROPIC_VERSION),
            _ => bearer_headers(&self.api_key),
        }
    }

    /// Endpoint URL and final body for a request.
    fn prepare(&self, model: &str, mut body: Value, stream: bool) -> Result<(String, Value)> {
        let Value::Object(ref mut map) = body else {
            return Err(LlmuxError::InvalidArgument(
                "request body must be a JSON object".into(),
            ));
        };

        let url = match self.kind {
            ProviderKind::Gemini => {
                let method = if stream {
                    "streamGenerateContent?alt=sse"
                } else {
                    "generateContent"
                };
                format!("{}/models/{model}:{method}", self.base_url)
            }
            ProviderKind::Anthropic => {
                map.entry("model").or_insert_with(|| Value::String(model.to_string()));
                map.insert("stream".into(), Value::Bool(stream));
                format!("{}/messages", self.base_url)
            }
            _ => {
                map.entry("model").or_insert_with(|| Value::String(model.to_string()));
                map.insert("stream".into(), Value::Bool(stream));
                format!("{}/chat/completions", self.base_url)
            }
        };

        Ok((url, body))
    }
}

#[async_trait]
impl StreamingBackend for StreamClient {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn stream(&self, model: &str, body: Value) -> Result<EventStream> {
        let (url, body) = self.prepare(model, body, true)?;
        let adapter = adapter_for(self.kind)?;

        debug!(provider = %self.kind, model, "stream");

        let resp = shared_client()
            .post(&url)
            .headers(self.headers())
            .json(&body)
            .send()
            .await?;

        provider::stream_response(resp, adapter, self.options.clone()).await
    }

    async fn generate(&self, model: &str, body: Value) -> Result<Vec<StreamEvent>> {
        let (url, body) = self.prepare(model, body, false)?;

        debug!(provider = %self.kind, model, "generate");

        let resp = shared_client()
            .post(&url)
            .headers(self.headers())
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body_text = resp.text().await?;
        if !(200..300).contains(&status) {
            return Err(status_to_error(status, &body_text));
        }

        provider::decode_response(self.kind, &body_text, self.options.clone())
    }
}
