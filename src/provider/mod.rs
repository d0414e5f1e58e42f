//! Frame adapters and the shared streaming loop.
//!
//! An adapter only decodes a provider's envelope into [`Frame`]s; every
//! provider runs through the same [`StreamNormalizer`] and the same loop.

pub mod http;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "anthropic")]
pub mod anthropic;

#[cfg(feature = "google")]
pub mod google;

use futures::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use tracing::debug;

use crate::config::StreamOptions;
use crate::error::{LlmuxError, Result};
use crate::normalizer::StreamNormalizer;
use crate::types::{Frame, StreamEvent};

use self::http::{status_to_error, SseDecoder};

/// Decodes one provider's wire format into frames.
///
/// Adapters may keep state across events (Gemini signature tracking,
/// Anthropic block bookkeeping), so a fresh adapter is used per stream.
pub trait FrameAdapter: Send {
    /// Provider name (e.g., "openai", "gemini").
    fn provider_name(&self) -> &'static str;

    /// Decode one SSE `data:` payload. May yield zero or more frames.
    fn decode_event(&mut self, data: &str) -> Result<Vec<Frame>>;

    /// Decode a whole non-streaming response body.
    fn decode_response(&mut self, body: &str) -> Result<Vec<Frame>>;
}

/// Supported backends, selected by configuration.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    #[strum(serialize = "openai-compatible")]
    #[serde(rename = "openai-compatible")]
    OpenAiCompatible,
    OpenRouter,
    DeepSeek,
    #[strum(to_string = "gemini", serialize = "google")]
    #[serde(alias = "google")]
    Gemini,
    Anthropic,
}

impl ProviderKind {
    /// Key used for API keys and base URLs in [`crate::config::LlmuxConfig`].
    pub fn config_key(self) -> &'static str {
        self.into()
    }

    /// Built-in API root, if the provider has a fixed one.
    pub fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::OpenRouter => Some("https://openrouter.ai/api/v1"),
            Self::DeepSeek => Some("https://api.deepseek.com/v1"),
            Self::Gemini => Some("https://generativelanguage.googleapis.com/v1beta"),
            Self::Anthropic => Some("https://api.anthropic.com/v1"),
            Self::OpenAiCompatible => None,
        }
    }

    /// Whether this provider speaks the OpenAI chat-completion format.
    pub fn is_openai_style(self) -> bool {
        matches!(
            self,
            Self::OpenAi | Self::OpenAiCompatible | Self::OpenRouter | Self::DeepSeek
        )
    }
}

/// Create a fresh adapter for `kind`.
pub fn adapter_for(kind: ProviderKind) -> Result<Box<dyn FrameAdapter>> {
    match kind {
        #[cfg(feature = "openai")]
        k if k.is_openai_style() => Ok(Box::new(openai::OpenAiAdapter::new(k))),
        #[cfg(feature = "google")]
        ProviderKind::Gemini => Ok(Box::new(google::GeminiAdapter::new())),
        #[cfg(feature = "anthropic")]
        ProviderKind::Anthropic => Ok(Box::new(anthropic::AnthropicAdapter::new())),
        #[allow(unreachable_patterns)]
        other => Err(LlmuxError::UnsupportedProvider(format!(
            "Provider '{other}' not enabled via feature flags"
        ))),
    }
}

/// Turn an HTTP streaming response into the canonical event stream.
///
/// A non-success status is returned as an error before any event.
pub async fn stream_response(
    resp: reqwest::Response,
    adapter: Box<dyn FrameAdapter>,
    options: StreamOptions,
) -> Result<BoxStream<'static, Result<StreamEvent>>> {
    let status = resp.status().as_u16();
    if !resp.status().is_success() {
        let body_text = resp.text().await.unwrap_or_default();
        return Err(status_to_error(status, &body_text));
    }

    normalize_stream(resp.bytes_stream(), adapter, options)
}

/// Drive any SSE byte stream through `adapter` and a fresh normalizer.
///
/// The returned stream is lazy; dropping it stops reading the transport.
/// After an error is yielded the stream ends without a `Finish` event.
pub fn normalize_stream<S, B, E>(
    bytes: S,
    mut adapter: Box<dyn FrameAdapter>,
    options: StreamOptions,
) -> Result<BoxStream<'static, Result<StreamEvent>>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<LlmuxError> + Send + 'static,
{
    let mut normalizer = StreamNormalizer::new(options)?;
    debug!(provider = adapter.provider_name(), "Starting normalized stream");

    let stream = async_stream::stream! {
        let mut decoder = SseDecoder::new();
        let mut failed = false;
        futures::pin_mut!(bytes);

        'read: while let Some(chunk_result) = bytes.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    yield Err(e.into());
                    failed = true;
                    break;
                }
            };

            for data in decoder.push(chunk.as_ref()) {
                match handle_data(adapter.as_mut(), &mut normalizer, &data) {
                    Ok(events) => {
                        for event in events {
                            yield Ok(event);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        failed = true;
                        break 'read;
                    }
                }
                if normalizer.is_finished() {
                    break 'read;
                }
            }
        }

        if !failed {
            if let Some(data) = decoder.finish() {
                match handle_data(adapter.as_mut(), &mut normalizer, &data) {
                    Ok(events) => {
                        for event in events {
                            yield Ok(event);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        failed = true;
                    }
                }
            }
        }

        if !failed {
            for event in normalizer.finish() {
                yield Ok(event);
            }
        }
    };

    Ok(Box::pin(stream))
}

fn handle_data(
    adapter: &mut dyn FrameAdapter,
    normalizer: &mut StreamNormalizer,
    data: &str,
) -> Result<Vec<StreamEvent>> {
    if data.is_empty() || normalizer.is_finished() {
        return Ok(Vec::new());
    }

    let mut events = Vec::new();
    for frame in adapter.decode_event(data)? {
        events.extend(normalizer.process_frame(frame));
    }
    Ok(events)
}

/// Decode a whole (non-streaming) response body into canonical events.
pub fn decode_response(
    kind: ProviderKind,
    body: &str,
    options: StreamOptions,
) -> Result<Vec<StreamEvent>> {
    let mut adapter = adapter_for(kind)?;
    let mut normalizer = StreamNormalizer::new(options)?;

    let mut events = Vec::new();
    for frame in adapter.decode_response(body)? {
        events.extend(normalizer.process_frame(frame));
    }
    events.extend(normalizer.finish());
    Ok(events)
}
