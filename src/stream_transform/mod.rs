//! Stream transformations over the canonical event stream.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::Result;
use crate::types::{FinishReason, StreamEvent, ToolCall};

/// A boxed canonical event stream.
pub type EventStream = BoxStream<'static, Result<StreamEvent>>;

/// Trait for transforming a stream of canonical events.
pub trait StreamTransform: Send + Sync {
    /// Transform the stream.
    fn transform(&self, stream: EventStream) -> EventStream;
}

/// Filter events based on a predicate.
///
/// `Finish` is always kept so the stream stays well-formed.
pub struct FilterTransform {
    predicate: Arc<dyn Fn(&StreamEvent) -> bool + Send + Sync>,
}

impl FilterTransform {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&StreamEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Drop reasoning deltas.
    pub fn without_reasoning() -> Self {
        Self::new(|event| !matches!(event, StreamEvent::ReasoningDelta { .. }))
    }
}

impl StreamTransform for FilterTransform {
    fn transform(&self, stream: EventStream) -> EventStream {
        let predicate = self.predicate.clone();
        let transformed = async_stream::stream! {
            let mut inner = std::pin::pin!(stream);
            while let Some(item) = inner.next().await {
                match item {
                    Ok(event) => {
                        if event.is_finish() || (predicate)(&event) {
                            yield Ok(event);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };
        Box::pin(transformed)
    }
}

/// Map each `TextDelta`'s text.
pub struct MapTransform {
    mapper: Arc<dyn Fn(String) -> String + Send + Sync>,
}

impl MapTransform {
    pub fn new<F>(mapper: F) -> Self
    where
        F: Fn(String) -> String + Send + Sync + 'static,
    {
        Self {
            mapper: Arc::new(mapper),
        }
    }
}

impl StreamTransform for MapTransform {
    fn transform(&self, stream: EventStream) -> EventStream {
        let mapper = self.mapper.clone();
        let transformed = async_stream::stream! {
            let mut inner = std::pin::pin!(stream);
            while let Some(item) = inner.next().await {
                match item {
                    Ok(StreamEvent::TextDelta { text }) => {
                        yield Ok(StreamEvent::TextDelta { text: (mapper)(text) });
                    }
                    Ok(other) => yield Ok(other),
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };
        Box::pin(transformed)
    }
}

/// Coalesce consecutive text deltas until a minimum size.
///
/// Buffered text is flushed before any non-text event, so ordering relative
/// to tool calls and `Finish` is preserved.
pub struct BufferTransform {
    min_chars: usize,
}

impl BufferTransform {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }
}

impl StreamTransform for BufferTransform {
    fn transform(&self, stream: EventStream) -> EventStream {
        let min_chars = self.min_chars;
        let transformed = async_stream::stream! {
            let mut buffer = String::new();
            let mut inner = std::pin::pin!(stream);

            while let Some(item) = inner.next().await {
                match item {
                    Ok(StreamEvent::TextDelta { text }) => {
                        buffer.push_str(&text);
                        if buffer.chars().count() >= min_chars {
                            yield Ok(StreamEvent::text(std::mem::take(&mut buffer)));
                        }
                    }
                    Ok(other) => {
                        if !buffer.is_empty() {
                            yield Ok(StreamEvent::text(std::mem::take(&mut buffer)));
                        }
                        yield Ok(other);
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }

            // Flush remaining buffer
            if !buffer.is_empty() {
                yield Ok(StreamEvent::text(buffer));
            }
        };

        Box::pin(transformed)
    }
}

/// Final result after consuming an event stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamTextResult {
    /// Full accumulated answer text.
    pub text: String,
    /// Full accumulated reasoning text.
    pub reasoning: String,
    /// Tool calls in emission order.
    pub tool_calls: Vec<ToolCall>,
    /// Finish reason, `None` if the stream ended without one.
    pub finish_reason: Option<FinishReason>,
}

/// Collect a stream into a final result, stopping at the first error.
pub async fn collect_stream(mut stream: EventStream) -> Result<StreamTextResult> {
    let mut result = StreamTextResult::default();

    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::TextDelta { text } => result.text.push_str(&text),
            StreamEvent::ReasoningDelta { text } => result.reasoning.push_str(&text),
            StreamEvent::ToolCall(call) => result.tool_calls.push(call),
            StreamEvent::Finish { reason } => result.finish_reason = Some(reason),
        }
    }

    Ok(result)
}
