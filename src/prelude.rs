//! Convenience re-exports for common use.

pub use crate::client::{StreamClient, StreamingBackend};
pub use crate::config::{LlmuxConfig, StreamOptions};
pub use crate::error::{LlmuxError, Result};
pub use crate::normalizer::StreamNormalizer;
pub use crate::provider::{adapter_for, decode_response, FrameAdapter, ProviderKind};
pub use crate::stream_transform::{collect_stream, EventStream, StreamTextResult, StreamTransform};
pub use crate::types::{FinishReason, Frame, StreamEvent, ToolCall};
