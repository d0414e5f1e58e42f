//! llmux: streaming response normalizer for LLM backends.
//!
//! Turns one provider HTTP event stream (OpenAI-style chat completions,
//! Gemini `candidates/parts`, Anthropic Messages) into one ordered sequence
//! of canonical events: text deltas, reasoning deltas, completed tool calls
//! and a final finish reason.
//!
//! # Quick Start
//!
//! ```no_run
//! use futures::StreamExt;
//! use llmux::prelude::*;
//!
//! # async fn example() -> llmux::error::Result<()> {
//! let client = StreamClient::from_global(ProviderKind::OpenAi)?;
//! let body = serde_json::json!({
//!     "messages": [{"role": "user", "content": "Hello!"}]
//! });
//! let mut events = client.stream("gpt-4o", body).await?;
//! while let Some(event) = events.next().await {
//!     match event? {
//!         StreamEvent::TextDelta { text } => print!("{text}"),
//!         StreamEvent::ToolCall(call) => println!("\n-> {}({})", call.name, call.arguments),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod normalizer;
pub mod parse;
pub mod prelude;
pub mod provider;
pub mod reasoning;
pub mod stream_transform;
pub mod types;
