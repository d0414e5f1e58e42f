//! Core types for llmux.

pub mod event;
pub mod frame;

pub use event::*;
pub use frame::*;
