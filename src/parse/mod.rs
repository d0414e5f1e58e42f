//! Incremental parsing primitives shared by every provider adapter.

pub mod accumulator;
pub mod json_slice;
pub mod sniffer;
pub mod tag_block;

pub use accumulator::{PendingCall, ToolCallAccumulator};
pub use json_slice::{brace_depth, slice_json_objects, JsonSlices};
pub use sniffer::PrefixSniffer;
pub use tag_block::{
    parse_bare_tool_call, parse_tool_call_payload, TagBlockExtractor, DEFAULT_TOOL_CALL_TAG,
};
