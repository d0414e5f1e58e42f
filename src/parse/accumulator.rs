//! Reassembly of indexed, fragmentary tool-call deltas.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};

use super::json_slice::brace_depth;
use super::tag_block::parse_arguments;
use crate::types::event::generate_call_id;
use crate::types::{ToolCall, ToolCallDelta};

/// A tool call still being assembled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl PendingCall {
    fn into_tool_call(self) -> ToolCall {
        ToolCall {
            id: if self.id.is_empty() {
                generate_call_id()
            } else {
                self.id
            },
            arguments: parse_arguments(&self.arguments),
            name: self.name,
        }
    }
}

/// Merges tool-call fragments by index and flushes each call exactly once.
///
/// One accumulator belongs to one stream; nothing here is shared.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    pending: BTreeMap<u32, PendingCall>,
    flushed: HashSet<u32>,
    index_by_id: HashMap<String, u32>,
    name_by_id: HashMap<String, String>,
    last_index: Option<u32>,
    next_index: u32,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment into the record for `index`.
    ///
    /// Returns the finished call once the accumulated arguments parse as a
    /// JSON object with balanced braces and a name is known. The record is
    /// removed at that point; later fragments for the same index are ignored.
    pub fn accumulate(
        &mut self,
        index: u32,
        name: Option<&str>,
        arguments: Option<&str>,
        id: Option<&str>,
    ) -> Option<ToolCall> {
        if self.flushed.contains(&index) {
            debug!(index, "Ignoring fragment for an already flushed tool call");
            return None;
        }

        self.last_index = Some(index);
        self.next_index = self.next_index.max(index.saturating_add(1));
        let record = self.pending.entry(index).or_default();

        if let Some(id) = id.filter(|id| !id.is_empty()) {
            if record.id.is_empty() {
                record.id = id.to_string();
                self.index_by_id.insert(record.id.clone(), index);
            }
        }

        match name.filter(|name| !name.is_empty()) {
            Some(name) => {
                record.name = name.to_string();
                if !record.id.is_empty() {
                    self.name_by_id.insert(record.id.clone(), record.name.clone());
                }
            }
            None if record.name.is_empty() && !record.id.is_empty() => {
                if let Some(known) = self.name_by_id.get(&record.id) {
                    record.name = known.clone();
                }
            }
            None => {}
        }

        if let Some(fragment) = arguments {
            record.arguments.push_str(fragment);
        }

        if record.name.is_empty() || !arguments_complete(&record.arguments) {
            return None;
        }

        let record = self.pending.remove(&index)?;
        self.flushed.insert(index);
        Some(record.into_tool_call())
    }

    /// Merge a decoded delta, resolving a missing index through its id.
    pub fn push(&mut self, delta: &ToolCallDelta) -> Option<ToolCall> {
        let index = self.resolve_index(delta);
        self.accumulate(
            index,
            delta.name.as_deref(),
            delta.arguments.as_deref(),
            delta.id.as_deref(),
        )
    }

    /// Flush every named record that never completed.
    ///
    /// Used at end of stream so a truncated call is still delivered with
    /// whatever argument text arrived. Unnamed records are dropped.
    pub fn drain_pending(&mut self) -> Vec<ToolCall> {
        let pending = std::mem::take(&mut self.pending);
        let mut calls = Vec::with_capacity(pending.len());

        for (index, record) in pending {
            self.flushed.insert(index);
            if record.name.is_empty() {
                debug!(index, "Dropping unnamed pending tool call");
                continue;
            }
            warn!(
                index,
                name = %record.name,
                "Flushing incomplete tool call at end of stream"
            );
            calls.push(record.into_tool_call());
        }

        calls
    }

    /// Whether any record is still being assembled.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Read access to a record still being assembled.
    pub fn pending(&self, index: u32) -> Option<&PendingCall> {
        self.pending.get(&index)
    }

    fn resolve_index(&mut self, delta: &ToolCallDelta) -> u32 {
        if let Some(index) = delta.index {
            return index;
        }
        match delta.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => match self.index_by_id.get(id) {
                Some(&index) => index,
                None => self.next_index,
            },
            None => self.last_index.unwrap_or(self.next_index),
        }
    }
}

fn arguments_complete(arguments: &str) -> bool {
    let trimmed = arguments.trim();
    if trimmed.is_empty() || brace_depth(trimmed) != 0 {
        return false;
    }
    matches!(
        serde_json::from_str::<serde_json::Value>(trimmed),
        Ok(serde_json::Value::Object(_))
    )
}
