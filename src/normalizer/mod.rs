//! Per-stream state machine turning decoded frames into canonical events.
//!
//! Every provider adapter feeds the same [`StreamNormalizer`]; the adapters
//! only decode envelopes. Per frame the normalizer drains reasoning first,
//! then structured tool-call fragments, then content text (tag blocks, bare
//! JSON calls, and finally sniffed plain text).

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::config::StreamOptions;
use crate::error::Result;
use crate::parse::json_slice::scan_objects;
use crate::parse::{parse_bare_tool_call, PrefixSniffer, TagBlockExtractor, ToolCallAccumulator};
use crate::reasoning::extract_reasoning;
use crate::types::{FinishReason, Frame, StreamEvent, ToolCall};

/// Lifecycle of one normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizerState {
    /// No frame seen yet.
    Idle,
    Streaming,
    /// `Finish` has been emitted; further frames are ignored.
    Finished,
}

/// Owns the accumulation buffer and pending calls for exactly one stream.
#[derive(Debug)]
pub struct StreamNormalizer {
    options: StreamOptions,
    tags: TagBlockExtractor,
    sniffer: PrefixSniffer,
    calls: ToolCallAccumulator,
    buffer: String,
    emitted_ids: HashSet<String>,
    emitted_calls: usize,
    state: NormalizerState,
}

impl StreamNormalizer {
    pub fn new(options: StreamOptions) -> Result<Self> {
        let tags = TagBlockExtractor::new(&options.tool_call_tag)?;
        let sniffer = PrefixSniffer::new([tags.open_tag(), tags.close_tag()]);
        Ok(Self {
            options,
            tags,
            sniffer,
            calls: ToolCallAccumulator::new(),
            buffer: String::new(),
            emitted_ids: HashSet::new(),
            emitted_calls: 0,
            state: NormalizerState::Idle,
        })
    }

    pub fn state(&self) -> NormalizerState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == NormalizerState::Finished
    }

    /// Text received but not yet released as a `TextDelta`.
    pub fn pending_text(&self) -> &str {
        &self.buffer
    }

    /// Process one frame, returning the events it produces in order.
    pub fn process_frame(&mut self, frame: Frame) -> Vec<StreamEvent> {
        if self.is_finished() {
            debug!("Ignoring frame after finish");
            return Vec::new();
        }
        self.state = NormalizerState::Streaming;

        let mut events = Vec::new();

        if let Some(reasoning) = extract_reasoning(&frame.reasoning) {
            events.push(StreamEvent::reasoning(reasoning.text));
        }

        let mut produced_call = false;
        for delta in &frame.tool_calls {
            if let Some(call) = self.calls.push(delta) {
                produced_call |= self.emit_call(call, &mut events);
            }
        }

        if let Some(content) = frame.content.as_deref().filter(|c| !c.is_empty()) {
            self.buffer.push_str(content);
        }
        self.drain_text(produced_call, &mut events);

        if frame.is_terminal() {
            let reason = match frame.finish_reason {
                Some(reason) => reason,
                None => FinishReason::Stop,
            };
            self.finalize(reason, &mut events);
        }

        events
    }

    /// End the stream at transport EOF.
    ///
    /// Flushes whatever is still pending and emits `Finish`. Returns nothing
    /// when a terminal frame already finished the stream.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.is_finished() {
            return Vec::new();
        }
        warn!("Stream ended without a finish reason");
        let mut events = Vec::new();
        self.finalize(FinishReason::Stop, &mut events);
        events
    }

    fn drain_text(&mut self, mut produced_call: bool, events: &mut Vec<StreamEvent>) {
        if self.buffer.is_empty() {
            return;
        }
        if !self.options.text_tool_calls {
            events.push(StreamEvent::text(std::mem::take(&mut self.buffer)));
            return;
        }

        for call in self.tags.extract(&mut self.buffer) {
            produced_call |= self.emit_call(call, events);
        }

        let mid_tag = self.tags.has_unclosed_open(&self.buffer);
        let mut json_open = None;
        if self.options.bare_json_tool_calls && !mid_tag {
            let (calls, open_from) = self.take_bare_json_calls();
            for call in calls {
                produced_call |= self.emit_call(call, events);
            }
            json_open = open_from;
        }

        if produced_call || mid_tag || self.tags.counts_mismatch(&self.buffer) {
            return;
        }

        let mut release = self.sniffer.releasable(&self.buffer);
        if let Some(open) = json_open {
            release = release.min(open);
        }
        if release > 0 {
            let text: String = self.buffer.drain(..release).collect();
            events.push(StreamEvent::text(text));
        }
    }

    /// Remove every complete top-level object that reads as a tool call.
    ///
    /// Returns the calls and the (adjusted) start of a still-open object.
    fn take_bare_json_calls(&mut self) -> (Vec<ToolCall>, Option<usize>) {
        let scan = scan_objects(&self.buffer);
        let mut calls = Vec::new();
        let mut removed = Vec::new();

        for span in scan.spans {
            if let Some(call) = parse_bare_tool_call(&self.buffer[span.clone()]) {
                calls.push(call);
                removed.push(span);
            }
        }

        let removed_len: usize = removed.iter().map(|span| span.len()).sum();
        for span in removed.into_iter().rev() {
            self.buffer.replace_range(span, "");
        }

        // Complete spans always precede the open object.
        (calls, scan.open_from.map(|open| open - removed_len))
    }

    fn finalize(&mut self, reason: FinishReason, events: &mut Vec<StreamEvent>) {
        for call in self.calls.drain_pending() {
            self.emit_call(call, events);
        }

        if self.options.text_tool_calls {
            if let Some(call) = self.tags.take_unclosed(&mut self.buffer) {
                self.emit_call(call, events);
            }
            let mut text = self.tags.strip_tags(&self.buffer);
            // A lone trailing `<` is ordinary text once nothing can follow it.
            let keep = self.sniffer.releasable(&text);
            if text.len() - keep > 1 {
                debug!(
                    discarded = &text[keep..],
                    "Dropping partial control tag at end of stream"
                );
                text.truncate(keep);
            }
            if !text.is_empty() {
                events.push(StreamEvent::text(text));
            }
        } else if !self.buffer.is_empty() {
            events.push(StreamEvent::text(self.buffer.clone()));
        }
        self.buffer.clear();

        let reason = if reason == FinishReason::Stop && self.emitted_calls > 0 {
            FinishReason::ToolCalls
        } else {
            reason
        };
        events.push(StreamEvent::finish(reason));
        self.state = NormalizerState::Finished;
    }

    /// Emit a call unless its id was already used in this stream.
    fn emit_call(&mut self, call: ToolCall, events: &mut Vec<StreamEvent>) -> bool {
        if !self.emitted_ids.insert(call.id.clone()) {
            debug!(id = %call.id, "Suppressing duplicate tool call");
            return false;
        }
        self.emitted_calls += 1;
        events.push(StreamEvent::ToolCall(call));
        true
    }
}
