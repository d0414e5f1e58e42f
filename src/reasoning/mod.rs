//! Reasoning extraction across the field conventions providers use.
//!
//! Priority is fixed: a direct string field wins over a structured detail
//! array, which wins over an opaque field. The opaque field is unwrapped one
//! level looking for the same shapes before it is serialized as a last resort.

use serde_json::{Map, Value};
use tracing::debug;

use crate::types::ReasoningFields;

/// Detail record `type` markers that carry plain reasoning text.
const TEXT_DETAIL_TYPES: &[&str] = &["reasoning.text", "text"];

/// How deep an opaque value is searched for nested reasoning fields.
const MAX_OPAQUE_DEPTH: usize = 1;

/// Where an extracted reasoning increment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningSource {
    /// Direct plain-string field.
    Field,
    /// First text-kind entry of a detail array.
    Details,
    /// Text found inside an opaque field.
    Opaque,
    /// The opaque field serialized as-is.
    Serialized,
}

impl ReasoningSource {
    /// Serialized extractions are a best-effort guess.
    pub fn is_low_confidence(self) -> bool {
        matches!(self, Self::Serialized)
    }
}

/// One reasoning increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningText {
    pub text: String,
    pub source: ReasoningSource,
}

/// Produce at most one reasoning increment from a frame's reasoning fields.
pub fn extract_reasoning(fields: &ReasoningFields) -> Option<ReasoningText> {
    let extracted = extract_at_depth(fields, 0);
    if let Some(ref r) = extracted {
        if r.source.is_low_confidence() {
            debug!(len = r.text.len(), "Reasoning taken from serialized opaque field");
        }
    }
    extracted
}

fn extract_at_depth(fields: &ReasoningFields, depth: usize) -> Option<ReasoningText> {
    if let Some(text) = fields.text.as_deref().filter(|t| !t.is_empty()) {
        return Some(ReasoningText {
            text: text.to_string(),
            source: ReasoningSource::Field,
        });
    }

    if let Some(text) = fields.details.as_deref().and_then(first_text_detail) {
        return Some(ReasoningText {
            text,
            source: ReasoningSource::Details,
        });
    }

    let opaque = fields.opaque.as_ref()?;
    unwrap_opaque(opaque, depth)
}

fn unwrap_opaque(value: &Value, depth: usize) -> Option<ReasoningText> {
    match value {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(ReasoningText {
            text: text.clone(),
            source: ReasoningSource::Opaque,
        }),
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        Value::Array(items) => first_text_detail(items)
            .map(|text| ReasoningText {
                text,
                source: ReasoningSource::Opaque,
            })
            .or_else(|| serialized(value)),
        Value::Object(map) => {
            if depth < MAX_OPAQUE_DEPTH {
                let nested = nested_fields(map);
                if !nested.is_empty() {
                    if let Some(found) = extract_at_depth(&nested, depth + 1) {
                        if !found.source.is_low_confidence() {
                            return Some(ReasoningText {
                                text: found.text,
                                source: ReasoningSource::Opaque,
                            });
                        }
                    }
                }
            }
            serialized(value)
        }
        Value::Bool(_) | Value::Number(_) => serialized(value),
    }
}

/// Read the reasoning shapes out of one nested object.
fn nested_fields(map: &Map<String, Value>) -> ReasoningFields {
    let direct = ["reasoning_content", "reasoning", "thinking", "text"]
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::to_string);

    let details = map
        .get("reasoning_details")
        .and_then(Value::as_array)
        .cloned();

    let opaque = map
        .get("reasoning")
        .filter(|value| !value.is_string())
        .cloned();

    ReasoningFields {
        text: direct,
        details,
        opaque,
    }
}

fn first_text_detail(details: &[Value]) -> Option<String> {
    details
        .iter()
        .find(|detail| {
            detail
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|kind| TEXT_DETAIL_TYPES.contains(&kind))
        })
        .and_then(|detail| detail.get("text"))
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn serialized(value: &Value) -> Option<ReasoningText> {
    Some(ReasoningText {
        text: value.to_string(),
        source: ReasoningSource::Serialized,
    })
}
