//! Brace-aware slicing of JSON objects out of free text.

use std::ops::Range;

use serde_json::Value;
use tracing::debug;

/// Result of [`slice_json_objects`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonSlices {
    /// Complete objects, each parseable on its own, in input order.
    pub fragments: Vec<String>,
    /// Unconsumed input: the unterminated tail when an object is still open,
    /// the whole input when no fragment was found, otherwise empty.
    pub rest: String,
}

/// Extract successive balanced and valid JSON objects from `input`.
///
/// A balanced candidate that fails to parse is discarded, never returned.
pub fn slice_json_objects(input: &str) -> JsonSlices {
    let scan = scan_objects(input);
    let fragments: Vec<String> = scan
        .spans
        .iter()
        .map(|span| input[span.clone()].to_string())
        .collect();

    let rest = if fragments.is_empty() {
        input.to_string()
    } else if let Some(open) = scan.open_from {
        input[open..].to_string()
    } else {
        String::new()
    };

    JsonSlices { fragments, rest }
}

/// Byte spans of valid top-level objects plus the start of a still-open one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ObjectScan {
    pub spans: Vec<Range<usize>>,
    pub open_from: Option<usize>,
}

/// Scan `input` for top-level `{...}` objects.
///
/// Quote tracking only applies inside an object, so prose quotes around an
/// object do not confuse the scanner.
pub(crate) fn scan_objects(input: &str) -> ObjectScan {
    let bytes = input.as_bytes();
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if depth == 0 {
            if b == b'{' {
                start = i;
                depth = 1;
            }
            continue;
        }

        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let span = start..i + 1;
                    if is_json_object(&input[span.clone()]) {
                        spans.push(span);
                    } else {
                        debug!(candidate = &input[span], "Discarding malformed JSON candidate");
                    }
                }
            }
            _ => {}
        }
    }

    ObjectScan {
        spans,
        open_from: (depth > 0).then_some(start),
    }
}

/// Net brace depth of `input`, ignoring braces inside strings.
///
/// Negative when there are more closing than opening braces.
pub fn brace_depth(input: &str) -> i64 {
    let mut depth = 0i64;
    let mut in_string = false;
    let mut escaped = false;

    for b in input.bytes() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => depth -= 1,
            _ => {}
        }
    }

    depth
}

fn is_json_object(candidate: &str) -> bool {
    matches!(serde_json::from_str::<Value>(candidate), Ok(Value::Object(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_consecutive_objects_and_keeps_open_tail() {
        let input = r#"{"a":1}{"b":{"c":2}}{"d":"#;
        let slices = slice_json_objects(input);

        assert_eq!(slices.fragments, vec![r#"{"a":1}"#, r#"{"b":{"c":2}}"#]);
        assert_eq!(slices.rest, r#"{"d":"#);
        assert_eq!(format!("{}{}", slices.fragments.concat(), slices.rest), input);
    }

    #[test]
    fn no_fragments_returns_whole_input_as_rest() {
        let slices = slice_json_objects("plain text, no objects");
        assert!(slices.fragments.is_empty());
        assert_eq!(slices.rest, "plain text, no objects");

        let slices = slice_json_objects(r#"{"open":"#);
        assert!(slices.fragments.is_empty());
        assert_eq!(slices.rest, r#"{"open":"#);
    }

    #[test]
    fn complete_input_leaves_empty_rest() {
        let slices = slice_json_objects(r#"{"a":[1,2,{"b":null}]}"#);
        assert_eq!(slices.fragments.len(), 1);
        assert_eq!(slices.rest, "");
    }

    #[test]
    fn braces_and_escaped_quotes_inside_strings_are_ignored() {
        let input = r#"{"text":"a } \" { b","n":1}"#;
        let slices = slice_json_objects(input);
        assert_eq!(slices.fragments, vec![input]);
        assert_eq!(slices.rest, "");
    }

    #[test]
    fn malformed_candidate_is_never_returned() {
        let slices = slice_json_objects(r#"{not json}{"ok":true}"#);
        assert_eq!(slices.fragments, vec![r#"{"ok":true}"#]);
        for fragment in &slices.fragments {
            assert!(serde_json::from_str::<Value>(fragment).is_ok());
        }
    }

    #[test]
    fn scan_reports_spans_inside_surrounding_prose() {
        let input = r#"Sure: {"name":"f","arguments":{}} and then {"x":"#;
        let scan = scan_objects(input);

        assert_eq!(scan.spans.len(), 1);
        assert_eq!(&input[scan.spans[0].clone()], r#"{"name":"f","arguments":{}}"#);
        assert_eq!(&input[scan.open_from.unwrap()..], r#"{"x":"#);
    }

    #[test]
    fn scan_handles_multibyte_text() {
        let input = "héllo {\"k\":\"ü\"} wörld";
        let scan = scan_objects(input);
        assert_eq!(&input[scan.spans[0].clone()], "{\"k\":\"ü\"}");
        assert_eq!(scan.open_from, None);
    }

    #[test]
    fn brace_depth_counts_outside_strings_only() {
        assert_eq!(brace_depth(r#"{"a":{"b":"}"}"#), 1);
        assert_eq!(brace_depth(r#"{"a":1}"#), 0);
        assert_eq!(brace_depth("}"), -1);
        assert_eq!(brace_depth(""), 0);
    }
}
