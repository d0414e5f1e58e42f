//! Tests for the canonical event emitter.

mod common;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{call_signatures, calls_of, char_frames, finish_of, text_of};
use llmux::config::StreamOptions;
use llmux::normalizer::StreamNormalizer;
use llmux::types::{FinishReason, Frame, ReasoningFields, StreamEvent, ToolCallDelta};

fn run_with(options: StreamOptions, frames: Vec<Frame>) -> Vec<StreamEvent> {
    let mut normalizer = StreamNormalizer::new(options).unwrap();
    let mut events = Vec::new();
    for frame in frames {
        events.extend(normalizer.process_frame(frame));
    }
    events.extend(normalizer.finish());
    events
}

fn run(frames: Vec<Frame>) -> Vec<StreamEvent> {
    run_with(StreamOptions::default(), frames)
}

fn whole_and_split(text: &str) -> (Vec<StreamEvent>, Vec<StreamEvent>) {
    let whole = run(vec![Frame::content(text), Frame::done()]);
    let mut frames = char_frames(text);
    frames.push(Frame::done());
    (whole, run(frames))
}

#[test]
fn tag_split_across_frames_yields_one_call_then_text() {
    let events = run(vec![
        Frame::content("<too"),
        Frame::content("l_call>"),
        Frame::content(r#"{"name":"f","arguments":{"x":1}}"#),
        Frame::content("</tool_call>"),
        Frame::content("done").with_finish(FinishReason::Stop),
    ]);

    assert_eq!(call_signatures(&events), vec![("f".to_string(), json!({"x": 1}))]);
    assert!(events[0].as_tool_call().is_some());
    assert_eq!(events[1], StreamEvent::text("done"));
    assert!(events[2].is_finish());
    assert_eq!(events.len(), 3);
}

#[test]
fn interleaved_structured_calls_are_reassembled() {
    let fragments = [
        ToolCallDelta::new(0).id("call_a").name("search").arguments(""),
        ToolCallDelta::new(1).id("call_b").name("fetch").arguments(""),
        ToolCallDelta::new(0).arguments("{\"query\":"),
        ToolCallDelta::new(1).arguments("{\"url\":\"https://"),
        ToolCallDelta::new(0).arguments("\"rust\"}"),
        ToolCallDelta::new(1).arguments("example.com\"}"),
    ];

    let forward: Vec<Frame> = fragments
        .iter()
        .cloned()
        .map(|d| Frame::default().with_tool_call(d))
        .chain([Frame::default().with_finish(FinishReason::ToolCalls)])
        .collect();
    let events = run(forward);

    let calls = calls_of(&events);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].id, "call_a");
    assert_eq!(calls[0].arguments, json!({"query": "rust"}));
    assert_eq!(calls[1].id, "call_b");
    assert_eq!(calls[1].arguments, json!({"url": "https://example.com"}));
    assert_eq!(finish_of(&events), Some(FinishReason::ToolCalls));

    // Index 1 completes first when its last fragment arrives first.
    let mut swapped = fragments.to_vec();
    swapped.swap(4, 5);
    let events = run(swapped.into_iter().map(|d| Frame::default().with_tool_call(d)).collect());
    let ids: Vec<_> = calls_of(&events).into_iter().map(|c| c.id).collect();
    assert_eq!(ids, vec!["call_b".to_string(), "call_a".to_string()]);
}

#[test]
fn truncated_call_is_flushed_at_finish() {
    let events = run(vec![
        Frame::default().with_tool_call(
            ToolCallDelta::new(2).id("call_2").name("write").arguments("{\"path\":"),
        ),
        Frame::default().with_tool_call(ToolCallDelta::new(2).arguments("\"/tmp/a")),
        Frame::default().with_finish(FinishReason::Length),
    ]);

    let calls = calls_of(&events);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, "write");
    assert_eq!(calls[0].arguments, json!("{\"path\":\"/tmp/a"));
    assert_eq!(events.last(), Some(&StreamEvent::finish(FinishReason::Length)));
}

#[test]
fn one_byte_frames_match_whole_frames() {
    let inputs = [
        r#"Let me check. <tool_call>{"name":"weather","arguments":{"city":"Paris"}}</tool_call> Done."#,
        r#"Result: {"name":"f","arguments":{"a":[1,2]}} ok"#,
        r#"Two <tool_call>{"name":"a","arguments":{}}</tool_call><tool_call>{"name":"b","arguments":{"s":"}"}}</tool_call> end"#,
        "plain text with a < sign and {braces} and \"quotes\"",
    ];

    for input in inputs {
        let (whole, split) = whole_and_split(input);
        assert_eq!(text_of(&whole), text_of(&split), "text for {input:?}");
        assert_eq!(call_signatures(&whole), call_signatures(&split), "calls for {input:?}");
        assert_eq!(finish_of(&whole), finish_of(&split));
    }
}

#[test]
fn no_tag_syntax_reaches_text() {
    let inputs = [
        "a <tool_call>oops</tool_call> b",
        r#"x <tool_call>{"name":"#,
        "y </tool_call> z",
        "w <tool_ca",
        r#"<tool_call>{"name":"f","arguments":{}}</tool_call>tail"#,
    ];

    for input in inputs {
        let (whole, split) = whole_and_split(input);
        for events in [&whole, &split] {
            for event in events.iter() {
                if let Some(text) = event.as_text() {
                    assert!(!text.contains('<') && !text.contains('>'), "{text:?} from {input:?}");
                }
            }
        }
    }
}

#[test]
fn malformed_block_is_dropped_and_surrounding_text_kept() {
    let events = run(vec![Frame::content("a <tool_call>oops</tool_call> b"), Frame::done()]);
    assert!(calls_of(&events).is_empty());
    assert_eq!(text_of(&events), "a  b");
    assert_eq!(finish_of(&events), Some(FinishReason::Stop));
}

#[test]
fn no_index_or_id_fires_twice() {
    let events = run(vec![
        Frame::default().with_tool_call(ToolCallDelta::new(0).id("same").name("f").arguments("{}")),
        Frame::default().with_tool_call(ToolCallDelta::new(0).id("same").name("f").arguments("{}")),
        Frame::content(r#"<tool_call>{"id":"same","name":"f","arguments":{}}</tool_call>"#),
        Frame::done(),
    ]);
    assert_eq!(calls_of(&events).len(), 1);
}

#[test]
fn direct_reasoning_wins_over_details() {
    let frame = Frame {
        reasoning: ReasoningFields {
            text: Some("direct".into()),
            details: Some(vec![json!({"type": "reasoning.text", "text": "detail"})]),
            opaque: None,
        },
        ..Default::default()
    };
    let events = run(vec![frame, Frame::done()]);
    assert_eq!(events[0], StreamEvent::reasoning("direct"));
}

#[test]
fn bare_json_detection_can_be_disabled() {
    let options = StreamOptions::builder().bare_json_tool_calls(false).build();
    let input = r#"{"name":"f","arguments":{}}"#;
    let events = run_with(options, vec![Frame::content(input), Frame::done()]);
    assert!(calls_of(&events).is_empty());
    assert_eq!(text_of(&events), input);
}

#[test]
fn plain_json_objects_in_the_answer_are_not_calls() {
    let input = r#"The user record is {"name":"Alice","age":30}."#;
    let (whole, split) = whole_and_split(input);
    for events in [&whole, &split] {
        assert!(calls_of(events).is_empty());
        assert_eq!(text_of(events), input);
        assert_eq!(finish_of(events), Some(FinishReason::Stop));
    }
}

#[test]
fn custom_tag_name_is_honoured() {
    let options = StreamOptions::builder().tool_call_tag("function_call").build();
    let events = run_with(
        options,
        vec![
            Frame::content("<function_"),
            Frame::content(r#"call>{"name":"g","arguments":{"n":1}}</function_call>"#),
            Frame::done(),
        ],
    );
    assert_eq!(call_signatures(&events), vec![("g".to_string(), json!({"n": 1}))]);
    assert_eq!(text_of(&events), "");
}

#[test]
fn stop_is_promoted_when_calls_were_emitted() {
    let events = run(vec![
        Frame::content(r#"<tool_call>{"name":"f","arguments":{}}</tool_call>"#)
            .with_finish(FinishReason::Stop),
    ]);
    assert_eq!(finish_of(&events), Some(FinishReason::ToolCalls));

    let events = run(vec![Frame::content("hi").with_finish(FinishReason::Stop)]);
    assert_eq!(finish_of(&events), Some(FinishReason::Stop));
}
