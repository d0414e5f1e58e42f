//! End-to-end stream tests against mocked provider endpoints.

#![cfg(all(feature = "openai", feature = "google", feature = "anthropic"))]

mod common;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{calls_of, chunked, collect_events, finish_of, sse_body, text_of};
use llmux::client::{StreamClient, StreamingBackend};
use llmux::config::{LlmuxConfig, StreamOptions};
use llmux::error::LlmuxError;
use llmux::provider::google::THOUGHT_SIGNATURE_KEY;
use llmux::provider::{adapter_for, decode_response, normalize_stream, ProviderKind};
use llmux::types::{FinishReason, StreamEvent};

const OPENAI_STREAM: &[&str] = &[
    r#"{"choices":[{"delta":{"reasoning_content":"Need weather."}}]}"#,
    r#"{"choices":[{"delta":{"content":"Checking "}}]}"#,
    r#"{"choices":[{"delta":{"content":"now.","tool_calls":[{"index":0,"id":"call_w","function":{"name":"weather","arguments":""}}]}}]}"#,
    r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"city\":"}}]}}]}"#,
    r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"Oslo\"}"}}]}}]}"#,
    r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
    "[DONE]",
];

fn sse_response(payloads: &[&str]) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(sse_body(payloads))
}

fn client(kind: ProviderKind, server: &MockServer) -> StreamClient {
    let config = LlmuxConfig::new();
    config.set_api_key(kind.config_key(), "test-key".to_string());
    config.set_base_url(kind.config_key(), server.uri());
    StreamClient::new(kind, &config).unwrap()
}

#[tokio::test]
async fn openai_stream_produces_canonical_events() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "gpt-4o", "stream": true})))
        .respond_with(sse_response(OPENAI_STREAM))
        .expect(1)
        .mount(&server)
        .await;

    let stream = client(ProviderKind::OpenAi, &server)
        .stream("gpt-4o", json!({"messages": [{"role": "user", "content": "weather?"}]}))
        .await
        .unwrap();
    let (events, error) = collect_events(stream).await;

    assert!(error.is_none());
    assert_eq!(events[0], StreamEvent::reasoning("Need weather."));
    assert_eq!(text_of(&events), "Checking now.");
    let calls = calls_of(&events);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "call_w");
    assert_eq!(calls[0].arguments, json!({"city": "Oslo"}));
    assert_eq!(finish_of(&events), Some(FinishReason::ToolCalls));
    assert_eq!(events.iter().filter(|e| e.is_finish()).count(), 1);
}

#[tokio::test]
async fn byte_chunking_does_not_change_events() {
    let body = sse_body(OPENAI_STREAM);

    let whole = normalize_stream(
        chunked(&body, body.len()),
        adapter_for(ProviderKind::OpenAi).unwrap(),
        StreamOptions::default(),
    )
    .unwrap();
    let split = normalize_stream(
        chunked(&body, 1),
        adapter_for(ProviderKind::OpenAi).unwrap(),
        StreamOptions::default(),
    )
    .unwrap();

    let (whole, _) = collect_events(whole).await;
    let (split, _) = collect_events(split).await;
    assert_eq!(whole, split);
}

#[tokio::test]
async fn gemini_stream_carries_thought_signature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-pro:streamGenerateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(sse_response(&[
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Thinking about it","thought":true,"thoughtSignature":"c2lnLTE="}]}}]}"#,
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Sure. "}]}}]}"#,
            r#"{"candidates":[{"content":{"role":"model","parts":[{"functionCall":{"name":"lookup","args":{"q":"rust"}}}]},"finishReason":"STOP"}]}"#,
        ]))
        .mount(&server)
        .await;

    let stream = client(ProviderKind::Gemini, &server)
        .stream("gemini-2.5-pro", json!({"contents": []}))
        .await
        .unwrap();
    let (events, error) = collect_events(stream).await;

    assert!(error.is_none());
    assert_eq!(events[0], StreamEvent::reasoning("Thinking about it"));
    assert_eq!(text_of(&events), "Sure. ");
    let calls = calls_of(&events);
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].arguments,
        json!({"q": "rust", "__thought_signature": "c2lnLTE="})
    );
    assert_eq!(calls[0].arguments[THOUGHT_SIGNATURE_KEY], "c2lnLTE=");
    assert_eq!(finish_of(&events), Some(FinishReason::ToolCalls));
}

#[tokio::test]
async fn anthropic_stream_assembles_tool_use() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_string(concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"On it.\"}}\n\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
            "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"read\",\"input\":{}}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"file\\\":\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"a.rs\\\"}\"}}\n\n",
            "data: {\"type\":\"content_block_stop\",\"index\":1}\n\n",
            "event: message_delta\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"}}\n\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        )))
        .mount(&server)
        .await;

    let stream = client(ProviderKind::Anthropic, &server)
        .stream("claude-sonnet-4", json!({"messages": [], "max_tokens": 64}))
        .await
        .unwrap();
    let (events, error) = collect_events(stream).await;

    assert!(error.is_none());
    assert_eq!(text_of(&events), "On it.");
    let calls = calls_of(&events);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "toolu_1");
    assert_eq!(calls[0].arguments, json!({"file": "a.rs"}));
    assert_eq!(finish_of(&events), Some(FinishReason::ToolCalls));
}

#[tokio::test]
async fn rate_limit_status_is_returned_before_streaming() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({"error": {"retry_after": 2}})),
        )
        .mount(&server)
        .await;

    let err = match client(ProviderKind::OpenAi, &server).stream("gpt-4o", json!({})).await {
        Ok(_) => panic!("expected an error"),
        Err(e) => e,
    };
    assert!(matches!(err, LlmuxError::RateLimited { retry_after_ms: Some(2000) }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn in_band_error_ends_stream_without_finish() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(sse_response(&[
            r#"{"choices":[{"delta":{"content":"partial"}}]}"#,
            r#"{"error":{"message":"upstream overloaded"}}"#,
            r#"{"choices":[{"delta":{"content":"never"}}]}"#,
        ]))
        .mount(&server)
        .await;

    let stream = client(ProviderKind::OpenAi, &server)
        .stream("gpt-4o", json!({}))
        .await
        .unwrap();
    let (events, error) = collect_events(stream).await;

    assert_eq!(events, vec![StreamEvent::text("partial")]);
    assert!(matches!(error, Some(LlmuxError::Stream(ref m)) if m == "upstream overloaded"));
}

#[tokio::test]
async fn eof_without_sentinel_still_finishes_and_flushes() {
    let body = sse_body(&[
        r#"{"choices":[{"delta":{"tool_calls":[{"index":2,"id":"c2","function":{"name":"save","arguments":"{\"k\":"}}]}}]}"#,
    ]);
    let stream = normalize_stream(
        chunked(&body, 7),
        adapter_for(ProviderKind::DeepSeek).unwrap(),
        StreamOptions::default(),
    )
    .unwrap();
    let (events, error) = collect_events(stream).await;

    assert!(error.is_none());
    assert_eq!(calls_of(&events)[0].arguments, json!("{\"k\":"));
    assert_eq!(finish_of(&events), Some(FinishReason::ToolCalls));
}

#[tokio::test]
async fn empty_finish_reasons_do_not_cut_the_stream() {
    let body = sse_body(&[
        r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":""}]}"#,
        r#"{"choices":[{"delta":{"content":"lo"},"finish_reason":""}]}"#,
        r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        "[DONE]",
    ]);
    let stream = normalize_stream(
        chunked(&body, body.len()),
        adapter_for(ProviderKind::OpenAiCompatible).unwrap(),
        StreamOptions::default(),
    )
    .unwrap();
    let (events, error) = collect_events(stream).await;

    assert!(error.is_none());
    assert_eq!(
        events,
        vec![
            StreamEvent::text("Hel"),
            StreamEvent::text("lo"),
            StreamEvent::finish(FinishReason::Stop),
        ]
    );
}

#[tokio::test]
async fn generate_decodes_whole_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "content": "Hi <tool_call>{\"name\":\"ping\",\"arguments\":{}}</tool_call>",
                    "reasoning_content": "greet"
                },
                "finish_reason": "stop"
            }]
        })))
        .mount(&server)
        .await;

    let events = client(ProviderKind::OpenRouter, &server)
        .generate("some/model", json!({"messages": []}))
        .await
        .unwrap();

    assert_eq!(events[0], StreamEvent::reasoning("greet"));
    assert_eq!(calls_of(&events)[0].name, "ping");
    assert_eq!(text_of(&events), "Hi ");
    assert_eq!(finish_of(&events), Some(FinishReason::ToolCalls));
}

#[test]
fn decode_response_for_gemini() {
    let events = decode_response(
        ProviderKind::Gemini,
        r#"{"candidates":[{"content":{"parts":[{"text":"Answer"}]},"finishReason":"MAX_TOKENS"}]}"#,
        StreamOptions::default(),
    )
    .unwrap();
    assert_eq!(
        events,
        vec![StreamEvent::text("Answer"), StreamEvent::finish(FinishReason::Length)]
    );
}
