//! Anthropic transport against a mock Messages API.

use edgequake_pdf_highlight::pipeline::conversation::{
    ContentBlock, RequestOptions, StopSignal, Turn,
};
use edgequake_pdf_highlight::pipeline::highlight::highlight_tool_schema;
use edgequake_pdf_highlight::{
    AnthropicConfig, AnthropicTransport, ConversationTransport, HighlightError,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn transport(server: &MockServer, max_retries: u32) -> AnthropicTransport {
    AnthropicTransport::new(
        AnthropicConfig::new("test-key")
            .base_url(server.uri())
            .model("claude-test")
            .max_retries(max_retries)
            .retry_backoff_ms(1),
    )
    .unwrap()
}

fn opening() -> Vec<Turn> {
    vec![Turn::document_prompt(
        Arc::from(&b"%PDF-1.7"[..]),
        "Highlight anything unusual.",
    )]
}

fn options() -> RequestOptions {
    RequestOptions {
        system_prompt: Some("You review documents.".into()),
        model: None,
        temperature: 0.0,
        max_tokens: 1024,
    }
}

fn tool_use_body() -> serde_json::Value {
    json!({
        "id": "msg_01",
        "type": "message",
        "role": "assistant",
        "model": "claude-test",
        "content": [
            {"type": "text", "text": "Marking the indemnity clause."},
            {
                "type": "tool_use",
                "id": "toolu_01",
                "name": "highlight_pdf",
                "input": {
                    "xCoordinate": 72, "yCoordinate": 120, "width": 468, "height": 40,
                    "pageNumber": 1, "reason": "uncapped indemnity"
                }
            }
        ],
        "stop_reason": "tool_use",
        "usage": {"input_tokens": 2048, "output_tokens": 96}
    })
}

#[tokio::test]
async fn request_carries_document_tools_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-test",
            "max_tokens": 1024,
            "system": "You review documents.",
            "tools": [{"name": "highlight_pdf"}],
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "document", "source": {"type": "base64", "media_type": "application/pdf", "data": "JVBERi0xLjc="}},
                    {"type": "text", "text": "Highlight anything unusual."}
                ]
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_use_body()))
        .expect(1)
        .mount(&server)
        .await;

    let reply = transport(&server, 0)
        .send(&opening(), &[highlight_tool_schema()], &options())
        .await
        .unwrap();

    assert_eq!(reply.stop, StopSignal::ToolUse);
    assert_eq!(reply.usage.input_tokens, 2048);
    assert_eq!(reply.usage.output_tokens, 96);
    let call = reply
        .content
        .iter()
        .find_map(|b| match b {
            ContentBlock::ToolUse(call) => Some(call),
            _ => None,
        })
        .expect("tool use block");
    assert_eq!(call.id, "toolu_01");
    assert_eq!(call.arguments["reason"], "uncapped indemnity");
}

#[tokio::test]
async fn tool_results_are_sent_with_call_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({
            "messages": [
                {"role": "user"},
                {"role": "assistant", "content": [{"type": "tool_use", "id": "toolu_01"}]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_01", "content": "acknowledged", "is_error": false}
                ]}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "All done."}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 3}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut turns = opening();
    turns.push(Turn::assistant(vec![ContentBlock::ToolUse(
        edgequake_pdf_highlight::pipeline::conversation::ToolInvocation {
            id: "toolu_01".into(),
            name: "highlight_pdf".into(),
            arguments: json!({}),
        },
    )]));
    turns.push(Turn::tool_results(vec![ContentBlock::ToolResult {
        call_id: "toolu_01".into(),
        content: "acknowledged".into(),
        is_error: false,
    }]));

    let reply = transport(&server, 0)
        .send(&turns, &[highlight_tool_schema()], &options())
        .await
        .unwrap();
    assert_eq!(reply.stop, StopSignal::Completed);
}

#[tokio::test]
async fn rate_limit_reports_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .expect(1)
        .mount(&server)
        .await;

    let err = transport(&server, 0)
        .send(&opening(), &[], &options())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HighlightError::RateLimitExceeded {
            retry_after_secs: Some(7),
            ..
        }
    ));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn unauthorized_is_auth_error_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "type": "error",
            "error": {"type": "authentication_error", "message": "invalid x-api-key"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = transport(&server, 3)
        .send(&opening(), &[], &options())
        .await
        .unwrap_err();

    match err {
        HighlightError::AuthError { provider, detail } => {
            assert_eq!(provider, "anthropic");
            assert!(detail.contains("invalid x-api-key"), "got: {detail}");
        }
        other => panic!("expected auth error, got {other:?}"),
    }
}

#[tokio::test]
async fn server_errors_are_retried_then_succeed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(529))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "ok"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 1, "output_tokens": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = transport(&server, 3)
        .send(&opening(), &[], &options())
        .await
        .unwrap();
    assert_eq!(reply.stop, StopSignal::Completed);
}

#[tokio::test]
async fn exhausted_retries_surface_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .expect(3)
        .mount(&server)
        .await;

    let err = transport(&server, 2)
        .send(&opening(), &[], &options())
        .await
        .unwrap_err();
    assert!(matches!(err, HighlightError::TransportFailed { .. }));
}

#[tokio::test]
async fn request_model_overrides_config_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(|req: &Request| {
            serde_json::from_slice::<serde_json::Value>(&req.body)
                .map(|v| v["model"] == "claude-override")
                .unwrap_or(false)
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [],
            "stop_reason": "end_turn"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut opts = options();
    opts.model = Some("claude-override".into());
    let reply = transport(&server, 0)
        .send(&opening(), &[], &opts)
        .await
        .unwrap();
    assert!(reply.content.is_empty());
}
