use std::sync::Arc;

use answer_stream::prelude::*;
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, PartialEq)]
enum Event {
    Delta(String),
    Metadata(usize),
    Done(TerminalResult),
    Error(SessionError),
}

struct Collector(mpsc::UnboundedSender<Event>);

impl StreamHandlers for Collector {
    fn on_delta(&mut self, text: &str) {
        let _ = self.0.send(Event::Delta(text.to_string()));
    }

    fn on_metadata(&mut self, metadata: &Metadata) {
        let _ = self.0.send(Event::Metadata(metadata.context.len()));
    }

    fn on_done(&mut self, result: TerminalResult) {
        let _ = self.0.send(Event::Done(result));
    }

    fn on_error(&mut self, error: SessionError) {
        let _ = self.0.send(Event::Error(error));
    }
}

fn settings() -> WidgetSettings {
    WidgetSettings::new("kb-public", "emb-1", "llm-1", "model-a")
}

async fn ask(base_url: &str, query: &str) -> (SessionState, Vec<Event>) {
    let transport = HttpTransport::new(ClientConfig::new(base_url).api_key("pk_test"))
        .expect("transport");
    let registry = WidgetRegistry::new(Arc::new(transport));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let state = registry
        .mount("#chat", settings())
        .ask(query, Collector(tx))
        .wait()
        .await;
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (state, events)
}

#[tokio::test]
async fn streams_answer_with_sources() {
    let server = MockServer::start().await;
    let body = concat!(
        "event: metadata\n",
        "data: {\"context\":[{\"score\":0.91,\"payload\":{\"title\":\"Reset password\"}}]}\n\n",
        "event: token\n",
        "data: {\"delta\":\"Open \"}\n\n",
        "event: token\n",
        "data: {\"delta\":\"settings\"}\n\n",
        "event: complete\n",
        "data: {\"answer\":\"Open settings.\"}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/public/rag/answer"))
        .and(header("accept", "text/event-stream"))
        .and(header("x-api-key", "pk_test"))
        .and(body_json(serde_json::json!({
            "query": "reset password",
            "embeddingProviderId": "emb-1",
            "llmProviderId": "llm-1",
            "llmModel": "model-a",
            "limit": 6,
            "contextLimit": 4,
            "publicId": "kb-public",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let (state, events) = ask(&server.uri(), "reset password").await;
    assert_eq!(state, SessionState::Done);
    assert_eq!(events[0], Event::Metadata(1));
    assert_eq!(events[1], Event::Delta("Open ".into()));
    assert_eq!(events[2], Event::Delta("settings".into()));
    let Event::Done(result) = &events[3] else {
        panic!("expected done, got {:?}", events[3]);
    };
    assert_eq!(result.answer, "Open settings.");
    assert_eq!(result.completion, Completion::Complete);
    assert_eq!(
        result.metadata.as_ref().map(|m| m.context[0].payload_str("title")),
        Some(Some("Reset password"))
    );
}

#[tokio::test]
async fn json_response_uses_fallback_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/public/rag/answer"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"answer":"X","context":[],"provider":{"id":"llm-1"}}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let (state, events) = ask(&server.uri(), "q").await;
    assert_eq!(state, SessionState::Done);
    assert_eq!(
        events,
        vec![Event::Done(TerminalResult {
            answer: "X".into(),
            metadata: Some(Metadata { context: vec![] }),
            completion: Completion::Fallback,
        })]
    );
}

#[tokio::test]
async fn bad_request_reports_error_and_details() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_raw(
            r#"{"error":"Bad request","details":"missing field"}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let (state, events) = ask(&server.uri(), "q").await;
    assert_eq!(state, SessionState::Error);
    assert_eq!(
        events,
        vec![Event::Error(SessionError::http(400, "Bad request — missing field"))]
    );
}

#[tokio::test]
async fn empty_error_body_falls_back_to_reason_phrase() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (_, events) = ask(&server.uri(), "q").await;
    assert_eq!(
        events,
        vec![Event::Error(SessionError::http(503, "Service Unavailable"))]
    );
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let uri = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        format!("http://{}", listener.local_addr().expect("addr"))
    };

    let (state, events) = ask(&uri, "q").await;
    assert_eq!(state, SessionState::Error);
    assert!(matches!(events.as_slice(), [Event::Error(SessionError::Transport(_))]));
}
