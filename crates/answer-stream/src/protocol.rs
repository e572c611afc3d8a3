//! Typed payloads of the answer stream and of the non-streaming responses.
//!
//! Each event name has its own payload shape, decoded independently. Shapes
//! that do not match are reported as [`MalformedFrame`] and skipped by the
//! session instead of failing it.

use serde::Deserialize;

use crate::decoder::Frame;
use crate::model::{Completion, ContextEntry, Metadata, TerminalResult};

/// Payload text that terminates the stream normally, on any event.
pub const DONE_MARKER: &str = "[DONE]";

/// Message used when an `error` frame carries no readable message.
pub const GENERIC_STREAM_ERROR: &str = "Failed to generate an answer";

/// Semantic meaning of one decoded frame.
#[derive(Clone, Debug, PartialEq)]
pub enum WireEvent {
    Metadata(Metadata),
    Token(String),
    Complete { answer: Option<String> },
    Error(String),
    Done,
    /// Event name this client does not handle.
    Ignored,
}

/// A `metadata`, `token` or `complete` frame whose payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed {event} frame: {reason}")]
pub struct MalformedFrame {
    pub event: String,
    pub reason: String,
}

#[derive(Deserialize)]
struct TokenPayload {
    delta: String,
}

#[derive(Deserialize)]
struct CompletePayload {
    #[serde(default)]
    answer: Option<String>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: Option<String>,
}

/// Interprets a frame by its event name.
///
/// An unreadable `complete` payload is malformed like any other and gets
/// skipped; an empty answer still ends the stream. `error` frames always stay
/// terminal, falling back to [`GENERIC_STREAM_ERROR`].
pub fn interpret_frame(frame: &Frame) -> Result<WireEvent, MalformedFrame> {
    if frame.data.trim() == DONE_MARKER {
        return Ok(WireEvent::Done);
    }
    let malformed = |e: serde_json::Error| MalformedFrame {
        event: frame.event.clone(),
        reason: e.to_string(),
    };
    match frame.event.as_str() {
        "metadata" => serde_json::from_str::<Metadata>(&frame.data)
            .map(WireEvent::Metadata)
            .map_err(malformed),
        "token" => serde_json::from_str::<TokenPayload>(&frame.data)
            .map(|p| WireEvent::Token(p.delta))
            .map_err(malformed),
        "complete" => serde_json::from_str::<CompletePayload>(&frame.data)
            .map(|p| WireEvent::Complete {
                answer: p.answer.filter(|answer| !answer.is_empty()),
            })
            .map_err(malformed),
        "error" => {
            let message = serde_json::from_str::<ErrorPayload>(&frame.data)
                .ok()
                .and_then(|p| p.message)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| GENERIC_STREAM_ERROR.to_string());
            Ok(WireEvent::Error(message))
        }
        _ => Ok(WireEvent::Ignored),
    }
}

/// Single JSON document returned by backends that do not stream.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackBody {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub context: Option<Vec<ContextEntry>>,
    #[serde(default)]
    pub provider: Option<serde_json::Value>,
    #[serde(default)]
    pub embedding_provider: Option<serde_json::Value>,
}

impl FallbackBody {
    pub fn into_result(self) -> TerminalResult {
        TerminalResult {
            answer: self.answer.unwrap_or_default(),
            metadata: Some(Metadata {
                context: self.context.unwrap_or_default(),
            }),
            completion: Completion::Fallback,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Builds a human-readable message for a non-success response.
///
/// Prefers a structured `{error, details}` body, then the raw body text, then
/// the status reason phrase.
pub fn http_error_message(status: u16, reason: &str, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body)
        && let Some(error) = parsed.error.filter(|e| !e.trim().is_empty())
    {
        return match parsed.details.filter(|d| !d.trim().is_empty()) {
            Some(details) => format!("{error} — {details}"),
            None => error,
        };
    }
    let text = body.trim();
    if !text.is_empty() {
        return text.to_string();
    }
    if !reason.trim().is_empty() {
        return reason.to_string();
    }
    format!("Request failed with status {status}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_with_delta_maps_to_token() {
        let event = interpret_frame(&Frame::new("token", r#"{"delta":"Hi"}"#)).expect("token");
        assert_eq!(event, WireEvent::Token("Hi".into()));
    }

    #[test]
    fn malformed_token_and_metadata_are_rejected() {
        assert!(interpret_frame(&Frame::new("token", "not-json")).is_err());
        assert!(interpret_frame(&Frame::new("token", r#"{"text":"Hi"}"#)).is_err());
        assert!(interpret_frame(&Frame::new("token", r#"{"delta":5}"#)).is_err());
        let err = interpret_frame(&Frame::new("metadata", "{")).expect_err("bad metadata");
        assert_eq!(err.event, "metadata");
    }

    #[test]
    fn metadata_decodes_context_entries() {
        let frame = Frame::new(
            "metadata",
            r#"{"context":[{"score":0.82,"payload":{"title":"FAQ","url":"https://kb/faq"}}]}"#,
        );
        let WireEvent::Metadata(meta) = interpret_frame(&frame).expect("metadata") else {
            panic!("expected metadata");
        };
        assert_eq!(meta.context.len(), 1);
        assert_eq!(meta.context[0].payload_str("title"), Some("FAQ"));
    }

    #[test]
    fn done_marker_wins_on_any_event() {
        for event in ["token", "metadata", "message", "complete"] {
            assert_eq!(
                interpret_frame(&Frame::new(event, DONE_MARKER)).expect("done"),
                WireEvent::Done
            );
        }
    }

    #[test]
    fn complete_ignores_empty_answer() {
        assert_eq!(
            interpret_frame(&Frame::new("complete", r#"{"answer":""}"#)).expect("complete"),
            WireEvent::Complete { answer: None }
        );
        assert_eq!(
            interpret_frame(&Frame::new("complete", "{}")).expect("complete"),
            WireEvent::Complete { answer: None }
        );
        assert_eq!(
            interpret_frame(&Frame::new("complete", r#"{"answer":"Hello world"}"#))
                .expect("complete"),
            WireEvent::Complete {
                answer: Some("Hello world".into())
            }
        );
    }

    #[test]
    fn unreadable_complete_is_malformed() {
        let err = interpret_frame(&Frame::new("complete", "oops")).expect_err("malformed");
        assert_eq!(err.event, "complete");
    }

    #[test]
    fn error_frame_defaults_to_generic_message() {
        assert_eq!(
            interpret_frame(&Frame::new("error", r#"{"message":"quota exceeded"}"#))
                .expect("error"),
            WireEvent::Error("quota exceeded".into())
        );
        assert_eq!(
            interpret_frame(&Frame::new("error", "<html>")).expect("error"),
            WireEvent::Error(GENERIC_STREAM_ERROR.into())
        );
    }

    #[test]
    fn unknown_events_are_ignored() {
        assert_eq!(
            interpret_frame(&Frame::new("ping", "{}")).expect("ping"),
            WireEvent::Ignored
        );
    }

    #[test]
    fn fallback_body_defaults_missing_fields() {
        let body: FallbackBody =
            serde_json::from_str(r#"{"provider":{"id":"p"},"embeddingProvider":null}"#)
                .expect("body");
        let result = body.into_result();
        assert_eq!(result.answer, "");
        assert_eq!(result.metadata, Some(Metadata::default()));
        assert_eq!(result.completion, Completion::Fallback);
    }

    #[test]
    fn http_error_prefers_structured_body() {
        assert_eq!(
            http_error_message(
                400,
                "Bad Request",
                r#"{"error":"Bad request","details":"missing field"}"#
            ),
            "Bad request — missing field"
        );
        assert_eq!(
            http_error_message(404, "Not Found", r#"{"error":"Unknown knowledge base"}"#),
            "Unknown knowledge base"
        );
    }

    #[test]
    fn http_error_falls_back_to_text_then_reason() {
        assert_eq!(
            http_error_message(502, "Bad Gateway", "upstream timed out\n"),
            "upstream timed out"
        );
        assert_eq!(http_error_message(503, "Service Unavailable", "  "), "Service Unavailable");
        assert_eq!(http_error_message(599, "", ""), "Request failed with status 599");
    }
}
