use serde::{Deserialize, Serialize};

/// Body of one answer request.
///
/// `context_limit <= limit` is expected but not enforced here; the backend
/// decides what to do with inconsistent limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    pub query: String,
    pub embedding_provider_id: String,
    pub llm_provider_id: String,
    pub llm_model: String,
    pub limit: u32,
    pub context_limit: u32,
    pub public_id: String,
}

/// One retrieved source document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub score: f64,
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl ContextEntry {
    /// Returns a string field of the payload (for example `title` or `url`).
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

/// Retrieved-source information sent alongside the answer text.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub context: Vec<ContextEntry>,
}

/// How a session reached its successful end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// The server sent a `complete` frame.
    Complete,
    /// The server sent a `[DONE]` payload.
    DoneMarker,
    /// The body ended without any terminal frame; the answer may be truncated.
    StreamClosed,
    /// The server answered with a single JSON document instead of a stream.
    Fallback,
}

/// Final value of a successful session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerminalResult {
    pub answer: String,
    pub metadata: Option<Metadata>,
    pub completion: Completion,
}

impl TerminalResult {
    /// True when the answer may be missing its tail.
    pub fn possibly_incomplete(&self) -> bool {
        self.completion == Completion::StreamClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_camel_case() {
        let request = StreamRequest {
            query: "q".into(),
            embedding_provider_id: "emb".into(),
            llm_provider_id: "llm".into(),
            llm_model: "model".into(),
            limit: 6,
            context_limit: 4,
            public_id: "kb".into(),
        };
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "query": "q",
                "embeddingProviderId": "emb",
                "llmProviderId": "llm",
                "llmModel": "model",
                "limit": 6,
                "contextLimit": 4,
                "publicId": "kb",
            })
        );
    }

    #[test]
    fn context_entry_payload_defaults_to_empty() {
        let entry: ContextEntry = serde_json::from_str(r#"{"score":0.5}"#).expect("entry");
        assert!(entry.payload.is_empty());
        assert_eq!(entry.payload_str("title"), None);
    }

    #[test]
    fn only_stream_closed_is_possibly_incomplete() {
        let mut result = TerminalResult {
            answer: "partial".into(),
            metadata: None,
            completion: Completion::StreamClosed,
        };
        assert!(result.possibly_incomplete());
        result.completion = Completion::Complete;
        assert!(!result.possibly_incomplete());
    }
}
