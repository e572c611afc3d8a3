use std::pin::Pin;

use futures::StreamExt as _;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderName, HeaderValue};
use tracing::debug;

use crate::config::ClientConfig;
use crate::errors::{ConfigError, SessionError};
use crate::model::StreamRequest;

pub(crate) const EVENT_STREAM: &str = "text/event-stream";

/// Response body as a stream of raw chunks.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, SessionError>> + Send + 'static>>;

/// Opened response: status line, content type, and an unread body.
pub struct TransportResponse {
    pub status: u16,
    /// Reason phrase for `status`, empty when unknown.
    pub reason: String,
    pub content_type: Option<String>,
    pub body: ByteStream,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True when the response advertises an event stream.
    pub fn is_event_stream(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains(EVENT_STREAM))
    }

    /// Reads the whole body as text, replacing invalid UTF-8.
    pub async fn text(mut self) -> Result<String, SessionError> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Seam between the session controller and the network.
///
/// `HttpTransport` is the production implementation; tests script responses
/// through their own implementations.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Sends the answer request and returns once response headers are known.
    async fn open(&self, request: &StreamRequest) -> Result<TransportResponse, SessionError>;
}

/// `reqwest`-backed transport posting to the configured answer endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    auth: Option<(HeaderName, HeaderValue)>,
}

impl HttpTransport {
    /// Creates a transport from explicit configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        if config.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("base_url"));
        }
        let auth = match &config.auth_header {
            Some((name, value)) => {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| ConfigError::invalid("auth header name", e.to_string()))?;
                let mut value = HeaderValue::from_str(value)
                    .map_err(|e| ConfigError::invalid("auth header value", e.to_string()))?;
                value.set_sensitive(true);
                Some((name, value))
            }
            None => None,
        };
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: config.answer_url(),
            auth,
        })
    }

    /// Creates a transport using `ClientConfig::from_env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(ClientConfig::from_env()?)
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &StreamRequest) -> Result<TransportResponse, SessionError> {
        debug!(url = %self.url, public_id = %request.public_id, model = %request.llm_model, "opening answer request");
        let mut http_req = self
            .client
            .post(&self.url)
            .header(ACCEPT, EVENT_STREAM)
            .json(request);
        if let Some((name, value)) = &self.auth {
            http_req = http_req.header(name.clone(), value.clone());
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| SessionError::transport(format!("answer request failed: {e}")))?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);
        let body = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| SessionError::transport(format!("answer stream read failed: {e}")))
        });

        Ok(TransportResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            content_type,
            body: Box::pin(body),
        })
    }
}
