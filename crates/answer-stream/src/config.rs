use std::time::Duration;

use crate::errors::ConfigError;

/// Header used for the widget's public API key unless overridden.
pub const DEFAULT_AUTH_HEADER: &str = "X-API-Key";
/// Answer endpoint relative to the base URL.
pub const DEFAULT_ENDPOINT: &str = "/api/public/rag/answer";

/// Configuration for the HTTP transport.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the backend, for example `https://kb.example.com`.
    pub base_url: String,
    /// Path of the answer endpoint.
    pub endpoint: String,
    /// Optional credential header as `(name, value)`.
    pub auth_header: Option<(String, String)>,
    /// HTTP timeout for the whole request, body included.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Creates a config with default endpoint and timeout and no credential.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            auth_header: None,
            timeout: Duration::from_secs(120),
        }
    }

    /// Builds a config from the environment.
    ///
    /// - `ANSWER_STREAM_BASE_URL` (required)
    /// - `ANSWER_STREAM_ENDPOINT` (optional path override)
    /// - `ANSWER_STREAM_API_KEY` (optional, sent as `X-API-Key`)
    /// - `ANSWER_STREAM_TIMEOUT_SECS` (optional)
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var("ANSWER_STREAM_BASE_URL").unwrap_or_default();
        if base_url.trim().is_empty() {
            return Err(ConfigError::Missing("ANSWER_STREAM_BASE_URL"));
        }
        let mut config = Self::new(base_url.trim());
        if let Ok(endpoint) = std::env::var("ANSWER_STREAM_ENDPOINT")
            && !endpoint.trim().is_empty()
        {
            config = config.endpoint(endpoint.trim());
        }
        if let Ok(key) = std::env::var("ANSWER_STREAM_API_KEY")
            && !key.trim().is_empty()
        {
            config = config.api_key(key.trim());
        }
        if let Ok(raw) = std::env::var("ANSWER_STREAM_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|e| {
                ConfigError::invalid("ANSWER_STREAM_TIMEOUT_SECS", e.to_string())
            })?;
            config = config.timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }

    /// Overrides the endpoint path.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets an arbitrary credential header.
    pub fn auth_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_header = Some((name.into(), value.into()));
        self
    }

    /// Sets the public API key under [`DEFAULT_AUTH_HEADER`].
    pub fn api_key(self, key: impl Into<String>) -> Self {
        self.auth_header(DEFAULT_AUTH_HEADER, key)
    }

    /// Overrides the HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn answer_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_url_joins_without_double_slash() {
        let config = ClientConfig::new("https://kb.example.com/").endpoint("/api/answer");
        assert_eq!(config.answer_url(), "https://kb.example.com/api/answer");
        let config = ClientConfig::new("http://localhost:3000");
        assert_eq!(
            config.answer_url(),
            "http://localhost:3000/api/public/rag/answer"
        );
    }

    #[test]
    fn api_key_uses_default_header() {
        let config = ClientConfig::new("http://localhost").api_key("pk_live");
        assert_eq!(
            config.auth_header,
            Some((DEFAULT_AUTH_HEADER.to_string(), "pk_live".to_string()))
        );
    }
}
