/// Terminal failure of a streaming session, delivered through
/// `StreamHandlers::on_error`.
///
/// The `Display` output is meant to be shown to the end user as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The request never reached the server or the body read failed mid-stream.
    #[error("{0}")]
    Transport(String),
    /// The server answered with a non-success status.
    #[error("{message}")]
    Http { status: u16, message: String },
    /// The server sent an `error` frame.
    #[error("{0}")]
    Stream(String),
    /// A non-streaming response body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl SessionError {
    /// Creates a transport-level error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates an HTTP status error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Creates an error for a server-sent `error` frame.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }

    /// Returns the HTTP status when the failure came from a non-success response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Invalid client configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required setting is absent.
    #[error("missing setting: {0}")]
    Missing(&'static str),
    /// A setting is present but unusable.
    #[error("invalid setting {name}: {message}")]
    Invalid { name: &'static str, message: String },
    /// The underlying HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            message: message.into(),
        }
    }
}
