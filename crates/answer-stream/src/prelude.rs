//! Common imports for embedding the answer client.
pub use crate::{
    CancelHandle, ClientConfig, Completion, ConfigError, ContextEntry, HttpTransport, Metadata,
    SessionController, SessionError, SessionHandle, SessionState, StreamHandlers, StreamRequest,
    TerminalResult, Widget, WidgetRegistry, WidgetSettings,
};
