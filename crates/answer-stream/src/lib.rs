//! Streaming answer client for the embeddable knowledge-base chat widget.
//!
//! A question is posted to the answer endpoint and the reply is consumed as an
//! event stream: `metadata` frames carry retrieved sources, `token` frames
//! carry answer deltas, and `complete`, `error` or a `[DONE]` payload end the
//! session. Backends that do not stream answer with one JSON document, which
//! is reported through the same handler interface.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use answer_stream::prelude::*;
//!
//! struct Print;
//!
//! impl StreamHandlers for Print {
//!     fn on_delta(&mut self, text: &str) {
//!         print!("{text}");
//!     }
//!     fn on_metadata(&mut self, metadata: &Metadata) {
//!         eprintln!("{} sources", metadata.context.len());
//!     }
//!     fn on_done(&mut self, _result: TerminalResult) {
//!         println!();
//!     }
//!     fn on_error(&mut self, error: SessionError) {
//!         eprintln!("error: {error}");
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ConfigError> {
//! let transport = Arc::new(HttpTransport::new(
//!     ClientConfig::new("https://kb.example.com").api_key("pk_live_123"),
//! )?);
//! let registry = WidgetRegistry::new(transport);
//! let widget = registry.mount(
//!     "#support-chat",
//!     WidgetSettings::new("kb-public-id", "emb-1", "llm-1", "gpt-4o-mini"),
//! );
//! widget.ask("How do I reset my password?", Print).wait().await;
//! # Ok(())
//! # }
//! ```

/// Client configuration.
pub mod config;
/// Incremental event-stream decoder.
pub mod decoder;
/// Error types.
pub mod errors;
/// Request and result types.
pub mod model;
/// Process-wide tracing setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Typed payloads of stream frames and non-streaming responses.
pub mod protocol;
/// Session controller, handlers, and cancellation.
pub mod session;
/// Network seam and its HTTP implementation.
pub mod transport;
/// Per-mount-point widget instances.
pub mod widget;

pub use config::ClientConfig;
pub use decoder::{Frame, FrameDecoder};
pub use errors::{ConfigError, SessionError};
pub use model::{Completion, ContextEntry, Metadata, StreamRequest, TerminalResult};
pub use session::{CancelHandle, SessionController, SessionHandle, SessionState, StreamHandlers};
pub use transport::{HttpTransport, Transport, TransportResponse};
pub use widget::{Widget, WidgetRegistry, WidgetSettings};
