//! Embeddable widget instances, one per mount point.
//!
//! A host page may include the widget script more than once; mounting is
//! idempotent so every inclusion for the same mount point shares one
//! controller and therefore one active session.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::info;

use crate::model::StreamRequest;
use crate::session::{SessionController, SessionHandle, StreamHandlers};
use crate::transport::Transport;

/// Per-widget request settings embedded in the widget script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WidgetSettings {
    pub public_id: String,
    pub embedding_provider_id: String,
    pub llm_provider_id: String,
    pub llm_model: String,
    pub limit: u32,
    pub context_limit: u32,
}

impl WidgetSettings {
    pub fn new(
        public_id: impl Into<String>,
        embedding_provider_id: impl Into<String>,
        llm_provider_id: impl Into<String>,
        llm_model: impl Into<String>,
    ) -> Self {
        Self {
            public_id: public_id.into(),
            embedding_provider_id: embedding_provider_id.into(),
            llm_provider_id: llm_provider_id.into(),
            llm_model: llm_model.into(),
            limit: 6,
            context_limit: 4,
        }
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn context_limit(mut self, context_limit: u32) -> Self {
        self.context_limit = context_limit;
        self
    }

    /// Builds the request for one user query.
    pub fn request(&self, query: impl Into<String>) -> StreamRequest {
        StreamRequest {
            query: query.into(),
            embedding_provider_id: self.embedding_provider_id.clone(),
            llm_provider_id: self.llm_provider_id.clone(),
            llm_model: self.llm_model.clone(),
            limit: self.limit,
            context_limit: self.context_limit,
            public_id: self.public_id.clone(),
        }
    }
}

/// One mounted widget: settings plus the controller that owns its session.
pub struct Widget {
    mount_id: String,
    settings: WidgetSettings,
    controller: SessionController,
}

impl Widget {
    pub fn mount_id(&self) -> &str {
        &self.mount_id
    }

    pub fn settings(&self) -> &WidgetSettings {
        &self.settings
    }

    /// Asks a question, cancelling the previous answer if it is still
    /// streaming.
    pub fn ask<H: StreamHandlers>(&self, query: impl Into<String>, handlers: H) -> SessionHandle {
        self.controller.send(self.settings.request(query), handlers)
    }

    /// Cancels the answer currently streaming, if any.
    pub fn stop(&self) {
        self.controller.cancel_active();
    }
}

/// Registry of mounted widgets keyed by mount point.
pub struct WidgetRegistry {
    transport: Arc<dyn Transport>,
    widgets: DashMap<String, Arc<Widget>>,
}

impl WidgetRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            widgets: DashMap::new(),
        }
    }

    /// Returns the widget mounted at `mount_id`, creating it on first use.
    ///
    /// Settings passed for an already-mounted widget are ignored.
    pub fn mount(&self, mount_id: impl Into<String>, settings: WidgetSettings) -> Arc<Widget> {
        match self.widgets.entry(mount_id.into()) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                info!(mount_id = %slot.key(), public_id = %settings.public_id, "mounting widget");
                let widget = Arc::new(Widget {
                    mount_id: slot.key().clone(),
                    settings,
                    controller: SessionController::new(self.transport.clone()),
                });
                slot.insert(widget.clone());
                widget
            }
        }
    }

    pub fn get(&self, mount_id: &str) -> Option<Arc<Widget>> {
        self.widgets.get(mount_id).map(|w| w.value().clone())
    }

    /// Removes the widget and cancels its active session. Returns false when
    /// nothing was mounted there.
    pub fn unmount(&self, mount_id: &str) -> bool {
        match self.widgets.remove(mount_id) {
            Some((_, widget)) => {
                widget.stop();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }
}
