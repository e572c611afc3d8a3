//! Session controller: one streaming answer request from `send` to a terminal
//! outcome.
//!
//! Each session runs as a spawned task that races every network suspension
//! point against its cancellation signal. Handlers are invoked from that task
//! in wire order, and the cancellation flag is re-checked before every handler
//! call so frames decoded before a cancel are dropped rather than delivered.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt as _;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::decoder::FrameDecoder;
use crate::errors::SessionError;
use crate::model::{Completion, Metadata, StreamRequest, TerminalResult};
use crate::protocol::{FallbackBody, WireEvent, http_error_message, interpret_frame};
use crate::transport::{ByteStream, Transport, TransportResponse};

/// Callbacks receiving the outcome of one session.
///
/// Exactly one of `on_done` / `on_error` is called per session, unless the
/// session is cancelled, in which case neither is.
pub trait StreamHandlers: Send + 'static {
    /// A new fragment of the answer.
    fn on_delta(&mut self, text: &str);
    /// Retrieved sources; replaces any metadata received earlier.
    fn on_metadata(&mut self, metadata: &Metadata);
    /// Successful end of the session.
    fn on_done(&mut self, result: TerminalResult);
    /// Fatal failure of the session.
    fn on_error(&mut self, error: SessionError);
}

/// Lifecycle of a session: `Idle -> Requesting -> {Streaming | FallbackJson}
/// -> {Done | Error | Cancelled}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Before `send`; a spawned session never reports it.
    Idle,
    Requesting,
    Streaming,
    FallbackJson,
    Done,
    Error,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancelled)
    }
}

/// Cancellation flag plus the lock every handler call runs under.
#[derive(Default)]
struct CancelGate {
    cancelled: AtomicBool,
    dispatch: Mutex<()>,
}

impl CancelGate {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn key(&self) -> usize {
        self as *const Self as usize
    }

    // True when the current thread is inside one of this gate's handler calls.
    fn is_dispatching_here(&self) -> bool {
        DISPATCHING.with(|current| current.get() == self.key())
    }
}

thread_local! {
    static DISPATCHING: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as running a handler for one gate; restores the
/// previous mark on drop, including on unwind.
struct DispatchMark {
    previous: usize,
}

impl DispatchMark {
    fn enter(gate: &CancelGate) -> Self {
        let previous = DISPATCHING.with(|current| current.replace(gate.key()));
        Self { previous }
    }
}

impl Drop for DispatchMark {
    fn drop(&mut self) {
        DISPATCHING.with(|current| current.set(self.previous));
    }
}

/// Handle used to cancel a session.
#[derive(Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
    gate: Arc<CancelGate>,
}

impl CancelHandle {
    /// Requests cancellation.
    ///
    /// Once this returns, the session's handlers are not invoked again: a
    /// handler call already running on another thread is waited for. Called
    /// from inside one of the session's own handlers it returns immediately
    /// and that call is the last. The in-flight request is dropped at its next
    /// suspension point.
    pub fn cancel(&self) {
        self.gate.cancelled.store(true, Ordering::SeqCst);
        if !self.gate.is_dispatching_here() {
            drop(self.gate.dispatch.lock().unwrap_or_else(PoisonError::into_inner));
        }
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.gate.is_cancelled()
    }
}

/// Handle returned by [`SessionController::send`].
///
/// Dropping it does not cancel the session.
pub struct SessionHandle {
    session_id: uuid::Uuid,
    cancel: CancelHandle,
    task: JoinHandle<SessionState>,
}

impl SessionHandle {
    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// Cancels the session.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns a detached handle that can cancel the session.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Waits for the session task and returns its terminal state.
    pub async fn wait(self) -> SessionState {
        match self.task.await {
            Ok(state) => state,
            Err(err) => {
                warn!(session_id = %self.session_id, error = %err, "session task did not finish cleanly");
                SessionState::Error
            }
        }
    }
}

/// Owns at most one active session at a time.
pub struct SessionController {
    transport: Arc<dyn Transport>,
    active: Mutex<Option<CancelHandle>>,
}

impl SessionController {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            active: Mutex::new(None),
        }
    }

    /// Starts a session, cancelling any session already in flight first.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn send<H: StreamHandlers>(&self, request: StreamRequest, handlers: H) -> SessionHandle {
        let (tx, rx) = watch::channel(false);
        let gate = Arc::new(CancelGate::default());
        let cancel = CancelHandle {
            tx,
            gate: gate.clone(),
        };
        let session_id = uuid::Uuid::new_v4();

        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(cancel.clone());
        if let Some(previous) = previous {
            if !previous.is_cancelled() {
                debug!(%session_id, "cancelling previous session");
            }
            previous.cancel();
        }

        let session = Session {
            id: session_id,
            handlers,
            gate,
            cancel_rx: rx,
            answer: String::new(),
            metadata: None,
        };
        let task = tokio::spawn(session.run(self.transport.clone(), request));

        SessionHandle {
            session_id,
            cancel,
            task,
        }
    }

    /// Cancels the active session, if any.
    pub fn cancel_active(&self) {
        if let Some(active) = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            active.cancel();
        }
    }
}

struct Session<H> {
    id: uuid::Uuid,
    handlers: H,
    gate: Arc<CancelGate>,
    cancel_rx: watch::Receiver<bool>,
    answer: String,
    metadata: Option<Metadata>,
}

impl<H: StreamHandlers> Session<H> {
    async fn run(mut self, transport: Arc<dyn Transport>, request: StreamRequest) -> SessionState {
        self.enter(SessionState::Requesting);
        let opened = tokio::select! {
            biased;
            _ = cancelled(&mut self.cancel_rx) => return self.enter(SessionState::Cancelled),
            opened = transport.open(&request) => opened,
        };
        let response = match opened {
            Ok(response) => response,
            Err(err) => return self.fail(err),
        };

        if !response.is_success() {
            return self.http_failure(response).await;
        }
        if response.is_event_stream() {
            self.enter(SessionState::Streaming);
            self.stream(response.body).await
        } else {
            self.enter(SessionState::FallbackJson);
            self.fallback(response).await
        }
    }

    async fn http_failure(&mut self, response: TransportResponse) -> SessionState {
        let status = response.status;
        let reason = response.reason.clone();
        let body = tokio::select! {
            biased;
            _ = cancelled(&mut self.cancel_rx) => return self.enter(SessionState::Cancelled),
            body = response.text() => body.unwrap_or_default(),
        };
        let message = http_error_message(status, &reason, &body);
        self.fail(SessionError::http(status, message))
    }

    async fn fallback(&mut self, response: TransportResponse) -> SessionState {
        let body = tokio::select! {
            biased;
            _ = cancelled(&mut self.cancel_rx) => return self.enter(SessionState::Cancelled),
            body = response.text() => body,
        };
        let body = match body {
            Ok(body) => body,
            Err(err) => return self.fail(err),
        };
        match serde_json::from_str::<FallbackBody>(&body) {
            Ok(parsed) => {
                let result = parsed.into_result();
                self.answer = result.answer;
                self.metadata = result.metadata;
                self.finish(Completion::Fallback)
            }
            Err(err) => self.fail(SessionError::InvalidResponse(err.to_string())),
        }
    }

    async fn stream(&mut self, mut body: ByteStream) -> SessionState {
        let mut decoder = FrameDecoder::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel_rx) => {
                    decoder.reset();
                    return self.enter(SessionState::Cancelled);
                }
                next = body.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    for frame in decoder.feed(&chunk) {
                        if let Some(state) = self.dispatch(frame) {
                            return state;
                        }
                    }
                }
                Some(Err(err)) => return self.fail(err),
                None => {
                    if decoder.pending_len() > 0 {
                        warn!(session_id = %self.id, pending = decoder.pending_len(), "stream ended inside a frame");
                    }
                    warn!(session_id = %self.id, "stream ended without a terminal frame");
                    return self.finish(Completion::StreamClosed);
                }
            }
        }
    }

    /// Applies one frame; returns the terminal state when the frame ends the
    /// session.
    fn dispatch(&mut self, frame: crate::decoder::Frame) -> Option<SessionState> {
        if self.is_cancelled() {
            return Some(self.enter(SessionState::Cancelled));
        }
        let event = match interpret_frame(&frame) {
            Ok(event) => event,
            Err(malformed) => {
                warn!(session_id = %self.id, error = %malformed, "skipping malformed frame");
                return None;
            }
        };
        match event {
            WireEvent::Metadata(metadata) => {
                debug!(session_id = %self.id, sources = metadata.context.len(), "metadata frame");
                if !self.deliver(|handlers| handlers.on_metadata(&metadata)) {
                    return Some(self.enter(SessionState::Cancelled));
                }
                self.metadata = Some(metadata);
                None
            }
            WireEvent::Token(delta) => {
                if delta.is_empty() {
                    return None;
                }
                if !self.deliver(|handlers| handlers.on_delta(&delta)) {
                    return Some(self.enter(SessionState::Cancelled));
                }
                self.answer.push_str(&delta);
                None
            }
            WireEvent::Complete { answer } => {
                if let Some(answer) = answer {
                    self.answer = answer;
                }
                Some(self.finish(Completion::Complete))
            }
            WireEvent::Done => Some(self.finish(Completion::DoneMarker)),
            WireEvent::Error(message) => Some(self.fail(SessionError::stream(message))),
            WireEvent::Ignored => {
                debug!(session_id = %self.id, event = %frame.event, "ignoring frame");
                None
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.gate.is_cancelled()
    }

    /// Runs one handler call unless the session is cancelled. The flag check
    /// and the call hold the gate lock that `CancelHandle::cancel` waits on.
    fn deliver(&mut self, call: impl FnOnce(&mut H)) -> bool {
        let gate = &self.gate;
        let _guard = gate.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
        if gate.is_cancelled() {
            return false;
        }
        let _mark = DispatchMark::enter(gate);
        call(&mut self.handlers);
        true
    }

    fn finish(&mut self, completion: Completion) -> SessionState {
        let result = TerminalResult {
            answer: std::mem::take(&mut self.answer),
            metadata: self.metadata.take(),
            completion,
        };
        let chars = result.answer.len();
        if !self.deliver(move |handlers| handlers.on_done(result)) {
            return self.enter(SessionState::Cancelled);
        }
        debug!(session_id = %self.id, ?completion, chars, "session done");
        self.enter(SessionState::Done)
    }

    fn fail(&mut self, error: SessionError) -> SessionState {
        let message = error.to_string();
        if !self.deliver(move |handlers| handlers.on_error(error)) {
            return self.enter(SessionState::Cancelled);
        }
        warn!(session_id = %self.id, error = %message, "session failed");
        self.enter(SessionState::Error)
    }

    fn enter(&self, state: SessionState) -> SessionState {
        debug!(session_id = %self.id, ?state, "session state");
        state
    }
}

// Resolves once cancellation is requested; never resolves if every cancel
// handle is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}
