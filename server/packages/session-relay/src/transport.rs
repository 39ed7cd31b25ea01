use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::frame::{CodecError, Frame};
use crate::registry::SessionRegistry;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,
    #[error("outbound stream is full")]
    Backpressure,
    #[error("failed to write the endpoint handshake frame")]
    HandshakeFailed,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("no message handler attached for session {0}")]
    NoHandler(String),
    #[error("message handler failed: {0}")]
    Dispatch(String),
}

/// Capabilities the protocol core exposes to one session's transport.
/// `on_message` is the inbound dispatch target; the close and error hooks
/// have empty defaults for cores that do not care.
pub trait SessionHandler: Send + Sync {
    fn on_message(&self, message: Value) -> Result<(), HandlerError>;
    fn on_close(&self) {}
    fn on_error(&self, _error: &TransportError) {}
}

/// Seam between the transport layer and the protocol core: called once per
/// accepted stream so the core can attach its `SessionHandler` and keep a
/// sender handle for pushes.
pub trait ProtocolCore: Send + Sync {
    fn attach(&self, transport: &Arc<SseTransport>);
}

/// One duplex channel: owns the outbound frame writer for a single session
/// and dispatches inbound messages to the attached handler.
///
/// The writer is the sending half of a bounded channel; the stream endpoint
/// turns the receiving half into the SSE response body. Dropping the sender
/// is what ends the client's stream, so `close()` takes it out of the slot.
pub struct SseTransport {
    session_id: String,
    sender: Mutex<Option<mpsc::Sender<Frame>>>,
    handler: Mutex<Option<Arc<dyn SessionHandler>>>,
    closed: AtomicBool,
    registry: Arc<SessionRegistry>,
}

impl SseTransport {
    /// Binds a transport to a fresh outbound writer and performs the
    /// handshake: exactly one `endpoint` frame is written before anything
    /// else can be. Failure here means the caller must not register the
    /// transport.
    pub fn open(
        session_id: String,
        deliver_url: &str,
        sender: mpsc::Sender<Frame>,
        registry: Arc<SessionRegistry>,
    ) -> Result<Arc<Self>, TransportError> {
        sender
            .try_send(Frame::endpoint(deliver_url))
            .map_err(|_| TransportError::HandshakeFailed)?;
        Ok(Arc::new(Self {
            session_id,
            sender: Mutex::new(Some(sender)),
            handler: Mutex::new(None),
            closed: AtomicBool::new(false),
            registry,
        }))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn set_handler(&self, handler: Arc<dyn SessionHandler>) {
        *self.handler.lock() = Some(handler);
    }

    /// Serializes one message and writes it as a `message` frame. Frames are
    /// enqueued whole under the sender lock, so concurrent sends can never
    /// interleave mid-frame; delivery order is enqueue order.
    pub fn send(&self, message: &Value) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let frame = match Frame::message(message) {
            Ok(frame) => frame,
            Err(err) => {
                let err = TransportError::Codec(err);
                self.notify_error(&err);
                return Err(err);
            }
        };

        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(TransportError::Closed);
        };
        match sender.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let err = TransportError::Backpressure;
                self.notify_error(&err);
                Err(err)
            }
            Err(TrySendError::Closed(_)) => {
                // Receiver gone: the stream broke underneath us.
                drop(guard);
                let err = TransportError::Closed;
                self.notify_error(&err);
                self.close();
                Err(err)
            }
        }
    }

    /// Forwards one inbound message to the attached handler. Handler errors
    /// are scoped to this call; the transport stays open.
    pub fn dispatch(&self, message: Value) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let handler = self.handler.lock().clone();
        let Some(handler) = handler else {
            tracing::error!(
                session_id = %self.session_id,
                "dispatch with no handler attached (protocol core never connected)"
            );
            return Err(TransportError::NoHandler(self.session_id.clone()));
        };
        handler
            .on_message(message)
            .map_err(|err| TransportError::Dispatch(err.to_string()))
    }

    /// Idempotent teardown: releases the writer (ending the client's
    /// stream), fires the closed hook, and removes this session's registry
    /// entry if it is still ours.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.sender.lock().take();
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler.on_close();
        }
        self.registry.remove_if(&self.session_id, self);
        tracing::debug!(session_id = %self.session_id, "transport closed");
    }

    fn notify_error(&self, error: &TransportError) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler.on_error(error);
        }
    }
}
