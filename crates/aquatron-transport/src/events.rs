//! Lifecycle and data events pushed by adapters to the dispatcher.

use aquatron_core::TransportKind;
use aquatron_protocol::Frame;
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Link is up and the adapter accepts writes.
    Connected { source: TransportKind, detail: String },

    /// Link went down; the adapter may reconnect on its own.
    Disconnected { source: TransportKind },

    /// Adapter can never become ready (missing feature or hardware).
    Unavailable { source: TransportKind, reason: String },

    /// A validated frame from the adapter's reassembler.
    Frame { source: TransportKind, frame: Frame },

    /// Open, read or write failure. Never fatal to the process.
    Error { source: TransportKind, message: String },
}

impl TransportEvent {
    pub fn source(&self) -> TransportKind {
        match self {
            Self::Connected { source, .. }
            | Self::Disconnected { source }
            | Self::Unavailable { source, .. }
            | Self::Frame { source, .. }
            | Self::Error { source, .. } => *source,
        }
    }
}

/// Sending half used by adapters.
///
/// A closed channel means the link is shutting down; events are dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    source: TransportKind,
    tx: mpsc::Sender<TransportEvent>,
}

impl EventSink {
    pub fn new(source: TransportKind, tx: mpsc::Sender<TransportEvent>) -> Self {
        Self { source, tx }
    }

    pub fn source(&self) -> TransportKind {
        self.source
    }

    pub async fn connected(&self, detail: impl Into<String>) {
        self.emit(TransportEvent::Connected {
            source: self.source,
            detail: detail.into(),
        })
        .await;
    }

    pub async fn disconnected(&self) {
        self.emit(TransportEvent::Disconnected {
            source: self.source,
        })
        .await;
    }

    pub async fn unavailable(&self, reason: impl Into<String>) {
        self.emit(TransportEvent::Unavailable {
            source: self.source,
            reason: reason.into(),
        })
        .await;
    }

    pub async fn frame(&self, frame: Frame) {
        trace!(source = %self.source, frame = %frame, "Frame received");
        self.emit(TransportEvent::Frame {
            source: self.source,
            frame,
        })
        .await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.emit(TransportEvent::Error {
            source: self.source,
            message: message.into(),
        })
        .await;
    }

    /// Blocking variant for adapters driven from a blocking thread.
    pub fn blocking_frame(&self, frame: Frame) -> bool {
        self.tx
            .blocking_send(TransportEvent::Frame {
                source: self.source,
                frame,
            })
            .is_ok()
    }

    /// Blocking variant of [`EventSink::error`].
    pub fn blocking_error(&self, message: impl Into<String>) -> bool {
        self.tx
            .blocking_send(TransportEvent::Error {
                source: self.source,
                message: message.into(),
            })
            .is_ok()
    }

    async fn emit(&self, event: TransportEvent) {
        let _ = self.tx.send(event).await;
    }
}
