//! In-memory transport for tests and development.
//!
//! A [`MockTransport`] behaves like any other adapter from the router's point
//! of view. Its [`MockTransportHandle`] plays the instrument: it toggles the
//! link, injects inbound bytes (reassembled exactly like a real adapter
//! would) and observes every packet written.
//!
//! ```
//! use aquatron_core::TransportKind;
//! use aquatron_transport::{MockTransport, Transport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (mock, mut handle) = MockTransport::new(TransportKind::Serial);
//!     handle.set_ready(true);
//!
//!     mock.send(&[0xAA, 0x02, 0x00, 0xA8, 0x55]).await.unwrap();
//!     assert_eq!(handle.next_sent().await.unwrap(), vec![0xAA, 0x02, 0x00, 0xA8, 0x55]);
//! }
//! ```

use crate::error::{Result, TransportError};
use crate::events::EventSink;
use crate::traits::Transport;
use aquatron_core::TransportKind;
use aquatron_protocol::Reassembler;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Input scripted through the handle.
#[derive(Debug, Clone, PartialEq, Eq)]
enum MockInput {
    Bytes(Vec<u8>),
    Connect,
    Disconnect,
}

#[derive(Debug, Default)]
struct MockState {
    ready: AtomicBool,
    fail_writes: AtomicBool,
}

#[derive(Debug)]
pub struct MockTransport {
    kind: TransportKind,
    state: Arc<MockState>,
    input_rx: Mutex<Option<mpsc::Receiver<MockInput>>>,
    sent_tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl MockTransport {
    /// Create a mock adapter posing as `kind`, initially not ready.
    pub fn new(kind: TransportKind) -> (Self, MockTransportHandle) {
        let (input_tx, input_rx) = mpsc::channel(32);
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let state = Arc::new(MockState::default());

        let transport = Self {
            kind,
            state: Arc::clone(&state),
            input_rx: Mutex::new(Some(input_rx)),
            sent_tx,
        };
        let handle = MockTransportHandle {
            kind,
            state,
            input_tx,
            sent_rx,
        };
        (transport, handle)
    }
}

impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn is_ready(&self) -> bool {
        self.state.ready.load(Ordering::SeqCst)
    }

    async fn send(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_ready() {
            return Err(TransportError::NotConnected(self.kind));
        }
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::connection_lost("mock write failure"));
        }
        let _ = self.sent_tx.send(bytes.to_vec());
        Ok(())
    }

    async fn run(&self, events: EventSink, shutdown: CancellationToken) {
        let Some(mut input_rx) = self.input_rx.lock().take() else {
            debug!(kind = %self.kind, "Mock transport already running");
            return;
        };

        if self.is_ready() {
            events.connected("mock").await;
        }

        let mut reassembler = Reassembler::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                input = input_rx.recv() => match input {
                    Some(MockInput::Bytes(bytes)) => {
                        reassembler.feed(&bytes);
                        for frame in reassembler.drain_frames() {
                            events.frame(frame).await;
                        }
                    }
                    Some(MockInput::Connect) => {
                        self.state.ready.store(true, Ordering::SeqCst);
                        events.connected("mock").await;
                    }
                    Some(MockInput::Disconnect) => {
                        self.state.ready.store(false, Ordering::SeqCst);
                        reassembler.clear();
                        events.disconnected().await;
                    }
                    None => break,
                },
            }
        }
    }
}

/// Instrument side of a [`MockTransport`].
#[derive(Debug)]
pub struct MockTransportHandle {
    kind: TransportKind,
    state: Arc<MockState>,
    input_tx: mpsc::Sender<MockInput>,
    sent_rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MockTransportHandle {
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Flip readiness without emitting lifecycle events.
    pub fn set_ready(&self, ready: bool) {
        self.state.ready.store(ready, Ordering::SeqCst);
    }

    /// Make every subsequent write fail with `ConnectionLost`.
    pub fn fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Deliver raw bytes as if they arrived on the link.
    pub async fn inject(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.input_tx.send(MockInput::Bytes(bytes.into())).await;
    }

    /// Bring the link up and emit `Connected`.
    pub async fn connect(&self) {
        let _ = self.input_tx.send(MockInput::Connect).await;
    }

    /// Take the link down and emit `Disconnected`.
    pub async fn disconnect(&self) {
        let _ = self.input_tx.send(MockInput::Disconnect).await;
    }

    /// Next packet written through the transport.
    pub async fn next_sent(&mut self) -> Option<Vec<u8>> {
        self.sent_rx.recv().await
    }

    pub fn try_next_sent(&mut self) -> Option<Vec<u8>> {
        self.sent_rx.try_recv().ok()
    }
}
