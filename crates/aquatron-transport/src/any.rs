//! Enum dispatch over the concrete adapters.
//!
//! `Transport` uses native `async fn`, so it cannot be used as a trait
//! object. This enum gives the router one concrete type to hold.

use crate::ble::BleTransport;
use crate::error::Result;
use crate::events::EventSink;
use crate::mock::MockTransport;
use crate::serial::SerialTransport;
use crate::tcp::TcpTransport;
use crate::traits::Transport;
use crate::websocket::WebSocketTransport;
use aquatron_core::TransportKind;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub enum AnyTransport {
    Serial(SerialTransport),
    Tcp(TcpTransport),
    WebSocket(WebSocketTransport),
    Ble(BleTransport),
    Mock(MockTransport),
}

impl Transport for AnyTransport {
    fn kind(&self) -> TransportKind {
        match self {
            Self::Serial(t) => t.kind(),
            Self::Tcp(t) => t.kind(),
            Self::WebSocket(t) => t.kind(),
            Self::Ble(t) => t.kind(),
            Self::Mock(t) => t.kind(),
        }
    }

    fn is_ready(&self) -> bool {
        match self {
            Self::Serial(t) => t.is_ready(),
            Self::Tcp(t) => t.is_ready(),
            Self::WebSocket(t) => t.is_ready(),
            Self::Ble(t) => t.is_ready(),
            Self::Mock(t) => t.is_ready(),
        }
    }

    async fn send(&self, bytes: &[u8]) -> Result<()> {
        match self {
            Self::Serial(t) => t.send(bytes).await,
            Self::Tcp(t) => t.send(bytes).await,
            Self::WebSocket(t) => t.send(bytes).await,
            Self::Ble(t) => t.send(bytes).await,
            Self::Mock(t) => t.send(bytes).await,
        }
    }

    async fn run(&self, events: EventSink, shutdown: CancellationToken) {
        match self {
            Self::Serial(t) => t.run(events, shutdown).await,
            Self::Tcp(t) => t.run(events, shutdown).await,
            Self::WebSocket(t) => t.run(events, shutdown).await,
            Self::Ble(t) => t.run(events, shutdown).await,
            Self::Mock(t) => t.run(events, shutdown).await,
        }
    }
}

impl From<SerialTransport> for AnyTransport {
    fn from(transport: SerialTransport) -> Self {
        Self::Serial(transport)
    }
}

impl From<TcpTransport> for AnyTransport {
    fn from(transport: TcpTransport) -> Self {
        Self::Tcp(transport)
    }
}

impl From<WebSocketTransport> for AnyTransport {
    fn from(transport: WebSocketTransport) -> Self {
        Self::WebSocket(transport)
    }
}

impl From<BleTransport> for AnyTransport {
    fn from(transport: BleTransport) -> Self {
        Self::Ble(transport)
    }
}

impl From<MockTransport> for AnyTransport {
    fn from(transport: MockTransport) -> Self {
        Self::Mock(transport)
    }
}
