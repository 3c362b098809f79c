//! Error types for transport operations.

use aquatron_core::TransportKind;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised by the adapters and the router.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The selected adapter has no live link.
    #[error("{} not connected", .0.label())]
    NotConnected(TransportKind),

    /// Auto mode found no ready adapter.
    #[error("No transport connected")]
    NoTransport,

    /// Connection attempt timed out.
    #[error("Connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    /// Link dropped while writing.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Adapter cannot work in this build or on this host.
    #[error("{0} unavailable: {1}")]
    Unavailable(TransportKind, String),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Bluetooth error: {0}")]
    Bluetooth(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] aquatron_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Create a new connection lost error.
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost(message.into())
    }

    /// Create a new bluetooth error.
    pub fn bluetooth(message: impl std::fmt::Display) -> Self {
        Self::Bluetooth(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TransportKind::WebSocket, "WiFi/WebSocket not connected")]
    #[case(TransportKind::Serial, "UART/Serial not connected")]
    #[case(TransportKind::Tcp, "TCP not connected")]
    #[case(TransportKind::Bluetooth, "Bluetooth not connected")]
    fn test_not_connected_messages(#[case] kind: TransportKind, #[case] expected: &str) {
        assert_eq!(TransportError::NotConnected(kind).to_string(), expected);
    }

    #[test]
    fn test_no_transport_message() {
        assert_eq!(TransportError::NoTransport.to_string(), "No transport connected");
    }
}
