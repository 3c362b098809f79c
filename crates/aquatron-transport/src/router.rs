//! Transport selection and fallback.
//!
//! The router owns one slot per [`TransportKind`] and the process-wide
//! [`TransportMode`]. Every send resolves to exactly one adapter:
//!
//! ```text
//! override (if specific) ──► that adapter only
//!         │ auto / none
//!         ▼
//! global mode (if specific) ──► that adapter only
//!         │ auto
//!         ▼
//! ws ─► tcp ─► serial ─► bluetooth   (first ready wins)
//! ```
//!
//! A pinned adapter that is not ready fails with its own `NotConnected`
//! error; there is no fallback. A write failure on the chosen adapter is
//! reported, never retried elsewhere.

use crate::any::AnyTransport;
use crate::error::{Result, TransportError};
use crate::traits::Transport;
use aquatron_core::{TransportKind, TransportMode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{debug, info, warn};

/// Result of a routed send. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub sent: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<TransportKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn sent(via: TransportKind) -> Self {
        Self {
            sent: true,
            via: Some(via),
            error: None,
        }
    }

    pub fn failed(via: Option<TransportKind>, error: impl ToString) -> Self {
        Self {
            sent: false,
            via,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportState {
    pub kind: TransportKind,
    pub configured: bool,
    pub ready: bool,
}

/// Snapshot of the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportStatus {
    pub mode: TransportMode,
    pub transports: Vec<TransportState>,

    /// Adapter a send issued now would use.
    pub active: Option<TransportKind>,
}

#[derive(Debug)]
pub struct TransportRouter {
    slots: [Option<Arc<AnyTransport>>; 4],
    mode: AtomicU8,
}

impl TransportRouter {
    /// Build a router over the given adapters. A later adapter of the same
    /// kind replaces an earlier one.
    pub fn new(transports: impl IntoIterator<Item = Arc<AnyTransport>>, mode: TransportMode) -> Self {
        let mut slots: [Option<Arc<AnyTransport>>; 4] = Default::default();
        for transport in transports {
            let kind = transport.kind();
            if slots[kind.index()].replace(transport).is_some() {
                warn!(kind = %kind, "Duplicate transport registered, keeping the last one");
            }
        }
        Self {
            slots,
            mode: AtomicU8::new(mode.as_u8()),
        }
    }

    pub fn mode(&self) -> TransportMode {
        TransportMode::from_u8(self.mode.load(Ordering::SeqCst))
    }

    /// Replace the global mode, returning the previous one.
    pub fn set_mode(&self, mode: TransportMode) -> TransportMode {
        let previous = TransportMode::from_u8(self.mode.swap(mode.as_u8(), Ordering::SeqCst));
        info!(from = %previous, to = %mode, "Transport mode changed");
        previous
    }

    pub fn transport(&self, kind: TransportKind) -> Option<&Arc<AnyTransport>> {
        self.slots[kind.index()].as_ref()
    }

    /// Every configured adapter, in priority order.
    pub fn transports(&self) -> impl Iterator<Item = &Arc<AnyTransport>> {
        self.slots.iter().flatten()
    }

    /// Resolve the adapter for a send.
    ///
    /// `Some(TransportMode::Auto)` as override defers to the global mode,
    /// like no override at all.
    pub fn select(&self, override_mode: Option<TransportMode>) -> Result<&Arc<AnyTransport>> {
        let mode = match override_mode {
            Some(mode) if mode != TransportMode::Auto => mode,
            _ => self.mode(),
        };

        match mode.target() {
            Some(kind) => self
                .transport(kind)
                .filter(|t| t.is_ready())
                .ok_or(TransportError::NotConnected(kind)),
            None => TransportKind::PRIORITY
                .iter()
                .filter_map(|kind| self.transport(*kind))
                .find(|t| t.is_ready())
                .ok_or(TransportError::NoTransport),
        }
    }

    /// Send one packet through the selected adapter.
    pub async fn send(&self, bytes: &[u8], override_mode: Option<TransportMode>) -> SendOutcome {
        let transport = match self.select(override_mode) {
            Ok(transport) => transport,
            Err(e) => {
                debug!(error = %e, "No transport selected");
                return SendOutcome::failed(None, e);
            }
        };

        let kind = transport.kind();
        match transport.send(bytes).await {
            Ok(()) => {
                debug!(via = %kind, len = bytes.len(), "Packet sent");
                SendOutcome::sent(kind)
            }
            Err(e) => {
                warn!(via = %kind, error = %e, "Packet write failed");
                SendOutcome::failed(Some(kind), e)
            }
        }
    }

    pub fn status(&self) -> TransportStatus {
        let transports = TransportKind::PRIORITY
            .iter()
            .map(|kind| {
                let transport = self.transport(*kind);
                TransportState {
                    kind: *kind,
                    configured: transport.is_some(),
                    ready: transport.is_some_and(|t| t.is_ready()),
                }
            })
            .collect();

        TransportStatus {
            mode: self.mode(),
            transports,
            active: self.select(None).ok().map(|t| t.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTransport, MockTransportHandle};
    use rstest::rstest;

    fn mock(kind: TransportKind) -> (Arc<AnyTransport>, MockTransportHandle) {
        let (transport, handle) = MockTransport::new(kind);
        (Arc::new(AnyTransport::Mock(transport)), handle)
    }

    /// Router with all four kinds configured, none ready.
    fn router(mode: TransportMode) -> (TransportRouter, Vec<MockTransportHandle>) {
        let (transports, handles): (Vec<_>, Vec<_>) =
            TransportKind::PRIORITY.iter().map(|kind| mock(*kind)).unzip();
        (TransportRouter::new(transports, mode), handles)
    }

    fn handle(handles: &mut [MockTransportHandle], kind: TransportKind) -> &mut MockTransportHandle {
        &mut handles[kind.index()]
    }

    #[tokio::test]
    async fn test_auto_prefers_websocket_over_serial() {
        let (router, mut handles) = router(TransportMode::Auto);
        handle(&mut handles, TransportKind::Serial).set_ready(true);
        handle(&mut handles, TransportKind::WebSocket).set_ready(true);

        let outcome = router.send(&[0xAA], None).await;
        assert_eq!(outcome, SendOutcome::sent(TransportKind::WebSocket));
        assert!(handle(&mut handles, TransportKind::Serial).try_next_sent().is_none());
        assert_eq!(
            handle(&mut handles, TransportKind::WebSocket).try_next_sent(),
            Some(vec![0xAA])
        );
    }

    #[tokio::test]
    async fn test_auto_falls_back_in_priority_order() {
        let (router, mut handles) = router(TransportMode::Auto);
        handle(&mut handles, TransportKind::Bluetooth).set_ready(true);
        handle(&mut handles, TransportKind::Serial).set_ready(true);

        let outcome = router.send(&[0x01], None).await;
        assert_eq!(outcome.via, Some(TransportKind::Serial));
    }

    #[tokio::test]
    async fn test_auto_with_nothing_ready() {
        let (router, _handles) = router(TransportMode::Auto);
        let outcome = router.send(&[0x01], None).await;
        assert!(!outcome.sent);
        assert_eq!(outcome.via, None);
        assert_eq!(outcome.error.as_deref(), Some("No transport connected"));
    }

    #[rstest]
    #[case(TransportMode::Wifi, "WiFi/WebSocket not connected")]
    #[case(TransportMode::Uart, "UART/Serial not connected")]
    #[case(TransportMode::Tcp, "TCP not connected")]
    #[case(TransportMode::Bluetooth, "Bluetooth not connected")]
    #[tokio::test]
    async fn test_override_does_not_fall_back(#[case] mode: TransportMode, #[case] error: &str) {
        let (router, mut handles) = router(TransportMode::Auto);
        for kind in TransportKind::PRIORITY {
            if Some(kind) != mode.target() {
                handle(&mut handles, kind).set_ready(true);
            }
        }

        let outcome = router.send(&[0x01], Some(mode)).await;
        assert!(!outcome.sent);
        assert_eq!(outcome.error.as_deref(), Some(error));
        for handle in handles.iter_mut() {
            assert!(handle.try_next_sent().is_none());
        }
    }

    #[tokio::test]
    async fn test_global_mode_pins_adapter() {
        let (router, mut handles) = router(TransportMode::Tcp);
        handle(&mut handles, TransportKind::WebSocket).set_ready(true);

        let outcome = router.send(&[0x01], None).await;
        assert_eq!(outcome.error.as_deref(), Some("TCP not connected"));

        // An explicit auto override still follows the global mode.
        let outcome = router.send(&[0x01], Some(TransportMode::Auto)).await;
        assert_eq!(outcome.error.as_deref(), Some("TCP not connected"));

        assert_eq!(router.set_mode(TransportMode::Auto), TransportMode::Tcp);
        let outcome = router.send(&[0x01], None).await;
        assert_eq!(outcome.via, Some(TransportKind::WebSocket));
    }

    #[tokio::test]
    async fn test_missing_adapter_reports_not_connected() {
        let (serial, serial_handle) = mock(TransportKind::Serial);
        serial_handle.set_ready(true);
        let router = TransportRouter::new([serial], TransportMode::Auto);

        let outcome = router.send(&[0x01], Some(TransportMode::Wifi)).await;
        assert_eq!(outcome.error.as_deref(), Some("WiFi/WebSocket not connected"));
        assert_eq!(
            router.send(&[0x01], None).await.via,
            Some(TransportKind::Serial)
        );
    }

    #[tokio::test]
    async fn test_write_failure_is_not_retried() {
        let (router, mut handles) = router(TransportMode::Auto);
        handle(&mut handles, TransportKind::WebSocket).set_ready(true);
        handle(&mut handles, TransportKind::WebSocket).fail_writes(true);
        handle(&mut handles, TransportKind::Tcp).set_ready(true);

        let outcome = router.send(&[0x01], None).await;
        assert!(!outcome.sent);
        assert_eq!(outcome.via, Some(TransportKind::WebSocket));
        assert!(handle(&mut handles, TransportKind::Tcp).try_next_sent().is_none());
    }

    #[test]
    fn test_status_snapshot() {
        let (serial, serial_handle) = mock(TransportKind::Serial);
        let (tcp, _tcp_handle) = mock(TransportKind::Tcp);
        serial_handle.set_ready(true);
        let router = TransportRouter::new([serial, tcp], TransportMode::Auto);

        let status = router.status();
        assert_eq!(status.mode, TransportMode::Auto);
        assert_eq!(status.active, Some(TransportKind::Serial));
        assert_eq!(
            status.transports[TransportKind::Tcp.index()],
            TransportState {
                kind: TransportKind::Tcp,
                configured: true,
                ready: false,
            }
        );
        assert!(!status.transports[TransportKind::WebSocket.index()].configured);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["mode"], "auto");
        assert_eq!(json["active"], "serial");
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(SendOutcome::sent(TransportKind::WebSocket)).unwrap();
        assert_eq!(json, serde_json::json!({"sent": true, "via": "ws"}));
    }
}
