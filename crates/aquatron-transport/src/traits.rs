//! The capability set shared by every physical adapter.
//!
//! Methods use native `async fn` (Edition 2024 RPITIT). Because such traits
//! are not object-safe, adapters are dispatched through the
//! [`AnyTransport`](crate::AnyTransport) enum instead of `Box<dyn Transport>`.

#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::events::EventSink;
use aquatron_core::TransportKind;
use tokio_util::sync::CancellationToken;

/// A physical link to the instrument.
///
/// `run` and `send` are called concurrently from different tasks: the
/// adapter's own task drives `run` for its whole lifetime while callers
/// write through `send`.
pub trait Transport: Send + Sync {
    /// Adapter identity used in `via` fields and status events.
    fn kind(&self) -> TransportKind;

    /// Whether a write issued now would reach the link.
    fn is_ready(&self) -> bool;

    /// Write one complete packet.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotConnected`](crate::TransportError::NotConnected)
    /// when the link is down, or the underlying write error.
    async fn send(&self, bytes: &[u8]) -> Result<()>;

    /// Connect and drive the adapter until `shutdown` fires.
    ///
    /// Every failure is reported through `events`; this never returns early
    /// because of an I/O error.
    async fn run(&self, events: EventSink, shutdown: CancellationToken);
}
