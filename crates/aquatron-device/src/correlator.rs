//! Request/response correlation.
//!
//! A caller registers interest in an [`EventKind`] *before* transmitting,
//! then awaits the returned [`PendingResponse`]. The bus offers every
//! published event to [`Correlator::resolve`]; the first matching event
//! completes the wait.
//!
//! At most one wait per kind is live. A second registration for a taken
//! kind fails immediately with `RequestPending`. A wait that times out, is
//! cancelled or is simply dropped releases its slot.
//!
//! A multi-step exchange can [`reserve`](Correlator::reserve) the slot up
//! front and [`arm`](Reservation::arm) it later. Matching events that arrive
//! while the slot is only reserved are not delivered to anyone.

use crate::events::{DeviceEvent, EventKind};
use aquatron_core::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

struct Slot {
    id: u64,
    created_at: Instant,
    tx: Option<oneshot::Sender<DeviceEvent>>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    slots: HashMap<EventKind, Slot>,
}

#[derive(Clone, Default)]
pub struct Correlator {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `kind` and start listening.
    ///
    /// # Errors
    ///
    /// `Error::RequestPending` if the slot is taken.
    pub fn register(&self, kind: EventKind) -> Result<PendingResponse> {
        Ok(self.reserve(kind)?.arm())
    }

    /// Claim the slot for `kind` without listening yet.
    ///
    /// # Errors
    ///
    /// `Error::RequestPending` if the slot is taken.
    pub fn reserve(&self, kind: EventKind) -> Result<Reservation> {
        let mut registry = self.registry.lock();
        if registry.slots.contains_key(&kind) {
            return Err(Error::RequestPending(kind.to_string()));
        }

        registry.next_id += 1;
        let id = registry.next_id;
        registry.slots.insert(
            kind,
            Slot {
                id,
                created_at: Instant::now(),
                tx: None,
            },
        );
        trace!(kind = %kind, id, "Reserved request slot");

        Ok(Reservation {
            kind,
            id,
            registry: Arc::clone(&self.registry),
        })
    }

    /// Complete the wait for this event's kind, if any. Returns whether a
    /// waiter took the event.
    pub fn resolve(&self, event: &DeviceEvent) -> bool {
        let kind = event.kind();
        let slot = {
            let mut registry = self.registry.lock();
            if !registry.slots.get(&kind).is_some_and(|slot| slot.tx.is_some()) {
                return false;
            }
            registry.slots.remove(&kind)
        };
        let Some(Slot { id, created_at, tx: Some(tx) }) = slot else {
            return false;
        };

        debug!(
            kind = %kind,
            id,
            elapsed_ms = created_at.elapsed().as_millis() as u64,
            "Pending request resolved"
        );
        tx.send(event.clone()).is_ok()
    }

    pub fn pending_count(&self) -> usize {
        self.registry.lock().slots.len()
    }

    pub fn is_pending(&self, kind: EventKind) -> bool {
        self.registry.lock().slots.contains_key(&kind)
    }
}

/// A claimed slot that does not listen yet. Dropping it releases the slot.
pub struct Reservation {
    kind: EventKind,
    id: u64,
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Reservation {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Start listening. Events seen before this call are not delivered.
    pub fn arm(self) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        if let Some(slot) = self
            .registry
            .lock()
            .slots
            .get_mut(&self.kind)
            .filter(|slot| slot.id == self.id)
        {
            slot.tx = Some(tx);
        }
        PendingResponse {
            reservation: self,
            rx,
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();
        if registry.slots.get(&self.kind).is_some_and(|slot| slot.id == self.id) {
            registry.slots.remove(&self.kind);
        }
    }
}

/// A registered wait. Dropping it releases the slot.
pub struct PendingResponse {
    reservation: Reservation,
    rx: oneshot::Receiver<DeviceEvent>,
}

impl std::fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("reservation", &self.reservation)
            .finish_non_exhaustive()
    }
}

impl PendingResponse {
    pub fn kind(&self) -> EventKind {
        self.reservation.kind
    }

    /// Await the matching event.
    ///
    /// # Errors
    ///
    /// - `Error::Timeout` when nothing matched within `timeout`
    /// - `Error::Cancelled` when `cancel` fired first
    pub async fn wait(mut self, timeout: Duration, cancel: Option<&CancellationToken>) -> Result<DeviceEvent> {
        let cancel = cancel.cloned().unwrap_or_default();
        let kind = self.reservation.kind;

        tokio::select! {
            biased;
            result = &mut self.rx => result.map_err(|_| Error::Cancelled(kind.to_string())),
            _ = cancel.cancelled() => {
                debug!(kind = %kind, "Pending request cancelled");
                Err(Error::Cancelled(kind.to_string()))
            }
            _ = tokio::time::sleep(timeout) => {
                debug!(kind = %kind, timeout_ms = timeout.as_millis() as u64, "Pending request timed out");
                Err(Error::Timeout {
                    kind: kind.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}
