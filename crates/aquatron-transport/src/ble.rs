//! Bluetooth-LE adapter.
//!
//! Built on `btleplug` when the `ble` feature is enabled: scan for the
//! configured service, connect to the first peripheral found, subscribe to
//! notifications on the configured characteristic and go back to scanning
//! when the peripheral drops. Without the feature (or without a usable host
//! adapter) the transport reports itself unavailable once and stays
//! not-ready.

use crate::error::{Result, TransportError};
use crate::events::EventSink;
use crate::traits::Transport;
use aquatron_core::TransportKind;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    pub service_uuid: String,
    pub characteristic_uuid: String,
}

impl BleConfig {
    pub fn new(service_uuid: impl Into<String>, characteristic_uuid: impl Into<String>) -> Self {
        Self {
            service_uuid: service_uuid.into(),
            characteristic_uuid: characteristic_uuid.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.service_uuid.is_empty() && !self.characteristic_uuid.is_empty()
    }
}

#[derive(Debug)]
pub struct BleTransport {
    config: BleConfig,
    ready: AtomicBool,
    #[cfg(feature = "ble")]
    link: tokio::sync::Mutex<Option<platform::Link>>,
}

impl BleTransport {
    pub fn new(config: BleConfig) -> Self {
        debug!(service = %config.service_uuid, "Creating BLE transport");
        Self {
            config,
            ready: AtomicBool::new(false),
            #[cfg(feature = "ble")]
            link: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BleConfig {
        &self.config
    }

    /// Report a permanent failure once and idle until shutdown.
    async fn park(&self, events: &EventSink, shutdown: &CancellationToken, reason: String) {
        tracing::warn!(reason = %reason, "BLE transport unavailable");
        self.ready.store(false, Ordering::SeqCst);
        events.unavailable(reason).await;
        shutdown.cancelled().await;
    }
}

#[cfg(not(feature = "ble"))]
impl Transport for BleTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Bluetooth
    }

    fn is_ready(&self) -> bool {
        false
    }

    async fn send(&self, _bytes: &[u8]) -> Result<()> {
        Err(TransportError::NotConnected(TransportKind::Bluetooth))
    }

    async fn run(&self, events: EventSink, shutdown: CancellationToken) {
        self.park(&events, &shutdown, "built without Bluetooth support".to_string())
            .await;
    }
}

#[cfg(feature = "ble")]
mod platform {
    use super::*;
    use aquatron_protocol::Reassembler;
    use btleplug::api::{
        Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
        ValueNotification, WriteType,
    };
    use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
    use futures::{Stream, StreamExt};
    use std::pin::Pin;
    use tracing::{info, trace, warn};
    use uuid::Uuid;

    type Notifications = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

    #[derive(Debug)]
    pub(super) struct Link {
        id: PeripheralId,
        peripheral: Peripheral,
        characteristic: Characteristic,
    }

    fn parse_uuids(config: &BleConfig) -> std::result::Result<(Uuid, Uuid), String> {
        if !config.is_configured() {
            return Err("service or characteristic UUID not configured".to_string());
        }
        let service = Uuid::parse_str(&config.service_uuid)
            .map_err(|e| format!("invalid service UUID '{}': {e}", config.service_uuid))?;
        let characteristic = Uuid::parse_str(&config.characteristic_uuid).map_err(|e| {
            format!("invalid characteristic UUID '{}': {e}", config.characteristic_uuid)
        })?;
        Ok((service, characteristic))
    }

    async fn first_adapter() -> Result<Adapter> {
        let manager = Manager::new().await.map_err(TransportError::bluetooth)?;
        manager
            .adapters()
            .await
            .map_err(TransportError::bluetooth)?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::bluetooth("no Bluetooth adapter found"))
    }

    async fn next_notification(stream: &mut Option<Notifications>) -> Option<ValueNotification> {
        match stream {
            Some(stream) => stream.next().await,
            None => std::future::pending().await,
        }
    }

    async fn subscribe(
        peripheral: &Peripheral,
        characteristic: Uuid,
    ) -> Result<(Characteristic, Notifications)> {
        peripheral
            .discover_services()
            .await
            .map_err(TransportError::bluetooth)?;

        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic)
            .ok_or_else(|| TransportError::bluetooth("characteristic not found"))?;

        peripheral
            .subscribe(&characteristic)
            .await
            .map_err(TransportError::bluetooth)?;
        let notifications = peripheral
            .notifications()
            .await
            .map_err(TransportError::bluetooth)?;
        Ok((characteristic, notifications))
    }

    /// Whether the peripheral advertises `service`. Updates for cached
    /// peripherals are not covered by the scan filter.
    async fn advertises(central: &Adapter, id: &PeripheralId, service: Uuid) -> bool {
        let Ok(peripheral) = central.peripheral(id).await else {
            return false;
        };
        matches!(
            peripheral.properties().await,
            Ok(Some(properties)) if properties.services.contains(&service)
        )
    }

    impl BleTransport {
        async fn attach(
            &self,
            central: &Adapter,
            id: &PeripheralId,
            characteristic: Uuid,
        ) -> Result<Notifications> {
            let peripheral = central.peripheral(id).await.map_err(TransportError::bluetooth)?;
            peripheral.connect().await.map_err(TransportError::bluetooth)?;

            let (characteristic, notifications) = match subscribe(&peripheral, characteristic).await {
                Ok(subscribed) => subscribed,
                Err(e) => {
                    // Not stored in `link` yet, so detach cannot reach it.
                    let _ = peripheral.disconnect().await;
                    return Err(e);
                }
            };

            *self.link.lock().await = Some(Link {
                id: id.clone(),
                peripheral,
                characteristic,
            });
            self.ready.store(true, Ordering::SeqCst);
            Ok(notifications)
        }

        async fn detach(&self) {
            self.ready.store(false, Ordering::SeqCst);
            if let Some(link) = self.link.lock().await.take() {
                let _ = link.peripheral.disconnect().await;
            }
        }

        async fn is_linked_to(&self, id: &PeripheralId) -> bool {
            self.link.lock().await.as_ref().is_some_and(|link| &link.id == id)
        }
    }

    impl Transport for BleTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Bluetooth
        }

        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        async fn send(&self, bytes: &[u8]) -> Result<()> {
            let link = self.link.lock().await;
            let link = link
                .as_ref()
                .ok_or(TransportError::NotConnected(TransportKind::Bluetooth))?;

            trace!(len = bytes.len(), "Writing packet over BLE");
            link.peripheral
                .write(&link.characteristic, bytes, WriteType::WithResponse)
                .await
                .map_err(TransportError::bluetooth)
        }

        async fn run(&self, events: EventSink, shutdown: CancellationToken) {
            let (service, characteristic) = match parse_uuids(&self.config) {
                Ok(uuids) => uuids,
                Err(reason) => return self.park(&events, &shutdown, reason).await,
            };
            let central = match first_adapter().await {
                Ok(central) => central,
                Err(e) => return self.park(&events, &shutdown, e.to_string()).await,
            };
            let mut central_events = match central.events().await {
                Ok(stream) => stream,
                Err(e) => return self.park(&events, &shutdown, e.to_string()).await,
            };

            let filter = ScanFilter {
                services: vec![service],
            };
            if let Err(e) = central.start_scan(filter.clone()).await {
                return self.park(&events, &shutdown, e.to_string()).await;
            }
            info!(service = %service, "Scanning for BLE instrument");

            let mut reassembler = Reassembler::new();
            let mut notifications: Option<Notifications> = None;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = central_events.next() => match event {
                        None => break,
                        Some(CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id))
                            if !self.is_ready() =>
                        {
                            if !advertises(&central, &id, service).await {
                                continue;
                            }
                            let _ = central.stop_scan().await;
                            match self.attach(&central, &id, characteristic).await {
                                Ok(stream) => {
                                    info!(peripheral = ?id, "BLE instrument connected");
                                    reassembler.clear();
                                    notifications = Some(stream);
                                    events.connected(format!("{id:?}")).await;
                                }
                                Err(e) => {
                                    warn!(peripheral = ?id, error = %e, "BLE connect failed");
                                    events.error(format!("BLE connect error: {e}")).await;
                                    self.detach().await;
                                    let _ = central.start_scan(filter.clone()).await;
                                }
                            }
                        }
                        Some(CentralEvent::DeviceDisconnected(id)) => {
                            if self.is_linked_to(&id).await {
                                info!(peripheral = ?id, "BLE instrument disconnected, resuming scan");
                                notifications = None;
                                self.detach().await;
                                events.disconnected().await;
                                let _ = central.start_scan(filter.clone()).await;
                            }
                        }
                        Some(_) => {}
                    },
                    notification = next_notification(&mut notifications) => match notification {
                        Some(notification) => {
                            reassembler.feed(&notification.value);
                            for frame in reassembler.drain_frames() {
                                events.frame(frame).await;
                            }
                        }
                        None => {
                            notifications = None;
                            self.detach().await;
                            events.disconnected().await;
                            let _ = central.start_scan(filter.clone()).await;
                        }
                    },
                }
            }

            let _ = central.stop_scan().await;
            self.detach().await;
            debug!("BLE transport stopped");
        }
    }
}
