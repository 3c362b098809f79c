//! The owning context: router, bus, correlator and timeouts behind one
//! cloneable handle.
//!
//! # Lifecycle
//!
//! 1. Build with [`DeviceLink::builder`], optionally injecting transports
//!    and a log sink
//! 2. [`DeviceLinkBuilder::start`] spawns one task per adapter plus the
//!    dispatcher and returns the link and a [`LinkHandle`]
//! 3. Call operations on the link from any task
//! 4. [`LinkHandle::shutdown`] stops everything
//!
//! ```text
//! ┌──────────┐
//! │ ws task  │──┐
//! └──────────┘  │    ┌────────────┐     ┌──────────┐     ┌────────────┐
//! ┌──────────┐  ├───►│ mpsc (100) │────►│dispatcher│────►│ correlator │
//! │ tcp task │──┤    └────────────┘     └──────────┘     └────────────┘
//! └──────────┘  │                             │
//! ┌──────────┐  │                             ▼
//! │serial ...│──┘                      broadcast<DeviceEvent>
//! └──────────┘
//! ```

use crate::bus::{EventBus, READY_MESSAGE};
use crate::config::{LinkConfig, Timeouts};
use crate::correlator::Correlator;
use crate::events::{Decoded, DeviceEvent, DeviceReady, DeviceStatus, EventKind};
use crate::log_sink::{LogRecord, LogSink, TracingLogSink};
use aquatron_core::constants::TRANSPORT_EVENT_CAPACITY;
use aquatron_core::{DeviceSettings, ElementSpec, Error, Result, TransportKind, TransportMode};
use aquatron_protocol::payload::{settings, sw_params};
use aquatron_protocol::{CommandCode, DeviceSettingsReport, FeedbackInfo, Frame};
use aquatron_transport::{
    AnyTransport, BleTransport, EventSink, SendOutcome, SerialTransport, TcpTransport, Transport,
    TransportRouter, TransportStatus, WebSocketTransport,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-call options supplied by the API layer.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Transport override by name. Unknown names are ignored.
    pub transport: Option<String>,

    /// Cancels the wait of a correlated call.
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = Some(transport.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// The normalized override, if any.
    pub fn override_mode(&self) -> Option<TransportMode> {
        let name = self.transport.as_deref()?;
        let mode = TransportMode::normalize(name);
        if mode.is_none() {
            debug!(transport = %name, "Ignoring unknown transport override");
        }
        mode
    }
}

/// Answer to a ready probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadyReply {
    pub status: String,
    pub payload: String,
    pub source: TransportKind,
    pub timestamp: DateTime<Utc>,
}

impl From<DeviceReady> for ReadyReply {
    fn from(ready: DeviceReady) -> Self {
        Self {
            status: "ready".to_string(),
            payload: ready.payload,
            source: ready.source,
            timestamp: ready.timestamp,
        }
    }
}

/// Result of a command delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReply {
    pub sent: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<TransportKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Whether the instrument signalled ready afterwards. Unset for
    /// commands without a handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_ready: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_payload: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl From<SendOutcome> for CommandReply {
    fn from(outcome: SendOutcome) -> Self {
        Self {
            sent: outcome.sent,
            via: outcome.via,
            error: outcome.error,
            device_ready: None,
            ready_payload: None,
            status: None,
        }
    }
}

struct LinkInner {
    router: TransportRouter,
    bus: EventBus,
    timeouts: Timeouts,
}

/// Cloneable handle to the device link.
#[derive(Clone)]
pub struct DeviceLink {
    inner: Arc<LinkInner>,
}

impl std::fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLink")
            .field("mode", &self.inner.router.mode())
            .field("bus", &self.inner.bus)
            .finish_non_exhaustive()
    }
}

pub struct DeviceLinkBuilder {
    config: LinkConfig,
    transports: Vec<AnyTransport>,
    log_sink: Option<Arc<dyn LogSink>>,
}

impl DeviceLinkBuilder {
    /// Add an adapter on top of the configured ones. An injected adapter
    /// replaces a configured adapter of the same kind.
    pub fn with_transport(mut self, transport: impl Into<AnyTransport>) -> Self {
        self.transports.push(transport.into());
        self
    }

    pub fn with_log_sink(mut self, log_sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(log_sink);
        self
    }

    fn configured_transports(config: &LinkConfig) -> Vec<AnyTransport> {
        let mut transports = Vec::new();
        if let Some(websocket) = &config.websocket {
            transports.push(WebSocketTransport::new(websocket.clone()).into());
        }
        if let Some(tcp) = &config.tcp {
            transports.push(TcpTransport::new(tcp.clone()).into());
        }
        if let Some(serial) = &config.serial {
            transports.push(SerialTransport::new(serial.clone()).into());
        }
        if let Some(ble) = &config.ble {
            transports.push(BleTransport::new(ble.clone()).into());
        }
        transports
    }

    /// Spawn the adapter tasks and the dispatcher. Must be called inside a
    /// tokio runtime.
    pub fn start(self) -> (DeviceLink, LinkHandle) {
        let transports: Vec<Arc<AnyTransport>> = Self::configured_transports(&self.config)
            .into_iter()
            .chain(self.transports)
            .map(Arc::new)
            .collect();

        let log_sink = self
            .log_sink
            .unwrap_or_else(|| Arc::new(TracingLogSink) as Arc<dyn LogSink>);
        let inner = Arc::new(LinkInner {
            router: TransportRouter::new(transports.iter().cloned(), self.config.transport_mode),
            bus: EventBus::new(self.config.event_capacity, Correlator::new(), log_sink),
            timeouts: self.config.timeouts,
        });

        let shutdown = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(TRANSPORT_EVENT_CAPACITY);
        let mut tasks = JoinSet::new();

        for transport in inner.router.transports() {
            let transport = Arc::clone(transport);
            let events = EventSink::new(transport.kind(), tx.clone());
            let shutdown = shutdown.clone();
            info!(kind = %transport.kind(), "Starting transport");
            tasks.spawn(async move { transport.run(events, shutdown).await });
        }
        drop(tx);

        {
            let inner = Arc::clone(&inner);
            let shutdown = shutdown.clone();
            tasks.spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        event = rx.recv() => match event {
                            Some(event) => inner.bus.dispatch(event),
                            None => break,
                        },
                    }
                }
                debug!("Dispatcher stopped");
            });
        }

        (DeviceLink { inner }, LinkHandle { tasks, shutdown })
    }
}

/// Owner of the running tasks.
pub struct LinkHandle {
    tasks: JoinSet<()>,
    shutdown: CancellationToken,
}

impl LinkHandle {
    /// Grace period for tasks to notice cancellation before being aborted.
    const GRACE: Duration = Duration::from_secs(2);

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop every adapter and the dispatcher.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();

        let mut panics = 0;
        let drained = tokio::time::timeout(Self::GRACE, async {
            while let Some(result) = self.tasks.join_next().await {
                if classify(result) == TaskTermination::Panic {
                    panics += 1;
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(remaining = self.tasks.len(), "Aborting link tasks after grace period");
            self.tasks.abort_all();
            while let Some(result) = self.tasks.join_next().await {
                if classify(result) == TaskTermination::Panic {
                    panics += 1;
                }
            }
        }

        if panics > 0 {
            warn!(panics, "Link tasks panicked");
        }
        info!("Device link stopped");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskTermination {
    Finished,
    Cancelled,
    Panic,
}

fn classify(result: std::result::Result<(), tokio::task::JoinError>) -> TaskTermination {
    match result {
        Ok(()) => TaskTermination::Finished,
        Err(e) if e.is_cancelled() => TaskTermination::Cancelled,
        Err(_) => TaskTermination::Panic,
    }
}

impl DeviceLink {
    pub fn builder(config: LinkConfig) -> DeviceLinkBuilder {
        DeviceLinkBuilder {
            config,
            transports: Vec::new(),
            log_sink: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.inner.bus.subscribe()
    }

    pub fn correlator(&self) -> &Correlator {
        self.inner.bus.correlator()
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.inner.timeouts
    }

    pub fn transport_mode(&self) -> TransportMode {
        self.inner.router.mode()
    }

    /// Change the global transport mode.
    ///
    /// # Errors
    ///
    /// `Error::InvalidTransportMode` for names outside the accepted set; the
    /// mode is left unchanged.
    pub fn set_transport_mode(&self, name: &str) -> Result<TransportMode> {
        let mode = TransportMode::normalize(name)
            .ok_or_else(|| Error::InvalidTransportMode(name.to_string()))?;
        let previous = self.inner.router.set_mode(mode);

        self.inner.bus.publish(DeviceEvent::DeviceStatus(
            DeviceStatus::new("transport_mode_changed").with_transport_mode(mode),
        ));
        self.log("Transport Mode Changed", json!({ "from": previous, "to": mode }));
        Ok(mode)
    }

    pub fn transport_status(&self) -> TransportStatus {
        self.inner.router.status()
    }

    /// Wait until some adapter is usable under the current mode.
    pub async fn wait_until_connected(&self, timeout: Duration) -> Result<TransportKind> {
        let mut events = self.subscribe();
        let wait = async {
            loop {
                if let Ok(transport) = self.inner.router.select(None) {
                    return Ok(transport.kind());
                }
                if let Err(broadcast::error::RecvError::Closed) = events.recv().await {
                    return Err(Error::Transport("event bus closed".to_string()));
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| Error::Timeout {
                kind: "transport".to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })?
    }

    /// Probe readiness with `GET_DEVICE_READY` (status timeout).
    pub async fn get_device_status(&self, options: &CallOptions) -> Result<ReadyReply> {
        self.ready_probe(self.inner.timeouts.status_probe, options).await
    }

    /// Explicit ready request (ready-request timeout).
    pub async fn request_device_ready(&self, options: &CallOptions) -> Result<ReadyReply> {
        self.ready_probe(self.inner.timeouts.ready_request, options).await
    }

    pub async fn get_device_settings(
        &self,
        options: &CallOptions,
    ) -> Result<Decoded<DeviceSettingsReport>> {
        let request = Frame::command_only(CommandCode::GetDeviceSettings);
        match self
            .request(
                request.as_bytes(),
                EventKind::DeviceSettings,
                self.inner.timeouts.settings,
                options,
            )
            .await?
        {
            DeviceEvent::DeviceSettings(decoded) => Ok(decoded),
            other => Err(unexpected(&other)),
        }
    }

    /// Request feedback statistics. The ready probe and the request go out
    /// as one transmission.
    pub async fn get_feedback_info(&self, options: &CallOptions) -> Result<Decoded<FeedbackInfo>> {
        match self
            .request(
                &aquatron_protocol::feedback_request(),
                EventKind::FeedbackInfo,
                self.inner.timeouts.feedback,
                options,
            )
            .await?
        {
            DeviceEvent::FeedbackInfo(decoded) => Ok(decoded),
            other => Err(unexpected(&other)),
        }
    }

    /// Send an arbitrary command. `SEND_SW_PARAMETERS` and
    /// `SET_DEVICE_SETTINGS` go through the ready handshake; everything else
    /// is sent once.
    pub async fn send_command(
        &self,
        cmd: u8,
        payload: &[u8],
        options: &CallOptions,
    ) -> Result<CommandReply> {
        let frame = Frame::encode(cmd, payload)?;
        let handshake = CommandCode::from_u8(cmd).is_some_and(|c| c.requires_handshake());
        if handshake {
            self.deliver(&frame, options).await
        } else {
            let outcome = self
                .inner
                .router
                .send(frame.as_bytes(), options.override_mode())
                .await;
            Ok(outcome.into())
        }
    }

    pub async fn send_sw_parameters(
        &self,
        elements: &[ElementSpec],
        options: &CallOptions,
    ) -> Result<CommandReply> {
        let payload = sw_params::encode(elements)?;
        let frame = Frame::encode(CommandCode::SendSwParameters, &payload)?;
        let reply = self.deliver(&frame, options).await?;

        self.log(
            "Send SW Parameters",
            json!({ "elements": elements, "result": reply }),
        );
        Ok(reply)
    }

    pub async fn set_device_settings(
        &self,
        device_settings: &DeviceSettings,
        options: &CallOptions,
    ) -> Result<CommandReply> {
        let payload = settings::encode(device_settings)?;
        let frame = Frame::encode(CommandCode::SetDeviceSettings, &payload)?;
        let reply = self.deliver(&frame, options).await?;

        self.log(
            "Set Device Settings",
            json!({ "settings": device_settings, "result": reply }),
        );
        Ok(reply)
    }

    /// Write bytes as-is, without framing or validation.
    pub async fn send_raw(&self, bytes: &[u8], options: &CallOptions) -> SendOutcome {
        self.inner.router.send(bytes, options.override_mode()).await
    }

    async fn ready_probe(&self, timeout: Duration, options: &CallOptions) -> Result<ReadyReply> {
        let request = aquatron_protocol::ready_request();
        match self
            .request(request.as_bytes(), EventKind::DeviceReady, timeout, options)
            .await?
        {
            DeviceEvent::DeviceReady(ready) => Ok(ready.into()),
            other => Err(unexpected(&other)),
        }
    }

    /// Register, transmit, await.
    async fn request(
        &self,
        bytes: &[u8],
        kind: EventKind,
        timeout: Duration,
        options: &CallOptions,
    ) -> Result<DeviceEvent> {
        let pending = self.correlator().register(kind)?;

        let outcome = self.inner.router.send(bytes, options.override_mode()).await;
        if !outcome.sent {
            return Err(Error::Transport(outcome.error.unwrap_or_default()));
        }

        pending.wait(timeout, options.cancel.as_ref()).await
    }

    /// Ready probe, settle, command, then wait for the instrument to signal
    /// ready again. A missing ready signal is reported, not an error.
    async fn deliver(&self, frame: &Frame, options: &CallOptions) -> Result<CommandReply> {
        let reservation = self.correlator().reserve(EventKind::DeviceReady)?;
        let override_mode = options.override_mode();

        let probe = self
            .inner
            .router
            .send(aquatron_protocol::ready_request().as_bytes(), override_mode)
            .await;
        if !probe.sent {
            return Ok(probe.into());
        }

        self.settle(options.cancel.as_ref()).await?;

        // Armed after the settle delay so the probe's own answer does not
        // satisfy the wait.
        let pending = reservation.arm();
        let outcome = self.inner.router.send(frame.as_bytes(), override_mode).await;
        if !outcome.sent {
            return Ok(outcome.into());
        }

        let mut reply = CommandReply::from(outcome);
        match pending
            .wait(self.inner.timeouts.command_ready, options.cancel.as_ref())
            .await
        {
            Ok(DeviceEvent::DeviceReady(ready)) => {
                self.inner.bus.publish(DeviceEvent::DeviceStatus(
                    DeviceStatus::new("ready_for_next_input")
                        .with_online(true)
                        .with_ready(true)
                        .with_message(READY_MESSAGE),
                ));
                reply.device_ready = Some(true);
                reply.ready_payload = Some(ready.payload);
                reply.status = Some("ready_for_next_input".to_string());
            }
            Ok(other) => return Err(unexpected(&other)),
            Err(e) if e.is_timeout() => {
                warn!(cmd = frame.cmd(), "No ready signal after command");
                reply.device_ready = Some(false);
                reply.error = Some("Device ready timeout".to_string());
            }
            Err(e) => return Err(e),
        }
        Ok(reply)
    }

    async fn settle(&self, cancel: Option<&CancellationToken>) -> Result<()> {
        let delay = self.inner.timeouts.settle_delay;
        match cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(Error::Cancelled(EventKind::DeviceReady.to_string())),
                _ = tokio::time::sleep(delay) => Ok(()),
            },
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }

    fn log(&self, action: &str, parameters: serde_json::Value) {
        self.inner
            .bus
            .log_sink()
            .append(LogRecord::new(self.inner.bus.device_id(), action, parameters));
    }
}

fn unexpected(event: &DeviceEvent) -> Error {
    Error::Transport(format!("unexpected {} event", event.name()))
}
