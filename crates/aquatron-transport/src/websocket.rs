//! WebSocket adapter for the instrument's WiFi bridge.
//!
//! Binary (and text) messages are fed into a per-connection
//! [`Reassembler`]; a WebSocket message boundary is not a frame boundary.
//! A keepalive ping goes out every `ping_interval`, and a connection that has
//! not answered with a pong within `pong_timeout` is dropped and redialled.

use crate::error::{Result, TransportError};
use crate::events::EventSink;
use crate::traits::Transport;
use aquatron_core::{
    TransportKind,
    constants::{DEFAULT_RECONNECT_DELAY_MS, DEFAULT_WS_PING_INTERVAL_MS, DEFAULT_WS_PONG_TIMEOUT_MS},
};
use aquatron_protocol::Reassembler;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    pub url: String,

    #[serde(with = "aquatron_core::serde_ms", rename = "ping_interval_ms")]
    pub ping_interval: Duration,

    #[serde(with = "aquatron_core::serde_ms", rename = "pong_timeout_ms")]
    pub pong_timeout: Duration,

    #[serde(with = "aquatron_core::serde_ms", rename = "reconnect_delay_ms")]
    pub reconnect_delay: Duration,
}

impl WsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Assemble the URL from its parts.
    ///
    /// ```
    /// use aquatron_transport::WsConfig;
    ///
    /// assert_eq!(WsConfig::build_url("esp.local", 81, "ws", false), "ws://esp.local:81/ws");
    /// assert_eq!(WsConfig::build_url("10.0.0.7", 443, "/link", true), "wss://10.0.0.7:443/link");
    /// assert_eq!(WsConfig::build_url("10.0.0.7", 81, "", false), "ws://10.0.0.7:81");
    /// ```
    pub fn build_url(host: &str, port: u16, path: &str, secure: bool) -> String {
        let scheme = if secure { "wss" } else { "ws" };
        let path = match path {
            "" => String::new(),
            p if p.starts_with('/') => p.to_string(),
            p => format!("/{p}"),
        };
        format!("{scheme}://{host}:{port}{path}")
    }
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            ping_interval: Duration::from_millis(DEFAULT_WS_PING_INTERVAL_MS),
            pong_timeout: Duration::from_millis(DEFAULT_WS_PONG_TIMEOUT_MS),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
        }
    }
}

/// Why a served connection ended.
#[derive(Debug, PartialEq, Eq)]
enum Ended {
    Shutdown,
    Closed,
    PongTimeout,
    Failed,
}

#[derive(Debug)]
pub struct WebSocketTransport {
    config: WsConfig,
    ready: AtomicBool,
    sink: Mutex<Option<WsSink>>,
}

impl WebSocketTransport {
    pub fn new(config: WsConfig) -> Self {
        debug!(url = %config.url, "Creating WebSocket transport");
        Self {
            config,
            ready: AtomicBool::new(false),
            sink: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    async fn write(&self, message: Message) -> Result<()> {
        let mut sink = self.sink.lock().await;
        let sink = sink
            .as_mut()
            .ok_or(TransportError::NotConnected(TransportKind::WebSocket))?;
        sink.send(message).await?;
        Ok(())
    }

    async fn serve(&self, ws: WsStream, events: &EventSink, shutdown: &CancellationToken) -> Ended {
        let (sink, mut stream) = ws.split();
        *self.sink.lock().await = Some(sink);
        self.ready.store(true, Ordering::SeqCst);
        info!(url = %self.config.url, "WebSocket connected");
        events.connected(self.config.url.clone()).await;

        let mut reassembler = Reassembler::new();
        let mut last_pong = Instant::now();
        let mut ping = tokio::time::interval_at(
            Instant::now() + self.config.ping_interval,
            self.config.ping_interval,
        );

        let ended = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break Ended::Shutdown,
                _ = ping.tick() => {
                    if last_pong.elapsed() > self.config.pong_timeout {
                        warn!(
                            timeout_ms = self.config.pong_timeout.as_millis() as u64,
                            "No pong from instrument, dropping WebSocket"
                        );
                        break Ended::PongTimeout;
                    }
                    trace!("Sending WebSocket keepalive ping");
                    if let Err(e) = self.write(Message::Ping(Vec::new())).await {
                        events.error(format!("ws-error: {e}")).await;
                        break Ended::Failed;
                    }
                }
                message = stream.next() => match message {
                    Some(Ok(Message::Binary(data))) => {
                        reassembler.feed(&data);
                        for frame in reassembler.drain_frames() {
                            events.frame(frame).await;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        reassembler.feed(text.as_bytes());
                        for frame in reassembler.drain_frames() {
                            events.frame(frame).await;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => last_pong = Instant::now(),
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break Ended::Closed,
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive failed");
                        events.error(format!("ws-error: {e}")).await;
                        break Ended::Failed;
                    }
                },
            }
        };

        self.ready.store(false, Ordering::SeqCst);
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        info!(url = %self.config.url, reason = ?ended, "WebSocket disconnected");
        events.disconnected().await;
        ended
    }
}

impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn send(&self, bytes: &[u8]) -> Result<()> {
        trace!(len = bytes.len(), "Writing packet over WebSocket");
        self.write(Message::Binary(bytes.to_vec())).await
    }

    async fn run(&self, events: EventSink, shutdown: CancellationToken) {
        while !shutdown.is_cancelled() {
            match connect_async(self.config.url.as_str()).await {
                Ok((ws, _response)) => {
                    if self.serve(ws, &events, &shutdown).await == Ended::Shutdown {
                        break;
                    }
                }
                Err(e) => {
                    debug!(url = %self.config.url, error = %e, "WebSocket connect failed");
                    events.error(format!("ws-error: {e}")).await;
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
        debug!("WebSocket transport stopped");
    }
}
