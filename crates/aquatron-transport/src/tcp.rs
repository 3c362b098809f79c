//! TCP adapter.
//!
//! Connects to the instrument's TCP bridge, keeps the link alive forever and
//! reconnects after a fixed backoff whenever the connection fails or closes.
//!
//! ```text
//! TcpTransport::run
//!     │
//!     ├─> connect (timeout) ─> set TCP_NODELAY
//!     │
//!     ├─> FramedRead<OwnedReadHalf, PacketCodec> ─> EventSink::frame
//!     │
//!     └─> on close/error: sleep(reconnect_delay), repeat
//! ```
//!
//! Writes go through the stored write half; they fail with
//! `NotConnected` while the link is down.

use crate::error::{Result, TransportError};
use crate::events::EventSink;
use crate::traits::Transport;
use aquatron_core::{
    TransportKind,
    constants::{DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_RECONNECT_DELAY_MS},
};
use aquatron_protocol::PacketCodec;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Configuration for the TCP adapter.
///
/// # Example
///
/// ```
/// use aquatron_transport::TcpConfig;
/// use std::time::Duration;
///
/// let config = TcpConfig {
///     host: "192.168.4.1".to_string(),
///     port: 3333,
///     ..TcpConfig::default()
/// };
/// assert_eq!(config.address(), "192.168.4.1:3333");
/// assert_eq!(config.reconnect_delay, Duration::from_millis(2000));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    pub host: String,
    pub port: u16,

    /// Timeout for each connection attempt.
    #[serde(with = "aquatron_core::serde_ms", rename = "connect_timeout_ms")]
    pub connect_timeout: Duration,

    /// Pause before reconnecting after a failure or close.
    #[serde(with = "aquatron_core::serde_ms", rename = "reconnect_delay_ms")]
    pub reconnect_delay: Duration,
}

impl TcpConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3333,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
        }
    }
}

/// TCP link to the instrument.
#[derive(Debug)]
pub struct TcpTransport {
    config: TcpConfig,
    ready: AtomicBool,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl TcpTransport {
    pub fn new(config: TcpConfig) -> Self {
        debug!(address = %config.address(), "Creating TCP transport");
        Self {
            config,
            ready: AtomicBool::new(false),
            writer: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    async fn connect(&self) -> Result<TcpStream> {
        let address = self.config.address();
        info!(address = %address, "Connecting to instrument over TCP");

        let stream = match tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(&address),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(TransportError::ConnectionTimeout(
                    self.config.connect_timeout.as_millis() as u64,
                ));
            }
        };

        // Frames are tiny; Nagle would delay every command.
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {} - latency may be impacted", e);
        }

        Ok(stream)
    }

    /// Serve one established connection until it closes or shutdown fires.
    async fn serve(&self, stream: TcpStream, events: &EventSink, shutdown: &CancellationToken) {
        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);
        self.ready.store(true, Ordering::SeqCst);
        events.connected(self.config.address()).await;

        let mut frames = FramedRead::new(read_half, PacketCodec::new());
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                next = frames.next() => match next {
                    Some(Ok(frame)) => events.frame(frame).await,
                    Some(Err(e)) => {
                        warn!(error = %e, "TCP read failed");
                        events.error(e.to_string()).await;
                        break;
                    }
                    None => {
                        info!(address = %self.config.address(), "TCP connection closed by peer");
                        break;
                    }
                },
            }
        }

        self.ready.store(false, Ordering::SeqCst);
        self.writer.lock().await.take();
        events.disconnected().await;
    }
}

impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn send(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let stream = writer
            .as_mut()
            .ok_or(TransportError::NotConnected(TransportKind::Tcp))?;

        trace!(len = bytes.len(), "Writing packet over TCP");
        if let Err(e) = stream.write_all(bytes).await {
            warn!(error = %e, "TCP write failed");
            return Err(e.into());
        }
        Ok(())
    }

    async fn run(&self, events: EventSink, shutdown: CancellationToken) {
        while !shutdown.is_cancelled() {
            match self.connect().await {
                Ok(stream) => self.serve(stream, &events, &shutdown).await,
                Err(e) => {
                    debug!(error = %e, "TCP connect failed");
                    events.error(e.to_string()).await;
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
        debug!("TCP transport stopped");
    }
}
