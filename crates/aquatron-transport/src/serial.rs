//! Serial (UART) adapter.
//!
//! `serialport` is a blocking API, so the reader runs on a dedicated blocking
//! thread that feeds its own [`Reassembler`] and pushes frames with
//! [`EventSink::blocking_frame`]. Writes hop onto the blocking pool as well.
//! The read timeout bounds how long the reader takes to notice shutdown.

use crate::error::{Result, TransportError};
use crate::events::EventSink;
use crate::traits::Transport;
use aquatron_core::{TransportKind, constants::DEFAULT_SERIAL_BAUD};
use aquatron_protocol::Reassembler;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

const READ_BUFFER_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub path: String,

    pub baud: u32,

    #[serde(with = "aquatron_core::serde_ms", rename = "read_timeout_ms")]
    pub read_timeout: Duration,

    /// Re-open the port after it fails or closes. `None` gives up after the
    /// first failure.
    #[serde(with = "aquatron_core::serde_ms::option", rename = "reopen_delay_ms")]
    pub reopen_delay: Option<Duration>,
}

impl SerialConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            baud: DEFAULT_SERIAL_BAUD,
            read_timeout: Duration::from_millis(100),
            reopen_delay: None,
        }
    }
}

type PortSlot = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

pub struct SerialTransport {
    config: SerialConfig,
    ready: AtomicBool,
    writer: PortSlot,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("config", &self.config)
            .field("ready", &self.ready)
            .finish_non_exhaustive()
    }
}

impl SerialTransport {
    pub fn new(config: SerialConfig) -> Self {
        debug!(path = %config.path, baud = config.baud, "Creating serial transport");
        Self {
            config,
            ready: AtomicBool::new(false),
            writer: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn open(&self) -> Result<Box<dyn SerialPort>> {
        info!(path = %self.config.path, baud = self.config.baud, "Opening serial port");
        let port = serialport::new(&self.config.path, self.config.baud)
            .timeout(self.config.read_timeout)
            .open()?;
        Ok(port)
    }

    async fn serve(&self, port: Box<dyn SerialPort>, events: &EventSink, shutdown: &CancellationToken) {
        let reader = match port.try_clone() {
            Ok(reader) => reader,
            Err(e) => {
                warn!(error = %e, "Failed to clone serial port handle");
                events.error(TransportError::from(e).to_string()).await;
                return;
            }
        };

        *self.writer.lock() = Some(port);
        self.ready.store(true, Ordering::SeqCst);
        events.connected(self.config.path.clone()).await;

        let sink = events.clone();
        let cancel = shutdown.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || read_loop(reader, sink, cancel)).await {
            warn!(error = %e, "Serial reader thread failed");
        }

        self.ready.store(false, Ordering::SeqCst);
        self.writer.lock().take();
        info!(path = %self.config.path, "Serial port closed");
        events.disconnected().await;
    }
}

/// Blocking receive loop; returns when the port fails, the event channel
/// closes or shutdown fires.
fn read_loop(mut port: Box<dyn SerialPort>, events: EventSink, shutdown: CancellationToken) {
    let mut reassembler = Reassembler::new();
    let mut buf = [0u8; READ_BUFFER_LEN];

    while !shutdown.is_cancelled() {
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                trace!(len = n, "Serial bytes received");
                reassembler.feed(&buf[..n]);
                for frame in reassembler.drain_frames() {
                    if !events.blocking_frame(frame) {
                        return;
                    }
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => {}
            Err(e) => {
                warn!(error = %e, "Serial read failed");
                events.blocking_error(e.to_string());
                return;
            }
        }
    }
}

impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn send(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_ready() {
            return Err(TransportError::NotConnected(TransportKind::Serial));
        }

        trace!(len = bytes.len(), "Writing packet to serial port");
        let writer = Arc::clone(&self.writer);
        let data = bytes.to_vec();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut slot = writer.lock();
            let port = slot
                .as_mut()
                .ok_or(TransportError::NotConnected(TransportKind::Serial))?;
            port.write_all(&data)?;
            port.flush()?;
            Ok(())
        })
        .await
        .map_err(|e| TransportError::connection_lost(e.to_string()))?
    }

    async fn run(&self, events: EventSink, shutdown: CancellationToken) {
        loop {
            match self.open() {
                Ok(port) => self.serve(port, &events, &shutdown).await,
                Err(e) => {
                    warn!(path = %self.config.path, error = %e, "Serial open failed");
                    events.error(e.to_string()).await;
                }
            }

            let Some(delay) = self.config.reopen_delay else {
                break;
            };
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!("Serial transport stopped");
    }
}
