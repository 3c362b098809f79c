//! Link configuration.
//!
//! Loaded from TOML:
//!
//! ```toml
//! transport_mode = "auto"
//!
//! [serial]
//! path = "/dev/ttyUSB0"
//! baud = 115200
//!
//! [websocket]
//! url = "ws://192.168.4.1:81/ws"
//! ping_interval_ms = 15000
//!
//! [timeouts]
//! command_ready_ms = 5000
//! ```
//!
//! or from the environment with [`LinkConfig::from_env`]. An absent
//! transport section means that adapter is not started.

use aquatron_core::constants::*;
use aquatron_core::{Error, Result, TransportMode};
use aquatron_transport::{BleConfig, SerialConfig, TcpConfig, WsConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Deadlines of the correlated operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    #[serde(with = "aquatron_core::serde_ms", rename = "status_probe_ms")]
    pub status_probe: Duration,

    #[serde(with = "aquatron_core::serde_ms", rename = "ready_request_ms")]
    pub ready_request: Duration,

    /// Wait for the ready signal after a delivery command.
    #[serde(with = "aquatron_core::serde_ms", rename = "command_ready_ms")]
    pub command_ready: Duration,

    #[serde(with = "aquatron_core::serde_ms", rename = "settings_ms")]
    pub settings: Duration,

    #[serde(with = "aquatron_core::serde_ms", rename = "feedback_ms")]
    pub feedback: Duration,

    /// Pause between the ready probe and a delivery command.
    #[serde(with = "aquatron_core::serde_ms", rename = "settle_delay_ms")]
    pub settle_delay: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            status_probe: Duration::from_millis(DEFAULT_STATUS_PROBE_TIMEOUT_MS),
            ready_request: Duration::from_millis(DEFAULT_READY_REQUEST_TIMEOUT_MS),
            command_ready: Duration::from_millis(DEFAULT_COMMAND_READY_TIMEOUT_MS),
            settings: Duration::from_millis(DEFAULT_SETTINGS_TIMEOUT_MS),
            feedback: Duration::from_millis(DEFAULT_FEEDBACK_TIMEOUT_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub transport_mode: TransportMode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<SerialConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp: Option<TcpConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub websocket: Option<WsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ble: Option<BleConfig>,

    pub timeouts: Timeouts,

    /// Capacity of the device event broadcast channel.
    pub event_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            transport_mode: TransportMode::Auto,
            serial: None,
            tcp: None,
            websocket: None,
            ble: None,
            timeouts: Timeouts::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl LinkConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)?;
        Self::from_toml_str(&input)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Build from the process environment.
    ///
    /// | Variable | Effect |
    /// |---|---|
    /// | `SERIAL_PORT`, `SERIAL_BAUD` | serial adapter |
    /// | `TCP_HOST`, `TCP_PORT` | TCP adapter (both required) |
    /// | `WS_URL` | WebSocket adapter |
    /// | `WS_HOST`/`ESP_HOST`, `WS_PORT`/`ESP_WS_PORT`, `WS_PATH`, `WS_SECURE` | WebSocket URL when `WS_URL` is unset |
    /// | `WS_PING_INTERVAL_MS`, `WS_PONG_TIMEOUT_MS` | keepalive timing |
    /// | `BLE_SERVICE_UUID`, `BLE_CHARACTERISTIC_UUID` | BLE adapter |
    /// | `TRANSPORT_MODE` | initial mode |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// [`LinkConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(mode) = var("TRANSPORT_MODE") {
            config.transport_mode = TransportMode::from_str(&mode)?;
        }

        if let Some(path) = var("SERIAL_PORT") {
            let mut serial = SerialConfig::new(path);
            if let Some(baud) = var("SERIAL_BAUD") {
                serial.baud = parse_number("SERIAL_BAUD", &baud)?;
            }
            config.serial = Some(serial);
        }

        if let (Some(host), Some(port)) = (var("TCP_HOST"), var("TCP_PORT")) {
            config.tcp = Some(TcpConfig::new(host, parse_number("TCP_PORT", &port)?));
        }

        let url = match var("WS_URL") {
            Some(url) => Some(url),
            None => {
                let host = var("WS_HOST").or_else(|| var("ESP_HOST"));
                let port = var("WS_PORT").or_else(|| var("ESP_WS_PORT"));
                match (host, port) {
                    (Some(host), Some(port)) => {
                        let port: u16 = parse_number("WS_PORT", &port)?;
                        let path = var("WS_PATH").unwrap_or_default();
                        let secure = var("WS_SECURE").is_some_and(|v| v.eq_ignore_ascii_case("true"));
                        Some(WsConfig::build_url(&host, port, &path, secure))
                    }
                    _ => None,
                }
            }
        };
        if let Some(url) = url {
            let mut websocket = WsConfig::new(url);
            if let Some(ms) = var("WS_PING_INTERVAL_MS") {
                websocket.ping_interval = Duration::from_millis(parse_number("WS_PING_INTERVAL_MS", &ms)?);
            }
            if let Some(ms) = var("WS_PONG_TIMEOUT_MS") {
                websocket.pong_timeout = Duration::from_millis(parse_number("WS_PONG_TIMEOUT_MS", &ms)?);
            }
            config.websocket = Some(websocket);
        }

        if let (Some(service), Some(characteristic)) =
            (var("BLE_SERVICE_UUID"), var("BLE_CHARACTERISTIC_UUID"))
        {
            config.ble = Some(BleConfig::new(service, characteristic));
        }

        Ok(config)
    }

    /// Whether at least one adapter is configured.
    pub fn has_transport(&self) -> bool {
        self.serial.is_some() || self.tcp.is_some() || self.websocket.is_some() || self.ble.is_some()
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a number, got '{value}'")))
}
