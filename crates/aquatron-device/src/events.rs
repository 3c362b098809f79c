//! Typed events published on the device bus.
//!
//! Every inbound frame and every transport lifecycle change becomes one or
//! more [`DeviceEvent`]s. Serialized, an event looks like
//! `{"event": "device-ready", "data": {...}}`, which is what an API layer
//! forwards to its clients unchanged.

use aquatron_core::{TransportKind, TransportMode};
use aquatron_protocol::{DeviceSettingsReport, FeedbackInfo};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Event name, also the correlator key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    DeviceStatus,
    DeviceReady,
    DeviceAck,
    DeviceSettings,
    FeedbackInfo,
    AdcData,
    StatData,
    DeviceData,
    DeviceError,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeviceStatus => "device-status",
            Self::DeviceReady => "device-ready",
            Self::DeviceAck => "device-ack",
            Self::DeviceSettings => "device-settings",
            Self::FeedbackInfo => "feedback-info",
            Self::AdcData => "adc-data",
            Self::StatData => "stat-data",
            Self::DeviceData => "device-data",
            Self::DeviceError => "device-error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall link/instrument status update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    /// Machine-readable status, e.g. `ws_connected` or `device_ready`.
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<TransportKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<TransportKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_mode: Option<TransportMode>,

    pub timestamp: DateTime<Utc>,
}

impl DeviceStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            online: None,
            ready: None,
            via: None,
            source: None,
            payload: None,
            device_id: None,
            message: None,
            transport_mode: None,
            timestamp: Utc::now(),
        }
    }

    /// `<prefix>_connected` / `<prefix>_disconnected` for an adapter.
    pub fn link(kind: TransportKind, online: bool) -> Self {
        let suffix = if online { "connected" } else { "disconnected" };
        Self::new(format!("{}_{suffix}", kind.status_prefix()))
            .with_online(online)
            .with_via(kind)
    }

    pub fn with_online(mut self, online: bool) -> Self {
        self.online = Some(online);
        self
    }

    pub fn with_ready(mut self, ready: bool) -> Self {
        self.ready = Some(ready);
        self
    }

    pub fn with_via(mut self, via: TransportKind) -> Self {
        self.via = Some(via);
        self
    }

    pub fn with_source(mut self, source: TransportKind) -> Self {
        self.source = Some(source);
        self
    }

    /// Payload hex, also used as the device identifier.
    pub fn with_payload(mut self, payload_hex: impl Into<String>) -> Self {
        let payload = payload_hex.into();
        self.device_id = Some(payload.clone());
        self.payload = Some(payload);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_transport_mode(mut self, mode: TransportMode) -> Self {
        self.transport_mode = Some(mode);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceReady {
    pub ready: bool,
    pub payload: String,
    pub device_id: String,
    pub source: TransportKind,
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceAck {
    pub ack: bool,
    pub payload: String,
    pub source: TransportKind,
}

/// A structured payload that may have failed to decode. The raw payload is
/// always kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decoded<T> {
    #[serde(flatten)]
    pub value: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub raw: String,
    pub source: TransportKind,
}

impl<T> Decoded<T> {
    pub fn new(result: aquatron_core::Result<T>, raw: &[u8], source: TransportKind) -> Self {
        let raw = aquatron_protocol::to_hex(raw);
        match result {
            Ok(value) => Self {
                value: Some(value),
                error: None,
                raw,
                source,
            },
            Err(e) => Self {
                value: None,
                error: Some(e.to_string()),
                raw,
                source,
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdcData {
    pub samples: Vec<u16>,
    pub source: TransportKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatData {
    pub payload: String,
    pub source: TransportKind,
}

/// Catch-all for heartbeats and unrecognized commands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceData {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,

    pub cmd: u8,
    pub payload: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    pub source: TransportKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<TransportKind>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum DeviceEvent {
    DeviceStatus(DeviceStatus),
    DeviceReady(DeviceReady),
    DeviceAck(DeviceAck),
    DeviceSettings(Decoded<DeviceSettingsReport>),
    FeedbackInfo(Decoded<FeedbackInfo>),
    AdcData(AdcData),
    StatData(StatData),
    DeviceData(DeviceData),
    DeviceError(DeviceError),
}

impl DeviceEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::DeviceStatus(_) => EventKind::DeviceStatus,
            Self::DeviceReady(_) => EventKind::DeviceReady,
            Self::DeviceAck(_) => EventKind::DeviceAck,
            Self::DeviceSettings(_) => EventKind::DeviceSettings,
            Self::FeedbackInfo(_) => EventKind::FeedbackInfo,
            Self::AdcData(_) => EventKind::AdcData,
            Self::StatData(_) => EventKind::StatData,
            Self::DeviceData(_) => EventKind::DeviceData,
            Self::DeviceError(_) => EventKind::DeviceError,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    pub fn error(source: Option<TransportKind>, message: impl Into<String>) -> Self {
        Self::DeviceError(DeviceError {
            source,
            message: message.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_names_are_kebab_case() {
        let event = DeviceEvent::error(Some(TransportKind::Serial), "boom");
        assert_eq!(event.name(), "device-error");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            json!({"event": "device-error", "data": {"source": "serial", "message": "boom"}})
        );
    }

    #[test]
    fn test_link_status() {
        let status = DeviceStatus::link(TransportKind::Bluetooth, true);
        assert_eq!(status.status, "ble_connected");
        assert_eq!(status.via, Some(TransportKind::Bluetooth));

        let status = DeviceStatus::link(TransportKind::WebSocket, false);
        assert_eq!(status.status, "ws_disconnected");
        assert_eq!(status.online, Some(false));
    }

    #[test]
    fn test_status_serialization_skips_unset_fields() {
        let status = DeviceStatus::new("transport_mode_changed").with_transport_mode(TransportMode::Uart);
        let json = serde_json::to_value(DeviceEvent::DeviceStatus(status)).unwrap();
        let data = json["data"].as_object().unwrap();

        assert_eq!(data["status"], "transport_mode_changed");
        assert_eq!(data["transportMode"], "uart");
        assert!(data.contains_key("timestamp"));
        assert!(!data.contains_key("online"));
    }

    #[test]
    fn test_decoded_failure_keeps_raw_bytes() {
        let raw = [0u8; 46];
        let decoded = Decoded::new(FeedbackInfo::decode(&raw), &raw, TransportKind::Tcp);

        assert!(!decoded.is_ok());
        assert_eq!(decoded.raw.len(), 92);
        assert_eq!(
            decoded.error.as_deref(),
            Some("Invalid feedback payload: expected 47 bytes, got 46")
        );

        let json = serde_json::to_value(&decoded).unwrap();
        assert!(json.get("enabled").is_none());
        assert_eq!(json["source"], "tcp");
    }

    #[test]
    fn test_decoded_success_flattens_value() {
        let raw = FeedbackInfo::default().encode();
        let decoded = Decoded::new(FeedbackInfo::decode(&raw), &raw, TransportKind::WebSocket);
        let json = serde_json::to_value(&decoded).unwrap();

        assert!(decoded.is_ok());
        assert!(json.get("error").is_none());
        assert!(json.get("enabled").is_some());
    }
}
