//! Event bus: turns transport events into [`DeviceEvent`]s, offers each one
//! to the correlator and broadcasts it.
//!
//! | cmd  | published                                              |
//! |------|--------------------------------------------------------|
//! | 0x01 | `device-status` (heartbeat) + `device-data` (heartbeat)|
//! | 0x03 | `device-ready` + `device-status` (device_ready)        |
//! | 0x05 | `device-ack`                                           |
//! | 0x08 | `device-settings`                                      |
//! | 0x0A | `feedback-info`                                        |
//! | 0x0B | `adc-data`                                             |
//! | 0x0C | `stat-data`                                            |
//! | else | `device-data`                                          |

use crate::correlator::Correlator;
use crate::events::{
    AdcData, Decoded, DeviceAck, DeviceData, DeviceEvent, DeviceReady, DeviceStatus, StatData,
};
use crate::log_sink::{LogRecord, LogSink};
use aquatron_core::TransportKind;
use aquatron_protocol::payload::{decode_adc_samples, settings};
use aquatron_protocol::{CommandCode, FeedbackInfo, Frame};
use aquatron_transport::TransportEvent;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

pub const HEARTBEAT_MESSAGE: &str = "Device heartbeat - ready for commands";
pub const READY_MESSAGE: &str = "Device ready for next command";

pub struct EventBus {
    tx: broadcast::Sender<DeviceEvent>,
    correlator: Correlator,
    log_sink: Arc<dyn LogSink>,
    /// Payload of the last heartbeat or ready frame.
    device_id: Mutex<Option<String>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.tx.receiver_count())
            .field("correlator", &self.correlator)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new(capacity: usize, correlator: Correlator, log_sink: Arc<dyn LogSink>) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            correlator,
            log_sink,
            device_id: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.tx.subscribe()
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn log_sink(&self) -> &Arc<dyn LogSink> {
        &self.log_sink
    }

    /// Identifier announced by the instrument, empty until one is seen.
    pub fn device_id(&self) -> String {
        self.device_id.lock().clone().unwrap_or_default()
    }

    /// Offer to the correlator, then broadcast. No subscribers is fine.
    pub fn publish(&self, event: DeviceEvent) {
        trace!(event = event.name(), "Publishing device event");
        self.correlator.resolve(&event);
        let _ = self.tx.send(event);
    }

    pub fn dispatch(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { source, detail } => {
                info!(source = %source, detail = %detail, "Transport connected");
                self.publish(DeviceEvent::DeviceStatus(DeviceStatus::link(source, true)));
            }
            TransportEvent::Disconnected { source } => {
                info!(source = %source, "Transport disconnected");
                self.publish(DeviceEvent::DeviceStatus(DeviceStatus::link(source, false)));
            }
            TransportEvent::Unavailable { source, reason } => {
                warn!(source = %source, reason = %reason, "Transport unavailable");
                let status = DeviceStatus::new(format!("{}_unavailable", source.status_prefix()))
                    .with_online(false)
                    .with_via(source)
                    .with_message(reason);
                self.publish(DeviceEvent::DeviceStatus(status));
            }
            TransportEvent::Frame { source, frame } => self.handle_frame(source, &frame),
            TransportEvent::Error { source, message } => {
                warn!(source = %source, error = %message, "Transport error");
                self.publish(DeviceEvent::error(Some(source), message));
            }
        }
    }

    pub fn handle_frame(&self, source: TransportKind, frame: &Frame) {
        debug!(source = %source, cmd = frame.cmd(), len = frame.payload_len(), "Frame received");

        let announces_id = matches!(
            frame.command(),
            Some(CommandCode::DeviceOnline | CommandCode::DeviceIsReady)
        );
        if announces_id && frame.payload_len() > 0 {
            *self.device_id.lock() = Some(frame.payload_hex());
        }

        if frame.command() == Some(CommandCode::DeviceOnline) {
            let payload = frame.payload_hex();
            self.log_sink.append(LogRecord::new(
                payload.clone(),
                "Device Heartbeat",
                json!({ "payload": payload, "source": source }),
            ));
        }

        for event in frame_events(source, frame) {
            self.publish(event);
        }
    }
}

/// Events for one inbound frame, in publication order.
pub fn frame_events(source: TransportKind, frame: &Frame) -> Vec<DeviceEvent> {
    let payload = frame.payload();
    let payload_hex = frame.payload_hex();

    match frame.command() {
        Some(CommandCode::DeviceOnline) => vec![
            DeviceEvent::DeviceStatus(
                DeviceStatus::new("heartbeat_received")
                    .with_online(true)
                    .with_source(source)
                    .with_payload(payload_hex.clone())
                    .with_message(HEARTBEAT_MESSAGE),
            ),
            DeviceEvent::DeviceData(DeviceData {
                data_type: Some("heartbeat".to_string()),
                cmd: frame.cmd(),
                payload: payload_hex.clone(),
                device_id: Some(payload_hex),
                status: Some("heartbeat_received".to_string()),
                source,
                timestamp: Utc::now(),
            }),
        ],
        Some(CommandCode::DeviceIsReady) => vec![
            DeviceEvent::DeviceReady(DeviceReady {
                ready: true,
                payload: payload_hex.clone(),
                device_id: payload_hex.clone(),
                source,
                status: "device_ready".to_string(),
                message: READY_MESSAGE.to_string(),
                timestamp: Utc::now(),
            }),
            DeviceEvent::DeviceStatus(
                DeviceStatus::new("device_ready")
                    .with_online(true)
                    .with_ready(true)
                    .with_source(source)
                    .with_payload(payload_hex)
                    .with_message(READY_MESSAGE),
            ),
        ],
        Some(CommandCode::DataAck) => vec![DeviceEvent::DeviceAck(DeviceAck {
            ack: true,
            payload: payload_hex,
            source,
        })],
        Some(CommandCode::DeviceSettings) => vec![DeviceEvent::DeviceSettings(Decoded::new(
            settings::decode_report(payload),
            payload,
            source,
        ))],
        Some(CommandCode::FeedbackInfo) => vec![DeviceEvent::FeedbackInfo(Decoded::new(
            FeedbackInfo::decode(payload),
            payload,
            source,
        ))],
        Some(CommandCode::AdcData) => vec![DeviceEvent::AdcData(AdcData {
            samples: decode_adc_samples(payload),
            source,
        })],
        Some(CommandCode::StatData) => vec![DeviceEvent::StatData(StatData {
            payload: payload_hex,
            source,
        })],
        _ => vec![DeviceEvent::DeviceData(DeviceData {
            data_type: None,
            cmd: frame.cmd(),
            payload: payload_hex,
            device_id: None,
            status: None,
            source,
            timestamp: Utc::now(),
        })],
    }
}
