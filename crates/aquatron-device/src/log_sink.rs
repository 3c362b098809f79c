//! Append-only activity log collaborator.
//!
//! The link records heartbeats, parameter deliveries and transport changes
//! through a [`LogSink`]. Appending never blocks and never fails from the
//! caller's point of view; a sink that cannot keep up drops records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub device_id: String,
    pub action: String,
    pub parameters: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl LogRecord {
    pub fn new(
        device_id: impl Into<String>,
        action: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            action: action.into(),
            parameters,
            timestamp: Utc::now(),
        }
    }
}

pub trait LogSink: Send + Sync {
    fn append(&self, record: LogRecord);
}

/// Emits every record as a `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn append(&self, record: LogRecord) {
        info!(
            device_id = %record.device_id,
            action = %record.action,
            parameters = %record.parameters,
            "Activity log"
        );
    }
}

/// Forwards records to a bounded channel; records are dropped when it is
/// full or closed.
#[derive(Debug, Clone)]
pub struct ChannelLogSink {
    tx: mpsc::Sender<LogRecord>,
}

impl ChannelLogSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LogRecord>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl LogSink for ChannelLogSink {
    fn append(&self, record: LogRecord) {
        if let Err(e) = self.tx.try_send(record) {
            warn!(error = %e, "Dropping activity log record");
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn append(&self, _record: LogRecord) {}
}
