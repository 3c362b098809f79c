//! Device link for the Aquatron instrument.
//!
//! [`DeviceLink`] is the surface the API layer talks to. It owns the
//! transport router, the event bus and the request correlator, and exposes
//! the command operations as async methods:
//!
//! ```no_run
//! use aquatron_device::{CallOptions, DeviceLink, LinkConfig};
//!
//! # async fn run() -> aquatron_core::Result<()> {
//! let (link, handle) = DeviceLink::builder(LinkConfig::from_env()?).start();
//!
//! let ready = link.get_device_status(&CallOptions::new()).await?;
//! println!("device {} ready via {}", ready.payload, ready.source);
//!
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod correlator;
pub mod events;
pub mod link;
pub mod log_sink;

pub use bus::{EventBus, HEARTBEAT_MESSAGE, READY_MESSAGE, frame_events};
pub use config::{LinkConfig, Timeouts};
pub use correlator::{Correlator, PendingResponse, Reservation};
pub use events::{
    AdcData, Decoded, DeviceAck, DeviceData, DeviceError, DeviceEvent, DeviceReady, DeviceStatus,
    EventKind, StatData,
};
pub use link::{CallOptions, CommandReply, DeviceLink, DeviceLinkBuilder, LinkHandle, ReadyReply};
pub use log_sink::{ChannelLogSink, LogRecord, LogSink, NullLogSink, TracingLogSink};
