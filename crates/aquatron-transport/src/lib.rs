//! Physical links to the Aquatron instrument.
//!
//! Every adapter speaks the same framed protocol and implements
//! [`Transport`]. Each one owns its own reassembly buffer and pushes
//! validated frames and lifecycle changes into a shared channel as
//! [`TransportEvent`]s. The [`TransportRouter`] picks the adapter for every
//! outbound packet.
//!
//! # Components
//!
//! - **SerialTransport**: UART through `serialport`
//! - **TcpTransport**: TCP bridge with reconnect
//! - **WebSocketTransport**: WiFi bridge with keepalive and reconnect
//! - **BleTransport**: Bluetooth-LE through `btleplug` (`ble` feature)
//! - **MockTransport**: in-memory adapter for tests
//!
//! # Example
//!
//! ```no_run
//! use aquatron_core::{TransportKind, TransportMode};
//! use aquatron_transport::{AnyTransport, EventSink, TcpConfig, TcpTransport, Transport, TransportRouter};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let tcp = Arc::new(AnyTransport::from(TcpTransport::new(TcpConfig::new("192.168.4.1", 3333))));
//! let router = TransportRouter::new([Arc::clone(&tcp)], TransportMode::Auto);
//!
//! let (tx, mut rx) = mpsc::channel(100);
//! let shutdown = CancellationToken::new();
//! tokio::spawn(async move { tcp.run(EventSink::new(TransportKind::Tcp, tx), shutdown).await });
//!
//! let outcome = router.send(&[0xAA, 0x02, 0x00, 0xA8, 0x55], None).await;
//! println!("sent: {}", outcome.sent);
//! while let Some(event) = rx.recv().await {
//!     println!("{event:?}");
//! }
//! # }
//! ```

mod any;
mod ble;
mod error;
mod events;
mod mock;
mod router;
mod serial;
mod tcp;
mod traits;
mod websocket;

pub use any::AnyTransport;
pub use ble::{BleConfig, BleTransport};
pub use error::{Result, TransportError};
pub use events::{EventSink, TransportEvent};
pub use mock::{MockTransport, MockTransportHandle};
pub use router::{SendOutcome, TransportRouter, TransportState, TransportStatus};
pub use serial::{SerialConfig, SerialTransport};
pub use tcp::{TcpConfig, TcpTransport};
pub use traits::Transport;
pub use websocket::{WebSocketTransport, WsConfig};
