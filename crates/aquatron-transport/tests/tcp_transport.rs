//! Integration tests for TcpTransport
//!
//! A local TcpListener plays the instrument's TCP bridge.

use aquatron_core::TransportKind;
use aquatron_protocol::{CommandCode, Frame, PacketCodec};
use aquatron_transport::{EventSink, TcpConfig, TcpTransport, Transport, TransportError, TransportEvent};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

async fn next_event(rx: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event channel closed")
}

fn config_for(port: u16) -> TcpConfig {
    TcpConfig {
        connect_timeout: Duration::from_millis(500),
        reconnect_delay: Duration::from_millis(50),
        ..TcpConfig::new("127.0.0.1", port)
    }
}

fn spawn_transport(
    transport: &Arc<TcpTransport>,
) -> (mpsc::Receiver<TransportEvent>, CancellationToken, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(32);
    let shutdown = CancellationToken::new();
    let task = {
        let transport = Arc::clone(transport);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            transport
                .run(EventSink::new(TransportKind::Tcp, tx), shutdown)
                .await
        })
    };
    (rx, shutdown, task)
}

/// Connect, write a request, receive the reply as a frame event.
#[tokio::test]
async fn test_exchange_frames_with_bridge() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, PacketCodec::new());

        let request = framed.next().await.unwrap().unwrap();
        assert_eq!(request.command(), Some(CommandCode::GetDeviceReady));
        framed
            .send(Frame::command_only(CommandCode::DeviceIsReady))
            .await
            .unwrap();
        // Hold the connection open until the client goes away.
        while framed.next().await.is_some() {}
    });

    let transport = Arc::new(TcpTransport::new(config_for(port)));
    assert!(!transport.is_ready());
    let (mut rx, shutdown, task) = spawn_transport(&transport);

    assert!(matches!(
        next_event(&mut rx).await,
        TransportEvent::Connected { source: TransportKind::Tcp, .. }
    ));
    assert!(transport.is_ready());

    transport
        .send(Frame::command_only(CommandCode::GetDeviceReady).as_bytes())
        .await
        .unwrap();

    match next_event(&mut rx).await {
        TransportEvent::Frame { source, frame } => {
            assert_eq!(source, TransportKind::Tcp);
            assert_eq!(frame.command(), Some(CommandCode::DeviceIsReady));
        }
        other => panic!("expected frame, got {other:?}"),
    }

    shutdown.cancel();
    task.await.unwrap();
    assert!(!transport.is_ready());
    server.await.unwrap();
}

/// Bytes split across writes and surrounded by noise still yield frames.
#[tokio::test]
async fn test_fragmented_stream_from_bridge() {
    use tokio::io::AsyncWriteExt;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let frame = Frame::encode(CommandCode::AdcData, &[0x10, 0x00, 0x20, 0x00]).unwrap();
    let bytes = frame.as_bytes().to_vec();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(&[0x13, 0x37]).await.unwrap();
        for chunk in bytes.chunks(3) {
            stream.write_all(chunk).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let transport = Arc::new(TcpTransport::new(config_for(port)));
    let (mut rx, shutdown, task) = spawn_transport(&transport);

    assert!(matches!(next_event(&mut rx).await, TransportEvent::Connected { .. }));
    match next_event(&mut rx).await {
        TransportEvent::Frame { frame: received, .. } => assert_eq!(received, frame),
        other => panic!("expected frame, got {other:?}"),
    }

    shutdown.cancel();
    task.await.unwrap();
}

/// The transport dials again after the bridge drops the connection.
#[tokio::test]
async fn test_reconnects_after_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (first, _) = listener.accept().await.unwrap();
        drop(first);
        let (_second, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let transport = Arc::new(TcpTransport::new(config_for(port)));
    let (mut rx, shutdown, task) = spawn_transport(&transport);

    assert!(matches!(next_event(&mut rx).await, TransportEvent::Connected { .. }));
    assert!(matches!(
        next_event(&mut rx).await,
        TransportEvent::Disconnected { source: TransportKind::Tcp }
    ));
    assert!(matches!(next_event(&mut rx).await, TransportEvent::Connected { .. }));
    assert!(transport.is_ready());

    shutdown.cancel();
    task.await.unwrap();
}

/// Refused connections become error events, never a task failure.
#[tokio::test]
async fn test_connect_failure_reported_as_event() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let transport = Arc::new(TcpTransport::new(config_for(port)));
    let (mut rx, shutdown, task) = spawn_transport(&transport);

    assert!(matches!(
        next_event(&mut rx).await,
        TransportEvent::Error { source: TransportKind::Tcp, .. }
    ));
    assert!(!transport.is_ready());

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_send_while_disconnected() {
    let transport = TcpTransport::new(TcpConfig::default());
    let err = transport.send(&[0xAA, 0x02, 0x00, 0xA8, 0x55]).await.unwrap_err();
    assert!(matches!(err, TransportError::NotConnected(TransportKind::Tcp)));
    assert_eq!(err.to_string(), "TCP not connected");
}
