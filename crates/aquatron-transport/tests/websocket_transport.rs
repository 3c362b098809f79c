//! Integration tests for WebSocketTransport against a local
//! tokio-tungstenite server.

use aquatron_core::TransportKind;
use aquatron_protocol::{CommandCode, Frame};
use aquatron_transport::{EventSink, Transport, TransportEvent, WebSocketTransport, WsConfig};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

async fn next_event(rx: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event channel closed")
}

fn spawn_transport(
    transport: &Arc<WebSocketTransport>,
) -> (mpsc::Receiver<TransportEvent>, CancellationToken, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(32);
    let shutdown = CancellationToken::new();
    let task = {
        let transport = Arc::clone(transport);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            transport
                .run(EventSink::new(TransportKind::WebSocket, tx), shutdown)
                .await
        })
    };
    (rx, shutdown, task)
}

/// A frame split across two binary messages is reassembled, and packets
/// written by the transport arrive as binary messages.
#[tokio::test]
async fn test_binary_exchange() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let reply = Frame::encode(CommandCode::DataAck, &[0x04]).unwrap();
    let reply_bytes = reply.as_bytes().to_vec();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let request = loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Binary(data) => break data,
                _ => continue,
            }
        };

        let (head, tail) = reply_bytes.split_at(3);
        ws.send(Message::Binary(head.to_vec())).await.unwrap();
        ws.send(Message::Binary(tail.to_vec())).await.unwrap();
        while ws.next().await.is_some() {}
        request
    });

    let config = WsConfig::new(WsConfig::build_url("127.0.0.1", port, "ws", false));
    let transport = Arc::new(WebSocketTransport::new(config));
    let (mut rx, shutdown, task) = spawn_transport(&transport);

    assert!(matches!(
        next_event(&mut rx).await,
        TransportEvent::Connected { source: TransportKind::WebSocket, .. }
    ));
    assert!(transport.is_ready());

    let request = Frame::command_only(CommandCode::GetDeviceSettings);
    transport.send(request.as_bytes()).await.unwrap();

    match next_event(&mut rx).await {
        TransportEvent::Frame { frame, .. } => assert_eq!(frame, reply),
        other => panic!("expected frame, got {other:?}"),
    }

    shutdown.cancel();
    task.await.unwrap();
    assert!(!transport.is_ready());
    assert_eq!(server.await.unwrap(), request.as_bytes());
}

/// Text messages are fed to the same reassembler as binary ones.
#[tokio::test]
async fn test_text_noise_then_binary_frame() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Text("noise".to_string())).await.unwrap();
        let frame = Frame::encode(CommandCode::StatData, b"OK").unwrap();
        ws.send(Message::Binary(frame.as_bytes().to_vec()))
            .await
            .unwrap();
        while ws.next().await.is_some() {}
    });

    let transport = Arc::new(WebSocketTransport::new(WsConfig::new(format!(
        "ws://127.0.0.1:{port}"
    ))));
    let (mut rx, shutdown, task) = spawn_transport(&transport);

    assert!(matches!(next_event(&mut rx).await, TransportEvent::Connected { .. }));
    match next_event(&mut rx).await {
        TransportEvent::Frame { frame: received, .. } => {
            assert_eq!(received.command(), Some(CommandCode::StatData));
            assert_eq!(received.payload(), b"OK");
        }
        other => panic!("expected frame, got {other:?}"),
    }

    shutdown.cancel();
    task.await.unwrap();
}

/// A peer that never answers pings is dropped after the pong timeout.
#[tokio::test]
async fn test_pong_timeout_drops_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        // Never polled, so pings are never answered.
        let _ws = accept_async(stream).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let config = WsConfig {
        ping_interval: Duration::from_millis(50),
        pong_timeout: Duration::from_millis(120),
        reconnect_delay: Duration::from_secs(10),
        ..WsConfig::new(format!("ws://127.0.0.1:{port}"))
    };
    let transport = Arc::new(WebSocketTransport::new(config));
    let (mut rx, shutdown, task) = spawn_transport(&transport);

    assert!(matches!(next_event(&mut rx).await, TransportEvent::Connected { .. }));
    assert!(matches!(
        next_event(&mut rx).await,
        TransportEvent::Disconnected { source: TransportKind::WebSocket }
    ));
    assert!(!transport.is_ready());

    shutdown.cancel();
    task.await.unwrap();
}

/// Dial failures are reported with the `ws-error:` prefix.
#[tokio::test]
async fn test_connect_failure_reported_as_event() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let transport = Arc::new(WebSocketTransport::new(WsConfig::new(format!(
        "ws://127.0.0.1:{port}"
    ))));
    let (mut rx, shutdown, task) = spawn_transport(&transport);

    match next_event(&mut rx).await {
        TransportEvent::Error { source, message } => {
            assert_eq!(source, TransportKind::WebSocket);
            assert!(message.starts_with("ws-error: "), "{message}");
        }
        other => panic!("expected error, got {other:?}"),
    }

    shutdown.cancel();
    task.await.unwrap();
}
