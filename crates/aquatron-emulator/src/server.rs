//! TCP front end for an [`Instrument`].
//!
//! Every accepted connection shares the same instrument, so state written by
//! one host (settings, SW parameters) is visible to the next one. Each
//! connection optionally receives periodic heartbeats.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use aquatron_protocol::{Frame, PacketCodec};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::instrument::Instrument;

#[derive(Debug, Clone)]
pub struct EmulatorServer {
    instrument: Arc<Mutex<Instrument>>,
    heartbeat_interval: Option<Duration>,
}

impl EmulatorServer {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument: Arc::new(Mutex::new(instrument)),
            heartbeat_interval: None,
        }
    }

    /// Send `DEVICE_ONLINE` on every connection at this interval.
    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Shared instrument, for inspection or live changes.
    pub fn instrument(&self) -> Arc<Mutex<Instrument>> {
        Arc::clone(&self.instrument)
    }

    /// Accept connections until `shutdown` fires.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> io::Result<()> {
        info!(addr = %listener.local_addr()?, "Emulator listening");
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    let server = self.clone();
                    let shutdown = shutdown.clone();
                    connections.spawn(async move { server.handle(stream, peer, shutdown).await });
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        connections.shutdown().await;
        info!("Emulator stopped");
        Ok(())
    }

    async fn handle(&self, stream: TcpStream, peer: SocketAddr, shutdown: CancellationToken) {
        info!(peer = %peer, "Host connected");
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Could not set TCP_NODELAY");
        }

        let mut framed = Framed::new(stream, PacketCodec::new());
        let mut heartbeat = self.heartbeat_interval.map(tokio::time::interval);

        loop {
            let replies = tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick(heartbeat.as_mut()) => vec![self.heartbeat_frame()],
                frame = framed.next() => match frame {
                    Some(Ok(frame)) => {
                        debug!(peer = %peer, frame = %frame, "Host frame");
                        self.respond(&frame)
                    }
                    Some(Err(e)) => {
                        warn!(peer = %peer, error = %e, "Read failed");
                        break;
                    }
                    None => break,
                },
            };

            for reply in replies {
                if let Err(e) = framed.send(reply).await {
                    warn!(peer = %peer, error = %e, "Write failed");
                    return;
                }
            }
        }
        info!(peer = %peer, "Host disconnected");
    }

    fn respond(&self, frame: &Frame) -> Vec<Frame> {
        self.instrument.lock().respond(frame)
    }

    fn heartbeat_frame(&self) -> Frame {
        self.instrument.lock().heartbeat_frame()
    }
}

async fn tick(interval: Option<&mut tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aquatron_protocol::CommandCode;

    async fn start(server: EmulatorServer) -> (SocketAddr, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        tokio::spawn(server.serve(listener, shutdown.clone()));
        (addr, shutdown)
    }

    #[tokio::test]
    async fn test_answers_over_tcp() {
        let (addr, shutdown) = start(EmulatorServer::new(Instrument::new())).await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut framed = Framed::new(stream, PacketCodec::new());

        framed
            .send(Frame::command_only(CommandCode::GetFeedbackInfo))
            .await
            .unwrap();
        let reply = framed.next().await.unwrap().unwrap();
        assert_eq!(reply.command(), Some(CommandCode::FeedbackInfo));
        assert_eq!(reply.payload_len(), 47);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_heartbeat() {
        let server = EmulatorServer::new(Instrument::builder().with_device_id(vec![0x07]).build())
            .with_heartbeat(Duration::from_millis(20));
        let (addr, shutdown) = start(server).await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut framed = Framed::new(stream, PacketCodec::new());

        for _ in 0..2 {
            let frame = framed.next().await.unwrap().unwrap();
            assert_eq!(frame.command(), Some(CommandCode::DeviceOnline));
            assert_eq!(frame.payload(), &[0x07]);
        }
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_delivered_state_is_visible() {
        let server = EmulatorServer::new(Instrument::new());
        let instrument = server.instrument();
        let (addr, shutdown) = start(server).await;

        let payload = aquatron_protocol::payload::sw_params::encode(&[
            aquatron_core::ElementSpec::new("Mg", 3),
        ])
        .unwrap();
        let mut host = Framed::new(TcpStream::connect(addr).await.unwrap(), PacketCodec::new());
        host
            .send(Frame::encode(CommandCode::SendSwParameters, &payload).unwrap())
            .await
            .unwrap();
        assert_eq!(
            host.next().await.unwrap().unwrap().command(),
            Some(CommandCode::DataAck)
        );

        assert_eq!(instrument.lock().elements()[0].symbol, "Mg");
        shutdown.cancel();
    }
}
