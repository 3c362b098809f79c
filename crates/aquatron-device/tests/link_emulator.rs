//! End-to-end: DeviceLink over TCP against the emulated instrument.

use std::sync::Arc;
use std::time::Duration;

use aquatron_core::{DeviceSettings, ElementSpec, Harmonic, TransportKind, VoutEntry};
use aquatron_device::{
    CallOptions, ChannelLogSink, DeviceEvent, DeviceLink, LinkConfig, LinkHandle, LogRecord,
    Timeouts,
};
use aquatron_emulator::{EmulatorServer, Instrument};
use aquatron_transport::TcpConfig;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Bench {
    link: DeviceLink,
    handle: LinkHandle,
    instrument: Arc<Mutex<Instrument>>,
    records: mpsc::Receiver<LogRecord>,
    emulator: CancellationToken,
}

impl Bench {
    async fn start(server: EmulatorServer) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let instrument = server.instrument();
        let emulator = CancellationToken::new();
        tokio::spawn(server.serve(listener, emulator.clone()));

        let config = LinkConfig {
            tcp: Some(TcpConfig::new("127.0.0.1", port)),
            timeouts: Timeouts {
                status_probe: Duration::from_millis(500),
                command_ready: Duration::from_millis(500),
                settle_delay: Duration::from_millis(20),
                ..Timeouts::default()
            },
            ..LinkConfig::default()
        };
        let (sink, records) = ChannelLogSink::new(16);
        let (link, handle) = DeviceLink::builder(config)
            .with_log_sink(Arc::new(sink))
            .start();

        let via = link
            .wait_until_connected(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(via, TransportKind::Tcp);

        Self {
            link,
            handle,
            instrument,
            records,
            emulator,
        }
    }

    async fn stop(self) {
        self.handle.shutdown().await;
        self.emulator.cancel();
    }
}

fn instrument() -> Instrument {
    Instrument::builder().with_device_id(vec![0x0A, 0x0B]).build()
}

#[tokio::test]
async fn test_status_probe() {
    let bench = Bench::start(EmulatorServer::new(instrument())).await;

    let reply = bench
        .link
        .get_device_status(&CallOptions::new())
        .await
        .unwrap();
    assert_eq!(reply.status, "ready");
    assert_eq!(reply.payload, "0A0B");
    assert_eq!(reply.source, TransportKind::Tcp);

    bench.stop().await;
}

#[tokio::test]
async fn test_sw_parameters_delivery() {
    let mut bench = Bench::start(EmulatorServer::new(instrument())).await;
    let elements = vec![ElementSpec::new("Li", 5), ElementSpec::new("K", 2)];

    let reply = bench
        .link
        .send_sw_parameters(&elements, &CallOptions::new())
        .await
        .unwrap();
    assert!(reply.sent);
    assert_eq!(reply.via, Some(TransportKind::Tcp));
    assert_eq!(reply.device_ready, Some(true));
    assert_eq!(reply.ready_payload.as_deref(), Some("0A0B"));
    assert_eq!(bench.instrument.lock().elements(), elements.as_slice());

    let record = bench.records.recv().await.unwrap();
    assert_eq!(record.action, "Send SW Parameters");
    assert_eq!(record.device_id, "0A0B");
    assert_eq!(record.parameters["elements"][0]["symbol"], "Li");

    bench.stop().await;
}

#[tokio::test]
async fn test_settings_round_trip() {
    let bench = Bench::start(EmulatorServer::new(instrument())).await;
    let wanted = DeviceSettings {
        freefall: -2,
        hptf: 10,
        harmonic: Harmonic::Half,
        duration_ms: 1000,
        vout_table: vec![VoutEntry::for_element("Li"), VoutEntry::for_element("Na")],
    };

    let reply = bench
        .link
        .set_device_settings(&wanted, &CallOptions::new())
        .await
        .unwrap();
    assert_eq!(reply.device_ready, Some(true));

    let decoded = bench
        .link
        .get_device_settings(&CallOptions::new())
        .await
        .unwrap();
    assert!(decoded.is_ok());
    let report = decoded.value.unwrap();
    assert_eq!(report.settings, wanted);
    assert!(report.count_mismatch.is_none());

    bench.stop().await;
}

#[tokio::test]
async fn test_feedback_info() {
    let bench = Bench::start(EmulatorServer::new(instrument())).await;

    let decoded = bench
        .link
        .get_feedback_info(&CallOptions::new())
        .await
        .unwrap();
    assert_eq!(decoded.raw.len(), 47 * 2);
    assert_eq!(
        decoded.value.as_ref(),
        Some(bench.instrument.lock().feedback())
    );

    bench.stop().await;
}

#[tokio::test]
async fn test_silent_instrument() {
    let server = EmulatorServer::new(instrument());
    server.instrument().lock().set_answer_ready(false);
    let bench = Bench::start(server).await;

    let err = bench
        .link
        .get_device_status(&CallOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let reply = bench
        .link
        .send_sw_parameters(&[ElementSpec::new("Ca", 1)], &CallOptions::new())
        .await
        .unwrap();
    assert!(reply.sent);
    assert_eq!(reply.device_ready, Some(false));
    assert_eq!(reply.error.as_deref(), Some("Device ready timeout"));
    assert_eq!(bench.link.correlator().pending_count(), 0);

    bench.stop().await;
}

#[tokio::test]
async fn test_heartbeat_is_broadcast() {
    let server = EmulatorServer::new(instrument()).with_heartbeat(Duration::from_millis(50));
    let mut bench = Bench::start(server).await;
    let mut events = bench.link.subscribe();

    let status = loop {
        match events.recv().await.unwrap() {
            DeviceEvent::DeviceStatus(status) if status.status == "heartbeat_received" => break status,
            _ => continue,
        }
    };
    assert_eq!(status.device_id.as_deref(), Some("0A0B"));

    let record = loop {
        let record = bench.records.recv().await.unwrap();
        if record.action == "Device Heartbeat" {
            break record;
        }
    };
    assert_eq!(record.parameters["source"], "tcp");

    bench.stop().await;
}
