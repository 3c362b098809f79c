//! Integration tests for `PacketCodec` over Tokio streams.

mod common;

use aquatron_protocol::{CommandCode, FeedbackInfo, Frame, PacketCodec};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::codec::{Framed, FramedRead};

fn create_framed_duplex(
    buffer_size: usize,
) -> (
    Framed<DuplexStream, PacketCodec>,
    Framed<DuplexStream, PacketCodec>,
) {
    let (host, instrument) = tokio::io::duplex(buffer_size);
    (
        Framed::new(host, PacketCodec::new()),
        Framed::new(instrument, PacketCodec::new()),
    )
}

#[tokio::test]
async fn test_codec_request_response() {
    let (mut host, mut instrument) = create_framed_duplex(1024);

    host.send(aquatron_protocol::ready_request()).await.unwrap();
    let request = instrument.next().await.unwrap().unwrap();
    common::assert_frame(&request, CommandCode::GetDeviceReady, &[]);

    instrument
        .send(Frame::command_only(CommandCode::DeviceIsReady))
        .await
        .unwrap();
    let reply = host.next().await.unwrap().unwrap();
    common::assert_frame(&reply, CommandCode::DeviceIsReady, &[]);
}

#[tokio::test]
async fn test_codec_max_size_payload() {
    let (mut host, mut instrument) = create_framed_duplex(1024);
    let payload = FeedbackInfo::default().encode();

    instrument
        .send(Frame::encode(CommandCode::FeedbackInfo, &payload).unwrap())
        .await
        .unwrap();

    let frame = host.next().await.unwrap().unwrap();
    assert_eq!(frame.payload_len(), 47);
    assert_eq!(FeedbackInfo::decode(frame.payload()).unwrap(), FeedbackInfo::default());
}

#[tokio::test]
async fn test_codec_multiple_frames_in_sequence() {
    let (mut host, mut instrument) = create_framed_duplex(4096);

    for i in 0..10u8 {
        instrument
            .send(Frame::encode(CommandCode::AdcData, &[i, 0]).unwrap())
            .await
            .unwrap();
    }

    for i in 0..10u8 {
        let frame = host.next().await.unwrap().unwrap();
        common::assert_frame(&frame, CommandCode::AdcData, &[i, 0]);
    }
}

#[tokio::test]
async fn test_framed_read_handles_fragmented_writes() {
    let (mut writer, reader) = tokio::io::duplex(64);
    let mut frames = FramedRead::new(reader, PacketCodec::new());

    let bytes = common::frame_bytes(CommandCode::DeviceOnline, &[0xDE, 0xAD, 0xBE, 0xEF]);
    tokio::spawn(async move {
        for chunk in bytes.chunks(3) {
            writer.write_all(chunk).await.unwrap();
            tokio::task::yield_now().await;
        }
    });

    let frame = frames.next().await.unwrap().unwrap();
    common::assert_frame(&frame, CommandCode::DeviceOnline, &[0xDE, 0xAD, 0xBE, 0xEF]);
}

#[tokio::test]
async fn test_framed_read_skips_noise_between_frames() {
    let mut data = b"boot log line\r\n".to_vec();
    data.extend(common::frame_bytes(CommandCode::DeviceIsReady, &[]));
    data.extend_from_slice(&[0xAA, 0x05, 0x01, 0x01, 0x00, 0x55]);
    data.extend(common::frame_bytes(CommandCode::DataAck, &[0x01]));

    let frames: Vec<_> = FramedRead::new(&data[..], PacketCodec::new())
        .map(|result| result.unwrap())
        .collect()
        .await;

    assert_eq!(frames.len(), 2);
    common::assert_frame(&frames[0], CommandCode::DeviceIsReady, &[]);
    common::assert_frame(&frames[1], CommandCode::DataAck, &[0x01]);
}

#[tokio::test]
async fn test_stream_closes_cleanly() {
    let (host, instrument) = create_framed_duplex(256);
    drop(instrument);

    let mut host = host;
    assert!(host.next().await.is_none());
}
