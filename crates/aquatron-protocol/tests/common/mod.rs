//! Common helpers shared by the protocol integration tests.

#![allow(dead_code)]

use aquatron_protocol::{CommandCode, Frame};

/// Wire bytes of a frame, panicking on oversize payloads.
pub fn frame_bytes(cmd: CommandCode, payload: &[u8]) -> Vec<u8> {
    Frame::encode(cmd, payload)
        .expect("test payload fits one frame")
        .as_bytes()
        .to_vec()
}

/// Concatenate several frames into one contiguous buffer.
pub fn concat_frames(frames: &[Frame]) -> Vec<u8> {
    frames.iter().flat_map(|f| f.as_bytes().to_vec()).collect()
}

/// Assert that a decoded frame carries the expected command and payload.
pub fn assert_frame(frame: &Frame, cmd: CommandCode, payload: &[u8]) {
    assert_eq!(frame.command(), Some(cmd), "unexpected command in {frame}");
    assert_eq!(frame.payload(), payload, "unexpected payload in {frame}");
}
