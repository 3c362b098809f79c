pub mod codec;
pub mod commands;
pub mod frame;
pub mod payload;
pub mod reassembler;

pub use codec::PacketCodec;
pub use commands::CommandCode;
pub use frame::{Frame, ScanOutcome, calculate_checksum, scan, scan_first, to_hex};
pub use payload::{CountMismatch, DeviceSettingsReport, FeedbackInfo};
pub use reassembler::{DrainFrames, Reassembler};

/// Frame asking the instrument whether it is ready.
pub fn ready_request() -> Frame {
    Frame::command_only(CommandCode::GetDeviceReady)
}

/// Bytes of the feedback-info request: a ready probe immediately followed by
/// `GET_FEEDBACK_INFO`, sent as a single transmission.
///
/// ```
/// let bytes = aquatron_protocol::feedback_request();
/// assert_eq!(&bytes[5..], &[0xAA, 0x09, 0x00, 0xA3, 0x55]);
/// ```
pub fn feedback_request() -> Vec<u8> {
    let mut bytes = ready_request().as_bytes().to_vec();
    bytes.extend_from_slice(Frame::command_only(CommandCode::GetFeedbackInfo).as_bytes());
    bytes
}
