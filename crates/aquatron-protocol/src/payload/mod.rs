//! Payload codecs for the structured commands.
//!
//! Every multi-byte field is little-endian. Encoders validate their input
//! before producing bytes; size limits of the surrounding frame are enforced
//! by [`Frame::encode`](crate::Frame::encode), not here.

pub mod adc;
pub mod feedback;
pub mod settings;
pub mod sw_params;

pub use adc::decode_adc_samples;
pub use feedback::FeedbackInfo;
pub use settings::{CountMismatch, DeviceSettingsReport};

/// Decode a fixed-width ASCII symbol, dropping `0x00` padding.
pub(crate) fn decode_symbol(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| b as char)
        .collect()
}

/// Encode `symbol` into `width` bytes, padding with `0x00`.
///
/// Returns `None` for empty, over-long or non-ASCII symbols.
pub(crate) fn encode_symbol<const N: usize>(symbol: &str) -> Option<[u8; N]> {
    if symbol.is_empty() || symbol.len() > N || !symbol.is_ascii() {
        return None;
    }
    let mut out = [0u8; N];
    out[..symbol.len()].copy_from_slice(symbol.as_bytes());
    Some(out)
}
