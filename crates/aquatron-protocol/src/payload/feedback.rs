//! Feedback-info payload (command 0x0A).
//!
//! Fixed 47-byte little-endian structure:
//!
//! ```text
//! enabled u8 | tolerance f32 | correction_factor u8 (/100) | max_iterations u8
//! settle_delay u16 | total_corrections u32 | successful_corrections u32
//! failed_corrections u32 | total_iterations u32 | avg_error_before f32
//! avg_error_after f32 | adc_vref f32 | adc_resolution u16 | dac_resolution u16
//! last_target_voltage f32 | success_rate u16 (/100)
//! ```

use aquatron_core::{Error, Result, constants::FEEDBACK_INFO_LEN};
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// Scale of the percentage-like integer fields.
const PERCENT_SCALE: f32 = 100.0;

/// Closed-loop voltage correction statistics reported by the instrument.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeedbackInfo {
    pub enabled: bool,
    pub tolerance: f32,
    pub correction_factor: f32,
    pub max_iterations: u8,
    pub settle_delay: u16,
    pub total_corrections: u32,
    pub successful_corrections: u32,
    pub failed_corrections: u32,
    pub total_iterations: u32,
    pub avg_error_before: f32,
    pub avg_error_after: f32,
    pub adc_vref: f32,
    pub adc_resolution: u16,
    pub dac_resolution: u16,
    pub last_target_voltage: f32,
    pub success_rate: f32,
}

impl FeedbackInfo {
    /// Decode a 47-byte payload.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidFeedbackPayload`] for any other length.
    ///
    /// ```
    /// use aquatron_protocol::FeedbackInfo;
    ///
    /// assert!(FeedbackInfo::decode(&[0u8; 47]).is_ok());
    /// assert!(FeedbackInfo::decode(&[0u8; 46]).is_err());
    /// ```
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() != FEEDBACK_INFO_LEN {
            return Err(Error::InvalidFeedbackPayload {
                expected: FEEDBACK_INFO_LEN,
                actual: payload.len(),
            });
        }

        let mut buf = payload;
        Ok(Self {
            enabled: buf.get_u8() != 0,
            tolerance: buf.get_f32_le(),
            correction_factor: buf.get_u8() as f32 / PERCENT_SCALE,
            max_iterations: buf.get_u8(),
            settle_delay: buf.get_u16_le(),
            total_corrections: buf.get_u32_le(),
            successful_corrections: buf.get_u32_le(),
            failed_corrections: buf.get_u32_le(),
            total_iterations: buf.get_u32_le(),
            avg_error_before: buf.get_f32_le(),
            avg_error_after: buf.get_f32_le(),
            adc_vref: buf.get_f32_le(),
            adc_resolution: buf.get_u16_le(),
            dac_resolution: buf.get_u16_le(),
            last_target_voltage: buf.get_f32_le(),
            success_rate: buf.get_u16_le() as f32 / PERCENT_SCALE,
        })
    }

    /// Encode into the 47-byte wire layout (instrument side).
    ///
    /// Scaled fields are rounded to the nearest hundredth and saturate at
    /// their integer range.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FEEDBACK_INFO_LEN);
        buf.put_u8(self.enabled as u8);
        buf.put_f32_le(self.tolerance);
        buf.put_u8((self.correction_factor * PERCENT_SCALE).round().clamp(0.0, u8::MAX as f32) as u8);
        buf.put_u8(self.max_iterations);
        buf.put_u16_le(self.settle_delay);
        buf.put_u32_le(self.total_corrections);
        buf.put_u32_le(self.successful_corrections);
        buf.put_u32_le(self.failed_corrections);
        buf.put_u32_le(self.total_iterations);
        buf.put_f32_le(self.avg_error_before);
        buf.put_f32_le(self.avg_error_after);
        buf.put_f32_le(self.adc_vref);
        buf.put_u16_le(self.adc_resolution);
        buf.put_u16_le(self.dac_resolution);
        buf.put_f32_le(self.last_target_voltage);
        buf.put_u16_le((self.success_rate * PERCENT_SCALE).round().clamp(0.0, u16::MAX as f32) as u16);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sample() -> FeedbackInfo {
        FeedbackInfo {
            enabled: true,
            tolerance: 0.05,
            correction_factor: 0.75,
            max_iterations: 8,
            settle_delay: 150,
            total_corrections: 1200,
            successful_corrections: 1150,
            failed_corrections: 50,
            total_iterations: 4100,
            avg_error_before: 0.12,
            avg_error_after: 0.01,
            adc_vref: 3.3,
            adc_resolution: 4096,
            dac_resolution: 4096,
            last_target_voltage: 2.2,
            success_rate: 95.83,
        }
    }

    #[test]
    fn test_encoded_length() {
        assert_eq!(sample().encode().len(), FEEDBACK_INFO_LEN);
    }

    #[test]
    fn test_decode_field_offsets() {
        let bytes = sample().encode();
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[5], 75);
        assert_eq!(bytes[6], 8);
        assert_eq!(&bytes[9..13], &1200u32.to_le_bytes());
        assert_eq!(&bytes[45..47], &9583u16.to_le_bytes());
    }

    #[test]
    fn test_decode_encoded_sample() {
        let info = FeedbackInfo::decode(&sample().encode()).unwrap();
        assert!(info.enabled);
        assert!((info.correction_factor - 0.75).abs() < 1e-6);
        assert_eq!(info.failed_corrections, 50);
        assert_eq!(info.adc_resolution, 4096);
        assert!((info.success_rate - 95.83).abs() < 1e-4);
        assert!((info.adc_vref - 3.3).abs() < 1e-6);
    }

    #[rstest]
    #[case(0)]
    #[case(46)]
    #[case(48)]
    fn test_decode_wrong_length(#[case] len: usize) {
        let result = FeedbackInfo::decode(&vec![0u8; len]);
        assert!(matches!(
            result,
            Err(Error::InvalidFeedbackPayload { expected: 47, actual }) if actual == len
        ));
    }
}
