//! ADC telemetry payload (command 0x0B).

/// Decode little-endian `u16` samples; a trailing odd byte is ignored.
///
/// ```
/// use aquatron_protocol::payload::decode_adc_samples;
///
/// assert_eq!(decode_adc_samples(&[0x01, 0x02, 0xFF, 0x0F, 0x99]), vec![0x0201, 0x0FFF]);
/// ```
pub fn decode_adc_samples(payload: &[u8]) -> Vec<u16> {
    payload
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode samples (instrument side).
pub fn encode_adc_samples(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload() {
        assert!(decode_adc_samples(&[]).is_empty());
        assert!(decode_adc_samples(&[0x7F]).is_empty());
    }

    #[test]
    fn test_encode_matches_decode() {
        let samples = vec![0, 1, 2048, 4095, u16::MAX];
        assert_eq!(decode_adc_samples(&encode_adc_samples(&samples)), samples);
    }
}
