//! Device-settings payloads.
//!
//! Two layouts share the same vout table encoding but differ in their header.
//!
//! Outbound, command 0x06 (8-byte header):
//!
//! ```text
//! freefall i16 | hptf i16 | harmonic u8 | duration u16 | count u8 | count × entry
//! ```
//!
//! Inbound, command 0x08 (10-byte header):
//!
//! ```text
//! freefall i16 | hptf i16 | fb_enabled u8 | fb_tolerance u8 | harmonic u8 | duration u16 | count u8 | count × entry
//! ```
//!
//! Each entry is 11 bytes: `sym[3] | vout_base f32 | freq u32`.

use super::{decode_symbol, encode_symbol};
use aquatron_core::{
    DeviceSettings, Error, Harmonic, Result, VoutEntry,
    constants::{SETTINGS_HEADER_LEN, SETTINGS_REPORT_HEADER_LEN, VOUT_ENTRY_LEN},
};
use serde::{Deserialize, Serialize};

/// Scale of the tolerance byte in the inbound header.
const TOLERANCE_SCALE: f32 = 1000.0;

/// Declared and actually parsed vout-table rows of a truncated report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountMismatch {
    pub declared: usize,
    pub parsed: usize,
}

/// Settings as reported back by the instrument.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceSettingsReport {
    #[serde(flatten)]
    pub settings: DeviceSettings,
    pub feedback_enabled: bool,
    pub feedback_tolerance: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_mismatch: Option<CountMismatch>,
}

/// Encode settings for command 0x06.
///
/// Symbols longer than 3 characters, empty or non-ASCII fail with
/// [`Error::InvalidElementSymbol`]. The result is `8 + 11 × N` bytes; tables
/// over 5 rows do not fit one frame and are rejected by `Frame::encode`.
///
/// ```
/// use aquatron_core::{DeviceSettings, Harmonic, VoutEntry};
/// use aquatron_protocol::payload::settings;
///
/// let payload = settings::encode(&DeviceSettings {
///     freefall: -2,
///     hptf: 10,
///     harmonic: Harmonic::Half,
///     duration_ms: 1000,
///     vout_table: vec![VoutEntry::for_element("Li")],
/// })
/// .unwrap();
/// assert_eq!(payload.len(), 19);
/// assert_eq!(&payload[..8], &[0xFE, 0xFF, 0x0A, 0x00, 0x01, 0xE8, 0x03, 0x01]);
/// ```
pub fn encode(settings: &DeviceSettings) -> Result<Vec<u8>> {
    let count = u8::try_from(settings.vout_table.len()).map_err(|_| Error::PayloadTooLarge {
        len: SETTINGS_HEADER_LEN + settings.vout_table.len() * VOUT_ENTRY_LEN,
        max: aquatron_core::constants::MAX_PAYLOAD_LEN,
    })?;

    let mut payload = Vec::with_capacity(SETTINGS_HEADER_LEN + count as usize * VOUT_ENTRY_LEN);
    payload.extend_from_slice(&settings.freefall.to_le_bytes());
    payload.extend_from_slice(&settings.hptf.to_le_bytes());
    payload.push(settings.harmonic.code());
    payload.extend_from_slice(&settings.duration_ms.to_le_bytes());
    payload.push(count);
    encode_vout_table(&settings.vout_table, &mut payload)?;

    Ok(payload)
}

/// Decode the outbound layout, as the instrument reads it.
pub fn decode(payload: &[u8]) -> Result<DeviceSettings> {
    if payload.len() < SETTINGS_HEADER_LEN {
        return Err(Error::InvalidSettingsPayload(format!(
            "header needs {} bytes, got {}",
            SETTINGS_HEADER_LEN,
            payload.len()
        )));
    }

    let harmonic = parse_harmonic(payload[4])?;
    let declared = payload[7] as usize;
    let (vout_table, mismatch) = decode_vout_table(&payload[SETTINGS_HEADER_LEN..], declared);
    if let Some(mismatch) = mismatch {
        return Err(Error::InvalidSettingsPayload(format!(
            "declared {} vout entries, found {}",
            mismatch.declared, mismatch.parsed
        )));
    }

    Ok(DeviceSettings {
        freefall: i16::from_le_bytes([payload[0], payload[1]]),
        hptf: i16::from_le_bytes([payload[2], payload[3]]),
        harmonic,
        duration_ms: u16::from_le_bytes([payload[5], payload[6]]),
        vout_table,
    })
}

/// Decode the inbound report of command 0x08.
///
/// A truncated vout table is not an error: parsing stops at the last
/// complete row and [`DeviceSettingsReport::count_mismatch`] records the
/// difference.
pub fn decode_report(payload: &[u8]) -> Result<DeviceSettingsReport> {
    if payload.len() < SETTINGS_REPORT_HEADER_LEN {
        return Err(Error::InvalidSettingsPayload(format!(
            "header needs {} bytes, got {}",
            SETTINGS_REPORT_HEADER_LEN,
            payload.len()
        )));
    }

    let harmonic = parse_harmonic(payload[6])?;
    let declared = payload[9] as usize;
    let (vout_table, count_mismatch) =
        decode_vout_table(&payload[SETTINGS_REPORT_HEADER_LEN..], declared);

    Ok(DeviceSettingsReport {
        settings: DeviceSettings {
            freefall: i16::from_le_bytes([payload[0], payload[1]]),
            hptf: i16::from_le_bytes([payload[2], payload[3]]),
            harmonic,
            duration_ms: u16::from_le_bytes([payload[7], payload[8]]),
            vout_table,
        },
        feedback_enabled: payload[4] != 0,
        feedback_tolerance: payload[5] as f32 / TOLERANCE_SCALE,
        count_mismatch,
    })
}

/// Encode a report in the inbound layout (instrument side).
///
/// The tolerance is rounded to the nearest thousandth and saturates at 0.255.
pub fn encode_report(report: &DeviceSettingsReport) -> Result<Vec<u8>> {
    let settings = &report.settings;
    let count = u8::try_from(settings.vout_table.len()).map_err(|_| Error::PayloadTooLarge {
        len: SETTINGS_REPORT_HEADER_LEN + settings.vout_table.len() * VOUT_ENTRY_LEN,
        max: aquatron_core::constants::MAX_PAYLOAD_LEN,
    })?;
    let tolerance = (report.feedback_tolerance * TOLERANCE_SCALE).round().clamp(0.0, 255.0) as u8;

    let mut payload =
        Vec::with_capacity(SETTINGS_REPORT_HEADER_LEN + count as usize * VOUT_ENTRY_LEN);
    payload.extend_from_slice(&settings.freefall.to_le_bytes());
    payload.extend_from_slice(&settings.hptf.to_le_bytes());
    payload.push(report.feedback_enabled as u8);
    payload.push(tolerance);
    payload.push(settings.harmonic.code());
    payload.extend_from_slice(&settings.duration_ms.to_le_bytes());
    payload.push(count);
    encode_vout_table(&settings.vout_table, &mut payload)?;

    Ok(payload)
}

fn parse_harmonic(code: u8) -> Result<Harmonic> {
    Harmonic::from_code(code)
        .ok_or_else(|| Error::InvalidSettingsPayload(format!("unknown harmonic code {code}")))
}

fn encode_vout_table(table: &[VoutEntry], payload: &mut Vec<u8>) -> Result<()> {
    for entry in table {
        let symbol = encode_symbol::<3>(&entry.symbol)
            .ok_or_else(|| Error::InvalidElementSymbol(entry.symbol.clone()))?;
        payload.extend_from_slice(&symbol);
        payload.extend_from_slice(&entry.vout_base.to_le_bytes());
        payload.extend_from_slice(&entry.freq.to_le_bytes());
    }
    Ok(())
}

fn decode_vout_table(bytes: &[u8], declared: usize) -> (Vec<VoutEntry>, Option<CountMismatch>) {
    let table: Vec<VoutEntry> = bytes
        .chunks_exact(VOUT_ENTRY_LEN)
        .take(declared)
        .map(|entry| VoutEntry {
            symbol: decode_symbol(&entry[..3]),
            vout_base: f32::from_le_bytes([entry[3], entry[4], entry[5], entry[6]]),
            freq: u32::from_le_bytes([entry[7], entry[8], entry[9], entry[10]]),
        })
        .collect();

    let mismatch = (table.len() != declared).then_some(CountMismatch {
        declared,
        parsed: table.len(),
    });
    (table, mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_settings() -> DeviceSettings {
        DeviceSettings {
            freefall: 120,
            hptf: -45,
            harmonic: Harmonic::Quarter,
            duration_ms: 2500,
            vout_table: vec![
                VoutEntry::for_element("Na"),
                VoutEntry {
                    symbol: "Abc".to_string(),
                    vout_base: 0.5,
                    freq: 70_000,
                },
            ],
        }
    }

    fn sample_report() -> DeviceSettingsReport {
        DeviceSettingsReport {
            settings: sample_settings(),
            feedback_enabled: true,
            feedback_tolerance: 0.025,
            count_mismatch: None,
        }
    }

    #[test]
    fn test_encode_layout() {
        let payload = encode(&sample_settings()).unwrap();
        assert_eq!(payload.len(), 8 + 2 * 11);
        assert_eq!(payload[4], 2);
        assert_eq!(payload[7], 2);
        assert_eq!(&payload[8..11], b"Na\0");
        assert_eq!(&payload[19..22], b"Abc");
        assert_eq!(&payload[26..30], &70_000u32.to_le_bytes());
    }

    #[test]
    fn test_encode_empty_table() {
        let settings = DeviceSettings::default();
        assert_eq!(encode(&settings).unwrap().len(), SETTINGS_HEADER_LEN);
    }

    #[test]
    fn test_encode_rejects_long_symbol() {
        let mut settings = sample_settings();
        settings.vout_table[0].symbol = "Long".to_string();
        assert!(matches!(encode(&settings), Err(Error::InvalidElementSymbol(_))));
    }

    #[test]
    fn test_six_rows_exceed_frame() {
        let mut settings = sample_settings();
        settings.vout_table = vec![VoutEntry::for_element("Fe"); 6];
        let payload = encode(&settings).unwrap();
        assert_eq!(payload.len(), 74);
        assert!(matches!(
            crate::Frame::encode(crate::CommandCode::SetDeviceSettings, &payload),
            Err(Error::PayloadTooLarge { len: 74, max: 64 })
        ));
    }

    #[test]
    fn test_decode_outbound_layout() {
        let settings = sample_settings();
        assert_eq!(decode(&encode(&settings).unwrap()).unwrap(), settings);
    }

    #[test]
    fn test_decode_outbound_rejects_truncated_table() {
        let mut payload = encode(&sample_settings()).unwrap();
        payload.truncate(payload.len() - 1);
        assert!(matches!(decode(&payload), Err(Error::InvalidSettingsPayload(_))));
    }

    #[test]
    fn test_decode_report() {
        let report = sample_report();
        let decoded = decode_report(&encode_report(&report).unwrap()).unwrap();

        assert_eq!(decoded.settings, report.settings);
        assert!(decoded.feedback_enabled);
        assert!((decoded.feedback_tolerance - 0.025).abs() < 1e-6);
        assert_eq!(decoded.count_mismatch, None);
    }

    #[test]
    fn test_decode_report_short_header() {
        let result = decode_report(&[0u8; 9]);
        assert!(matches!(result, Err(Error::InvalidSettingsPayload(_))));
    }

    #[test]
    fn test_decode_report_unknown_harmonic() {
        let mut payload = encode_report(&sample_report()).unwrap();
        payload[6] = 7;
        assert!(matches!(
            decode_report(&payload),
            Err(Error::InvalidSettingsPayload(ref msg)) if msg.contains("harmonic")
        ));
    }

    #[test]
    fn test_decode_report_truncated_table_reports_mismatch() {
        let mut payload = encode_report(&sample_report()).unwrap();
        payload.truncate(SETTINGS_REPORT_HEADER_LEN + VOUT_ENTRY_LEN + 4);

        let decoded = decode_report(&payload).unwrap();
        assert_eq!(decoded.settings.vout_table.len(), 1);
        assert_eq!(
            decoded.count_mismatch,
            Some(CountMismatch {
                declared: 2,
                parsed: 1
            })
        );
    }

    #[test]
    fn test_report_serializes_flat() {
        let json = serde_json::to_value(sample_report()).unwrap();
        assert_eq!(json["harmonic"], "quarter");
        assert_eq!(json["feedback_enabled"], true);
        assert!(json.get("count_mismatch").is_none());
    }
}
