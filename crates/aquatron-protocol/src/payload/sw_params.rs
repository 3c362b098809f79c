//! SW-parameters payload (command 0x04).
//!
//! ```text
//! [count] + count × [sym0, sym1, qty_lo, qty_hi]
//! ```
//!
//! ```
//! use aquatron_core::ElementSpec;
//! use aquatron_protocol::payload::sw_params;
//!
//! let payload = sw_params::encode(&[ElementSpec::new("Li", 5)]).unwrap();
//! assert_eq!(payload, vec![0x01, 0x4C, 0x69, 0x05, 0x00]);
//! ```

use super::{decode_symbol, encode_symbol};
use aquatron_core::{
    ElementSpec, Error, Result,
    constants::{MAX_ELEMENTS, MIN_ELEMENTS, SW_ELEMENT_LEN},
};

/// Encode an element list.
///
/// # Errors
///
/// - [`Error::InvalidElementCount`] outside 1-30 elements
/// - [`Error::InvalidElementSymbol`] for empty, over-long or non-ASCII symbols
pub fn encode(elements: &[ElementSpec]) -> Result<Vec<u8>> {
    if !(MIN_ELEMENTS..=MAX_ELEMENTS).contains(&elements.len()) {
        return Err(Error::InvalidElementCount(elements.len()));
    }

    let mut payload = Vec::with_capacity(1 + elements.len() * SW_ELEMENT_LEN);
    payload.push(elements.len() as u8);

    for element in elements {
        let symbol = encode_symbol::<2>(&element.symbol)
            .ok_or_else(|| Error::InvalidElementSymbol(element.symbol.clone()))?;
        payload.extend_from_slice(&symbol);
        payload.extend_from_slice(&element.quantity.to_le_bytes());
    }

    Ok(payload)
}

/// Decode an element list as the instrument sees it.
pub fn decode(payload: &[u8]) -> Result<Vec<ElementSpec>> {
    let (&count, entries) = payload
        .split_first()
        .ok_or(Error::InvalidElementCount(0))?;
    let count = count as usize;

    if !(MIN_ELEMENTS..=MAX_ELEMENTS).contains(&count) || entries.len() < count * SW_ELEMENT_LEN {
        return Err(Error::InvalidElementCount(count));
    }

    Ok(entries
        .chunks_exact(SW_ELEMENT_LEN)
        .take(count)
        .map(|entry| ElementSpec {
            symbol: decode_symbol(&entry[..2]),
            quantity: u16::from_le_bytes([entry[2], entry[3]]),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_encode_multiple_elements() {
        let payload = encode(&[ElementSpec::new("Na", 300), ElementSpec::new("K", 1)]).unwrap();
        assert_eq!(
            payload,
            vec![0x02, b'N', b'a', 0x2C, 0x01, b'K', 0x00, 0x01, 0x00]
        );
    }

    #[rstest]
    #[case(0)]
    #[case(31)]
    fn test_encode_rejects_count(#[case] count: usize) {
        let elements = vec![ElementSpec::new("Li", 1); count];
        assert!(matches!(
            encode(&elements),
            Err(Error::InvalidElementCount(n)) if n == count
        ));
    }

    #[rstest]
    #[case("")]
    #[case("Abc")]
    #[case("é")]
    fn test_encode_rejects_symbol(#[case] symbol: &str) {
        let result = encode(&[ElementSpec::new(symbol, 1)]);
        assert!(matches!(result, Err(Error::InvalidElementSymbol(ref s)) if s == symbol));
    }

    #[test]
    fn test_thirty_elements_encode_but_exceed_one_frame() {
        let elements = vec![ElementSpec::new("Fe", 2); 30];
        let payload = encode(&elements).unwrap();
        assert_eq!(payload.len(), 121);
        assert!(crate::Frame::encode(crate::CommandCode::SendSwParameters, &payload).is_err());
    }

    #[test]
    fn test_decode_mirrors_encode() {
        let elements = vec![ElementSpec::new("Cu", 7), ElementSpec::new("K", 65535)];
        let decoded = decode(&encode(&elements).unwrap()).unwrap();
        assert_eq!(decoded, elements);
    }

    #[test]
    fn test_decode_rejects_truncated() {
        assert!(decode(&[]).is_err());
        assert!(decode(&[0x02, b'L', b'i', 0x01, 0x00]).is_err());
    }
}
