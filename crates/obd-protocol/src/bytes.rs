//! Byte and Hex Utilities
//!
//! Conversions between the adapter's ASCII hex wire format and byte
//! sequences, plus the integer helpers shared by the decoders.

use crate::error::ObdError;

/// Big-endian unsigned interpretation of up to 8 bytes
pub fn bytes_to_int(bytes: &[u8]) -> Result<u64, ObdError> {
    if bytes.is_empty() {
        return Err(ObdError::malformed("cannot convert an empty byte sequence"));
    }
    if bytes.len() > 8 {
        return Err(ObdError::malformed(format!(
            "{} bytes do not fit in a 64-bit integer",
            bytes.len()
        )));
    }
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

/// Reinterpret the low `bits` of `value` as a two's complement number
pub fn twos_complement(value: u64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return value as i64;
    }
    let mask = (1u64 << bits) - 1;
    let value = value & mask;
    if value & (1u64 << (bits - 1)) != 0 {
        value as i64 - (1i64 << bits)
    } else {
        value as i64
    }
}

/// Parse adapter hex text into bytes, ignoring any whitespace
pub fn hex_to_bytes(text: &str) -> Result<Vec<u8>, ObdError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() % 2 != 0 {
        return Err(ObdError::malformed(format!(
            "odd number of hex digits in {text:?}"
        )));
    }
    hex::decode(&compact).map_err(|e| ObdError::malformed(format!("{text:?}: {e}")))
}

/// Render bytes as contiguous upper-case hex
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Canonical form of a hex string: whitespace removed, upper-case digits
pub fn normalize_hex(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// True when every non-space character is a hex digit
pub(crate) fn is_hex_line(line: &str) -> bool {
    let mut seen = false;
    for c in line.chars().filter(|c| !c.is_whitespace()) {
        if !c.is_ascii_hexdigit() {
            return false;
        }
        seen = true;
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bytes_to_int() {
        assert_eq!(bytes_to_int(&[0x1A, 0xF8]).unwrap(), 0x1AF8);
        assert_eq!(bytes_to_int(&[0xFF]).unwrap(), 255);
        assert!(matches!(bytes_to_int(&[]), Err(ObdError::MalformedData(_))));
    }

    #[test]
    fn test_twos_complement() {
        assert_eq!(twos_complement(0xFF, 8), -1);
        assert_eq!(twos_complement(0x80, 8), -128);
        assert_eq!(twos_complement(0x7F, 8), 127);
        assert_eq!(twos_complement(0xFFFE, 16), -2);
    }

    #[test]
    fn test_hex_to_bytes_tolerates_spacing() {
        assert_eq!(
            hex_to_bytes(" 41 0C\t1A F8 ").unwrap(),
            vec![0x41, 0x0C, 0x1A, 0xF8]
        );
    }

    #[test]
    fn test_hex_to_bytes_rejects_bad_input() {
        assert!(matches!(hex_to_bytes("410"), Err(ObdError::MalformedData(_))));
        assert!(matches!(hex_to_bytes("41 0G"), Err(ObdError::MalformedData(_))));
    }

    #[test]
    fn test_is_hex_line() {
        assert!(is_hex_line("7E8 03 41 0D 3C"));
        assert!(!is_hex_line("NO DATA"));
        assert!(!is_hex_line("   "));
    }

    proptest! {
        #[test]
        fn hex_round_trip_matches_normalized_form(bytes in proptest::collection::vec(any::<u8>(), 0..32), spaced in any::<bool>()) {
            let text = if spaced {
                bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
            } else {
                hex::encode(&bytes)
            };
            let parsed = hex_to_bytes(&text).unwrap();
            prop_assert_eq!(bytes_to_hex(&parsed), normalize_hex(&text));
        }
    }
}
