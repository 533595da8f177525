//! Unsigned LEB128 varints, as used by multicodec and multihash headers.

use crate::error::IdentifierError;

/// Append `value` to `out` as an unsigned varint.
pub fn encode(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Decode one varint from the front of `input`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode(input: &[u8]) -> Result<(u64, usize), IdentifierError> {
    let mut value: u64 = 0;
    for (i, byte) in input.iter().enumerate().take(10) {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(IdentifierError::TruncatedVarint)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        encode(value, &mut out);
        out
    }

    #[test]
    fn small_values_are_one_byte() {
        assert_eq!(encoded(0x1e), vec![0x1e]);
        assert_eq!(encoded(0x55), vec![0x55]);
    }

    #[test]
    fn ed25519_multicodec_prefix() {
        assert_eq!(encoded(0xed), vec![0xed, 0x01]);
    }

    #[test]
    fn decode_reports_consumed_bytes() {
        let bytes = [0xa9, 0x02, 0xff];
        assert_eq!(decode(&bytes).unwrap(), (0x0129, 2));
    }

    #[test]
    fn truncated_input_is_rejected() {
        assert_eq!(decode(&[0x80]), Err(IdentifierError::TruncatedVarint));
        assert_eq!(decode(&[]), Err(IdentifierError::TruncatedVarint));
    }
}
