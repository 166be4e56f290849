//! Base-128 varints and zigzag mapping.
//!
//! Each byte carries 7 data bits, least-significant group first; the high
//! bit marks continuation. Used for schema tags, lengths, integer scalars and
//! message ids.
//!
//! ```
//! use routewire_client::codec::varint::{decode_varint, encode_varint};
//!
//! let mut buf = Vec::new();
//! encode_varint(300, &mut buf);
//! assert_eq!(buf, [0xAC, 0x02]);
//! assert_eq!(decode_varint(&buf).unwrap(), (300, 2));
//! ```

use crate::error::CodecError;

/// Longest varint accepted (a full u64).
pub const MAX_VARINT_LEN: usize = 10;

const CONTINUATION_BIT: u8 = 0x80;
const DATA_MASK: u8 = 0x7F;

/// Append `value` as a varint.
#[inline]
pub fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    loop {
        let byte = (value & u64::from(DATA_MASK)) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | CONTINUATION_BIT);
    }
}

/// Decode a varint from the front of `buf`.
///
/// Returns the value and the number of bytes consumed.
///
/// # Errors
///
/// `MalformedPayload` if the buffer ends before a terminating byte, or the
/// run is longer than [`MAX_VARINT_LEN`].
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize), CodecError> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err(CodecError::MalformedPayload(
                "varint longer than 10 bytes".to_string(),
            ));
        }

        let data = u64::from(byte & DATA_MASK);
        if shift == 63 && data > 1 {
            return Err(CodecError::MalformedPayload("varint overflows u64".to_string()));
        }
        result |= data << shift;

        if byte & CONTINUATION_BIT == 0 {
            return Ok((result, i + 1));
        }
        shift += 7;
    }

    Err(CodecError::MalformedPayload(
        "buffer ends inside a varint".to_string(),
    ))
}

/// Map a signed value onto unsigned so small magnitudes stay short.
#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_byte_values() {
        for v in [0u64, 1, 127] {
            let mut buf = Vec::new();
            encode_varint(v, &mut buf);
            assert_eq!(buf.len(), 1);
            assert_eq!(decode_varint(&buf).unwrap(), (v, 1));
        }
    }

    #[test]
    fn test_multi_byte_layout() {
        let mut buf = Vec::new();
        encode_varint(150, &mut buf);
        assert_eq!(buf, [0x96, 0x01]);

        let mut buf = Vec::new();
        encode_varint(u64::from(u32::MAX), &mut buf);
        assert_eq!(buf, [0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_eq!(decode_varint(&buf).unwrap(), (u64::from(u32::MAX), 5));
    }

    #[test]
    fn test_decode_stops_at_terminator() {
        // Trailing bytes belong to the next field
        assert_eq!(decode_varint(&[0x96, 0x01, 0xFF]).unwrap(), (150, 2));
    }

    #[test]
    fn test_truncated_varint_is_malformed() {
        assert!(matches!(
            decode_varint(&[0x96]),
            Err(CodecError::MalformedPayload(_))
        ));
        assert!(matches!(
            decode_varint(&[]),
            Err(CodecError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_overlong_varint_is_malformed() {
        let buf = [0xFF; 11];
        assert!(matches!(
            decode_varint(&buf),
            Err(CodecError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_u64_max() {
        let mut buf = Vec::new();
        encode_varint(u64::MAX, &mut buf);
        assert_eq!(buf.len(), MAX_VARINT_LEN);
        assert_eq!(decode_varint(&buf).unwrap(), (u64::MAX, MAX_VARINT_LEN));
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        for v in [i64::from(i32::MIN), -300, -1, 0, 1, 300, i64::from(i32::MAX)] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
    }
}
