//! # VarNum Codec
//!
//! Variable-length encoding for 32-bit (`VarInt`) and 64-bit (`VarLong`) integers.
//!
//! Each byte carries seven payload bits, least-significant group first. The high
//! bit marks that another byte follows.
//!
//! ```text
//!   127 -> [0x7F]
//!   128 -> [0x80, 0x01]
//!    -1 -> [0xFF, 0xFF, 0xFF, 0xFF, 0x0F]
//! ```
//!
//! Negative values are encoded from their two's-complement bit pattern, so a
//! negative `VarInt` always takes the full five bytes.
//!
//! ## Security
//! Decoding never inspects more than [`VARINT_MAX_BYTES`] / [`VARLONG_MAX_BYTES`]
//! bytes. Longer continuation chains fail with [`DecodeError::TooLarge`].

use bytes::BufMut;

use crate::error::DecodeError;

/// Maximum encoded size of a 32-bit VarInt
pub const VARINT_MAX_BYTES: usize = 5;

/// Maximum encoded size of a 64-bit VarLong
pub const VARLONG_MAX_BYTES: usize = 10;

const SEGMENT_BITS: u8 = 0x7F;
const CONTINUE_BIT: u8 = 0x80;

/// Writes `value` as a VarInt and returns the number of bytes written.
#[inline]
pub fn write_varint<B: BufMut>(buf: &mut B, value: i32) -> usize {
    write_unsigned(buf, u64::from(value as u32))
}

/// Writes `value` as a VarLong and returns the number of bytes written.
#[inline]
pub fn write_varlong<B: BufMut>(buf: &mut B, value: i64) -> usize {
    write_unsigned(buf, value as u64)
}

/// Encodes a VarInt into a freshly allocated buffer.
pub fn encode_varint(value: i32) -> Vec<u8> {
    let mut out = Vec::with_capacity(VARINT_MAX_BYTES);
    write_varint(&mut out, value);
    out
}

/// Encodes a VarLong into a freshly allocated buffer.
pub fn encode_varlong(value: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(VARLONG_MAX_BYTES);
    write_varlong(&mut out, value);
    out
}

/// Decodes a VarInt from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed.
///
/// # Errors
/// - [`DecodeError::TooLarge`] if five bytes all carry the continuation bit
/// - [`DecodeError::Truncated`] if `bytes` ends before the terminating byte
#[inline]
pub fn decode_varint(bytes: &[u8]) -> Result<(i32, usize), DecodeError> {
    let (raw, consumed) = read_unsigned(bytes, VARINT_MAX_BYTES)?;
    // The fifth byte may carry bits above 32; they are discarded like the JVM does.
    Ok((raw as u32 as i32, consumed))
}

/// Decodes a VarLong from the front of `bytes`.
///
/// # Errors
/// Same as [`decode_varint`], with a ten byte limit.
#[inline]
pub fn decode_varlong(bytes: &[u8]) -> Result<(i64, usize), DecodeError> {
    let (raw, consumed) = read_unsigned(bytes, VARLONG_MAX_BYTES)?;
    Ok((raw as i64, consumed))
}

/// Number of bytes `value` occupies as a VarInt.
#[inline]
pub fn varint_len(value: i32) -> usize {
    unsigned_len(u64::from(value as u32))
}

/// Number of bytes `value` occupies as a VarLong.
#[inline]
pub fn varlong_len(value: i64) -> usize {
    unsigned_len(value as u64)
}

fn write_unsigned<B: BufMut>(buf: &mut B, mut value: u64) -> usize {
    let mut written = 0;
    loop {
        let segment = (value & u64::from(SEGMENT_BITS)) as u8;
        // logical shift on the unsigned view; never sign-extends
        value >>= 7;
        written += 1;
        if value == 0 {
            buf.put_u8(segment);
            return written;
        }
        buf.put_u8(segment | CONTINUE_BIT);
    }
}

fn read_unsigned(bytes: &[u8], max_bytes: usize) -> Result<(u64, usize), DecodeError> {
    let mut value = 0u64;
    for (index, &byte) in bytes.iter().take(max_bytes).enumerate() {
        value |= u64::from(byte & SEGMENT_BITS) << (7 * index);
        if byte & CONTINUE_BIT == 0 {
            return Ok((value, index + 1));
        }
    }

    if bytes.len() >= max_bytes {
        Err(DecodeError::TooLarge)
    } else {
        Err(DecodeError::Truncated)
    }
}

fn unsigned_len(value: u64) -> usize {
    match value {
        0 => 1,
        v => (64 - v.leading_zeros() as usize).div_ceil(7),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_varint_encodings() {
        assert_eq!(encode_varint(0), vec![0x00]);
        assert_eq!(encode_varint(1), vec![0x01]);
        assert_eq!(encode_varint(127), vec![0x7F]);
        assert_eq!(encode_varint(128), vec![0x80, 0x01]);
        assert_eq!(encode_varint(255), vec![0xFF, 0x01]);
        assert_eq!(encode_varint(25565), vec![0xDD, 0xC7, 0x01]);
        assert_eq!(encode_varint(2_097_151), vec![0xFF, 0xFF, 0x7F]);
        assert_eq!(encode_varint(i32::MAX), vec![0xFF, 0xFF, 0xFF, 0xFF, 0x07]);
        assert_eq!(encode_varint(-1), vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_eq!(encode_varint(i32::MIN), vec![0x80, 0x80, 0x80, 0x80, 0x08]);
    }

    #[test]
    fn test_known_varlong_encodings() {
        assert_eq!(encode_varlong(0), vec![0x00]);
        assert_eq!(encode_varlong(128), vec![0x80, 0x01]);
        assert_eq!(
            encode_varlong(i64::MAX),
            vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F]
        );
        assert_eq!(
            encode_varlong(-1),
            vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]
        );
    }

    #[test]
    fn test_decode_reports_consumed_bytes() {
        let bytes = [0xDD, 0xC7, 0x01, 0xAA, 0xBB];
        assert_eq!(decode_varint(&bytes), Ok((25565, 3)));
    }

    #[test]
    fn test_decode_too_large() {
        let bytes = [0xFF; 6];
        assert_eq!(decode_varint(&bytes), Err(DecodeError::TooLarge));

        let bytes = [0x80; 5];
        assert_eq!(decode_varint(&bytes), Err(DecodeError::TooLarge));

        let bytes = [0x80; 11];
        assert_eq!(decode_varlong(&bytes), Err(DecodeError::TooLarge));
    }

    #[test]
    fn test_decode_truncated() {
        assert_eq!(decode_varint(&[]), Err(DecodeError::Truncated));
        assert_eq!(decode_varint(&[0x80, 0x80]), Err(DecodeError::Truncated));
        assert_eq!(decode_varlong(&[0xFF; 9]), Err(DecodeError::Truncated));
    }

    #[test]
    fn test_lengths_match_encodings() {
        for value in [0, 1, 127, 128, 16_383, 16_384, 2_097_151, i32::MAX, -1, i32::MIN] {
            assert_eq!(varint_len(value), encode_varint(value).len(), "value {value}");
        }
        for value in [0i64, 127, 128, i64::MAX, -1, i64::MIN] {
            assert_eq!(varlong_len(value), encode_varlong(value).len(), "value {value}");
        }
    }

    #[test]
    fn test_write_into_bytes_mut() {
        let mut buf = bytes::BytesMut::new();
        assert_eq!(write_varint(&mut buf, 300), 2);
        assert_eq!(write_varlong(&mut buf, 1), 1);
        assert_eq!(&buf[..], &[0xAC, 0x02, 0x01]);
    }
}
