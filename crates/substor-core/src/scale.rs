//! SCALE canonical encoding helpers.
//!
//! The ledger serializes every storage key component and call argument with
//! SCALE. A byte sequence encodes as a compact length prefix followed by the
//! raw bytes:
//! - lengths 0..=63 use one byte (`len << 2`)
//! - lengths up to 2^14 - 1 use two bytes (`len << 2 | 0b01`, little endian)
//! - lengths up to 2^30 - 1 use four bytes (`len << 2 | 0b10`)
//! - larger lengths use the big-integer mode (`0b11`)
//!
//! The encoding is deterministic and self-delimiting, which is what makes
//! concatenated key components unambiguous.

use parity_scale_codec::{Compact, Decode, DecodeAll, Encode};

use crate::error::{CoreError, Result};

/// Encode a byte sequence as SCALE `Vec<u8>`.
pub fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    bytes.encode()
}

/// Append a SCALE `Vec<u8>` encoding of `bytes` to `buf`.
pub fn encode_bytes_to(buf: &mut Vec<u8>, bytes: &[u8]) {
    bytes.encode_to(buf);
}

/// Encode a compact unsigned integer.
pub fn encode_compact(buf: &mut Vec<u8>, n: u64) {
    Compact(n).encode_to(buf);
}

/// Decode a SCALE `Vec<u8>` that must span the whole input.
pub fn decode_bytes_exact(mut input: &[u8]) -> Result<Vec<u8>> {
    Vec::<u8>::decode_all(&mut input).map_err(|e| CoreError::Decoding(e.to_string()))
}

/// Decode a SCALE `Vec<u8>` from the front of `input`, advancing it.
pub fn decode_bytes(input: &mut &[u8]) -> Result<Vec<u8>> {
    Vec::<u8>::decode(input).map_err(|e| CoreError::Decoding(e.to_string()))
}

/// Decode a compact `u32` from the front of `input`, advancing it.
pub fn decode_compact_u32(input: &mut &[u8]) -> Result<u32> {
    Compact::<u32>::decode(input)
        .map(|c| c.0)
        .map_err(|e| CoreError::Decoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_length_modes() {
        // single-byte mode
        assert_eq!(encode_bytes(&[]), vec![0x00]);
        assert_eq!(encode_bytes(b"a"), vec![0x04, b'a']);
        assert_eq!(encode_bytes(&[0u8; 63])[0], 63 << 2);

        // two-byte mode
        let encoded = encode_bytes(&[0u8; 64]);
        assert_eq!(&encoded[..2], &[0x01, 0x01]);
        assert_eq!(encoded.len(), 66);

        // four-byte mode
        let encoded = encode_bytes(&[0u8; 1 << 14]);
        assert_eq!(encoded[0] & 0b11, 0b10);
        assert_eq!(encoded.len(), 4 + (1 << 14));
    }

    #[test]
    fn test_decode_bytes_exact_rejects_trailing() {
        let mut encoded = encode_bytes(b"key");
        assert_eq!(decode_bytes_exact(&encoded).unwrap(), b"key".to_vec());

        encoded.push(0xff);
        assert!(decode_bytes_exact(&encoded).is_err());
    }

    #[test]
    fn test_decode_bytes_truncated() {
        let encoded = encode_bytes(b"abcdef");
        assert!(decode_bytes_exact(&encoded[..4]).is_err());
    }

    #[test]
    fn test_decode_bytes_advances_input() {
        let mut buf = encode_bytes(b"ns");
        encode_bytes_to(&mut buf, b"key");
        let mut input = buf.as_slice();
        assert_eq!(decode_bytes(&mut input).unwrap(), b"ns".to_vec());
        assert_eq!(decode_bytes(&mut input).unwrap(), b"key".to_vec());
        assert!(input.is_empty());
    }

    #[test]
    fn test_compact_u32() {
        let mut buf = Vec::new();
        encode_compact(&mut buf, 1_000);
        let mut input = buf.as_slice();
        assert_eq!(decode_compact_u32(&mut input).unwrap(), 1_000);
    }
}
