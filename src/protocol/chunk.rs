//! Chunk decoding.
//!
//! The wire carries raw UTF-8 text with no framing. Whatever one read
//! returns is one chunk, and one chunk becomes one `DataReceived` event.
//! Message boundaries are whatever the transport happens to deliver.

// ============================================================================
// Imports
// ============================================================================

use std::str;

use crate::error::DecodeWarning;

// ============================================================================
// Decoding
// ============================================================================

/// Decodes a received chunk as UTF-8.
///
/// Returns a [`DecodeWarning`] for invalid input; the caller drops the
/// chunk. A multi-byte character split across two reads also fails here,
/// since chunks are not reassembled.
///
/// # Example
///
/// ```
/// use tcp_exchange::protocol::decode_chunk;
///
/// assert_eq!(decode_chunk(b"2024-01-01T00:00:00Z").unwrap(), "2024-01-01T00:00:00Z");
/// assert!(decode_chunk(&[0xff, 0xfe]).is_err());
/// ```
pub fn decode_chunk(chunk: &[u8]) -> Result<String, DecodeWarning> {
    str::from_utf8(chunk)
        .map(str::to_owned)
        .map_err(|e| DecodeWarning::new(chunk.len(), e))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ascii() {
        assert_eq!(decode_chunk(b"hello").unwrap(), "hello");
    }

    #[test]
    fn test_decode_multibyte() {
        let text = "Zeit: 12:00 \u{00e9}\u{4e16}";
        assert_eq!(decode_chunk(text.as_bytes()).unwrap(), text);
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(decode_chunk(b"").unwrap(), "");
    }

    #[test]
    fn test_split_character_is_rejected() {
        let bytes = "\u{00e9}".as_bytes();
        let warning = decode_chunk(&bytes[..1]).unwrap_err();
        assert_eq!(warning.len, 1);
        assert_eq!(warning.valid_up_to, 0);
    }
}
