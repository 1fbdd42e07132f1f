//! Content fingerprints.
//!
//! A fingerprint is the lowercase hex SHA-256 of a file's raw bytes. It
//! depends on content only, never on the path or revision, so identical
//! bytes always produce identical fingerprints.

use sha2::{Digest, Sha256};

/// Compute the fingerprint of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Decode `bytes` as text if, and only if, the whole buffer is valid UTF-8.
///
/// Files that fail here are still fingerprinted and classified, but never
/// chunked.
pub fn decode_text(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_content_addressed() {
        let a = fingerprint(b"fn main() {}\n");
        let b = fingerprint(b"fn main() {}\n");
        let c = fingerprint(b"fn main() { }\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_decode_strict() {
        assert_eq!(decode_text("héllo".as_bytes()), Some("héllo"));
        assert_eq!(decode_text(&[0xff, 0xfe, 0x00]), None);
        // Truncated multi-byte sequence.
        let mut bytes = "é".as_bytes().to_vec();
        bytes.pop();
        assert_eq!(decode_text(&bytes), None);
    }
}
