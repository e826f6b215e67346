//! Content fingerprints: stable identifiers derived from a byte stream's
//! SHA-256 digest, rendered as lowercase hex. Used wherever two processes
//! need to agree on "the same bytes" without shipping them — payload
//! dedup, schema identity, cache keys.

use sha2::{Digest, Sha256};

/// Hex digits in a [`short_fingerprint`]. Twelve digits (48 bits) keeps
/// collisions negligible at the scales these are used for while staying
/// readable in logs.
pub const SHORT_FINGERPRINT_LEN: usize = 12;

/// The full SHA-256 digest of `bytes` as 64 lowercase hex digits.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A truncated fingerprint for display and log contexts.
pub fn short_fingerprint(bytes: &[u8]) -> String {
    let mut full = fingerprint(bytes);
    full.truncate(SHORT_FINGERPRINT_LEN);
    full
}

/// The raw 32-byte digest, for callers that embed fingerprints in binary
/// formats rather than text.
pub fn fingerprint_bytes(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_input_yields_identical_fingerprints() {
        assert_eq!(fingerprint(b"hello"), fingerprint(b"hello"));
        assert_eq!(fingerprint_bytes(b"hello"), fingerprint_bytes(b"hello"));
    }

    #[test]
    fn different_input_yields_different_fingerprints() {
        assert_ne!(fingerprint(b"hello"), fingerprint(b"hello!"));
    }

    #[test]
    fn short_form_is_a_prefix_of_the_full_form() {
        let full = fingerprint(b"payload");
        let short = short_fingerprint(b"payload");
        assert_eq!(short.len(), SHORT_FINGERPRINT_LEN);
        assert!(full.starts_with(&short));
    }

    #[test]
    fn known_digest_matches() {
        // SHA-256 of the empty string.
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
