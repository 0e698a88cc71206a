//! Stable content identifiers for remote resources.

use sha2::{Digest, Sha256};

/// Length of a content identifier in hex characters.
pub const CONTENT_ID_LENGTH: usize = 16;

/// Derive a short, filesystem-safe identifier from a resource URI.
///
/// The same URI always yields the same identifier, so it can key on-disk
/// directories across runs.
pub fn content_id(resource_id: &str) -> String {
    let digest = Sha256::digest(resource_id.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(CONTENT_ID_LENGTH);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_is_stable_and_short() {
        let a = content_id("https://example.org/iiif/image-1");
        let b = content_id("https://example.org/iiif/image-1");
        let c = content_id("https://example.org/iiif/image-2");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), CONTENT_ID_LENGTH);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_content_id_known_value() {
        // sha256("abc") = ba7816bf8f01cfea...
        assert_eq!(content_id("abc"), "ba7816bf8f01cfea");
    }
}
