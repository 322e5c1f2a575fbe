//! Content-addressed cache keys.
//!
//! Key = SHA-256 over the normalized answer text and the embedding model
//! version, so identical inputs always map to the same entry and a model
//! upgrade never serves stale vectors.

use sha2::{Digest, Sha256};

/// Collapse the text to a canonical form before hashing: trimmed,
/// lowercased, internal whitespace runs reduced to single spaces.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Hex-encoded content hash of (normalized text, model version).
pub fn cache_key(text: &str, model_version: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(text).as_bytes());
    hasher.update([0u8]);
    hasher.update(model_version.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize("  Great   Service\t\n really "), "great service really");
        assert_eq!(normalize("already normal"), "already normal");
    }

    #[test]
    fn equivalent_texts_share_a_key() {
        let a = cache_key("Great   service!", "embed-v2");
        let b = cache_key("  great service!  ", "embed-v2");
        assert_eq!(a, b);
    }

    #[test]
    fn model_version_changes_the_key() {
        let a = cache_key("great service", "embed-v1");
        let b = cache_key("great service", "embed-v2");
        assert_ne!(a, b);
    }

    #[test]
    fn key_is_hex_sha256() {
        let key = cache_key("anything", "embed-v2");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_texts_differ() {
        assert_ne!(
            cache_key("too expensive", "embed-v2"),
            cache_key("too slow", "embed-v2")
        );
    }
}
