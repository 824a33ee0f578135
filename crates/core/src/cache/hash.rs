//! Cache key generation.

use sha2::{Digest, Sha256};

/// Prefix shared by all rendered image keys.
pub const IMAGE_KEY_PREFIX: &str = "png-";

/// Compute the cache key for a rendered image of `normalized_url`.
///
/// The caller is responsible for normalizing the URL first; equal inputs
/// always produce equal keys.
pub fn compute_cache_key(normalized_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_url.as_bytes());
    format!("{IMAGE_KEY_PREFIX}{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_cache_key("https://example.com/");
        let hash2 = compute_cache_key("https://example.com/");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_different_urls() {
        let a = compute_cache_key("https://example.com/a");
        let b = compute_cache_key("https://example.com/b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_format() {
        let key = compute_cache_key("https://example.com/");
        assert!(key.starts_with("png-"));
        assert_eq!(key.len(), 4 + 64);
        assert!(key[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
