//! URL canonicalization for fetching and cache keys.

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a URL string.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str().map(str::to_lowercase) {
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// The string a source URL is identified by in the image cache.
///
/// Falls back to the trimmed input when the URL cannot be canonicalized, so
/// every input still maps to exactly one key.
pub fn cache_identity(input: &str) -> String {
    match canonicalize(input) {
        Ok(url) => url.into(),
        Err(_) => input.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_default_scheme() {
        let url = canonicalize("example.com").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_canonicalize_lowercase_host() {
        let url = canonicalize("https://EXAMPLE.COM/Path").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.path(), "/Path");
    }

    #[test]
    fn test_canonicalize_complex_path() {
        let url = canonicalize("https://example.com/path/to/resource?query=value#fragment").unwrap();
        assert_eq!(url.path(), "/path/to/resource");
        assert_eq!(url.query(), Some("query=value"));
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_canonicalize_unsupported_scheme() {
        let result = canonicalize("file:///etc/passwd");
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_canonicalize_empty() {
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_cache_identity_equal_for_equivalent_urls() {
        let a = cache_identity("https://Example.com/post/1#comments");
        let b = cache_identity("  https://example.com/post/1 ");
        assert_eq!(a, b);
        assert_eq!(a, "https://example.com/post/1");
    }

    #[test]
    fn test_cache_identity_keeps_query() {
        assert_ne!(cache_identity("https://example.com/?id=1"), cache_identity("https://example.com/?id=2"));
    }

    #[test]
    fn test_cache_identity_fallback() {
        assert_eq!(cache_identity(" mailto:someone "), "mailto:someone");
    }
}
