//! oEmbed document retrieval.

use std::sync::Arc;

use snapembed_core::{Error, OEmbedDocument};

use crate::fetch::{ACCEPT_JSON, PageFetcher};

/// Fetches and parses oEmbed documents.
pub struct OEmbedFetcher {
    fetcher: Arc<dyn PageFetcher>,
}

impl OEmbedFetcher {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Retrieve the document at `discovery_url`.
    ///
    /// # Errors
    ///
    /// `Error::OEmbedFetchFailed` on transport failure, a non-success status,
    /// or a body that is not an oEmbed JSON object.
    pub async fn fetch(&self, discovery_url: &str) -> Result<OEmbedDocument, Error> {
        let response = self
            .fetcher
            .fetch(discovery_url, ACCEPT_JSON)
            .await
            .map_err(|e| Error::OEmbedFetchFailed(e.to_string()))?;

        let doc = OEmbedDocument::from_slice(&response.bytes)
            .map_err(|e| Error::OEmbedFetchFailed(format!("malformed oEmbed document: {e}")))?;

        tracing::debug!(url = %response.final_url, kind = %doc.kind, cache_age = ?doc.cache_age, "fetched oEmbed document");

        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oembed::testing::CannedFetcher;
    use snapembed_core::EmbedType;

    const ENDPOINT: &str = "https://example.com/oembed";

    async fn fetch_body(body: &str) -> Result<OEmbedDocument, Error> {
        let fetcher = CannedFetcher::default().page(ENDPOINT, &[body]);
        OEmbedFetcher::new(Arc::new(fetcher)).fetch(ENDPOINT).await
    }

    #[tokio::test]
    async fn test_fetch_rich() {
        let doc = fetch_body(r#"{"type":"rich","html":"<div>hi</div>","cache_age":7200}"#).await.unwrap();
        assert_eq!(doc.kind, EmbedType::Rich);
        assert_eq!(doc.cache_age, Some(7200));
    }

    #[tokio::test]
    async fn test_fetch_reads_whole_body() {
        let fetcher = CannedFetcher::default().page(ENDPOINT, &[r#"{"type":"photo","#, r#""url":"https://img.example/a.jpg"}"#]);
        let doc = OEmbedFetcher::new(Arc::new(fetcher)).fetch(ENDPOINT).await.unwrap();
        assert_eq!(doc.photo_url(), Some("https://img.example/a.jpg"));
    }

    #[tokio::test]
    async fn test_fetch_preserves_unknown_type() {
        let doc = fetch_body(r#"{"type":"slideshow"}"#).await.unwrap();
        assert_eq!(doc.kind, EmbedType::Other("slideshow".into()));
    }

    #[tokio::test]
    async fn test_fetch_malformed_body() {
        let result = fetch_body("<html>not json</html>").await;
        assert!(matches!(result, Err(Error::OEmbedFetchFailed(msg)) if msg.contains("malformed")));
    }

    #[tokio::test]
    async fn test_fetch_transport_failure() {
        let result = OEmbedFetcher::new(Arc::new(CannedFetcher::default())).fetch(ENDPOINT).await;
        assert!(matches!(result, Err(Error::OEmbedFetchFailed(_))));
    }
}
