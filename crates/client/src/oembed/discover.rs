//! oEmbed link discovery on a source page.

use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::Url;
use snapembed_core::Error;

use super::scan::ScanWorker;
use crate::fetch::{ACCEPT_HTML, FetchStream, PageFetcher};

/// Finds the oEmbed endpoint a page advertises.
pub struct OEmbedDiscoverer {
    fetcher: Arc<dyn PageFetcher>,
    max_bytes: usize,
}

impl OEmbedDiscoverer {
    /// `max_bytes` bounds how much of a page is scanned.
    pub fn new(fetcher: Arc<dyn PageFetcher>, max_bytes: usize) -> Self {
        Self { fetcher, max_bytes }
    }

    /// Return the oEmbed discovery URL advertised by `source_url`.
    ///
    /// # Errors
    ///
    /// `Error::DiscoveryFailed` if the page cannot be fetched, carries no
    /// JSON oEmbed link within the scan budget, or the link is not a URL.
    pub async fn discover(&self, source_url: &str) -> Result<Url, Error> {
        let FetchStream { final_url, mut body } = self
            .fetcher
            .fetch_stream(source_url, ACCEPT_HTML)
            .await
            .map_err(|e| Error::DiscoveryFailed(e.to_string()))?;

        let mut scanner = ScanWorker::spawn();
        let mut scanned = 0usize;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::DiscoveryFailed(e.to_string()))?;
            let take = chunk.len().min(self.max_bytes - scanned);
            scanned += take;

            if let Some(href) = scanner.feed(chunk.slice(..take)).await {
                let discovered = final_url
                    .join(&href)
                    .map_err(|e| Error::DiscoveryFailed(format!("invalid oEmbed href {href:?}: {e}")))?;
                tracing::debug!(source = %final_url, oembed = %discovered, scanned, "discovered oEmbed link");
                return Ok(discovered);
            }

            if scanned >= self.max_bytes {
                return Err(Error::DiscoveryFailed(format!(
                    "no oEmbed link in the first {} bytes",
                    self.max_bytes
                )));
            }
        }

        Err(Error::DiscoveryFailed("no oEmbed link".into()))
    }
}
