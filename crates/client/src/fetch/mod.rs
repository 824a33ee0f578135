//! HTTP fetch pipeline.
//!
//! ### URL Canonicalization
//! - Trim whitespace, ensure scheme (default: `https`)
//! - Lowercase host, remove fragments
//! - Preserve query string
//!
//! ### Limits
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)
//! - Whole-request timeout: 20s (configurable)
//!
//! Source pages are exposed as a byte stream so the oEmbed link scan can stop
//! early; oEmbed documents are read whole.

pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::Url;
use reqwest::{Client, header};
use std::time::{Duration, Instant};

pub use url::{UrlError, cache_identity, canonicalize};

use snapembed_core::{AppConfig, Error};

/// Accept header for source pages.
pub const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Accept header for oEmbed documents.
pub const ACCEPT_JSON: &str = "application/json,text/javascript;q=0.9,*/*;q=0.5";

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "snapembed/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "snapembed/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// A successful response read to the end.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The final URL after redirects
    pub final_url: Url,
    pub bytes: Bytes,
}

/// Body chunks of a response that is still being received.
pub type ByteStream = BoxStream<'static, Result<Bytes, Error>>;

/// A successful response whose body has not been read yet.
pub struct FetchStream {
    /// The final URL after redirects
    pub final_url: Url,
    pub body: ByteStream,
}

/// The page-fetch capability the oEmbed pipeline is built on.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url` and read the whole body. Non-success statuses are errors.
    async fn fetch(&self, url: &str, accept: &str) -> Result<FetchResponse, Error>;

    /// Fetch `url` and hand back the body as it arrives.
    async fn fetch_stream(&self, url: &str, accept: &str) -> Result<FetchStream, Error>;
}

/// HTTP fetch client backed by reqwest.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    async fn send(&self, url_str: &str, accept: &str) -> Result<(Url, reqwest::Response), Error> {
        let url = canonicalize(url_str).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, accept)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpError(format!("status {}", status.as_u16())));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        Ok((url, response))
    }
}

fn transport_error(err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(err.to_string())
    } else {
        Error::HttpError(format!("network error: {}", err))
    }
}

#[async_trait]
impl PageFetcher for FetchClient {
    async fn fetch(&self, url_str: &str, accept: &str) -> Result<FetchResponse, Error> {
        let start = Instant::now();
        let (url, response) = self.send(url_str, accept).await?;
        let final_url = response.url().clone();

        let bytes = response.bytes().await.map_err(|e| transport_error(&e))?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!("fetched {} -> {} in {}ms ({} bytes)", url, final_url, fetch_ms, bytes.len());

        Ok(FetchResponse { final_url, bytes })
    }

    async fn fetch_stream(&self, url_str: &str, accept: &str) -> Result<FetchStream, Error> {
        let (url, response) = self.send(url_str, accept).await?;
        let final_url = response.url().clone();

        tracing::debug!("streaming {} -> {}", url, final_url);

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| transport_error(&e)))
            .boxed();

        Ok(FetchStream { final_url, body })
    }
}
