//! Unified error types for snapembed.
//!
//! Every failure in the snapshot pipeline maps onto one of these variants so
//! the HTTP layer can turn it into a response instead of crashing.

use tokio_rusqlite::rusqlite;

/// Reasons a headless render can fail.
///
/// Cloneable so a single failed render can be handed to every request that
/// was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// Failed to launch the browser or open a page.
    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    /// The embed markup could not be loaded into the page.
    #[error("content load failed: {0}")]
    ContentLoadFailed(String),

    /// The page did not settle within the render timeout.
    #[error("render timeout after {0}ms")]
    Timeout(u64),

    /// Taking the screenshot failed or produced no bytes.
    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

/// Unified error types for the snapembed service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Source page could not be fetched or carried no oEmbed link.
    #[error("DISCOVERY_FAILED: {0}")]
    DiscoveryFailed(String),

    /// oEmbed document could not be fetched or parsed.
    #[error("OEMBED_FETCH_FAILED: {0}")]
    OEmbedFetchFailed(String),

    /// The oEmbed type has no snapshot representation.
    #[error("UNSUPPORTED_EMBED_TYPE: {0}")]
    UnsupportedEmbedType(String),

    /// Headless rendering failed.
    #[error("RENDER_FAILED: {0}")]
    Render(#[from] RenderError),

    /// The image store could not be reached.
    #[error("CACHE_UNAVAILABLE: {0}")]
    CacheUnavailable(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// HTTP error response.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl Error {
    /// Whether the caller may expect a different answer by retrying later.
    ///
    /// Render failures are never cached, so the next request renders again.
    /// Discovery and oEmbed failures reflect the upstream page and are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Render(_) | Error::CacheUnavailable(_) | Error::FetchTimeout(_))
    }
}
