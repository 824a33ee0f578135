//! The snapshot pipeline.
//!
//! Resolve the source URL's oEmbed document, branch on its type, and for
//! `rich` embeds go through the render cache. Every outcome is a value; the
//! HTTP layer decides how to present it.

use std::sync::Arc;

use snapembed_client::fetch::cache_identity;
use snapembed_client::{OEmbedDiscoverer, OEmbedFetcher, PageFetcher, Renderer};
use snapembed_core::cache::hash::compute_cache_key;
use snapembed_core::{AppConfig, CachedImage, EmbedType, Error, OEmbedDocument, RenderCache, RenderError};

/// Result of a snapshot request.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotOutcome {
    /// A cached or freshly rendered PNG.
    Image(CachedImage),
    /// A `photo` embed; the client should fetch this URL directly.
    Redirect(String),
    NotAvailable(Unavailable),
}

/// Why no image can be produced for a source URL.
///
/// The display strings are the client-facing error messages.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Unavailable {
    #[error("No oEmbed available.")]
    NoOEmbed,

    #[error("Invalid oEmbed - no url provided for type photo")]
    MissingUrl,

    #[error("No oEmbed available.")]
    UnsupportedType(EmbedType),

    #[error("Rendering is disabled.")]
    RenderDisabled,

    #[error("Render failed: {0}")]
    Render(RenderError),
}

impl Unavailable {
    /// The pipeline error behind this outcome, for outcomes that have one.
    pub fn cause(&self) -> Option<Error> {
        match self {
            Unavailable::UnsupportedType(kind) => Some(Error::UnsupportedEmbedType(kind.to_string())),
            Unavailable::Render(err) => Some(Error::Render(err.clone())),
            Unavailable::NoOEmbed | Unavailable::MissingUrl | Unavailable::RenderDisabled => None,
        }
    }
}

/// Orchestrates discovery, dispatch, and cached rendering.
pub struct SnapshotService {
    discoverer: OEmbedDiscoverer,
    fetcher: OEmbedFetcher,
    renderer: Option<Arc<dyn Renderer>>,
    cache: RenderCache,
}

impl SnapshotService {
    /// `renderer` is `None` when rendering is disabled; `max_bytes` bounds
    /// the discovery scan.
    pub fn new(
        page_fetcher: Arc<dyn PageFetcher>, renderer: Option<Arc<dyn Renderer>>, cache: RenderCache, max_bytes: usize,
    ) -> Self {
        Self {
            discoverer: OEmbedDiscoverer::new(Arc::clone(&page_fetcher), max_bytes),
            fetcher: OEmbedFetcher::new(page_fetcher),
            renderer,
            cache,
        }
    }

    /// Discover and fetch the oEmbed document for `source_url`.
    ///
    /// # Errors
    ///
    /// `Error::DiscoveryFailed` or `Error::OEmbedFetchFailed`.
    pub async fn get_oembed_raw(&self, source_url: &str) -> Result<OEmbedDocument, Error> {
        let discovery_url = self.discoverer.discover(source_url).await?;
        self.fetcher.fetch(discovery_url.as_str()).await
    }

    /// Produce the snapshot for `source_url`.
    pub async fn get_snapshot(&self, source_url: &str) -> SnapshotOutcome {
        let doc = match self.get_oembed_raw(source_url).await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::info!(source_url, error = %e, "no oEmbed available");
                return SnapshotOutcome::NotAvailable(Unavailable::NoOEmbed);
            }
        };

        let kind = doc.kind.clone();
        match kind {
            EmbedType::Rich => self.render_rich(source_url, doc).await,
            EmbedType::Photo => match doc.photo_url() {
                Some(url) => SnapshotOutcome::Redirect(url.to_string()),
                None => SnapshotOutcome::NotAvailable(Unavailable::MissingUrl),
            },
            EmbedType::Video | EmbedType::Link | EmbedType::Other(_) => {
                tracing::debug!(source_url, kind = %kind, "embed type is not rendered");
                SnapshotOutcome::NotAvailable(Unavailable::UnsupportedType(kind))
            }
        }
    }

    async fn render_rich(&self, source_url: &str, doc: OEmbedDocument) -> SnapshotOutcome {
        let Some(renderer) = &self.renderer else {
            return SnapshotOutcome::NotAvailable(Unavailable::RenderDisabled);
        };

        let key = compute_cache_key(&cache_identity(source_url));
        let ttl_hint = doc.cache_ttl();
        let renderer = Arc::clone(renderer);

        let result = self
            .cache
            .get_or_render(&key, ttl_hint, move || async move { renderer.render(&doc).await })
            .await;

        match result {
            Ok(image) => SnapshotOutcome::Image(image),
            Err(e) => SnapshotOutcome::NotAvailable(Unavailable::Render(e)),
        }
    }
}

/// The renderer to use for this configuration, if any.
#[cfg(feature = "render")]
pub fn renderer_from_config(config: &AppConfig) -> Option<Arc<dyn Renderer>> {
    if !config.render_enabled {
        tracing::info!("rendering disabled by configuration");
        return None;
    }
    Some(Arc::new(snapembed_client::HeadlessRenderer::from_config(config)))
}

/// The renderer to use for this configuration, if any.
#[cfg(not(feature = "render"))]
pub fn renderer_from_config(config: &AppConfig) -> Option<Arc<dyn Renderer>> {
    if config.render_enabled {
        tracing::warn!("built without the render feature; rich embeds will not be rendered");
    }
    None
}
