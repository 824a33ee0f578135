//! Headless browser rendering of rich embeds.
//!
//! This module provides a renderer trait and a feature-gated implementation
//! using chromiumoxide for headless Chrome/Chromium browser control.

use std::time::Duration;

use bytes::Bytes;
use snapembed_core::{AppConfig, OEmbedDocument, RenderError};

#[cfg(feature = "render")]
mod headless;

#[cfg(feature = "render")]
pub use headless::{BrowserOptions, HeadlessRenderer};

/// Options for rendering an embed.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Overall timeout in milliseconds, from page setup to capture (default: 30000).
    pub timeout_ms: u64,

    /// Viewport dimensions (default: 600x600).
    pub viewport: (u32, u32),

    /// Quiet window with no in-flight requests (default: 1000ms).
    pub network_idle_ms: u64,

    /// Fixed delay after network idle (default: 1000ms).
    pub settle_ms: u64,

    /// Selector for the element to capture; the full page is captured when
    /// nothing matches (default: "body div").
    pub selector: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            viewport: (600, 600),
            network_idle_ms: 1000,
            settle_ms: 1000,
            selector: "body div".to_string(),
        }
    }
}

impl From<&AppConfig> for RenderOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout_ms: config.render_timeout_ms,
            viewport: (config.viewport_width, config.viewport_height),
            network_idle_ms: config.network_idle_ms,
            settle_ms: config.settle_ms,
            selector: config.capture_selector.clone(),
        }
    }
}

impl RenderOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn network_idle(&self) -> Duration {
        Duration::from_millis(self.network_idle_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Renderer trait for turning a rich oEmbed document into a PNG.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    /// Render `doc.html` in isolation and capture it as PNG bytes.
    async fn render(&self, doc: &OEmbedDocument) -> Result<Bytes, RenderError>;
}

/// The markup to render, or why there is none.
pub fn embed_markup(doc: &OEmbedDocument) -> Result<&str, RenderError> {
    doc.html
        .as_deref()
        .filter(|html| !html.trim().is_empty())
        .ok_or_else(|| RenderError::ContentLoadFailed(format!("{} oEmbed document has no html", doc.kind)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_options_default() {
        let opts = RenderOptions::default();
        assert_eq!(opts.viewport, (600, 600));
        assert_eq!(opts.timeout(), Duration::from_secs(30));
        assert_eq!(opts.network_idle(), Duration::from_secs(1));
        assert_eq!(opts.settle(), Duration::from_secs(1));
        assert_eq!(opts.selector, "body div");
    }

    #[test]
    fn test_render_options_from_config() {
        let config = AppConfig { viewport_width: 800, settle_ms: 250, capture_selector: "main".into(), ..Default::default() };
        let opts = RenderOptions::from(&config);
        assert_eq!(opts.viewport, (800, 600));
        assert_eq!(opts.settle_ms, 250);
        assert_eq!(opts.selector, "main");
    }

    #[test]
    fn test_embed_markup() {
        let doc = OEmbedDocument::from_slice(br#"{"type":"rich","html":"<div>hi</div>"}"#).unwrap();
        assert_eq!(embed_markup(&doc).unwrap(), "<div>hi</div>");

        let doc = OEmbedDocument::from_slice(br#"{"type":"rich","html":"  "}"#).unwrap();
        assert!(matches!(embed_markup(&doc), Err(RenderError::ContentLoadFailed(_))));
    }
}
