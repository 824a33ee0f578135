//! Client code for snapembed.
//!
//! This crate provides the HTTP fetch pipeline, oEmbed discovery and
//! retrieval, and headless rendering of rich embeds.

pub mod fetch;
pub mod oembed;
pub mod render;

pub use fetch::{FetchClient, FetchConfig, FetchResponse, FetchStream, PageFetcher};
pub use oembed::{LinkScanner, OEmbedDiscoverer, OEmbedFetcher, ScanWorker};
pub use render::{RenderOptions, Renderer};

#[cfg(feature = "render")]
pub use render::{BrowserOptions, HeadlessRenderer};
