//! oEmbed discovery and retrieval.
//!
//! ### Discovery
//! - Stream the source page and scan it for
//!   `<link rel="alternate" type="application/json+oembed" href="...">`.
//! - Stop reading at the first match, at the end of the page, or after the
//!   configured byte budget.
//! - Relative `href`s resolve against the page's final URL.
//!
//! ### Retrieval
//! - GET the discovery URL and parse the JSON body into an `OEmbedDocument`.
//! - Neither step retries; failures surface to the caller immediately.

pub mod discover;
pub mod fetch;
pub mod scan;

pub use discover::OEmbedDiscoverer;
pub use fetch::OEmbedFetcher;
pub use scan::{LinkScanner, ScanWorker};
