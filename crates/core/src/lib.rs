//! Core types and shared functionality for snapembed.
//!
//! This crate provides:
//! - Unified error types, including the render failure taxonomy
//! - Layered configuration
//! - The oEmbed document model
//! - The SQLite image store and the single-flight render cache built on it

pub mod cache;
pub mod config;
pub mod error;
pub mod oembed;

pub use cache::{CacheDb, CachedImage, ImageStore, MAX_TTL, RenderCache, StoredImage};
pub use config::AppConfig;
pub use error::{Error, RenderError};
pub use oembed::{EmbedType, OEmbedDocument};
