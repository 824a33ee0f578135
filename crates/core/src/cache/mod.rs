//! SQLite-backed image cache with single-flight rendering.
//!
//! This module provides a persistent, TTL-bounded image store using SQLite
//! with async access via tokio-rusqlite, and the render cache on top of it:
//!
//! - Cache keys derived from normalized source URLs using SHA-256
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - A minimum TTL floor on every stored entry
//! - At most one in-flight render per cache key

pub mod connection;
pub mod hash;
pub mod images;
pub mod migrations;
pub mod render_cache;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use render_cache::{CachedImage, MAX_TTL, RenderCache};
pub use store::{ImageStore, StoredImage};
