//! Key-value image store abstraction.

use std::time::Duration;

use bytes::Bytes;

use super::connection::CacheDb;
use crate::Error;

/// An image read back from the store together with the TTL it was stored with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub bytes: Bytes,
    pub ttl: Duration,
}

/// Persistent storage for rendered images.
///
/// `get` must never return an entry past its expiry.
#[async_trait::async_trait]
pub trait ImageStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StoredImage>, Error>;

    async fn put(&self, key: &str, bytes: &[u8], ttl: Duration) -> Result<(), Error>;
}

#[async_trait::async_trait]
impl ImageStore for CacheDb {
    async fn get(&self, key: &str) -> Result<Option<StoredImage>, Error> {
        self.get_image(key).await
    }

    async fn put(&self, key: &str, bytes: &[u8], ttl: Duration) -> Result<(), Error> {
        self.put_image(key, bytes, ttl).await
    }
}
