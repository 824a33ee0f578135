//! Render cache with single-flight coordination.
//!
//! A miss installs one shared render job per key; every request for the same
//! key that arrives while the job runs awaits that job instead of starting
//! its own render. Successful results are stored before they are handed out,
//! failures are handed out and forgotten. Jobs run as their own tasks, so a
//! render whose requesters all disconnect still completes and is stored.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt, Shared};

use super::store::{ImageStore, StoredImage};
use crate::config::AppConfig;
use crate::{Error, RenderError};

/// A cached or freshly rendered image and the TTL enforced for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedImage {
    pub bytes: Bytes,
    pub ttl: Duration,
}

impl From<StoredImage> for CachedImage {
    fn from(image: StoredImage) -> Self {
        Self { bytes: image.bytes, ttl: image.ttl }
    }
}

/// Upper bound on any stored TTL, whatever the upstream `cache_age` says.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

type RenderJob = Shared<BoxFuture<'static, Result<CachedImage, RenderError>>>;
type InFlight = Arc<Mutex<HashMap<String, RenderJob>>>;

/// TTL-bounded image cache in front of an [`ImageStore`].
pub struct RenderCache {
    store: Arc<dyn ImageStore>,
    min_ttl: Duration,
    default_ttl: Duration,
    in_flight: InFlight,
}

impl RenderCache {
    pub fn new(store: Arc<dyn ImageStore>, min_ttl: Duration, default_ttl: Duration) -> Self {
        Self { store, min_ttl, default_ttl, in_flight: Arc::default() }
    }

    pub fn from_config(store: Arc<dyn ImageStore>, config: &AppConfig) -> Self {
        Self::new(store, config.min_ttl(), config.default_ttl())
    }

    /// TTL actually applied for an upstream hint: the hint (or the default
    /// when absent), raised to the floor and capped at [`MAX_TTL`].
    pub fn effective_ttl(&self, hint: Option<Duration>) -> Duration {
        self.bounded(hint.unwrap_or(self.default_ttl))
    }

    fn bounded(&self, ttl: Duration) -> Duration {
        ttl.max(self.min_ttl).min(MAX_TTL)
    }

    /// Cached image for `key`, if present and unexpired.
    ///
    /// A failing store counts as a miss.
    pub async fn get(&self, key: &str) -> Option<CachedImage> {
        lookup(self.store.as_ref(), key).await
    }

    /// Store `bytes` under `key` for at least the TTL floor and at most [`MAX_TTL`].
    pub async fn put(&self, key: &str, bytes: Bytes, ttl: Duration) -> Result<CachedImage, Error> {
        let ttl = self.bounded(ttl);
        self.store
            .put(key, &bytes, ttl)
            .await
            .map_err(|e| Error::CacheUnavailable(e.to_string()))?;
        Ok(CachedImage { bytes, ttl })
    }

    /// Return the cached image for `key`, rendering it on a miss.
    ///
    /// `render` is only invoked when this call starts the render job for
    /// `key`; concurrent callers share that job's outcome.
    pub async fn get_or_render<F, Fut>(
        &self, key: &str, ttl_hint: Option<Duration>, render: F,
    ) -> Result<CachedImage, RenderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, RenderError>> + Send + 'static,
    {
        if let Some(hit) = self.get(key).await {
            tracing::debug!(key, "render cache hit");
            return Ok(hit);
        }

        let job = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(key) {
                Some(job) => {
                    tracing::debug!(key, "joining in-flight render");
                    job.clone()
                }
                None => {
                    tracing::debug!(key, "render cache miss");
                    let job = self.start_job(key, self.effective_ttl(ttl_hint), render());
                    in_flight.insert(key.to_string(), job.clone());
                    job
                }
            }
        };

        job.await
    }

    /// Number of render jobs currently in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Spawn the render so it finishes and is stored even if every waiter
    /// goes away.
    fn start_job<Fut>(&self, key: &str, ttl: Duration, render: Fut) -> RenderJob
    where
        Fut: Future<Output = Result<Bytes, RenderError>> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let slot = InFlightSlot { in_flight: Arc::clone(&self.in_flight), key: key.to_string() };

        let task = tokio::spawn(async move {
            // A job for this key may have completed between our lookup and
            // claiming the slot.
            match lookup(store.as_ref(), &slot.key).await {
                Some(hit) => Ok(hit),
                None => render_and_store(store.as_ref(), &slot.key, ttl, render).await,
            }
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(RenderError::CaptureFailed(format!("render task failed: {e}"))))
        }
        .boxed()
        .shared()
    }
}

/// Frees a key's in-flight slot when its render task ends, panics included.
struct InFlightSlot {
    in_flight: InFlight,
    key: String,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.key);
    }
}

async fn render_and_store<Fut>(
    store: &dyn ImageStore, key: &str, ttl: Duration, render: Fut,
) -> Result<CachedImage, RenderError>
where
    Fut: Future<Output = Result<Bytes, RenderError>>,
{
    let start = Instant::now();
    let bytes = match render.await {
        Ok(bytes) if bytes.is_empty() => return Err(RenderError::CaptureFailed("render produced no image".into())),
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(key, error = %e, "render failed; nothing cached");
            return Err(e);
        }
    };

    tracing::info!(
        key,
        bytes = bytes.len(),
        ttl_secs = ttl.as_secs(),
        render_ms = start.elapsed().as_millis() as u64,
        "rendered image"
    );

    if let Err(e) = store.put(key, &bytes, ttl).await {
        let e = Error::CacheUnavailable(e.to_string());
        tracing::warn!(key, error = %e, "failed to store rendered image");
    }

    Ok(CachedImage { bytes, ttl })
}

async fn lookup(store: &dyn ImageStore, key: &str) -> Option<CachedImage> {
    match store.get(key).await {
        Ok(found) => found.map(CachedImage::from),
        Err(e) => {
            let e = Error::CacheUnavailable(e.to_string());
            tracing::warn!(key, error = %e, "image store lookup failed; treating as miss");
            None
        }
    }
}

fn lock(in_flight: &InFlight) -> MutexGuard<'_, HashMap<String, RenderJob>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheDb;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryStore {
        entries: Mutex<HashMap<String, StoredImage>>,
        puts: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ImageStore for MemoryStore {
        async fn get(&self, key: &str) -> Result<Option<StoredImage>, Error> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn put(&self, key: &str, bytes: &[u8], ttl: Duration) -> Result<(), Error> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            let image = StoredImage { bytes: Bytes::copy_from_slice(bytes), ttl };
            self.entries.lock().unwrap().insert(key.to_string(), image);
            Ok(())
        }
    }

    struct BrokenStore;

    #[async_trait::async_trait]
    impl ImageStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<StoredImage>, Error> {
            Err(Error::CacheUnavailable("store offline".into()))
        }

        async fn put(&self, _key: &str, _bytes: &[u8], _ttl: Duration) -> Result<(), Error> {
            Err(Error::CacheUnavailable("store offline".into()))
        }
    }

    fn cache_with(store: Arc<dyn ImageStore>) -> RenderCache {
        RenderCache::new(store, Duration::from_secs(60), Duration::from_secs(14_400))
    }

    fn counting_render(
        calls: &Arc<AtomicUsize>, result: Result<&'static [u8], RenderError>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<Bytes, RenderError>> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                result.map(Bytes::from_static)
            }
            .boxed()
        }
    }

    #[test]
    fn test_effective_ttl() {
        let cache = cache_with(Arc::new(MemoryStore::default()));
        assert_eq!(cache.effective_ttl(Some(Duration::from_secs(10))), Duration::from_secs(60));
        assert_eq!(cache.effective_ttl(Some(Duration::from_secs(7200))), Duration::from_secs(7200));
        assert_eq!(cache.effective_ttl(None), Duration::from_secs(14_400));
        assert_eq!(cache.effective_ttl(Some(Duration::from_secs(u64::MAX))), MAX_TTL);
    }

    #[tokio::test]
    async fn test_huge_cache_age_is_capped_and_stored() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = cache_with(Arc::new(db.clone()));
        let calls = Arc::new(AtomicUsize::new(0));

        for (key, hint) in [("a", 10_000_000_000_000), ("b", u64::MAX)] {
            let image = cache
                .get_or_render(key, Some(Duration::from_secs(hint)), counting_render(&calls, Ok(b"png")))
                .await
                .unwrap();
            assert_eq!(image.ttl, MAX_TTL);

            let hit = cache.get(key).await.unwrap();
            assert_eq!(hit.ttl, MAX_TTL);
        }
        assert_eq!(db.image_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_put_raises_ttl_to_floor() {
        let store = Arc::new(MemoryStore::default());
        let cache = cache_with(store.clone());

        let image = cache.put("k", Bytes::from_static(b"png"), Duration::from_secs(10)).await.unwrap();
        assert_eq!(image.ttl, Duration::from_secs(60));

        let hit = cache.get("k").await.unwrap();
        assert_eq!(&hit.bytes[..], b"png");
        assert_eq!(hit.ttl, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_short_ttl_survives_until_floor() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = cache_with(Arc::new(db.clone()));
        let now = chrono::Utc::now();

        cache.put("k", Bytes::from_static(b"png"), Duration::from_secs(10)).await.unwrap();

        assert!(cache.get("k").await.is_some());
        let after_requested = db.get_image_at("k", now + chrono::Duration::seconds(30)).await.unwrap();
        assert!(after_requested.is_some());
        let after_floor = db.get_image_at("k", now + chrono::Duration::seconds(120)).await.unwrap();
        assert!(after_floor.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_misses_render_once() {
        let store = Arc::new(MemoryStore::default());
        let cache = cache_with(store.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let requests = (0..8).map(|_| cache.get_or_render("k", None, counting_render(&calls, Ok(&b"png"[..]))));
        let results = futures_util::future::join_all(requests).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
        let first = results[0].clone().unwrap();
        assert!(results.iter().all(|r| r.as_ref() == Ok(&first)));
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_render_still_stores() {
        let store = Arc::new(MemoryStore::default());
        let cache = cache_with(store.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let request = cache.get_or_render("k", None, counting_render(&calls, Ok(&b"png"[..])));
        assert!(tokio::time::timeout(Duration::from_millis(10), request).await.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight(), 0);
        assert!(cache.get("k").await.is_some());
    }

    #[tokio::test]
    async fn test_hit_skips_render() {
        let cache = cache_with(Arc::new(MemoryStore::default()));
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get_or_render("k", Some(Duration::from_secs(7200)), counting_render(&calls, Ok(&b"png"[..]))).await.unwrap();
        let hit = cache.get_or_render("k", None, counting_render(&calls, Ok(&b"other"[..]))).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(&hit.bytes[..], b"png");
        assert_eq!(hit.ttl, Duration::from_secs(7200));
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_not_cached() {
        let store = Arc::new(MemoryStore::default());
        let cache = cache_with(store.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = || counting_render(&calls, Err(RenderError::Timeout(30_000)));
        let (a, b) = tokio::join!(cache.get_or_render("k", None, failing()), cache.get_or_render("k", None, failing()));

        assert_eq!(a, Err(RenderError::Timeout(30_000)));
        assert_eq!(b, Err(RenderError::Timeout(30_000)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.get("k").await.is_none());
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);

        let retried = cache.get_or_render("k", None, counting_render(&calls, Ok(&b"png"[..]))).await;
        assert!(retried.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_render_is_failure() {
        let cache = cache_with(Arc::new(MemoryStore::default()));
        let calls = Arc::new(AtomicUsize::new(0));

        let result = cache.get_or_render("k", None, counting_render(&calls, Ok(&b""[..]))).await;
        assert!(matches!(result, Err(RenderError::CaptureFailed(_))));
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_broken_store_still_renders() {
        let cache = cache_with(Arc::new(BrokenStore));
        let calls = Arc::new(AtomicUsize::new(0));

        let image = cache.get_or_render("k", Some(Duration::from_secs(5)), counting_render(&calls, Ok(&b"png"[..]))).await.unwrap();
        assert_eq!(&image.bytes[..], b"png");
        assert_eq!(image.ttl, Duration::from_secs(60));
        assert!(cache.put("k", Bytes::from_static(b"png"), Duration::from_secs(60)).await.is_err());
    }

    #[tokio::test]
    async fn test_distinct_keys_render_independently() {
        let cache = cache_with(Arc::new(MemoryStore::default()));
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            cache.get_or_render("a", None, counting_render(&calls, Ok(&b"a"[..]))),
            cache.get_or_render("b", None, counting_render(&calls, Ok(&b"b"[..])))
        );

        assert_eq!(&a.unwrap().bytes[..], b"a");
        assert_eq!(&b.unwrap().bytes[..], b"b");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
