//! Background sweep of expired images.

use std::time::Duration;

use snapembed_core::CacheDb;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Delete expired images every `every`, starting immediately.
///
/// Expired rows are already invisible to lookups; the sweep only reclaims space.
pub fn spawn_purge_task(db: CacheDb, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match db.purge_expired_images().await {
                Ok(0) => tracing::debug!("no expired images to purge"),
                Ok(deleted) => tracing::info!(deleted, "purged expired images"),
                Err(e) => tracing::warn!(error = %e, "failed to purge expired images"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_purge_task_removes_expired_images() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let long_ago = Utc::now() - chrono::Duration::hours(2);
        db.put_image_at("png-old", b"png", Duration::from_secs(60), long_ago).await.unwrap();
        db.put_image("png-fresh", b"png", Duration::from_secs(3600)).await.unwrap();

        let task = spawn_purge_task(db.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.abort();

        assert_eq!(db.image_count().await.unwrap(), 1);
        assert!(db.get_image("png-fresh").await.unwrap().is_some());
    }
}
