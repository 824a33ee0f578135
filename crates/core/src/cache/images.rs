//! Image entry operations.
//!
//! Rendered images are stored with an absolute expiry. Lookups past the
//! expiry report a miss; expired rows are removed by the purge sweep.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::store::StoredImage;
use crate::Error;

/// Timestamps are stored in one fixed RFC 3339 shape so that string
/// comparison in SQL matches chronological order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl CacheDb {
    /// Insert or replace the image stored under `key`.
    ///
    /// The entry expires `ttl` after `now`. No floor or cap is applied here; see
    /// [`RenderCache`](super::RenderCache). A TTL whose expiry cannot be
    /// represented is rejected with `CacheUnavailable`.
    pub async fn put_image_at(&self, key: &str, bytes: &[u8], ttl: Duration, now: DateTime<Utc>) -> Result<(), Error> {
        let out_of_range = || Error::CacheUnavailable(format!("ttl of {}s is out of range", ttl.as_secs()));
        let ttl_secs = i64::try_from(ttl.as_secs()).map_err(|_| out_of_range())?;
        let expires = chrono::Duration::try_seconds(ttl_secs)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(out_of_range)?;

        let key = key.to_string();
        let bytes = bytes.to_vec();
        let (created_at, expires_at) = (timestamp(now), timestamp(expires));

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO images (key, bytes, ttl_secs, created_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(key) DO UPDATE SET
                        bytes = excluded.bytes,
                        ttl_secs = excluded.ttl_secs,
                        created_at = excluded.created_at,
                        expires_at = excluded.expires_at",
                    params![key, bytes, ttl_secs, created_at, expires_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    pub async fn put_image(&self, key: &str, bytes: &[u8], ttl: Duration) -> Result<(), Error> {
        self.put_image_at(key, bytes, ttl, Utc::now()).await
    }

    /// Get the image stored under `key` if it is still fresh at `now`.
    pub async fn get_image_at(&self, key: &str, now: DateTime<Utc>) -> Result<Option<StoredImage>, Error> {
        let key = key.to_string();
        let now = timestamp(now);
        self.conn
            .call(move |conn| -> Result<Option<StoredImage>, Error> {
                let result = conn.query_row(
                    "SELECT bytes, ttl_secs FROM images WHERE key = ?1 AND expires_at > ?2",
                    params![key, now],
                    |row| {
                        let bytes: Vec<u8> = row.get(0)?;
                        let ttl_secs: i64 = row.get(1)?;
                        Ok(StoredImage {
                            bytes: Bytes::from(bytes),
                            ttl: Duration::from_secs(ttl_secs.max(0) as u64),
                        })
                    },
                );

                match result {
                    Ok(image) => Ok(Some(image)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Get the image stored under `key` if it has not expired yet.
    pub async fn get_image(&self, key: &str) -> Result<Option<StoredImage>, Error> {
        self.get_image_at(key, Utc::now()).await
    }

    /// Delete entries that expired at or before `now`.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_expired_images_at(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let now = timestamp(now);
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM images WHERE expires_at <= ?1", params![now])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn purge_expired_images(&self) -> Result<u64, Error> {
        self.purge_expired_images_at(Utc::now()).await
    }

    /// Number of rows in the store, expired or not.
    pub async fn image_count(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
