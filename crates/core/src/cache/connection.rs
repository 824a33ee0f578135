//! SQLite connection setup for the image store.

use std::path::Path;

use tokio_rusqlite::Connection;

use super::migrations;
use crate::Error;

/// WAL lets lookups proceed while a render result is being written.
const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA busy_timeout=5000;
     PRAGMA temp_store=MEMORY;";

/// Handle to the image store database.
///
/// Queries run on tokio-rusqlite's background thread; clones share it.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
}

impl CacheDb {
    /// Open (or create) the database file at `path`, creating missing parent
    /// directories, and bring its schema up to date.
    ///
    /// # Errors
    ///
    /// `Error::Database` if the file cannot be opened, `Error::MigrationFailed`
    /// if the schema cannot be applied.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::CacheUnavailable(format!("cannot create {}: {e}", parent.display())))?;
        }

        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    /// A private in-memory database with the same schema.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| conn.execute_batch(PRAGMAS))
            .await
            .map_err(Error::Database)?;

        let applied = migrations::run(&conn).await?;
        if applied > 0 {
            tracing::info!(applied, "migrated image store schema");
        }

        Ok(Self { conn })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory_is_empty() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert_eq!(db.image_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reopen_keeps_images() {
        let dir = std::env::temp_dir().join(format!("snapembed-test-{}", std::process::id()));
        let path = dir.join("nested").join("cache.sqlite");

        let db = CacheDb::open(&path).await.unwrap();
        db.put_image("png-abc", b"png", std::time::Duration::from_secs(600)).await.unwrap();
        drop(db);

        let db = CacheDb::open(&path).await.unwrap();
        let image = db.get_image("png-abc").await.unwrap().unwrap();
        assert_eq!(&image.bytes[..], b"png");

        std::fs::remove_dir_all(&dir).ok();
    }
}
