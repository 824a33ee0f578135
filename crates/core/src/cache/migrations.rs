//! Versioned schema migrations for the image store.
//!
//! Applied versions are recorded in `_migrations`; each pending migration
//! runs in its own transaction together with its bookkeeping row.

use chrono::{SecondsFormat, Utc};
use tokio_rusqlite::{Connection, params};

use super::Error;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Ordered by version; append only.
const MIGRATIONS: &[Migration] =
    &[Migration { version: 1, name: "images", sql: include_str!("../../migrations/001_images.sql") }];

/// Apply pending migrations and return how many ran.
///
/// # Errors
///
/// `Error::MigrationFailed` naming the migration whose SQL failed.
pub async fn run(conn: &Connection) -> Result<usize, Error> {
    conn.call(|conn| -> Result<usize, Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
        )?;

        let applied: i64 = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        let mut count = 0;
        for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
            let tx = conn.transaction()?;
            tx.execute_batch(migration.sql)
                .map_err(|e| Error::MigrationFailed(format!("{:03}_{}: {e}", migration.version, migration.name)))?;
            tx.execute(
                "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![migration.version, migration.name, Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)],
            )?;
            tx.commit()?;

            tracing::debug!(version = migration.version, name = migration.name, "applied image store migration");
            count += 1;
        }

        Ok(count)
    })
    .await
    .map_err(Error::from)
}
