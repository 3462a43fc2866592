//! SQLite backend.
//!
//! Maps the logical collections onto two tables: `records` keyed by
//! `(collection, key)` with a per-row version counter, and `blobs` keyed by
//! name. Conditional create rides on `INSERT OR IGNORE`; version-checked
//! puts ride on `UPDATE .. WHERE version = ?`, so both primitives are atomic
//! in the database itself rather than emulated in process.

use crate::error::{BackendError, BackendResult};
use crate::traits::{Backend, BlobStore, RecordStore, Version, VersionedRecord};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    key        TEXT NOT NULL,
    version    INTEGER NOT NULL,
    data       TEXT NOT NULL,
    PRIMARY KEY (collection, key)
);

CREATE TABLE IF NOT EXISTS blobs (
    name TEXT PRIMARY KEY,
    data BLOB NOT NULL
);
"#;

/// SQLite-backed record and blob store.
#[derive(Debug)]
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
}

impl SqliteBackend {
    /// Open (creating if missing) a SQLite backend at `path`.
    pub async fn new(path: impl AsRef<Path>, max_connections: u32) -> BackendResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let backend = Self { pool };
        backend.migrate().await?;
        Ok(backend)
    }

    /// Run schema migrations.
    pub async fn migrate(&self) -> BackendResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for SqliteBackend {
    #[instrument(skip(self), fields(backend = "sqlite"))]
    async fn get_record(&self, collection: &str, key: &str) -> BackendResult<VersionedRecord> {
        let row: Option<(i64, String)> = sqlx::query_as(
            "SELECT version, data FROM records WHERE collection = ? AND key = ?",
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let (version, data) =
            row.ok_or_else(|| BackendError::NotFound(format!("{collection}/{key}")))?;
        Ok(VersionedRecord {
            version: version as Version,
            data: serde_json::from_str(&data)?,
        })
    }

    #[instrument(skip(self, data), fields(backend = "sqlite"))]
    async fn put_record(
        &self,
        collection: &str,
        key: &str,
        data: Value,
        expected_version: Option<Version>,
    ) -> BackendResult<Version> {
        let payload = serde_json::to_string(&data)?;

        match expected_version {
            Some(expected) => {
                let row: Option<(i64,)> = sqlx::query_as(
                    "UPDATE records SET data = ?, version = version + 1
                     WHERE collection = ? AND key = ? AND version = ?
                     RETURNING version",
                )
                .bind(&payload)
                .bind(collection)
                .bind(key)
                .bind(expected as i64)
                .fetch_optional(&self.pool)
                .await?;

                match row {
                    Some((version,)) => Ok(version as Version),
                    None => {
                        let found: Option<(i64,)> = sqlx::query_as(
                            "SELECT version FROM records WHERE collection = ? AND key = ?",
                        )
                        .bind(collection)
                        .bind(key)
                        .fetch_optional(&self.pool)
                        .await?;
                        Err(BackendError::VersionConflict(match found {
                            Some((found,)) => format!(
                                "{collection}/{key}: expected version {expected}, found {found}"
                            ),
                            None => format!(
                                "{collection}/{key}: expected version {expected}, record gone"
                            ),
                        }))
                    }
                }
            }
            None => {
                let (version,): (i64,) = sqlx::query_as(
                    "INSERT INTO records (collection, key, version, data) VALUES (?, ?, 1, ?)
                     ON CONFLICT (collection, key)
                     DO UPDATE SET data = excluded.data, version = records.version + 1
                     RETURNING version",
                )
                .bind(collection)
                .bind(key)
                .bind(&payload)
                .fetch_one(&self.pool)
                .await?;
                Ok(version as Version)
            }
        }
    }

    #[instrument(skip(self, data), fields(backend = "sqlite"))]
    async fn create_record_if_absent(
        &self,
        collection: &str,
        key: &str,
        data: Value,
    ) -> BackendResult<Version> {
        let payload = serde_json::to_string(&data)?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO records (collection, key, version, data) VALUES (?, ?, 1, ?)",
        )
        .bind(collection)
        .bind(key)
        .bind(&payload)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BackendError::Conflict(format!("{collection}/{key}")));
        }
        Ok(1)
    }

    #[instrument(skip(self), fields(backend = "sqlite"))]
    async fn delete_record(&self, collection: &str, key: &str) -> BackendResult<()> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ? AND key = ?")
            .bind(collection)
            .bind(key)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(BackendError::NotFound(format!("{collection}/{key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for SqliteBackend {
    #[instrument(skip(self), fields(backend = "sqlite"))]
    async fn get_blob(&self, name: &str) -> BackendResult<Bytes> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT data FROM blobs WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        let (data,) = row.ok_or_else(|| BackendError::NotFound(format!("blob {name}")))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self, data), fields(backend = "sqlite", size = data.len()))]
    async fn put_blob(&self, name: &str, data: Bytes) -> BackendResult<()> {
        sqlx::query(
            "INSERT INTO blobs (name, data) VALUES (?, ?)
             ON CONFLICT (name) DO UPDATE SET data = excluded.data",
        )
        .bind(name)
        .bind(data.as_ref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "sqlite"))]
    async fn delete_blob(&self, name: &str) -> BackendResult<()> {
        let result = sqlx::query("DELETE FROM blobs WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(BackendError::NotFound(format!("blob {name}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn health_check(&self) -> BackendResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
