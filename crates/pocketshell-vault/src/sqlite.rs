//! SQLite-backed durable storage.
//!
//! [`SqliteStorage`] keeps every vault record in one table of a single
//! database file. Values are opaque blobs: the metadata record is JSON with
//! base64 fields and entry records are already encrypted, so nothing in this
//! file is plaintext credential data.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE vault_kv (
//!     namespace  TEXT NOT NULL,   -- 'meta' | 'entries'
//!     key        TEXT NOT NULL,
//!     value      BLOB NOT NULL,
//!     updated_at INTEGER NOT NULL,
//!     PRIMARY KEY (namespace, key)
//! );
//! ```
//!
//! The connection lives behind an `Arc<Mutex<>>` and every call is
//! dispatched onto tokio's blocking pool via `spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{Result, VaultError};
use crate::storage::{Namespace, VaultStorage};

/// Vault storage in a SQLite database.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (or create) the database at `path` and create the schema.
    ///
    /// This call blocks briefly (file I/O); call it during startup.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Database`] if the database cannot be opened, or
    /// [`VaultError::Storage`] if schema setup fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "opening vault database");

        let conn = Connection::open(path)?;
        Self::configure_connection(&conn)?;
        Self::run_migrations(&conn)?;

        tracing::info!("vault database ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Configure SQLite pragmas for durability and safety.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA temp_store = MEMORY;
             PRAGMA secure_delete = ON;",
        )?;
        Ok(())
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        tracing::debug!("running vault schema migrations");

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS vault_kv (
                namespace  TEXT NOT NULL CHECK(namespace IN ('meta','entries')),
                key        TEXT NOT NULL,
                value      BLOB NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (namespace, key)
            );",
        )
        .map_err(|e| VaultError::Storage {
            reason: format!("schema migration failed: {e}"),
        })?;

        tracing::debug!("vault schema migrations complete");
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool.
    async fn execute<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| VaultError::TaskJoin(format!("mutex poisoned: {e}")))?;
            f(&conn)
        })
        .await?
    }
}

#[async_trait]
impl VaultStorage for SqliteStorage {
    async fn get(&self, ns: Namespace, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_owned();
        self.execute(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM vault_kv WHERE namespace = ?1 AND key = ?2",
                    params![ns.as_str(), key],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, ns: Namespace, key: &str, value: Vec<u8>) -> Result<()> {
        let key = key.to_owned();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO vault_kv (namespace, key, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(namespace, key)
                 DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![ns.as_str(), key, value, Utc::now().timestamp()],
            )?;
            tracing::debug!(namespace = %ns, key = %key, "stored vault record");
            Ok(())
        })
        .await
    }

    async fn delete(&self, ns: Namespace, key: &str) -> Result<()> {
        let key = key.to_owned();
        self.execute(move |conn| {
            let rows = conn.execute(
                "DELETE FROM vault_kv WHERE namespace = ?1 AND key = ?2",
                params![ns.as_str(), key],
            )?;
            if rows > 0 {
                tracing::debug!(namespace = %ns, key = %key, "deleted vault record");
            }
            Ok(())
        })
        .await
    }

    async fn keys(&self, ns: Namespace) -> Result<Vec<String>> {
        self.execute(move |conn| {
            let mut stmt =
                conn.prepare("SELECT key FROM vault_kv WHERE namespace = ?1 ORDER BY key")?;
            let keys = stmt
                .query_map(params![ns.as_str()], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(keys)
        })
        .await
    }

    async fn clear(&self, ns: Namespace) -> Result<()> {
        self.execute(move |conn| {
            let rows = conn.execute(
                "DELETE FROM vault_kv WHERE namespace = ?1",
                params![ns.as_str()],
            )?;
            tracing::debug!(namespace = %ns, rows, "cleared vault namespace");
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_and_read_back() {
        let storage = SqliteStorage::open_in_memory().unwrap();

        storage
            .set(Namespace::Entries, "bastion", b"v1".to_vec())
            .await
            .unwrap();
        storage
            .set(Namespace::Entries, "bastion", b"v2".to_vec())
            .await
            .unwrap();

        let value = storage.get(Namespace::Entries, "bastion").await.unwrap();
        assert_eq!(value, Some(b"v2".to_vec()));
        assert!(storage.get(Namespace::Meta, "bastion").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_missing_key_is_ok() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.delete(Namespace::Entries, "nope").await.unwrap();
    }

    #[tokio::test]
    async fn keys_and_clear() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage
            .set(Namespace::Meta, "vault", vec![1])
            .await
            .unwrap();
        for id in ["web-2", "web-1"] {
            storage
                .set(Namespace::Entries, id, vec![2])
                .await
                .unwrap();
        }

        assert_eq!(
            storage.keys(Namespace::Entries).await.unwrap(),
            vec!["web-1", "web-2"]
        );

        storage.clear(Namespace::Entries).await.unwrap();
        assert!(storage.keys(Namespace::Entries).await.unwrap().is_empty());
        assert_eq!(storage.keys(Namespace::Meta).await.unwrap(), vec!["vault"]);
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");

        {
            let storage = SqliteStorage::open(&path).unwrap();
            storage
                .set(Namespace::Meta, "vault", b"meta".to_vec())
                .await
                .unwrap();
        }

        let storage = SqliteStorage::open(&path).unwrap();
        assert_eq!(
            storage.get(Namespace::Meta, "vault").await.unwrap(),
            Some(b"meta".to_vec())
        );
    }
}
