//! Durable key-value storage consumed by the vault.
//!
//! The vault persists exactly two kinds of record, each in its own
//! [`Namespace`]: the metadata records (salt, wrapped keys, biometric
//! registration) and one encrypted record per credential id. Anything that
//! can get, set and delete byte values by key can back a vault.
//!
//! - [`MemoryStorage`]: process-local map, for tests and throwaway sessions.
//! - [`SqliteStorage`](crate::sqlite::SqliteStorage): single-file SQLite.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;

/// Record namespace within a storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Vault metadata and biometric registration.
    Meta,
    /// Encrypted credential entries, keyed by credential id.
    Entries,
}

impl Namespace {
    /// Convert to the string stored by persistent backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::Entries => "entries",
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque byte store.
///
/// Errors from these methods are treated as fatal by the vault and are
/// propagated to the caller unchanged.
#[async_trait]
pub trait VaultStorage: Send + Sync {
    /// Read the value under `key`, or `None` if absent.
    async fn get(&self, ns: Namespace, key: &str) -> Result<Option<Vec<u8>>>;

    /// Insert or overwrite the value under `key`.
    async fn set(&self, ns: Namespace, key: &str, value: Vec<u8>) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, ns: Namespace, key: &str) -> Result<()>;

    /// All keys in `ns`, sorted.
    async fn keys(&self, ns: Namespace) -> Result<Vec<String>>;

    /// Remove every key in `ns`.
    async fn clear(&self, ns: Namespace) -> Result<()> {
        for key in self.keys(ns).await? {
            self.delete(ns, &key).await?;
        }
        Ok(())
    }
}

/// In-memory storage backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: DashMap<(Namespace, String), Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all namespaces.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl VaultStorage for MemoryStorage {
    async fn get(&self, ns: Namespace, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .records
            .get(&(ns, key.to_owned()))
            .map(|v| v.value().clone()))
    }

    async fn set(&self, ns: Namespace, key: &str, value: Vec<u8>) -> Result<()> {
        self.records.insert((ns, key.to_owned()), value);
        Ok(())
    }

    async fn delete(&self, ns: Namespace, key: &str) -> Result<()> {
        self.records.remove(&(ns, key.to_owned()));
        Ok(())
    }

    async fn keys(&self, ns: Namespace) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .records
            .iter()
            .filter(|r| r.key().0 == ns)
            .map(|r| r.key().1.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let storage = MemoryStorage::new();
        assert!(storage.get(Namespace::Meta, "vault").await.unwrap().is_none());

        storage
            .set(Namespace::Meta, "vault", b"one".to_vec())
            .await
            .unwrap();
        storage
            .set(Namespace::Meta, "vault", b"two".to_vec())
            .await
            .unwrap();
        assert_eq!(
            storage.get(Namespace::Meta, "vault").await.unwrap(),
            Some(b"two".to_vec())
        );

        storage.delete(Namespace::Meta, "vault").await.unwrap();
        storage.delete(Namespace::Meta, "vault").await.unwrap();
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn namespaces_are_separate() {
        let storage = MemoryStorage::new();
        storage
            .set(Namespace::Meta, "k", b"meta".to_vec())
            .await
            .unwrap();
        storage
            .set(Namespace::Entries, "k", b"entry".to_vec())
            .await
            .unwrap();

        assert_eq!(
            storage.get(Namespace::Entries, "k").await.unwrap(),
            Some(b"entry".to_vec())
        );

        storage.clear(Namespace::Entries).await.unwrap();
        assert!(storage.get(Namespace::Entries, "k").await.unwrap().is_none());
        assert!(storage.get(Namespace::Meta, "k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn keys_are_sorted() {
        let storage = MemoryStorage::new();
        for id in ["prod-db", "bastion", "homelab"] {
            storage
                .set(Namespace::Entries, id, vec![0])
                .await
                .unwrap();
        }
        assert_eq!(
            storage.keys(Namespace::Entries).await.unwrap(),
            vec!["bastion", "homelab", "prod-db"]
        );
        assert!(storage.keys(Namespace::Meta).await.unwrap().is_empty());
    }
}
