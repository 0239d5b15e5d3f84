//! In-memory blob store using `DashMap`.
//!
//! Default backend for tests and single-process deployments - data is lost
//! on process restart.

use super::BlobStore;
use crate::Result;
use dashmap::DashMap;

/// In-memory blob store using a lock-free concurrent hashmap.
///
/// Thread-safe; concurrent jobs write disjoint key namespaces.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    /// Create a new in-memory blob store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blobs: DashMap::new(),
        }
    }

    /// Get the number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.blobs.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.get(key).map(|v| v.value().clone()))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.blobs.contains_key(key))
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .blobs
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
