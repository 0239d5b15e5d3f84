//! Blob storage for job records and stage artifacts
//!
//! The pipeline depends on the [`BlobStore`] trait only. Two backends ship
//! with the crate:
//!
//! - [`MemoryBlobStore`]: `DashMap`-backed, lost on restart
//! - [`FsBlobStore`]: one file per key under a root directory
//!
//! Every job owns the key namespace `<prefix>/<job_id>/`, so concurrent jobs
//! never touch each other's keys.
//!
//! # Example
//!
//! ```rust
//! use trueno_traverse::storage::{BlobStore, MemoryBlobStore};
//!
//! # async fn example() -> trueno_traverse::Result<()> {
//! let store = MemoryBlobStore::new();
//!
//! store.put("jobs/job-1/input/uploaded.csv", b"x,y,v\n".to_vec()).await?;
//! assert!(store.exists("jobs/job-1/input/uploaded.csv").await?);
//! assert_eq!(store.list_prefix("jobs/job-1/").await?.len(), 1);
//! # Ok(())
//! # }
//! ```

mod fs;
mod memory;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;

use crate::job::Job;
use crate::{Error, Result};
use std::future::Future;
use std::sync::Arc;

/// Blob storage collaborator.
pub trait BlobStore: Send + Sync {
    /// Store bytes under a key, overwriting any existing blob.
    fn put(&self, key: &str, bytes: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    /// Fetch the blob under a key.
    ///
    /// Returns `None` if the key doesn't exist.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Check if a key exists.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// All keys starting with `prefix`, sorted.
    fn list_prefix(&self, prefix: &str) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// Shared handle, e.g. a store also written to by an asynchronous
/// inference collaborator.
impl<S: BlobStore> BlobStore for Arc<S> {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        (**self).put(key, bytes).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        (**self).exists(key).await
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).list_prefix(prefix).await
    }
}

/// Artifact keys inside one job's namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobKeys {
    root: String,
}

impl JobKeys {
    /// Namespace `<prefix>/<job_id>/`
    #[must_use]
    pub fn new(prefix: &str, job_id: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        let root = if prefix.is_empty() {
            format!("{job_id}/")
        } else {
            format!("{prefix}/{job_id}/")
        };
        Self { root }
    }

    /// Namespace root, ending in `/`
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.root)
    }

    /// Job record
    #[must_use]
    pub fn metadata(&self) -> String {
        self.key("metadata/job.json")
    }

    /// Raw upload
    #[must_use]
    pub fn upload(&self) -> String {
        self.key("input/uploaded.csv")
    }

    /// Frozen traverse
    #[must_use]
    pub fn geometry(&self) -> String {
        self.key("geometry/traverse.csv")
    }

    /// Training pairs
    #[must_use]
    pub fn train(&self) -> String {
        self.key("split/train.csv")
    }

    /// Query distances
    #[must_use]
    pub fn predict(&self) -> String {
        self.key("split/predict.csv")
    }

    /// Where an asynchronous collaborator drops its predictions
    #[must_use]
    pub fn predictions(&self) -> String {
        self.key("inference/predictions.csv")
    }

    /// Final deliverable
    #[must_use]
    pub fn output(&self) -> String {
        self.key("output/final.csv")
    }
}

/// Job records persisted as JSON through a [`BlobStore`].
///
/// Read-modify-write keyed by job id; each job has a single writer.
#[derive(Debug)]
pub struct JobStore<'a, S: BlobStore> {
    store: &'a S,
    prefix: &'a str,
}

impl<'a, S: BlobStore> JobStore<'a, S> {
    /// Wrap a blob store
    #[must_use]
    pub const fn new(store: &'a S, prefix: &'a str) -> Self {
        Self { store, prefix }
    }

    /// Write (create or overwrite) a job record.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the store write fails.
    pub async fn save(&self, job: &Job) -> Result<()> {
        let key = JobKeys::new(self.prefix, job.job_id()).metadata();
        let bytes = serde_json::to_vec_pretty(job)?;
        self.store.put(&key, bytes).await
    }

    /// Load a job record.
    ///
    /// # Errors
    ///
    /// Returns `Error::JobNotFound` if no record exists, or a storage/JSON
    /// error if it cannot be read.
    pub async fn load(&self, job_id: &str) -> Result<Job> {
        let key = JobKeys::new(self.prefix, job_id).metadata();
        let bytes = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
