//! Named cache storage
//!
//! Persisted state lives in three independently addressable named caches:
//!
//! | Cache | Lifetime | Contents |
//! |-------|----------|----------|
//! | content | durable | responses served to runtime requests |
//! | staging | install → activate | freshly fetched shell files |
//! | manifest | durable | one record: the last committed manifest |
//!
//! Backends implement [`CacheStorage`] and hand out [`NamedCache`] handles.
//! Deleting a cache detaches existing handles; a later `open` starts empty.

pub mod content;
pub mod fs;
pub mod manifest_store;
pub mod memory;

pub use content::ContentCache;
pub use fs::FsStorage;
pub use manifest_store::{ManifestRecord, ManifestStore};
pub use memory::MemoryStorage;

use crate::error::ShellcacheResult;
use crate::fetch::Response;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// A single string-keyed response store
#[async_trait]
pub trait NamedCache: Send + Sync {
    /// Name this handle was opened with
    fn name(&self) -> &str;

    /// Look up a stored response
    async fn get(&self, key: &str) -> ShellcacheResult<Option<Response>>;

    /// Store a response, replacing any existing entry for the key
    async fn put(&self, key: &str, response: &Response) -> ShellcacheResult<()>;

    /// Remove an entry, returning whether it existed
    async fn delete(&self, key: &str) -> ShellcacheResult<bool>;

    /// Snapshot of the stored keys, in no particular order
    async fn keys(&self) -> ShellcacheResult<Vec<String>>;
}

/// Collection of named caches
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a cache by name, creating it if missing
    async fn open(&self, name: &str) -> ShellcacheResult<Arc<dyn NamedCache>>;

    /// Whether a cache with this name exists
    async fn has(&self, name: &str) -> ShellcacheResult<bool>;

    /// Delete a cache and all its entries, returning whether it existed
    async fn delete(&self, name: &str) -> ShellcacheResult<bool>;

    /// Names of all existing caches
    async fn names(&self) -> ShellcacheResult<Vec<String>>;
}

/// Names of the three caches a worker uses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheNames {
    /// Long-lived cache serving runtime requests
    pub content: String,

    /// Transient cache filled during install
    pub staging: String,

    /// Cache holding the committed manifest record
    pub manifest: String,
}

impl Default for CacheNames {
    fn default() -> Self {
        Self {
            content: "shell-app-cache".to_string(),
            staging: "shell-temp-cache".to_string(),
            manifest: "shell-app-manifest".to_string(),
        }
    }
}

impl CacheNames {
    pub fn all(&self) -> [&str; 3] {
        [&self.content, &self.staging, &self.manifest]
    }
}

/// Storage handle bound to a set of cache names
///
/// Handles are opened per operation so that a cache deleted by one
/// component is transparently recreated by the next `open`.
#[derive(Clone)]
pub struct Stores {
    storage: Arc<dyn CacheStorage>,
    names: CacheNames,
}

impl Stores {
    pub fn new(storage: Arc<dyn CacheStorage>, names: CacheNames) -> Self {
        Self { storage, names }
    }

    pub fn names(&self) -> &CacheNames {
        &self.names
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub async fn content(&self) -> ShellcacheResult<ContentCache> {
        Ok(ContentCache::new(self.storage.open(&self.names.content).await?))
    }

    pub async fn staging(&self) -> ShellcacheResult<Arc<dyn NamedCache>> {
        self.storage.open(&self.names.staging).await
    }

    pub async fn manifest_store(&self) -> ShellcacheResult<ManifestStore> {
        Ok(ManifestStore::new(
            self.storage.open(&self.names.manifest).await?,
        ))
    }

    pub async fn delete_content(&self) -> ShellcacheResult<bool> {
        self.storage.delete(&self.names.content).await
    }

    pub async fn delete_staging(&self) -> ShellcacheResult<bool> {
        self.storage.delete(&self.names.staging).await
    }

    /// Delete all three caches
    ///
    /// Every deletion is attempted even if an earlier one fails; the first
    /// error is returned.
    pub async fn delete_all(&self) -> ShellcacheResult<()> {
        let mut first_err = None;
        for name in self.names.all() {
            match self.storage.delete(name).await {
                Ok(existed) => debug!("Deleted cache {} (existed: {})", name, existed),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Whether each of the three caches currently exists
    pub async fn existing(&self) -> ShellcacheResult<[(String, bool); 3]> {
        let [content, staging, manifest] = self.names.all();
        Ok([
            (content.to_string(), self.storage.has(content).await?),
            (staging.to_string(), self.storage.has(staging).await?),
            (manifest.to_string(), self.storage.has(manifest).await?),
        ])
    }
}

/// Copy every entry of `from` into `to`, overwriting existing entries
pub async fn copy_all(from: &dyn NamedCache, to: &dyn NamedCache) -> ShellcacheResult<usize> {
    let mut copied = 0;
    for key in from.keys().await? {
        if let Some(response) = from.get(&key).await? {
            to.put(&key, &response).await?;
            copied += 1;
        }
    }
    Ok(copied)
}
