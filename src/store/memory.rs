//! In-process cache storage

use super::{CacheStorage, NamedCache};
use crate::error::{ShellcacheError, ShellcacheResult};
use crate::fetch::Response;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cache storage held entirely in memory
#[derive(Default)]
pub struct MemoryStorage {
    caches: RwLock<HashMap<String, Arc<MemoryCache>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> ShellcacheResult<Arc<dyn NamedCache>> {
        let mut caches = self.caches.write().await;
        let cache: Arc<dyn NamedCache> = caches
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCache::new(name)))
            .clone();
        Ok(cache)
    }

    async fn has(&self, name: &str) -> ShellcacheResult<bool> {
        Ok(self.caches.read().await.contains_key(name))
    }

    async fn delete(&self, name: &str) -> ShellcacheResult<bool> {
        match self.caches.write().await.remove(name) {
            Some(cache) => {
                cache.detached.store(true, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn names(&self) -> ShellcacheResult<Vec<String>> {
        Ok(self.caches.read().await.keys().cloned().collect())
    }
}

/// A single in-memory named cache
pub struct MemoryCache {
    name: String,
    entries: RwLock<HashMap<String, Response>>,
    detached: AtomicBool,
}

impl MemoryCache {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(HashMap::new()),
            detached: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl NamedCache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> ShellcacheResult<Option<Response>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, response: &Response) -> ShellcacheResult<()> {
        if self.detached.load(Ordering::SeqCst) {
            return Err(ShellcacheError::CacheDetached(self.name.clone()));
        }
        self.entries
            .write()
            .await
            .insert(key.to_string(), response.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> ShellcacheResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn keys(&self) -> ShellcacheResult<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}
