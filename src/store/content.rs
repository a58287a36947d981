//! Content cache serving runtime requests

use super::NamedCache;
use crate::error::ShellcacheResult;
use crate::fetch::Response;
use crate::manifest::ResourceKey;
use std::sync::Arc;

/// Resource-keyed view over the content named cache
#[derive(Clone)]
pub struct ContentCache {
    inner: Arc<dyn NamedCache>,
}

impl ContentCache {
    pub fn new(inner: Arc<dyn NamedCache>) -> Self {
        Self { inner }
    }

    pub async fn get(&self, key: &ResourceKey) -> ShellcacheResult<Option<Response>> {
        self.inner.get(key.as_str()).await
    }

    /// Store a response; last writer wins
    pub async fn put(&self, key: &ResourceKey, response: &Response) -> ShellcacheResult<()> {
        self.inner.put(key.as_str(), response).await
    }

    /// Delete by raw stored key, which may not be a valid resource key
    pub async fn delete(&self, key: &str) -> ShellcacheResult<bool> {
        self.inner.delete(key).await
    }

    /// Raw stored keys, snapshot at call time
    pub async fn list_keys(&self) -> ShellcacheResult<Vec<String>> {
        self.inner.keys().await
    }

    pub fn handle(&self) -> &dyn NamedCache {
        &*self.inner
    }
}
