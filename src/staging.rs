//! Staging area filled during install
//!
//! Shell files are fetched with [`CacheMode::Reload`] so every install sees
//! the latest deployed bytes, never a copy held by an intermediate cache.

use crate::error::{ShellcacheError, ShellcacheResult};
use crate::fetch::{CacheMode, Fetcher, Request};
use crate::manifest::ResourceKey;
use crate::router::Origin;
use crate::store::NamedCache;
use std::sync::Arc;
use tracing::{debug, info};

/// Write buffer for shell files awaiting activation
pub struct StagingArea {
    cache: Arc<dyn NamedCache>,
    fetcher: Arc<dyn Fetcher>,
    origin: Origin,
}

impl StagingArea {
    pub fn new(cache: Arc<dyn NamedCache>, fetcher: Arc<dyn Fetcher>, origin: Origin) -> Self {
        Self {
            cache,
            fetcher,
            origin,
        }
    }

    /// Fetch every key from the network and store it
    ///
    /// Stops at the first failed fetch or non-2xx response; entries stored
    /// before the failure are left in place.
    pub async fn populate(&self, keys: &[ResourceKey]) -> ShellcacheResult<usize> {
        for key in keys {
            let url = self.origin.url_for(key)?;
            let request = Request::get(url).with_cache_mode(CacheMode::Reload);

            let response = self
                .fetcher
                .fetch(&request)
                .await
                .map_err(|e| ShellcacheError::staging_fetch(key.as_str(), e))?;

            if !response.is_ok() {
                return Err(ShellcacheError::staging_fetch(
                    key.as_str(),
                    format!("status {}", response.status),
                ));
            }

            self.cache.put(key.as_str(), &response).await?;
            debug!("Staged {} ({} bytes)", key, response.body.len());
        }

        info!("Staged {} shell files", keys.len());
        Ok(keys.len())
    }
}
