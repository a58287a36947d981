//! Request routing
//!
//! Decides per request whether to pass through, serve network-first (root
//! document) or serve cache-first (every other manifest resource).

use crate::error::{ShellcacheError, ShellcacheResult};
use crate::fetch::{Fetcher, Method, Request, Response};
use crate::manifest::{Manifest, ResourceKey};
use crate::store::{ContentCache, Stores};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Site origin that resource keys are relative to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    base: Url,
}

impl Origin {
    /// Parse an http(s) origin; any path, query or fragment is dropped
    pub fn parse(s: &str) -> ShellcacheResult<Self> {
        let mut base = Url::parse(s).map_err(|source| ShellcacheError::UrlInvalid {
            url: s.to_string(),
            source,
        })?;

        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(ShellcacheError::User(format!(
                "Origin must be an http(s) URL: {}",
                s
            )));
        }

        base.set_path("/");
        base.set_query(None);
        base.set_fragment(None);
        Ok(Self { base })
    }

    pub fn as_url(&self) -> &Url {
        &self.base
    }

    /// Absolute URL for a resource key
    pub fn url_for(&self, key: &ResourceKey) -> ShellcacheResult<Url> {
        self.base
            .join(key.url_path())
            .map_err(|source| ShellcacheError::UrlInvalid {
                url: key.to_string(),
                source,
            })
    }

    /// Origin-relative remainder of `url` (path without the leading slash,
    /// then query and fragment), or `None` for a foreign origin
    pub fn relative(&self, url: &Url) -> Option<String> {
        if url.origin() != self.base.origin() {
            return None;
        }

        let mut rel = url.path().trim_start_matches('/').to_string();
        if let Some(query) = url.query() {
            rel.push('?');
            rel.push_str(query);
        }
        if let Some(fragment) = url.fragment() {
            rel.push('#');
            rel.push_str(fragment);
        }
        Some(rel)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base.as_str().trim_end_matches('/'))
    }
}

/// Routing decision for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Not ours; let the default network handling take it
    PassThrough,
    /// Root document: network, then cache on failure
    NetworkFirst(ResourceKey),
    /// Build artifact: cache, then network with write-through on miss
    CacheFirst(ResourceKey),
}

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// Result of handling an intercepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    PassThrough,
    Respond {
        response: Response,
        source: ResponseSource,
    },
}

/// Routes GET requests for manifest resources through the content cache
#[derive(Clone)]
pub struct Router {
    manifest: Arc<Manifest>,
    origin: Origin,
    version_param: String,
    stores: Stores,
    fetcher: Arc<dyn Fetcher>,
}

impl Router {
    pub fn new(
        manifest: Arc<Manifest>,
        origin: Origin,
        version_param: impl Into<String>,
        stores: Stores,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            manifest,
            origin,
            version_param: version_param.into(),
            stores,
            fetcher,
        }
    }

    /// Map a request URL to a resource key
    ///
    /// Strips the origin and the cache-busting version parameter, and folds
    /// the bare origin and `/#...` navigations onto the root key. Returns
    /// `None` for foreign origins.
    pub fn normalize(&self, url: &Url) -> Option<ResourceKey> {
        let mut rel = self.origin.relative(url)?;

        let marker = format!("?{}=", self.version_param);
        if let Some(pos) = rel.find(&marker) {
            rel.truncate(pos);
        }

        if rel.is_empty() || rel.starts_with('#') {
            return Some(ResourceKey::root());
        }

        ResourceKey::new(rel).ok()
    }

    /// Decide how to serve a request
    pub fn route(&self, request: &Request) -> Route {
        if request.method != Method::Get {
            return Route::PassThrough;
        }

        let Some(key) = self.normalize(&request.url) else {
            return Route::PassThrough;
        };

        if !self.manifest.contains(&key) {
            return Route::PassThrough;
        }

        if key.is_root() {
            Route::NetworkFirst(key)
        } else {
            Route::CacheFirst(key)
        }
    }

    /// Serve a request according to its route
    pub async fn handle(&self, request: &Request) -> ShellcacheResult<FetchOutcome> {
        let route = self.route(request);
        debug!("{} {} -> {:?}", request.method, request.url, route);

        match route {
            Route::PassThrough => Ok(FetchOutcome::PassThrough),
            Route::NetworkFirst(key) => self.network_first(request, &key).await,
            Route::CacheFirst(key) => self.cache_first(request, &key).await,
        }
    }

    /// Open the content cache; failure degrades to serving from the network
    async fn content(&self, key: &ResourceKey) -> Option<ContentCache> {
        match self.stores.content().await {
            Ok(content) => Some(content),
            Err(e) => {
                warn!("Content cache unavailable for {}, using network: {}", key, e);
                None
            }
        }
    }

    async fn cache_first(
        &self,
        request: &Request,
        key: &ResourceKey,
    ) -> ShellcacheResult<FetchOutcome> {
        let content = self.content(key).await;

        if let Some(content) = &content {
            match content.get(key).await {
                Ok(Some(response)) => {
                    return Ok(FetchOutcome::Respond {
                        response,
                        source: ResponseSource::Cache,
                    })
                }
                Ok(None) => {}
                Err(e) => warn!("Cache read for {} failed, using network: {}", key, e),
            }
        }

        let response = self.fetcher.fetch(request).await?;
        if let Some(content) = content.filter(|_| response.is_ok()) {
            if let Err(e) = content.put(key, &response).await {
                warn!("Failed to cache {}: {}", key, e);
            } else {
                debug!("Cached {} on miss", key);
            }
        }

        Ok(FetchOutcome::Respond {
            response,
            source: ResponseSource::Network,
        })
    }

    async fn network_first(
        &self,
        request: &Request,
        key: &ResourceKey,
    ) -> ShellcacheResult<FetchOutcome> {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_ok() {
                    if let Some(content) = self.content(key).await {
                        if let Err(e) = content.put(key, &response).await {
                            warn!("Failed to refresh {}: {}", key, e);
                        }
                    }
                }
                Ok(FetchOutcome::Respond {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(err) => {
                let Some(content) = self.content(key).await else {
                    return Err(err);
                };
                match content.get(key).await {
                    Ok(Some(response)) => {
                        debug!("Network failed for {}, serving cached copy", key);
                        Ok(FetchOutcome::Respond {
                            response,
                            source: ResponseSource::Cache,
                        })
                    }
                    _ => Err(err),
                }
            }
        }
    }
}
