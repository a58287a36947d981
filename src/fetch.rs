//! Network access
//!
//! The [`Fetcher`] trait is the seam between cache logic and the network.
//! [`HttpFetcher`] is the production implementation; tests script their own.

use crate::error::{ShellcacheError, ShellcacheResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP request method
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Other(String),
}

impl Method {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Head => write!(f, "HEAD"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
            Self::Other(m) => write!(f, "{}", m),
        }
    }
}

/// How a request interacts with intermediate HTTP caches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Normal HTTP caching rules apply
    #[default]
    Default,
    /// Force a round-trip to the origin, bypassing any intermediate cache
    Reload,
}

/// Outgoing or intercepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub cache_mode: CacheMode,
}

impl Request {
    /// GET request with default cache mode
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            cache_mode: CacheMode::Default,
        }
    }

    /// Parse a URL string into a GET request
    pub fn parse_get(url: &str) -> ShellcacheResult<Self> {
        let parsed = Url::parse(url).map_err(|source| ShellcacheError::UrlInvalid {
            url: url.to_string(),
            source,
        })?;
        Ok(Self::get(parsed))
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }
}

/// A complete response: status, headers and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: vec![],
            body: body.into(),
        }
    }

    /// 200 response with the given body
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Whether the status is in the 2xx range
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value with a case-insensitive name match
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Network fetch abstraction
///
/// A fetch that reaches the server resolves to a [`Response`] whatever its
/// status; only transport failures are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> ShellcacheResult<Response>;
}

/// Blocking `ureq` agent driven from the tokio blocking pool
#[derive(Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
        }
    }

    fn fetch_blocking(agent: &ureq::Agent, request: &Request) -> ShellcacheResult<Response> {
        let url = request.url.as_str();
        if request.method != Method::Get {
            return Err(ShellcacheError::User(format!(
                "Only GET requests can be fetched, got {}",
                request.method
            )));
        }

        let mut builder = agent.get(url);
        if request.cache_mode == CacheMode::Reload {
            builder = builder
                .header("Cache-Control", "no-cache")
                .header("Pragma", "no-cache");
        }

        let mut response = builder
            .call()
            .map_err(|e| ShellcacheError::network(url, e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| ShellcacheError::network(url, e.to_string()))?;

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> ShellcacheResult<Response> {
        debug!("{} {} ({:?})", request.method, request.url, request.cache_mode);

        let agent = self.agent.clone();
        let request = request.clone();
        tokio::task::spawn_blocking(move || Self::fetch_blocking(&agent, &request))
            .await
            .map_err(|e| ShellcacheError::Internal(format!("fetch task failed: {}", e)))?
    }
}

/// In-memory fetcher serving canned responses by URL
///
/// Unknown URLs resolve to 404. While offline every fetch fails with a
/// network error. All requests are recorded for inspection.
#[derive(Default)]
pub struct StaticFetcher {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    requests: Mutex<Vec<Request>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `response` for `url`, replacing any previous route
    pub fn route(&self, url: &str, response: Response) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(url.to_string(), response);
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Requests seen so far, in arrival order
    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, request: &Request) -> ShellcacheResult<Response> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(ShellcacheError::network(request.url.as_str(), "offline"));
        }

        let routes = self
            .routes
            .lock()
            .map_err(|e| ShellcacheError::Internal(e.to_string()))?;
        Ok(routes
            .get(request.url.as_str())
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found")))
    }
}
