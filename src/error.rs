//! Error types for shellcache
//!
//! All modules use `ShellcacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for shellcache operations
pub type ShellcacheResult<T> = Result<T, ShellcacheError>;

/// All errors that can occur in shellcache
#[derive(Error, Debug)]
pub enum ShellcacheError {
    // Manifest errors
    #[error("Invalid asset bundle at {path}: {reason}")]
    BundleInvalid { path: PathBuf, reason: String },

    #[error("Asset bundle not found: {0}")]
    BundleNotFound(PathBuf),

    #[error("Invalid resource key {key:?}: {reason}")]
    KeyInvalid { key: String, reason: String },

    // Storage errors
    #[error("Cache entry {key} in {cache} is corrupt: {reason}")]
    EntryCorrupt {
        cache: String,
        key: String,
        reason: String,
    },

    #[error("Cache {0} was deleted while in use")]
    CacheDetached(String),

    // Fetch errors
    #[error("Network request failed: {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("Request for {url} returned status {status}")]
    BadStatus { url: String, status: u16 },

    #[error("Invalid URL {url}: {source}")]
    UrlInvalid {
        url: String,
        #[source]
        source: url::ParseError,
    },

    // Lifecycle errors
    #[error("Failed to stage shell file {key}: {reason}")]
    StagingFetch { key: String, reason: String },

    #[error("Reconciliation failed during {stage}: {reason}")]
    Reconciliation { stage: String, reason: String },

    #[error("Worker is {0}, cannot continue")]
    WorkerState(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl ShellcacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a network error for a URL
    pub fn network(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a staging fetch error for a shell key
    pub fn staging_fetch(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::StagingFetch {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a reconciliation error tagged with the failing stage
    pub fn reconciliation(stage: impl ToString, reason: impl ToString) -> Self {
        Self::Reconciliation {
            stage: stage.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Check if error is retryable
    ///
    /// Reconciliation failures are never retried in place; the next
    /// activation starts from an empty cache instead.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::StagingFetch { .. } | Self::BadStatus { status: 500.., .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::BundleNotFound(_) => Some("Run: shellcache manifest build <dir>"),
            Self::StagingFetch { .. } => Some("Check that the origin is reachable, then run: shellcache install"),
            Self::Reconciliation { .. } => {
                Some("All caches were cleared; the next activation starts from a cold cache")
            }
            Self::Network { .. } => Some("Check the [origin] url in your config"),
            _ => None,
        }
    }
}
