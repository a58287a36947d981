//! Configuration schema for shellcache
//!
//! Configuration is stored at `~/.config/shellcache/config.toml`

use crate::store::CacheNames;
use crate::worker::Precache;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Site origin
    pub origin: OriginConfig,

    /// Asset bundle location
    pub bundle: BundleConfig,

    /// Storage backend settings
    pub storage: StorageConfig,

    /// Names of the three caches
    pub caches: CacheNames,

    /// Request routing settings
    pub routing: RoutingConfig,

    /// Install settings
    pub install: InstallConfig,

    /// Network settings
    pub fetch: FetchConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Record lifecycle events to the event log
    pub event_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            event_log: true,
        }
    }
}

/// Site origin settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Origin every resource key is resolved against
    pub url: String,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
        }
    }
}

/// Asset bundle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Path to the asset bundle JSON
    pub path: PathBuf,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("asset-bundle.json"),
        }
    }
}

/// Storage backend settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for named caches (default: `<state_dir>/caches`)
    pub root: Option<PathBuf>,
}

/// Request routing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Cache-busting query parameter stripped from request URLs
    pub version_param: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            version_param: "v".to_string(),
        }
    }
}

/// Install settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Resources staged on install: "core" or "complete"
    pub precache: Precache,
}

/// Network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Concurrent fetches during bulk sync
    pub sync_concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            sync_concurrency: 4,
        }
    }
}
