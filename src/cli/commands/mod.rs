//! CLI command implementations

pub mod clear;
pub mod config;
pub mod fetch;
pub mod lifecycle;
pub mod manifest;
pub mod message;
pub mod status;
pub mod sync;

pub use clear::execute as clear;
pub use config::execute as config;
pub use fetch::execute as fetch;
pub use lifecycle::{activate, install, update};
pub use manifest::execute as manifest;
pub use message::execute as message;
pub use status::execute as status;
pub use sync::execute as sync;

use crate::config::{Config, ConfigManager};
use crate::error::ShellcacheResult;
use crate::events::EventLog;
use crate::fetch::HttpFetcher;
use crate::manifest::AssetBundle;
use crate::router::Origin;
use crate::store::{FsStorage, Stores};
use crate::worker::{Worker, WorkerOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Configuration with command-line overrides applied
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: Config,
    pub bundle_path: PathBuf,
    pub origin: String,
}

impl Settings {
    pub fn new(config: Config, bundle: Option<PathBuf>, origin: Option<String>) -> Self {
        Self {
            bundle_path: bundle.unwrap_or_else(|| config.bundle.path.clone()),
            origin: origin.unwrap_or_else(|| config.origin.url.clone()),
            config,
        }
    }

    /// Named caches on the configured filesystem root
    pub fn stores(&self) -> Stores {
        let root = ConfigManager::storage_root(&self.config);
        debug!("Using cache storage at {}", root.display());
        Stores::new(
            Arc::new(FsStorage::new(root)),
            self.config.caches.clone(),
        )
    }

    fn events(&self) -> EventLog {
        if self.config.general.event_log {
            EventLog::new(ConfigManager::event_log_path())
        } else {
            EventLog::disabled()
        }
    }

    /// Build a worker for the configured bundle
    pub async fn worker(&self) -> ShellcacheResult<Worker> {
        let bundle = AssetBundle::load(&self.bundle_path).await?;
        let origin = Origin::parse(&self.origin)?;

        let mut options = WorkerOptions::new(origin);
        options.version_param = self.config.routing.version_param.clone();
        options.precache = self.config.install.precache;
        options.sync_concurrency = self.config.fetch.sync_concurrency;

        let fetcher = HttpFetcher::new(Duration::from_secs(self.config.fetch.timeout_secs));

        Ok(Worker::new(
            bundle,
            self.stores(),
            Arc::new(fetcher),
            options,
            self.events(),
        ))
    }
}
