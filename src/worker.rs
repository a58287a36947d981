//! Worker lifecycle
//!
//! A [`Worker`] is one generation of the cache logic, bound to one asset
//! bundle. The host drives it through install, activate, fetch and message
//! events:
//!
//! ```text
//! Parsed -> Installing -> Installed -> Activating -> Activated
//!               |                          |
//!               +-------> Redundant <------+
//! ```

use crate::error::{ShellcacheError, ShellcacheResult};
use crate::events::EventLog;
use crate::fetch::{Fetcher, Request, Response};
use crate::manifest::{AssetBundle, Manifest, ResourceKey};
use crate::reconcile::{ActivationReport, Reconciler};
use crate::router::{FetchOutcome, Origin, Router};
use crate::staging::StagingArea;
use crate::store::Stores;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    /// Activation committed and clients claimed
    Activated,
    /// Install or activation failed; this worker will not control clients
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        };
        write!(f, "{}", name)
    }
}

/// Commands accepted on the message channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMessage {
    /// Activate now instead of waiting for old clients to close
    SkipWaiting,
    /// Fetch every manifest resource missing from the content cache
    DownloadOffline,
}

impl WorkerMessage {
    /// Parse a wire message; unknown messages yield `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "skipWaiting" => Some(Self::SkipWaiting),
            "downloadOffline" => Some(Self::DownloadOffline),
            _ => None,
        }
    }
}

/// Result of handling a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// `SkipWaiting` ran the activation
    Activated(ActivationReport),
    /// `SkipWaiting` arrived with nothing waiting to activate
    NotWaiting(WorkerState),
    Synced(SyncReport),
}

/// Which resources install stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precache {
    /// Only the shell keys; everything else is cached lazily
    #[default]
    Core,
    /// Shell keys plus every resource that is new, changed or not yet cached
    Complete,
}

/// Outcome of a bulk sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Manifest keys missing from the content cache
    pub requested: usize,
    /// Entries written
    pub stored: usize,
}

/// Runtime options for a worker
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub origin: Origin,
    pub version_param: String,
    pub precache: Precache,
    pub sync_concurrency: usize,
}

impl WorkerOptions {
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            version_param: "v".to_string(),
            precache: Precache::Core,
            sync_concurrency: 4,
        }
    }
}

/// One generation of the cache logic
pub struct Worker {
    id: String,
    bundle: Arc<AssetBundle>,
    manifest: Arc<Manifest>,
    stores: Stores,
    fetcher: Arc<dyn Fetcher>,
    options: WorkerOptions,
    router: Router,
    events: EventLog,
    state: watch::Sender<WorkerState>,
}

impl Worker {
    pub fn new(
        bundle: AssetBundle,
        stores: Stores,
        fetcher: Arc<dyn Fetcher>,
        options: WorkerOptions,
        events: EventLog,
    ) -> Self {
        let manifest = Arc::new(bundle.resources.clone());
        let router = Router::new(
            manifest.clone(),
            options.origin.clone(),
            options.version_param.clone(),
            stores.clone(),
            fetcher.clone(),
        );
        let (state, _) = watch::channel(WorkerState::Parsed);

        Self {
            id: Uuid::new_v4().to_string(),
            bundle: Arc::new(bundle),
            manifest,
            stores,
            fetcher,
            options,
            router,
            events,
            state,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    fn transition(&self, next: WorkerState) {
        debug!("Worker {} -> {}", self.id, next);
        self.state.send_replace(next);
    }

    /// Stage the shell files for the next activation
    ///
    /// Any leftover staging cache from an earlier, never-activated install
    /// is discarded first.
    pub async fn install(&self) -> ShellcacheResult<usize> {
        self.transition(WorkerState::Installing);

        match self.populate_staging().await {
            Ok(staged) => {
                self.transition(WorkerState::Installed);
                self.events
                    .log(
                        &self.id,
                        "install.completed",
                        &serde_json::json!({ "staged": staged }),
                    )
                    .await;
                Ok(staged)
            }
            Err(e) => {
                warn!("Install failed: {}", e);
                self.transition(WorkerState::Redundant);
                self.events
                    .log(
                        &self.id,
                        "install.failed",
                        &serde_json::json!({ "error": e.to_string() }),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn populate_staging(&self) -> ShellcacheResult<usize> {
        let keys = self.staging_keys().await?;
        self.stores.delete_staging().await?;

        let staging = StagingArea::new(
            self.stores.staging().await?,
            self.fetcher.clone(),
            self.options.origin.clone(),
        );
        staging.populate(&keys).await
    }

    /// Keys install fetches, shell keys first
    pub async fn staging_keys(&self) -> ShellcacheResult<Vec<ResourceKey>> {
        let mut keys = self.bundle.core.clone();
        if self.options.precache == Precache::Core {
            return Ok(keys);
        }

        let previous = self.stores.manifest_store().await?.load().await?;
        let cached: HashSet<String> = self
            .stores
            .content()
            .await?
            .list_keys()
            .await?
            .into_iter()
            .collect();

        for key in self.manifest.keys() {
            if keys.contains(key) {
                continue;
            }
            let outdated = match &previous {
                None => true,
                Some(previous) => self.manifest.is_stale(previous, key),
            };
            if outdated || !cached.contains(key.as_str()) {
                keys.push(key.clone());
            }
        }

        Ok(keys)
    }

    /// Reconcile the content cache with this worker's manifest
    ///
    /// Runs at most once per worker. On failure all caches are cleared and
    /// the worker becomes redundant.
    pub async fn activate(&self) -> ShellcacheResult<ActivationReport> {
        match self.state() {
            WorkerState::Parsed | WorkerState::Installed => {}
            other => return Err(ShellcacheError::WorkerState(other.to_string())),
        }
        self.transition(WorkerState::Activating);

        let reconciler = Reconciler::new(self.stores.clone(), self.manifest.clone(), &self.id);
        let result = reconciler
            .run(|| self.transition(WorkerState::Activated))
            .await;

        match &result {
            Ok(report) => {
                self.events
                    .log(
                        &self.id,
                        "activation.completed",
                        &serde_json::json!({
                            "fresh_install": report.fresh_install,
                            "evicted": report.evicted,
                            "retained": report.retained,
                            "promoted": report.promoted,
                            "resources": report.resources,
                        }),
                    )
                    .await;
            }
            Err(e) => {
                self.transition(WorkerState::Redundant);
                self.events
                    .log(
                        &self.id,
                        "activation.failed",
                        &serde_json::json!({ "error": e.to_string() }),
                    )
                    .await;
            }
        }

        result
    }

    /// Run activation as a task the host can await before declaring readiness
    pub fn spawn_activation(self: &Arc<Self>) -> JoinHandle<ShellcacheResult<ActivationReport>> {
        let worker = Arc::clone(self);
        tokio::spawn(async move { worker.activate().await })
    }

    /// Handle an intercepted request
    pub async fn handle_fetch(&self, request: &Request) -> ShellcacheResult<FetchOutcome> {
        self.router.handle(request).await
    }

    /// Handle a message from a client
    pub async fn handle_message(&self, message: WorkerMessage) -> ShellcacheResult<MessageOutcome> {
        match message {
            WorkerMessage::SkipWaiting => match self.state() {
                WorkerState::Parsed | WorkerState::Installed => {
                    Ok(MessageOutcome::Activated(self.activate().await?))
                }
                other => {
                    debug!("skipWaiting ignored, worker is {}", other);
                    Ok(MessageOutcome::NotWaiting(other))
                }
            },
            WorkerMessage::DownloadOffline => Ok(MessageOutcome::Synced(self.sync_all().await?)),
        }
    }

    /// Fetch and store every manifest resource missing from the content cache
    ///
    /// All fetches must succeed with a 2xx status before anything is stored.
    pub async fn sync_all(&self) -> ShellcacheResult<SyncReport> {
        let content = self.stores.content().await?;
        let cached: HashSet<String> = content.list_keys().await?.into_iter().collect();

        let missing: Vec<ResourceKey> = self
            .manifest
            .keys()
            .filter(|k| !cached.contains(k.as_str()))
            .cloned()
            .collect();

        if missing.is_empty() {
            debug!("Content cache already holds every resource");
            return Ok(SyncReport::default());
        }

        let origin = &self.options.origin;
        let fetcher = &self.fetcher;
        let fetched: Vec<ShellcacheResult<(ResourceKey, Response)>> = stream::iter(missing.iter())
            .map(|key| async move {
                let url = origin.url_for(key)?;
                let response = fetcher.fetch(&Request::get(url.clone())).await?;
                if !response.is_ok() {
                    return Err(ShellcacheError::BadStatus {
                        url: url.to_string(),
                        status: response.status,
                    });
                }
                Ok((key.clone(), response))
            })
            .buffer_unordered(self.options.sync_concurrency.max(1))
            .collect()
            .await;

        let responses = fetched.into_iter().collect::<ShellcacheResult<Vec<_>>>()?;
        for (key, response) in &responses {
            content.put(key, response).await?;
        }

        let report = SyncReport {
            requested: missing.len(),
            stored: responses.len(),
        };
        info!("Synced {} resources for offline use", report.stored);
        self.events
            .log(
                &self.id,
                "sync.completed",
                &serde_json::json!({ "stored": report.stored }),
            )
            .await;
        Ok(report)
    }
}
