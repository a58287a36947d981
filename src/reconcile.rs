//! Activation-time reconciliation of the content cache
//!
//! Brings the content cache into agreement with a new manifest as an ordered
//! pipeline:
//!
//! | Stage | Effect | Postcondition |
//! |-------|--------|---------------|
//! | load-manifest | read the previous manifest | - |
//! | flush (first activation) | delete the whole content cache | content is empty |
//! | evict (upgrade) | delete removed or changed entries | no stale entry remains |
//! | promote-staging | copy staged shell files over content | every staged key is in content |
//! | discard-staging | delete the staging cache | staging does not exist |
//! | commit-manifest | persist the new manifest | stored manifest equals the new one |
//! | claim | signal readiness | - |
//!
//! Any failure before claim deletes all three caches, so the next activation
//! starts over from the first-activation path instead of trusting a
//! half-merged cache.

use crate::error::{ShellcacheError, ShellcacheResult};
use crate::manifest::{Manifest, ResourceKey};
use crate::store::{copy_all, ContentCache, Stores};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Reconciliation pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadManifest,
    Flush,
    Evict,
    PromoteStaging,
    DiscardStaging,
    CommitManifest,
    Claim,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LoadManifest => "load-manifest",
            Self::Flush => "flush",
            Self::Evict => "evict",
            Self::PromoteStaging => "promote-staging",
            Self::DiscardStaging => "discard-staging",
            Self::CommitManifest => "commit-manifest",
            Self::Claim => "claim",
        };
        write!(f, "{}", name)
    }
}

/// Summary of a successful activation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// No previous manifest existed, so the content cache was flushed
    pub fresh_install: bool,
    /// Content keys deleted as removed or changed
    pub evicted: Vec<String>,
    /// Content keys kept from the previous generation
    pub retained: usize,
    /// Entries copied from staging into content
    pub promoted: usize,
    /// Resources in the committed manifest
    pub resources: usize,
}

/// Applies a new manifest to the content cache
pub struct Reconciler {
    stores: Stores,
    manifest: Arc<Manifest>,
    worker_id: String,
}

impl Reconciler {
    pub fn new(stores: Stores, manifest: Arc<Manifest>, worker_id: impl Into<String>) -> Self {
        Self {
            stores,
            manifest,
            worker_id: worker_id.into(),
        }
    }

    /// Run the pipeline, invoking `claim` once everything is committed
    ///
    /// On failure all three caches are deleted before the error is returned.
    pub async fn run(&self, claim: impl FnOnce() + Send) -> ShellcacheResult<ActivationReport> {
        match self.reconcile().await {
            Ok(report) => {
                claim();
                debug!("Stage {} complete", Stage::Claim);
                Ok(report)
            }
            Err(err) => {
                error!("Failed to upgrade cache: {}", err);
                if let Err(cleanup) = self.stores.delete_all().await {
                    error!("Failed to clear caches after failed upgrade: {}", cleanup);
                }
                Err(err)
            }
        }
    }

    async fn reconcile(&self) -> ShellcacheResult<ActivationReport> {
        let manifest_store = at(Stage::LoadManifest, self.stores.manifest_store().await)?;
        let previous = at(Stage::LoadManifest, manifest_store.load().await)?;
        let staging = at(Stage::LoadManifest, self.stores.staging().await)?;

        let mut report = ActivationReport {
            fresh_install: previous.is_none(),
            resources: self.manifest.len(),
            ..Default::default()
        };

        let content = match &previous {
            None => self.flush().await?,
            Some(previous) => {
                let content = at(Stage::Evict, self.stores.content().await)?;
                let (evicted, retained) = self.evict(&content, previous).await?;
                report.evicted = evicted;
                report.retained = retained;
                content
            }
        };

        report.promoted = at(
            Stage::PromoteStaging,
            copy_all(&*staging, content.handle()).await,
        )?;
        for key in at(Stage::PromoteStaging, staging.keys().await)? {
            let present = at(Stage::PromoteStaging, content.handle().get(&key).await)?;
            ensure(Stage::PromoteStaging, present.is_some(), || {
                format!("staged entry {} missing from content", key)
            })?;
        }
        debug!("Promoted {} staged entries", report.promoted);

        at(Stage::DiscardStaging, self.stores.delete_staging().await)?;
        let staging_exists = at(
            Stage::DiscardStaging,
            self.stores.storage().has(&self.stores.names().staging).await,
        )?;
        ensure(Stage::DiscardStaging, !staging_exists, || {
            "staging cache still exists".to_string()
        })?;

        at(
            Stage::CommitManifest,
            manifest_store.save(&self.manifest, &self.worker_id).await,
        )?;
        let committed = at(Stage::CommitManifest, manifest_store.load().await)?;
        ensure(
            Stage::CommitManifest,
            committed.as_ref() == Some(&*self.manifest),
            || "stored manifest differs from committed manifest".to_string(),
        )?;

        info!(
            "Activated manifest with {} resources ({} evicted, {} retained, {} promoted)",
            report.resources,
            report.evicted.len(),
            report.retained,
            report.promoted
        );
        Ok(report)
    }

    /// First activation: no basis for a diff, start from an empty cache
    async fn flush(&self) -> ShellcacheResult<ContentCache> {
        at(Stage::Flush, self.stores.delete_content().await)?;
        let content = at(Stage::Flush, self.stores.content().await)?;

        let remaining = at(Stage::Flush, content.list_keys().await)?;
        ensure(Stage::Flush, remaining.is_empty(), || {
            format!("{} entries survived the flush", remaining.len())
        })?;

        info!("No previous manifest, content cache flushed");
        Ok(content)
    }

    /// Upgrade: drop entries whose key was removed or whose fingerprint changed
    async fn evict(
        &self,
        content: &ContentCache,
        previous: &Manifest,
    ) -> ShellcacheResult<(Vec<String>, usize)> {
        let mut evicted = vec![];
        let mut retained = 0;

        for raw in at(Stage::Evict, content.list_keys().await)? {
            if self.is_current(previous, &raw) {
                retained += 1;
                continue;
            }
            at(Stage::Evict, content.delete(&raw).await)?;
            debug!("Evicted {}", raw);
            evicted.push(raw);
        }

        for raw in at(Stage::Evict, content.list_keys().await)? {
            ensure(Stage::Evict, self.is_current(previous, &raw), || {
                format!("stale entry {} survived eviction", raw)
            })?;
        }

        Ok((evicted, retained))
    }

    fn is_current(&self, previous: &Manifest, raw: &str) -> bool {
        ResourceKey::new(raw)
            .map(|key| !self.manifest.is_stale(previous, &key))
            .unwrap_or(false)
    }
}

/// Tag an error with the stage it happened in
fn at<T>(stage: Stage, result: ShellcacheResult<T>) -> ShellcacheResult<T> {
    result.map_err(|e| match e {
        ShellcacheError::Reconciliation { .. } => e,
        other => ShellcacheError::reconciliation(stage, other),
    })
}

fn ensure(stage: Stage, condition: bool, reason: impl FnOnce() -> String) -> ShellcacheResult<()> {
    if condition {
        Ok(())
    } else {
        Err(ShellcacheError::reconciliation(
            stage,
            format!("postcondition violated: {}", reason()),
        ))
    }
}
