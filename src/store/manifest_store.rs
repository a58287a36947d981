//! Persistence of the last committed manifest
//!
//! The record is a single entry under a fixed key whose body is the
//! manifest's flat JSON object. It is written only after reconciliation has
//! fully completed, so the stored manifest always describes a content cache
//! that was once consistent.

use super::NamedCache;
use crate::error::{ShellcacheError, ShellcacheResult};
use crate::fetch::Response;
use crate::manifest::Manifest;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Fixed key of the manifest record
pub const MANIFEST_KEY: &str = "manifest";

const COMMITTED_AT_HEADER: &str = "x-shellcache-committed-at";
const WORKER_HEADER: &str = "x-shellcache-worker";

/// A committed manifest and its provenance
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestRecord {
    pub manifest: Manifest,
    /// When the record was written (absent for records written by other tools)
    pub committed_at: Option<DateTime<Utc>>,
    /// Worker instance that committed the record
    pub worker: Option<String>,
}

/// Store holding at most one committed manifest
#[derive(Clone)]
pub struct ManifestStore {
    inner: Arc<dyn NamedCache>,
}

impl ManifestStore {
    pub fn new(inner: Arc<dyn NamedCache>) -> Self {
        Self { inner }
    }

    /// Load the committed manifest, or `None` before the first activation
    pub async fn load(&self) -> ShellcacheResult<Option<Manifest>> {
        Ok(self.load_record().await?.map(|r| r.manifest))
    }

    /// Load the committed manifest with its provenance headers
    pub async fn load_record(&self) -> ShellcacheResult<Option<ManifestRecord>> {
        let Some(response) = self.inner.get(MANIFEST_KEY).await? else {
            return Ok(None);
        };

        let body = std::str::from_utf8(&response.body).map_err(|e| {
            ShellcacheError::EntryCorrupt {
                cache: self.inner.name().to_string(),
                key: MANIFEST_KEY.to_string(),
                reason: e.to_string(),
            }
        })?;
        let manifest = Manifest::from_json(body)?;

        let committed_at = response
            .header(COMMITTED_AT_HEADER)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(Some(ManifestRecord {
            manifest,
            committed_at,
            worker: response.header(WORKER_HEADER).map(str::to_string),
        }))
    }

    /// Overwrite the record with `manifest`
    pub async fn save(&self, manifest: &Manifest, worker: &str) -> ShellcacheResult<()> {
        let response = Response::ok(manifest.to_json()?)
            .with_header("content-type", "application/json")
            .with_header(COMMITTED_AT_HEADER, Utc::now().to_rfc3339())
            .with_header(WORKER_HEADER, worker);

        self.inner.put(MANIFEST_KEY, &response).await?;
        debug!("Committed manifest with {} resources", manifest.len());
        Ok(())
    }
}
