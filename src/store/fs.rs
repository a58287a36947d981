//! Filesystem-backed cache storage
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<cache-name>/<sha256(key)>.<write-id>.body   raw response body
//! <root>/<cache-name>/<sha256(key)>.json              key, status, headers, body file
//! ```
//!
//! Every put writes a fresh body file and then renames the metadata into
//! place. The rename is the commit point: readers see either the previous
//! entry or the new one, and a body without metadata pointing at it is never
//! served. The superseded body is removed after the commit.

use super::{CacheStorage, NamedCache};
use crate::error::{ShellcacheError, ShellcacheResult};
use crate::fetch::Response;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Attempts to pair metadata with its body while writers replace the entry
const READ_ATTEMPTS: usize = 3;

/// Cache storage rooted at a directory
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, name: &str) -> ShellcacheResult<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(ShellcacheError::User(format!(
                "Invalid cache name: {:?}. Use letters, digits, '-', '_' or '.'",
                name
            )));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl CacheStorage for FsStorage {
    async fn open(&self, name: &str) -> ShellcacheResult<Arc<dyn NamedCache>> {
        let dir = self.cache_dir(name)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| ShellcacheError::io(format!("creating cache {}", dir.display()), e))?;

        Ok(Arc::new(FsCache {
            name: name.to_string(),
            dir,
        }))
    }

    async fn has(&self, name: &str) -> ShellcacheResult<bool> {
        Ok(self.cache_dir(name)?.is_dir())
    }

    async fn delete(&self, name: &str) -> ShellcacheResult<bool> {
        let dir = self.cache_dir(name)?;
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| ShellcacheError::io(format!("deleting cache {}", dir.display()), e))?;
        debug!("Removed cache directory {}", dir.display());
        Ok(true)
    }

    async fn names(&self) -> ShellcacheResult<Vec<String>> {
        if !self.root.exists() {
            return Ok(vec![]);
        }

        let mut names = vec![];
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| ShellcacheError::io("reading storage root", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ShellcacheError::io("reading storage entry", e))?
        {
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        Ok(names)
    }
}

/// Entry metadata persisted next to the body
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    status: u16,
    #[serde(default)]
    headers: Vec<(String, String)>,
    /// Body file name within the cache directory
    body: String,
}

/// A named cache stored as a directory
pub struct FsCache {
    name: String,
    dir: PathBuf,
}

impl FsCache {
    fn stem(key: &str) -> String {
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::stem(key)))
    }

    fn new_body_name(key: &str) -> String {
        format!("{}.{}.body", Self::stem(key), Uuid::new_v4().simple())
    }

    /// Resolve a body name from metadata, refusing anything outside the cache
    fn body_path(&self, meta: &EntryMeta) -> ShellcacheResult<PathBuf> {
        let name = Path::new(&meta.body);
        if name.components().count() != 1 || name.file_name().is_none() {
            return Err(ShellcacheError::EntryCorrupt {
                cache: self.name.clone(),
                key: meta.key.clone(),
                reason: format!("invalid body file {:?}", meta.body),
            });
        }
        Ok(self.dir.join(name))
    }

    async fn read_meta(&self, path: &Path) -> ShellcacheResult<Option<EntryMeta>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ShellcacheError::io(
                    format!("reading cache entry {}", path.display()),
                    e,
                ))
            }
        };
        Ok(Some(serde_json::from_str(&content)?))
    }
}

#[async_trait]
impl NamedCache for FsCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> ShellcacheResult<Option<Response>> {
        let meta_path = self.meta_path(key);

        for _ in 0..READ_ATTEMPTS {
            let Some(meta) = self.read_meta(&meta_path).await? else {
                return Ok(None);
            };

            if meta.key != key {
                return Err(ShellcacheError::EntryCorrupt {
                    cache: self.name.clone(),
                    key: key.to_string(),
                    reason: format!("metadata belongs to {}", meta.key),
                });
            }

            let body_path = self.body_path(&meta)?;
            match fs::read(&body_path).await {
                Ok(body) => {
                    return Ok(Some(Response {
                        status: meta.status,
                        headers: meta.headers,
                        body,
                    }))
                }
                // Replaced between reading the metadata and the body
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Entry {} in {} replaced during read", key, self.name);
                }
                Err(e) => {
                    return Err(ShellcacheError::EntryCorrupt {
                        cache: self.name.clone(),
                        key: key.to_string(),
                        reason: format!("body unreadable: {}", e),
                    })
                }
            }
        }

        warn!("Entry {} in {} kept changing, treating as missing", key, self.name);
        Ok(None)
    }

    async fn put(&self, key: &str, response: &Response) -> ShellcacheResult<()> {
        if !self.dir.is_dir() {
            return Err(ShellcacheError::CacheDetached(self.name.clone()));
        }

        let meta_path = self.meta_path(key);
        let previous = self.read_meta(&meta_path).await.ok().flatten();

        let meta = EntryMeta {
            key: key.to_string(),
            status: response.status,
            headers: response.headers.clone(),
            body: Self::new_body_name(key),
        };
        let body_path = self.body_path(&meta)?;
        fs::write(&body_path, &response.body)
            .await
            .map_err(|e| ShellcacheError::io(format!("writing {}", body_path.display()), e))?;

        let tmp_name = format!("{}.{}.tmp", Self::stem(key), Uuid::new_v4().simple());
        let tmp_path = self.dir.join(tmp_name);
        fs::write(&tmp_path, serde_json::to_vec(&meta)?)
            .await
            .map_err(|e| ShellcacheError::io(format!("writing {}", tmp_path.display()), e))?;
        fs::rename(&tmp_path, &meta_path)
            .await
            .map_err(|e| ShellcacheError::io(format!("committing {}", meta_path.display()), e))?;

        if let Some(previous) = previous {
            if let Ok(old_body) = self.body_path(&previous) {
                if let Err(e) = fs::remove_file(&old_body).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove superseded body {}: {}", old_body.display(), e);
                    }
                }
            }
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> ShellcacheResult<bool> {
        let meta_path = self.meta_path(key);
        let Some(meta) = self.read_meta(&meta_path).await.ok().flatten() else {
            if let Err(e) = fs::remove_file(&meta_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(ShellcacheError::io(
                        format!("deleting {}", meta_path.display()),
                        e,
                    ));
                }
                return Ok(false);
            }
            return Ok(true);
        };

        let mut paths = vec![meta_path];
        paths.extend(self.body_path(&meta).ok());
        for path in paths {
            if let Err(e) = fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(ShellcacheError::io(
                        format!("deleting {}", path.display()),
                        e,
                    ));
                }
            }
        }

        Ok(true)
    }

    async fn keys(&self) -> ShellcacheResult<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(vec![]);
        }

        let mut keys = vec![];
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| ShellcacheError::io(format!("reading cache {}", self.name), e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ShellcacheError::io(format!("reading cache {}", self.name), e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                match self.read_meta(&path).await {
                    Ok(Some(meta)) => keys.push(meta.key),
                    Ok(None) => {}
                    Err(e) => warn!("Skipping unreadable entry {}: {}", path.display(), e),
                }
            }
        }

        Ok(keys)
    }
}
