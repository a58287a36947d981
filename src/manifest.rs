//! Content-addressed manifests
//!
//! A manifest maps every resource key the shell may serve to the fingerprint
//! of its content. Two manifests are compared key by key; fingerprint
//! equality is the only test for "unchanged".

use crate::error::{ShellcacheError, ShellcacheResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Normalized, origin-relative resource path used as a cache key
///
/// Keys never start with `/`, except the sentinel [`ResourceKey::ROOT`]
/// which stands for the site root document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Sentinel key for the site root
    pub const ROOT: &'static str = "/";

    /// Create a validated key
    pub fn new(key: impl Into<String>) -> ShellcacheResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(ShellcacheError::KeyInvalid {
                key,
                reason: "empty key".to_string(),
            });
        }
        if key.starts_with('/') && key != Self::ROOT {
            return Err(ShellcacheError::KeyInvalid {
                key,
                reason: "keys are origin-relative and must not start with '/'".to_string(),
            });
        }
        Ok(Self(key))
    }

    /// The sentinel root key
    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    /// Whether this is the sentinel root key
    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path component to append to the origin when fetching this key
    pub fn url_path(&self) -> &str {
        if self.is_root() {
            ""
        } else {
            &self.0
        }
    }
}

impl TryFrom<String> for ResourceKey {
    type Error = ShellcacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceKey> for String {
    fn from(key: ResourceKey) -> Self {
        key.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque content fingerprint, compared for equality only
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Fingerprint raw content: SHA-256, first 16 bytes as hex
    pub fn of_bytes(content: &[u8]) -> Self {
        let digest = Sha256::digest(content);
        Self(hex::encode(&digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable mapping from resource key to fingerprint
///
/// Serializes as a flat JSON object, which is also the format of the
/// committed manifest record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(BTreeMap<ResourceKey, Fingerprint>);

impl Manifest {
    pub fn get(&self, key: &ResourceKey) -> Option<&Fingerprint> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, &Fingerprint)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a cached entry for `key`, written under `previous`, must be
    /// evicted when this manifest becomes current
    ///
    /// True when the key is gone from this manifest or its fingerprint differs
    /// from the one recorded in `previous`.
    pub fn is_stale(&self, previous: &Manifest, key: &ResourceKey) -> bool {
        match self.get(key) {
            None => true,
            Some(current) => previous.get(key) != Some(current),
        }
    }

    /// Compute the key-level difference from `previous` to `self`
    pub fn diff(&self, previous: &Manifest) -> ManifestDiff {
        let mut diff = ManifestDiff::default();

        for (key, fingerprint) in self.iter() {
            match previous.get(key) {
                None => {
                    diff.added.insert(key.clone());
                }
                Some(old) if old != fingerprint => {
                    diff.changed.insert(key.clone());
                }
                Some(_) => {
                    diff.unchanged.insert(key.clone());
                }
            }
        }

        for key in previous.keys() {
            if !self.contains(key) {
                diff.removed.insert(key.clone());
            }
        }

        diff
    }

    /// Parse from the flat JSON object representation
    pub fn from_json(content: &str) -> ShellcacheResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Serialize to the flat JSON object representation
    pub fn to_json(&self) -> ShellcacheResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl FromIterator<(ResourceKey, Fingerprint)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (ResourceKey, Fingerprint)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Key-level difference between two manifests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    /// Keys only in the newer manifest
    pub added: BTreeSet<ResourceKey>,
    /// Keys only in the older manifest
    pub removed: BTreeSet<ResourceKey>,
    /// Keys in both with different fingerprints
    pub changed: BTreeSet<ResourceKey>,
    /// Keys in both with equal fingerprints
    pub unchanged: BTreeSet<ResourceKey>,
}

impl ManifestDiff {
    /// True when the two manifests describe the same content
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Build artifact consumed by a worker: the manifest plus the shell keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBundle {
    /// Every servable resource and its fingerprint
    pub resources: Manifest,

    /// Shell keys restaged on every activation, in fetch order
    #[serde(default)]
    pub core: Vec<ResourceKey>,
}

impl AssetBundle {
    /// Create a bundle, checking that every shell key is a manifest resource
    pub fn new(resources: Manifest, core: Vec<ResourceKey>) -> ShellcacheResult<Self> {
        let bundle = Self { resources, core };
        bundle.validate().map_err(|reason| ShellcacheError::BundleInvalid {
            path: PathBuf::from("<memory>"),
            reason,
        })?;
        Ok(bundle)
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(missing) = self.core.iter().find(|k| !self.resources.contains(k)) {
            return Err(format!("shell key {} is not listed in resources", missing));
        }
        Ok(())
    }

    /// Load a bundle from a JSON file
    pub async fn load(path: &Path) -> ShellcacheResult<Self> {
        if !path.exists() {
            return Err(ShellcacheError::BundleNotFound(path.to_path_buf()));
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ShellcacheError::io(format!("reading asset bundle {}", path.display()), e)
        })?;

        Self::parse(&content).map_err(|reason| ShellcacheError::BundleInvalid {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse a bundle from its JSON representation
    pub fn parse(content: &str) -> Result<Self, String> {
        let bundle: Self = serde_json::from_str(content).map_err(|e| e.to_string())?;
        bundle.validate()?;
        Ok(bundle)
    }

    /// Write the bundle as pretty JSON
    pub async fn save(&self, path: &Path) -> ShellcacheResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await.map_err(|e| {
            ShellcacheError::io(format!("writing asset bundle {}", path.display()), e)
        })
    }

    /// Fingerprint every file under a web build output directory
    ///
    /// Dot-files are skipped. When `index.html` exists, the root key is
    /// mapped to its fingerprint.
    pub fn build_from_dir(dir: &Path, core: Vec<ResourceKey>) -> ShellcacheResult<Self> {
        let mut entries = BTreeMap::new();
        collect_files(dir, dir, &mut entries)?;

        if let Some(index) = ResourceKey::new("index.html")
            .ok()
            .and_then(|k| entries.get(&k).cloned())
        {
            entries.insert(ResourceKey::root(), index);
        }

        debug!("Fingerprinted {} resources under {}", entries.len(), dir.display());

        let bundle = Self {
            resources: Manifest(entries),
            core,
        };
        bundle.validate().map_err(|reason| ShellcacheError::BundleInvalid {
            path: dir.to_path_buf(),
            reason,
        })?;
        Ok(bundle)
    }
}

fn collect_files(
    root: &Path,
    dir: &Path,
    entries: &mut BTreeMap<ResourceKey, Fingerprint>,
) -> ShellcacheResult<()> {
    let read_dir = fs::read_dir(dir)
        .map_err(|e| ShellcacheError::io(format!("reading directory {}", dir.display()), e))?;

    for entry in read_dir {
        let entry =
            entry.map_err(|e| ShellcacheError::io(format!("reading {}", dir.display()), e))?;
        let path = entry.path();

        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }

        if path.is_dir() {
            collect_files(root, &path, entries)?;
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .map_err(|e| ShellcacheError::Internal(e.to_string()))?;
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let contents = fs::read(&path)
            .map_err(|e| ShellcacheError::io(format!("reading {}", path.display()), e))?;
        entries.insert(ResourceKey::new(key)?, Fingerprint::of_bytes(&contents));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest(pairs: &[(&str, &str)]) -> Manifest {
        pairs
            .iter()
            .map(|(k, v)| (ResourceKey::new(*k).unwrap(), Fingerprint::new(*v)))
            .collect()
    }

    fn key(s: &str) -> ResourceKey {
        ResourceKey::new(s).unwrap()
    }

    #[test]
    fn key_validation() {
        assert!(ResourceKey::new("").is_err());
        assert!(ResourceKey::new("/main.js").is_err());
        assert!(ResourceKey::new("/").unwrap().is_root());
        assert_eq!(key("assets/a.png").url_path(), "assets/a.png");
        assert_eq!(ResourceKey::root().url_path(), "");
    }

    #[test]
    fn stale_when_removed_or_changed() {
        let old = manifest(&[("a", "h1"), ("b", "h2"), ("gone", "h9")]);
        let new = manifest(&[("a", "h1"), ("b", "h3"), ("c", "h4")]);

        assert!(!new.is_stale(&old, &key("a")));
        assert!(new.is_stale(&old, &key("b")));
        assert!(new.is_stale(&old, &key("gone")));
        // Present now but unknown to the previous manifest
        assert!(new.is_stale(&old, &key("c")));
    }

    #[test]
    fn diff_classifies_keys() {
        let old = manifest(&[("a", "h1"), ("b", "h2"), ("gone", "h9")]);
        let new = manifest(&[("a", "h1"), ("b", "h3"), ("c", "h4")]);

        let diff = new.diff(&old);
        assert_eq!(diff.added, [key("c")].into());
        assert_eq!(diff.removed, [key("gone")].into());
        assert_eq!(diff.changed, [key("b")].into());
        assert_eq!(diff.unchanged, [key("a")].into());
        assert!(!diff.is_empty());
        assert!(new.diff(&new).is_empty());
    }

    #[test]
    fn manifest_json_is_flat_object() {
        let m = manifest(&[("/", "r"), ("main.js", "m")]);
        let json = m.to_json().unwrap();
        assert_eq!(json, r#"{"/":"r","main.js":"m"}"#);
        assert_eq!(Manifest::from_json(&json).unwrap(), m);
        assert!(Manifest::from_json(r#"{"/bad":"x"}"#).is_err());
    }

    #[test]
    fn bundle_rejects_unknown_core_key() {
        let result = AssetBundle::new(manifest(&[("a", "h1")]), vec![key("b")]);
        assert!(matches!(result, Err(ShellcacheError::BundleInvalid { .. })));

        let parsed = AssetBundle::parse(r#"{"resources":{"a":"h1"},"core":["a"]}"#).unwrap();
        assert_eq!(parsed.core, vec![key("a")]);
    }

    #[test]
    fn build_from_dir_fingerprints_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        fs::write(dir.path().join("main.js"), "console.log(1)").unwrap();
        fs::write(dir.path().join(".hidden"), "x").unwrap();
        fs::create_dir(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("assets").join("logo.png"), [0u8, 1, 2]).unwrap();

        let bundle =
            AssetBundle::build_from_dir(dir.path(), vec![key("index.html"), key("main.js")])
                .unwrap();

        let keys: Vec<_> = bundle.resources.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["/", "assets/logo.png", "index.html", "main.js"]);
        assert_eq!(
            bundle.resources.get(&ResourceKey::root()),
            bundle.resources.get(&key("index.html"))
        );
        assert_eq!(
            bundle.resources.get(&key("main.js")).unwrap(),
            &Fingerprint::of_bytes(b"console.log(1)")
        );
        assert_eq!(
            bundle.resources.get(&key("main.js")).unwrap().as_str().len(),
            32
        );
    }

    #[test]
    fn build_from_dir_rejects_missing_core() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.js"), "x").unwrap();
        let result = AssetBundle::build_from_dir(dir.path(), vec![key("index.html")]);
        assert!(result.is_err());
    }
}
