//! Content-addressed download cache.
//!
//! The cache is a directory of files keyed by structured cache keys
//! (`go/modules/<module>@<version>`, `rust/<crate>@<version>`, ...) plus a
//! `manifest.json` mapping each key to its metadata: source URL, optional
//! ETag, fetch time, optional expiry, size, and SHA-256 checksum.
//!
//! Writes stream through a temp file inside the cache root and land with an
//! atomic rename, so a crash mid-`put` never leaves a half-written entry
//! behind. The manifest is rewritten whole on every mutation; a single
//! process owns the cache directory at a time.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Error, Result};

const MANIFEST_VERSION: u32 = 1;
const MANIFEST_FILE: &str = "manifest.json";

/// Key of the virtual manifest entry holding git commit metadata.
/// It has no backing file; its `source` field carries a JSON blob.
pub const GIT_META_KEY: &str = "_git_meta";

/// Metadata for a single cached item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Relative path of the backing file under the cache root.
    pub path: String,
    /// Source identifier (URL or, for `_git_meta`, a JSON payload).
    pub source: String,
    /// Upstream ETag, when one was provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub fetched_at: DateTime<Utc>,
    /// Expiry time; `None` means the entry never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub size: i64,
    /// Hex SHA-256 of the backing file.
    pub checksum: String,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() > at,
            None => false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    entries: BTreeMap<String, CacheEntry>,
}

impl Manifest {
    fn new() -> Self {
        Manifest {
            version: MANIFEST_VERSION,
            entries: BTreeMap::new(),
        }
    }

    fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Manifest::new());
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&data)
            .map_err(|err| Error::Corruption(format!("cache manifest: {err}")))
    }

    fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let data = serde_json::to_vec_pretty(self)
            .map_err(|err| Error::Other(format!("serialize manifest: {err}")))?;
        fs::write(dir.join(MANIFEST_FILE), data)?;
        Ok(())
    }
}

/// Filesystem cache rooted at one directory, with an in-memory manifest.
pub struct Cache {
    dir: PathBuf,
    manifest: Manifest,
}

impl Cache {
    /// Open (creating if needed) the cache at `dir` and load its manifest.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let manifest = Manifest::load(&dir)?;
        Ok(Cache { dir, manifest })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Look up `key`, returning the backing file path and entry metadata.
    ///
    /// Expired entries are deleted and reported as not found.
    pub fn get(&mut self, key: &str) -> Result<(PathBuf, CacheEntry)> {
        let entry = match self.manifest.entries.get(key) {
            Some(entry) => entry.clone(),
            None => return Err(Error::not_found(format!("cache key: {key}"))),
        };

        if entry.is_expired() {
            let _ = self.delete(key);
            return Err(Error::not_found(format!("cache entry expired: {key}")));
        }

        let path = self.dir.join(&entry.path);
        if !path.exists() {
            let _ = self.delete(key);
            return Err(Error::not_found(format!("cache file missing: {key}")));
        }

        Ok((path, entry))
    }

    /// Stream `reader` into the cache under `key`.
    ///
    /// The payload is written to a temp file inside the cache root while the
    /// SHA-256 is computed on the fly, fsynced, then renamed into place. A
    /// `ttl` of zero means the entry never expires.
    pub fn put(
        &mut self,
        key: &str,
        source: &str,
        mut reader: impl Read,
        ttl: Duration,
    ) -> Result<CacheEntry> {
        fs::create_dir_all(&self.dir)?;
        let final_path = self.dir.join(key);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp = tempfile::Builder::new()
            .prefix(".cache_tmp_")
            .tempfile_in(&self.dir)?;
        let mut hasher = Sha256::new();
        let mut size: i64 = 0;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            tmp.write_all(&buf[..n])?;
            size += n as i64;
        }
        tmp.flush()?;
        tmp.as_file().sync_all()?;

        let now = Utc::now();
        let entry = CacheEntry {
            path: key.to_string(),
            source: source.to_string(),
            etag: None,
            fetched_at: now,
            expires_at: (ttl > Duration::ZERO)
                .then(|| now + chrono::Duration::from_std(ttl).unwrap_or_default()),
            size,
            checksum: hex_digest(hasher),
        };

        // Rename on the same filesystem makes the landing atomic.
        tmp.persist(&final_path)
            .map_err(|err| Error::Io(err.error))?;

        self.manifest.entries.insert(key.to_string(), entry.clone());
        if let Err(err) = self.manifest.save(&self.dir) {
            let _ = fs::remove_file(&final_path);
            return Err(err);
        }

        debug!(key, size, "cached");
        Ok(entry)
    }

    /// True when `key` exists, is unexpired, and (for file-backed entries)
    /// the backing file is present. Missing backing files self-heal by
    /// deleting the manifest row.
    pub fn has(&mut self, key: &str) -> bool {
        let entry = match self.manifest.entries.get(key) {
            Some(entry) => entry.clone(),
            None => return false,
        };
        if entry.is_expired() {
            let _ = self.delete(key);
            return false;
        }
        if key != GIT_META_KEY && !self.dir.join(&entry.path).exists() {
            let _ = self.delete(key);
            return false;
        }
        true
    }

    /// Remove `key` and its backing file. Removing an absent key is a no-op.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        let entry = match self.manifest.entries.remove(key) {
            Some(entry) => entry,
            None => return Ok(()),
        };
        let _ = fs::remove_file(self.dir.join(&entry.path));
        self.manifest.save(&self.dir)
    }

    /// Recompute the SHA-256 of the backing file and compare to the stored
    /// checksum.
    pub fn validate(&mut self, key: &str) -> Result<bool> {
        let (path, entry) = self.get(key)?;
        let mut file = fs::File::open(path)?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(hex_digest(hasher) == entry.checksum)
    }

    /// Reset `fetched_at` for `key` to now.
    pub fn refresh(&mut self, key: &str) -> Result<()> {
        match self.manifest.entries.get_mut(key) {
            Some(entry) => entry.fetched_at = Utc::now(),
            None => return Err(Error::not_found(format!("cache key: {key}"))),
        }
        self.manifest.save(&self.dir)
    }

    /// Total size in bytes across all manifest entries.
    pub fn size(&self) -> i64 {
        self.manifest.entries.values().map(|e| e.size).sum()
    }

    /// Remove expired entries; when `max_age` is nonzero, also remove entries
    /// fetched longer than `max_age` ago. Returns the number removed.
    pub fn prune(&mut self, max_age: Duration) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default();
        let doomed: Vec<String> = self
            .manifest
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry.is_expired() || (max_age > Duration::ZERO && entry.fetched_at < cutoff)
            })
            .map(|(key, _)| key.clone())
            .collect();

        let mut count = 0;
        for key in doomed {
            if self.delete(&key).is_ok() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Remove every entry and its backing file, then reset the manifest.
    pub fn clear(&mut self) -> Result<()> {
        for entry in self.manifest.entries.values() {
            let _ = fs::remove_file(self.dir.join(&entry.path));
        }
        self.manifest = Manifest::new();
        self.manifest.save(&self.dir)
    }

    /// Entries whose key starts with `prefix` (empty prefix lists all),
    /// together with their keys.
    pub fn list(&self, prefix: &str) -> Vec<(String, CacheEntry)> {
        self.manifest
            .entries
            .iter()
            .filter(|(key, _)| prefix.is_empty() || key.starts_with(prefix))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }

    pub(crate) fn manifest_entry(&self, key: &str) -> Option<&CacheEntry> {
        self.manifest.entries.get(key)
    }

    pub(crate) fn set_manifest_entry(&mut self, key: &str, entry: CacheEntry) -> Result<()> {
        self.manifest.entries.insert(key.to_string(), entry);
        self.manifest.save(&self.dir)
    }
}

fn hex_digest(hasher: Sha256) -> String {
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Hex SHA-256 of `data`, used for document hashes and checksums.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex_digest(hasher)
}

// Cache key builders. Keys double as relative file paths under the root.

pub fn go_module_key(module: &str, version: &str) -> String {
    format!("go/modules/{module}@{version}")
}

pub fn go_stdlib_key(toolchain: &str, pkg: &str) -> String {
    format!("go/stdlib/{toolchain}/{pkg}")
}

pub fn atproto_key(repo: &str) -> String {
    format!("atproto/{repo}")
}

pub fn rust_crate_key(krate: &str, version: &str) -> String {
    format!("rust/{krate}@{version}")
}

pub fn hex_package_key(pkg: &str, version: &str) -> String {
    format!("hex/{pkg}@{version}")
}

pub fn github_repo_key(owner: &str, repo: &str, branch: &str) -> String {
    format!("github/{owner}/{repo}@{branch}")
}
