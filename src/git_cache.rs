//! Commit-SHA tracking for repository-sourced ingestors.
//!
//! Repo ingestors key their cache by commit SHA so re-ingesting a branch at
//! the same HEAD is a no-op. Commits live in the `_git_meta` virtual entry of
//! the cache manifest (a JSON map in the entry's `source` field — no backing
//! file on disk).

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::cache::{Cache, CacheEntry, GIT_META_KEY};
use crate::error::{Error, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
struct GitMetadata {
    commits: BTreeMap<String, String>,
}

/// Git-aware view over a [`Cache`].
pub struct GitCache<'a> {
    cache: &'a mut Cache,
}

impl<'a> GitCache<'a> {
    pub fn new(cache: &'a mut Cache) -> Self {
        GitCache { cache }
    }

    /// Cached commit SHA for `key`, if one is tracked.
    pub fn get_commit(&self, key: &str) -> Option<String> {
        self.load().commits.get(key).cloned()
    }

    /// Record `sha` as the current commit for `key`.
    pub fn put_commit(&mut self, key: &str, sha: &str) -> Result<()> {
        let mut meta = self.load();
        meta.commits.insert(key.to_string(), sha.to_string());
        self.save(&meta)
    }

    /// Number of tracked repositories.
    pub fn count(&self) -> usize {
        self.load().commits.len()
    }

    /// All tracked commit SHAs by cache key.
    pub fn list_commits(&self) -> BTreeMap<String, String> {
        self.load().commits
    }

    fn load(&self) -> GitMetadata {
        let entry = match self.cache.manifest_entry(GIT_META_KEY) {
            Some(entry) => entry,
            None => return GitMetadata::default(),
        };
        // A garbled blob degrades to an empty map rather than failing the run.
        serde_json::from_str(&entry.source).unwrap_or_default()
    }

    fn save(&mut self, meta: &GitMetadata) -> Result<()> {
        let blob = serde_json::to_string(meta)
            .map_err(|err| Error::Other(format!("serialize git metadata: {err}")))?;
        self.cache.set_manifest_entry(
            GIT_META_KEY,
            CacheEntry {
                path: GIT_META_KEY.to_string(),
                source: blob,
                etag: None,
                fetched_at: Utc::now(),
                expires_at: None,
                size: 0,
                checksum: String::new(),
            },
        )
    }
}

/// `git rev-parse HEAD` in `repo_path`.
pub fn repo_head_commit(repo_path: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_path)
        .output()?;
    if !output.status.success() {
        return Err(Error::Other(format!(
            "git rev-parse failed in {}",
            repo_path.display()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Shallow-clone `url` into `dest`, then check out `commit`.
pub fn shallow_clone_at(url: &str, commit: &str, dest: &Path) -> Result<()> {
    run_git(Command::new("git").args(["clone", "--depth", "1", url]).arg(dest))?;
    run_git(
        Command::new("git")
            .args(["checkout", commit])
            .current_dir(dest),
    )
}

/// Shallow-clone the default branch of `url` into `dest`.
pub fn shallow_clone(url: &str, dest: &Path) -> Result<()> {
    run_git(Command::new("git").args(["clone", "--depth", "1", url]).arg(dest))
}

/// Shallow-clone a single branch of `url` into `dest`.
pub fn shallow_clone_branch(url: &str, branch: &str, dest: &Path) -> Result<()> {
    let mut cmd = Command::new("git");
    cmd.args(["clone", "--depth", "1", "--single-branch"]);
    if !branch.is_empty() {
        cmd.args(["-b", branch]);
    }
    cmd.arg(url).arg(dest);
    run_git(&mut cmd)
}

fn run_git(cmd: &mut Command) -> Result<()> {
    let output = cmd
        .output()
        .map_err(|err| Error::Other(format!("failed to execute git: {err}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Upstream(format!("git failed: {}", stderr.trim())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commits_round_trip_through_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = Cache::open(tmp.path()).unwrap();

        {
            let mut git = GitCache::new(&mut cache);
            assert_eq!(git.get_commit("atproto/atproto"), None);
            git.put_commit("atproto/atproto", "abc123").unwrap();
            git.put_commit("atproto/bsky-docs", "def456").unwrap();
        }

        // Reopen from disk; the virtual entry persists in the manifest.
        let mut cache = Cache::open(tmp.path()).unwrap();
        let git = GitCache::new(&mut cache);
        assert_eq!(git.get_commit("atproto/atproto").as_deref(), Some("abc123"));
        assert_eq!(git.count(), 2);
        assert!(git.list_commits().contains_key("atproto/bsky-docs"));
    }

    #[test]
    fn git_meta_has_no_backing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = Cache::open(tmp.path()).unwrap();
        GitCache::new(&mut cache).put_commit("x", "sha").unwrap();

        assert!(!tmp.path().join(GIT_META_KEY).exists());
        // `has` must not self-heal-delete the virtual entry.
        assert!(cache.has(GIT_META_KEY));
    }
}
