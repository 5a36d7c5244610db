//! Registry of known databases.
//!
//! `init` records every database it creates in `<data-dir>/databases.json`
//! so the CLI can resolve databases by name and pick a default.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paths;

const REGISTRY_VERSION: u32 = 1;
const REGISTRY_FILE: &str = "databases.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseEntry {
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseRegistry {
    version: u32,
    databases: BTreeMap<String, DatabaseEntry>,
    #[serde(default)]
    default: String,
}

impl DatabaseRegistry {
    fn empty() -> Self {
        DatabaseRegistry {
            version: REGISTRY_VERSION,
            databases: BTreeMap::new(),
            default: String::new(),
        }
    }

    pub fn load() -> Result<Self> {
        let path = registry_path()?;
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::empty());
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&data)
            .map_err(|err| Error::Corruption(format!("database registry: {err}")))
    }

    pub fn save(&self) -> Result<()> {
        let path = registry_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)
            .map_err(|err| Error::Other(format!("serialize registry: {err}")))?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Register `name` at `path`; re-adding an existing name only bumps its
    /// `updated_at`. The first database added becomes the default.
    pub fn add(&mut self, name: &str, path: &str) {
        let now = Utc::now();
        if let Some(entry) = self.databases.get_mut(name) {
            entry.updated_at = now;
            return;
        }
        self.databases.insert(
            name.to_string(),
            DatabaseEntry {
                path: path.to_string(),
                created_at: now,
                updated_at: now,
            },
        );
        if self.default.is_empty() {
            self.default = name.to_string();
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.databases.remove(name);
        if self.default == name {
            self.default = self.databases.keys().next().cloned().unwrap_or_default();
        }
    }

    pub fn get_path(&self, name: &str) -> Option<&str> {
        self.databases.get(name).map(|e| e.path.as_str())
    }

    pub fn set_default(&mut self, name: &str) {
        if self.databases.contains_key(name) {
            self.default = name.to_string();
        }
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    pub fn names(&self) -> Vec<&str> {
        self.databases.keys().map(String::as_str).collect()
    }

    pub fn entries(&self) -> &BTreeMap<String, DatabaseEntry> {
        &self.databases
    }
}

fn registry_path() -> Result<PathBuf> {
    Ok(paths::data_dir()?.join(REGISTRY_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_remove_default() {
        let mut reg = DatabaseRegistry::empty();
        reg.add("default", "/data/default.usde");
        reg.add("work", "/data/work.usde");

        assert_eq!(reg.default_name(), "default");
        assert_eq!(reg.get_path("work"), Some("/data/work.usde"));
        assert_eq!(reg.names().len(), 2);

        reg.remove("default");
        assert_eq!(reg.default_name(), "work");

        reg.set_default("missing");
        assert_eq!(reg.default_name(), "work");
    }

    #[test]
    fn re_add_keeps_created_at() {
        let mut reg = DatabaseRegistry::empty();
        reg.add("db", "/a");
        let created = reg.entries()["db"].created_at;
        reg.add("db", "/b");
        assert_eq!(reg.entries()["db"].created_at, created);
        // The original path wins; re-adding never re-points a name.
        assert_eq!(reg.get_path("db"), Some("/a"));
    }
}
