//! Platform path resolution for config, data, and cache roots.
//!
//! Resolution order for each root:
//!
//! 1. `$USDE_HOME/<kind>` when the override is set
//! 2. the platform user directory on macOS (`~/Library/...`)
//! 3. `$XDG_<KIND>_HOME/usde` on other Unixes
//! 4. `~/.<kind>/usde`

use std::path::PathBuf;

use crate::error::{Error, Result};

const APP: &str = "usde";
const HOME_OVERRIDE: &str = "USDE_HOME";

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| Error::Other("cannot determine home directory".into()))
}

/// Configuration directory (`config.toml` lives here).
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(HOME_OVERRIDE) {
        if !home.is_empty() {
            return Ok(PathBuf::from(home).join("config"));
        }
    }
    if cfg!(target_os = "macos") {
        return Ok(home_dir()?.join("Library/Application Support").join(APP));
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return Ok(PathBuf::from(xdg).join(APP));
        }
    }
    Ok(home_dir()?.join(".config").join(APP))
}

/// Data directory (databases and the database registry live here).
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(HOME_OVERRIDE) {
        if !home.is_empty() {
            return Ok(PathBuf::from(home).join("data"));
        }
    }
    if cfg!(target_os = "macos") {
        return Ok(home_dir()?.join("Library/Application Support").join(APP));
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        if !xdg.is_empty() {
            return Ok(PathBuf::from(xdg).join(APP));
        }
    }
    Ok(home_dir()?.join(".local/share").join(APP))
}

/// Cache directory (downloaded upstream artifacts live here).
pub fn cache_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(HOME_OVERRIDE) {
        if !home.is_empty() {
            return Ok(PathBuf::from(home).join("cache"));
        }
    }
    if cfg!(target_os = "macos") {
        return Ok(home_dir()?.join("Library/Caches").join(APP));
    }
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        if !xdg.is_empty() {
            return Ok(PathBuf::from(xdg).join(APP));
        }
    }
    Ok(home_dir()?.join(".cache").join(APP))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    // Tests in one binary share the process environment.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn home_override_wins() {
        let _guard = ENV_LOCK.lock().unwrap();
        let old = std::env::var(HOME_OVERRIDE).ok();
        std::env::set_var(HOME_OVERRIDE, "/tmp/usde-home");

        assert_eq!(config_dir().unwrap(), PathBuf::from("/tmp/usde-home/config"));
        assert_eq!(data_dir().unwrap(), PathBuf::from("/tmp/usde-home/data"));
        assert_eq!(cache_dir().unwrap(), PathBuf::from("/tmp/usde-home/cache"));

        match old {
            Some(v) => std::env::set_var(HOME_OVERRIDE, v),
            None => std::env::remove_var(HOME_OVERRIDE),
        }
    }

    #[test]
    fn roots_are_app_scoped() {
        let _guard = ENV_LOCK.lock().unwrap();
        let old = std::env::var(HOME_OVERRIDE).ok();
        std::env::remove_var(HOME_OVERRIDE);

        for dir in [config_dir().unwrap(), data_dir().unwrap(), cache_dir().unwrap()] {
            assert!(dir.to_string_lossy().contains(APP), "{dir:?}");
        }

        if let Some(v) = old {
            std::env::set_var(HOME_OVERRIDE, v);
        }
    }
}
