//! TOML configuration.
//!
//! Read from `<config-dir>/config.toml` (overridable with `$USDE_CONFIG`).
//! Missing files yield defaults; unknown keys are ignored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paths;

pub const CONFIG_OVERRIDE: &str = "USDE_CONFIG";

/// Database file extension; a `usde` database is a single SQLite file
/// carrying the documents, search, and symbol tables.
pub const DB_EXTENSION: &str = "usde";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub search: SearchConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Default database name or path.
    pub default: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            default: default_database_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| format!("default.{DB_EXTENSION}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_size_bytes: i64,
    pub max_age_days: u32,
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_size_bytes: 5 * 1024 * 1024 * 1024,
            max_age_days: 30,
            ttl_seconds: 86_400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig { default_limit: 20 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: usize,
    pub use_pager: bool,
    pub render_markdown: bool,
    /// `None` = auto-detect from the terminal.
    pub color_output: Option<bool>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            width: 80,
            use_pager: false,
            render_markdown: false,
            color_output: None,
        }
    }
}

/// Path of the active config file.
pub fn config_file_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_OVERRIDE) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    Ok(paths::config_dir()?.join("config.toml"))
}

/// Load the config, falling back to defaults when the file does not exist.
pub fn load() -> Result<Config> {
    let path = config_file_path()?;
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Config::default());
        }
        Err(err) => return Err(err.into()),
    };
    toml::from_str(&content)
        .map_err(|err| Error::Input(format!("parse {}: {err}", path.display())))
}

/// Write the config back to the active config file.
pub fn save(config: &Config) -> Result<()> {
    let path = config_file_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|err| Error::Other(format!("serialize config: {err}")))?;
    std::fs::write(&path, content)?;
    Ok(())
}

fn default_database_path() -> Result<PathBuf> {
    Ok(paths::data_dir()?.join(format!("default.{DB_EXTENSION}")))
}

/// Resolve a database name or path to an absolute file path.
///
/// `""` and `"default"` resolve through the config. Absolute paths pass
/// through untouched. Anything else resolves into the data directory, with
/// the `.usde` extension appended when none is given.
pub fn resolve_database_path(name_or_path: &str) -> Result<PathBuf> {
    if name_or_path.is_empty() || name_or_path == "default" {
        let cfg = load()?;
        return Ok(PathBuf::from(cfg.database.default));
    }

    let candidate = Path::new(name_or_path);
    if candidate.is_absolute() {
        return Ok(candidate.to_path_buf());
    }

    let mut file = name_or_path.to_string();
    if candidate.extension().is_none() {
        file.push('.');
        file.push_str(DB_EXTENSION);
    }
    Ok(paths::data_dir()?.join(file))
}

/// Path to the default database.
pub fn default_database() -> Result<PathBuf> {
    resolve_database_path("default")
}

/// Create the parent directory of a database file if needed.
pub fn ensure_database_dir(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Read one dotted config key (`section.key`) as a display string.
pub fn get_value(config: &Config, key: &str) -> Result<String> {
    let value = match key {
        "database.default" => config.database.default.clone(),
        "cache.max_size_bytes" => config.cache.max_size_bytes.to_string(),
        "cache.max_age_days" => config.cache.max_age_days.to_string(),
        "cache.ttl_seconds" => config.cache.ttl_seconds.to_string(),
        "search.default_limit" => config.search.default_limit.to_string(),
        "display.width" => config.display.width.to_string(),
        "display.use_pager" => config.display.use_pager.to_string(),
        "display.render_markdown" => config.display.render_markdown.to_string(),
        "display.color_output" => match config.display.color_output {
            Some(v) => v.to_string(),
            None => "auto".to_string(),
        },
        _ => return Err(Error::input(format!("unknown config key: {key}"))),
    };
    Ok(value)
}

/// Set one dotted config key from its string form.
pub fn set_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
        value
            .parse()
            .map_err(|_| Error::input(format!("invalid value for {key}: {value}")))
    }

    match key {
        "database.default" => config.database.default = value.to_string(),
        "cache.max_size_bytes" => config.cache.max_size_bytes = parse(key, value)?,
        "cache.max_age_days" => config.cache.max_age_days = parse(key, value)?,
        "cache.ttl_seconds" => config.cache.ttl_seconds = parse(key, value)?,
        "search.default_limit" => config.search.default_limit = parse(key, value)?,
        "display.width" => config.display.width = parse(key, value)?,
        "display.use_pager" => config.display.use_pager = parse(key, value)?,
        "display.render_markdown" => config.display.render_markdown = parse(key, value)?,
        "display.color_output" => {
            config.display.color_output = match value {
                "auto" => None,
                other => Some(parse(key, other)?),
            }
        }
        _ => return Err(Error::input(format!("unknown config key: {key}"))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.search.default_limit, 20);
        assert_eq!(cfg.cache.max_age_days, 30);
        assert_eq!(cfg.display.width, 80);
        assert!(cfg.database.default.ends_with(".usde"));
    }

    #[test]
    fn parse_partial_toml() {
        let cfg: Config = toml::from_str(
            r#"
            [search]
            default_limit = 50

            [display]
            width = 120
            "#,
        )
        .unwrap();
        assert_eq!(cfg.search.default_limit, 50);
        assert_eq!(cfg.display.width, 120);
        // Untouched sections fall back to defaults.
        assert_eq!(cfg.cache.ttl_seconds, 86_400);
    }

    #[test]
    fn get_set_round_trip() {
        let mut cfg = Config::default();
        set_value(&mut cfg, "search.default_limit", "33").unwrap();
        assert_eq!(get_value(&cfg, "search.default_limit").unwrap(), "33");

        set_value(&mut cfg, "display.color_output", "auto").unwrap();
        assert_eq!(get_value(&cfg, "display.color_output").unwrap(), "auto");
        set_value(&mut cfg, "display.color_output", "true").unwrap();
        assert_eq!(get_value(&cfg, "display.color_output").unwrap(), "true");

        assert!(set_value(&mut cfg, "nope.nope", "1").is_err());
        assert!(set_value(&mut cfg, "display.width", "wide").is_err());
    }

    #[test]
    fn resolve_names_and_paths() {
        let abs = resolve_database_path("/tmp/docs.usde").unwrap();
        assert_eq!(abs, PathBuf::from("/tmp/docs.usde"));

        let named = resolve_database_path("mydocs").unwrap();
        assert!(named.to_string_lossy().ends_with("mydocs.usde"));

        let with_ext = resolve_database_path("other.usde").unwrap();
        assert!(with_ext.to_string_lossy().ends_with("other.usde"));
    }
}
