//! Go standard library ingestor.
//!
//! Scrapes the stdlib directory listing from pkg.go.dev to enumerate
//! package paths, then fetches each package's tree as a tar.gz from the
//! canonical git mirror (gitiles). `start` and `max` cursors allow
//! incremental runs over the large package list.

use std::path::Path;
use std::time::Duration;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::info;

use crate::cache::{self, Cache};
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::ingest::golang::ingest_package_dir;
use crate::store::Store;
use crate::archive;

const STDLIB_URL: &str = "https://pkg.go.dev/std";
const GITILES_ARCHIVE: &str = "https://go.googlesource.com/go/+archive";

pub struct StdlibOptions<'a> {
    /// Toolchain tag (e.g. `go1.24.0`); detected from pkg.go.dev when unset.
    pub version: Option<String>,
    /// First package path to ingest; earlier packages are skipped.
    pub start: Option<String>,
    /// Cap on the number of packages ingested (0 = all).
    pub max: usize,
    pub cache: Option<&'a mut Cache>,
}

/// Ingest the Go standard library, one document per package under
/// `go/<pkg>`.
pub async fn ingest_stdlib(store: &Store, opts: StdlibOptions<'_>) -> Result<()> {
    // pkg.go.dev throttles aggressively; space requests a second apart.
    let fetcher = Fetcher::with_min_interval(Duration::from_secs(1));

    let listing = fetcher.get_text(STDLIB_URL).await?;
    let version = match &opts.version {
        Some(version) => version.clone(),
        None => extract_stdlib_version(&listing)
            .ok_or_else(|| Error::upstream("unable to detect stdlib version"))?,
    };

    let mut packages = extract_stdlib_packages(&listing);
    if packages.is_empty() {
        return Err(Error::upstream("no stdlib packages found"));
    }
    packages = filter_packages(packages, opts.start.as_deref(), opts.max);
    if packages.is_empty() {
        return Err(Error::input("no stdlib packages selected"));
    }
    info!(
        %version,
        packages = packages.len(),
        start = opts.start.as_deref().unwrap_or(""),
        max = opts.max,
        "stdlib ingest starting"
    );

    let scratch = tempfile::Builder::new().prefix("usde-stdlib-").tempdir()?;
    let mut cache = opts.cache;

    let mut tx = store.begin().await?;
    for pkg in &packages {
        info!(path = %pkg, "ingesting stdlib package");
        let pkg_dir = scratch.path().join("src").join(pkg);
        std::fs::create_dir_all(&pkg_dir)?;

        fetch_archive(&fetcher, &version, pkg, &pkg_dir, cache.as_deref_mut())
            .await
            .map_err(|err| Error::Other(format!("{pkg}: {err}")))?;

        let doc_path = format!("go/{pkg}");
        ingest_package_dir(&mut tx, pkg, &pkg_dir, &doc_path).await?;
    }
    tx.commit().await
}

/// Toolchain tag from the listing page, e.g. `go1.24.0`.
fn extract_stdlib_version(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);

    let canonical = Selector::parse(".js-canonicalURLPath").ok()?;
    if let Some(el) = doc.select(&canonical).next() {
        if let Some(path) = el.value().attr("data-canonical-url-path") {
            if let Some((_, version)) = path.split_once('@') {
                let version = version.trim_start_matches('v');
                if !version.is_empty() {
                    return Some(version.to_string());
                }
            }
        }
    }

    let re = Regex::new(r"Version:\s*(go[0-9.]+)").expect("version regex");
    re.captures(html)
        .map(|caps| caps[1].to_string())
}

/// Package paths from the directory table. Row ids use `-` where the
/// import path uses `/`.
fn extract_stdlib_packages(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let rows = match Selector::parse("table.UnitDirectories-table tr[data-id]") {
        Ok(sel) => sel,
        Err(_) => return Vec::new(),
    };

    let mut packages: Vec<String> = doc
        .select(&rows)
        .filter_map(|row| row.value().attr("data-id"))
        .map(|id| id.replace('-', "/"))
        .map(|path| path.trim_start_matches('/').to_string())
        .filter(|path| !path.is_empty() && path != "std")
        .collect();

    packages.sort();
    packages.dedup();
    packages
}

fn filter_packages(packages: Vec<String>, start: Option<&str>, max: usize) -> Vec<String> {
    let mut filtered = match start {
        Some(start) if !start.is_empty() => packages
            .into_iter()
            .skip_while(|pkg| pkg != start)
            .collect(),
        _ => packages,
    };
    if max > 0 && filtered.len() > max {
        filtered.truncate(max);
    }
    filtered
}

async fn fetch_archive(
    fetcher: &Fetcher,
    version: &str,
    pkg: &str,
    dest: &Path,
    cache: Option<&mut Cache>,
) -> Result<()> {
    let key = cache::go_stdlib_key(version, pkg);
    let url = format!("{GITILES_ARCHIVE}/{version}/src/{pkg}.tar.gz");

    match cache {
        Some(cache) => {
            if let Ok((path, _)) = cache.get(&key) {
                info!(package = pkg, version, "using cached stdlib package");
                return archive::untar_gz(&path, dest);
            }
            let bytes = fetcher.get_bytes(&url).await?;
            cache.put(&key, &url, std::io::Cursor::new(bytes), Duration::ZERO)?;
            let (path, _) = cache.get(&key)?;
            archive::untar_gz(&path, dest)
        }
        None => {
            let bytes = fetcher.get_bytes(&url).await?;
            let tmp = tempfile::NamedTempFile::new()?;
            std::fs::write(tmp.path(), &bytes)?;
            archive::untar_gz(tmp.path(), dest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r##"
    <html><body>
    <a class="js-canonicalURLPath" data-canonical-url-path="/std@go1.24.0">std</a>
    <table class="UnitDirectories-table">
      <tr data-id="archive-tar"><td>archive/tar</td></tr>
      <tr data-id="archive-zip"><td>archive/zip</td></tr>
      <tr data-id="fmt"><td>fmt</td></tr>
      <tr data-id="net-http"><td>net/http</td></tr>
      <tr data-id="std"><td>std</td></tr>
      <tr><td>no id</td></tr>
    </table>
    </body></html>
    "##;

    #[test]
    fn extracts_version_from_canonical_path() {
        assert_eq!(extract_stdlib_version(LISTING).as_deref(), Some("go1.24.0"));
    }

    #[test]
    fn extracts_version_from_text_fallback() {
        let html = "<html><body>Version: go1.23.4 released</body></html>";
        assert_eq!(extract_stdlib_version(html).as_deref(), Some("go1.23.4"));
        assert_eq!(extract_stdlib_version("<html></html>"), None);
    }

    #[test]
    fn extracts_package_paths() {
        let packages = extract_stdlib_packages(LISTING);
        assert_eq!(
            packages,
            vec!["archive/tar", "archive/zip", "fmt", "net/http"]
        );
    }

    #[test]
    fn start_and_max_cursors() {
        let all = vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "d".to_string(),
        ];
        assert_eq!(
            filter_packages(all.clone(), Some("c"), 0),
            vec!["c", "d"]
        );
        assert_eq!(filter_packages(all.clone(), None, 2), vec!["a", "b"]);
        assert_eq!(filter_packages(all.clone(), Some("b"), 1), vec!["b"]);
        assert_eq!(filter_packages(all.clone(), None, 0), all);
        // An unknown start skips everything.
        assert!(filter_packages(all, Some("zzz"), 0).is_empty());
    }
}
