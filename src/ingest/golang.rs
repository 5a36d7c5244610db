//! Go module ingestor.
//!
//! Downloads the module zip from the Go module proxy, discovers every
//! non-test, non-testdata, non-vendored directory containing `.go` files,
//! extracts documentation per package, and stores one markdown document per
//! package under `go/<import-path>`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::cache::{self, Cache};
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::ingest::godoc::{self, GoPackage};
use crate::ingest::{insert_unit, EntryDraft, SymbolDraft};
use crate::archive;
use crate::store::{Document, Store, StoreTx};

const MODULE_PROXY: &str = "https://proxy.golang.org";

pub struct GoOptions<'a> {
    pub module: String,
    pub version: Option<String>,
    pub cache: Option<&'a mut Cache>,
}

#[derive(serde::Deserialize)]
struct LatestResponse {
    #[serde(rename = "Version")]
    version: String,
}

/// Ingest one Go module at a version (latest when unset).
pub async fn ingest_module(store: &Store, opts: GoOptions<'_>) -> Result<()> {
    if opts.module.is_empty() {
        return Err(Error::input("module is required"));
    }

    let fetcher = Fetcher::new();
    let version = match &opts.version {
        Some(version) => version.clone(),
        None => fetch_latest_version(&fetcher, &opts.module).await?,
    };

    let (root, _scratch) =
        download_module_zip(&fetcher, &opts.module, &version, opts.cache).await?;

    let packages = discover_packages(&root)?;
    if packages.is_empty() {
        return Err(Error::not_found(format!(
            "no packages found in {}@{version}",
            opts.module
        )));
    }
    info!(
        module = %opts.module,
        %version,
        packages = packages.len(),
        "go module ingest starting"
    );

    let mut tx = store.begin().await?;
    for pkg_dir in &packages {
        let import_path = build_import_path(&opts.module, &root, pkg_dir);
        let doc_path = format!("go/{import_path}");
        ingest_package_dir(&mut tx, &import_path, pkg_dir, &doc_path).await?;
    }
    tx.commit().await
}

async fn fetch_latest_version(fetcher: &Fetcher, module: &str) -> Result<String> {
    let url = format!("{MODULE_PROXY}/{}/@latest", escape_module_path(module));
    let latest: LatestResponse = fetcher.get_json(&url).await?;
    if latest.version.is_empty() {
        return Err(Error::upstream("module proxy response missing version"));
    }
    Ok(latest.version)
}

/// Download (or reuse from cache) the module zip and extract it. Returns the
/// module root inside the scratch directory; the scratch guard keeps the
/// extraction alive until the ingest finishes.
async fn download_module_zip(
    fetcher: &Fetcher,
    module: &str,
    version: &str,
    cache: Option<&mut Cache>,
) -> Result<(PathBuf, tempfile::TempDir)> {
    let key = cache::go_module_key(module, version);
    let url = format!(
        "{MODULE_PROXY}/{}/@v/{version}.zip",
        escape_module_path(module)
    );

    let zip_path: PathBuf;
    let mut _downloaded: Option<tempfile::NamedTempFile> = None;

    match cache {
        Some(cache) => {
            if let Ok((path, _)) = cache.get(&key) {
                info!(module, version, path = %path.display(), "using cached module");
                zip_path = path;
            } else {
                let bytes = fetcher.get_bytes(&url).await?;
                cache.put(&key, &url, std::io::Cursor::new(bytes), Duration::ZERO)?;
                let (path, _) = cache.get(&key)?;
                zip_path = path;
            }
        }
        None => {
            let bytes = fetcher.get_bytes(&url).await?;
            let file = tempfile::NamedTempFile::new()?;
            std::fs::write(file.path(), &bytes)?;
            zip_path = file.path().to_path_buf();
            _downloaded = Some(file);
        }
    }

    let scratch = tempfile::Builder::new().prefix("usde-module-").tempdir()?;
    archive::unzip(&zip_path, scratch.path())?;

    // Module zips nest everything under `<escaped-path>@<version>/`.
    let mut root = scratch.path().to_path_buf();
    let nested = scratch
        .path()
        .join(format!("{}@{version}", escape_module_path(module)));
    if nested.is_dir() {
        root = nested;
    } else {
        let entries: Vec<_> = std::fs::read_dir(scratch.path())?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .collect();
        if entries.len() == 1 {
            root = entries[0].path();
        }
    }

    Ok((root, scratch))
}

/// Escape a module path for the proxy: each uppercase letter becomes
/// `!<lowercase>` per the module proxy protocol.
fn escape_module_path(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_ascii_uppercase() {
            escaped.push('!');
            escaped.push(c.to_ascii_lowercase());
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// Directories under `root` containing at least one non-test `.go` file,
/// skipping `.git`, `vendor`, `testdata`, and dot-directories.
fn discover_packages(root: &Path) -> Result<Vec<PathBuf>> {
    let mut packages = Vec::new();
    let mut seen = std::collections::BTreeSet::new();

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        if !entry.file_type().is_dir() {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        !(name == "vendor"
            || name == "testdata"
            || (name.starts_with('.') && entry.depth() > 0))
    });

    for entry in walker {
        let entry = entry.map_err(|err| Error::Other(format!("walk {}: {err}", root.display())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !name.ends_with(".go") || name.ends_with("_test.go") {
            continue;
        }
        let dir = entry.path().parent().unwrap_or(root).to_path_buf();
        if seen.insert(dir.clone()) {
            packages.push(dir);
        }
    }

    packages.sort();
    Ok(packages)
}

fn build_import_path(module: &str, module_root: &Path, pkg_dir: &Path) -> String {
    match pkg_dir.strip_prefix(module_root) {
        Ok(rel) if !rel.as_os_str().is_empty() => {
            format!("{module}/{}", rel.to_string_lossy().replace('\\', "/"))
        }
        _ => module.to_string(),
    }
}

/// Extract, render, and store one package directory. Shared with the stdlib
/// ingestor. Unparseable packages are logged and skipped.
pub async fn ingest_package_dir(
    tx: &mut StoreTx,
    import_path: &str,
    pkg_dir: &Path,
    doc_path: &str,
) -> Result<()> {
    let pkg = match godoc::parse_package(pkg_dir, import_path) {
        Ok(Some(pkg)) => pkg,
        Ok(None) => return Ok(()),
        Err(err) => {
            warn!(import_path, %err, "failed to parse package, skipping");
            return Ok(());
        }
    };

    let markdown = godoc::render_markdown(&pkg);
    let (entries, symbols) = collect_symbols(&pkg);

    let doc = Document::from_markdown(doc_path, &markdown)?;
    insert_unit(tx, &doc, &entries, &symbols).await?;
    Ok(())
}

/// Per-symbol search entries and agent contexts for one package.
fn collect_symbols(pkg: &GoPackage) -> (Vec<EntryDraft>, Vec<SymbolDraft>) {
    let mut entries = Vec::new();
    let mut symbols = Vec::new();

    if !pkg.doc.is_empty() {
        entries.push(EntryDraft::new(
            &pkg.name,
            "Package",
            godoc::summary_text(&pkg.doc),
        ));
        symbols.push(SymbolDraft::new(
            &pkg.name,
            format!("package {}", pkg.name),
            godoc::synopsis(&pkg.doc),
        ));
    }

    for func in &pkg.funcs {
        entries.push(EntryDraft::new(
            func.qualified_name(),
            "Func",
            godoc::summary_text(&func.doc),
        ));
        symbols.push(SymbolDraft::new(
            func.qualified_name(),
            &func.signature,
            godoc::synopsis(&func.doc),
        ));
    }

    for typ in &pkg.types {
        entries.push(EntryDraft::new(
            &typ.name,
            "Type",
            godoc::summary_text(&typ.doc),
        ));
        symbols.push(SymbolDraft::new(
            &typ.name,
            godoc::one_line_signature(&typ.decl),
            godoc::synopsis(&typ.doc),
        ));

        for method in &typ.methods {
            let name = format!("{}.{}", typ.name, method.name);
            entries.push(EntryDraft::new(
                &name,
                "Method",
                godoc::summary_text(&method.doc),
            ));
            symbols.push(SymbolDraft::new(
                &name,
                &method.signature,
                godoc::synopsis(&method.doc),
            ));
        }
    }

    for (values, kind) in [(&pkg.vars, "Var"), (&pkg.consts, "Const")] {
        for value in values.iter() {
            for name in &value.names {
                entries.push(EntryDraft::new(
                    name,
                    kind,
                    godoc::summary_text(&value.doc),
                ));
                symbols.push(SymbolDraft::new(
                    name,
                    godoc::one_line_signature(&value.decl),
                    godoc::synopsis(&value.doc),
                ));
            }
        }
    }

    (entries, symbols)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_uppercase_module_paths() {
        assert_eq!(
            escape_module_path("github.com/BurntSushi/toml"),
            "github.com/!burnt!sushi/toml"
        );
        assert_eq!(escape_module_path("golang.org/x/net"), "golang.org/x/net");
    }

    #[test]
    fn discover_skips_vendor_and_tests() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("pkg")).unwrap();
        std::fs::create_dir_all(root.join("vendor/dep")).unwrap();
        std::fs::create_dir_all(root.join("testdata")).unwrap();
        std::fs::create_dir_all(root.join(".hidden")).unwrap();
        std::fs::write(root.join("main.go"), "package main").unwrap();
        std::fs::write(root.join("pkg/pkg.go"), "package pkg").unwrap();
        std::fs::write(root.join("pkg/pkg_test.go"), "package pkg").unwrap();
        std::fs::write(root.join("vendor/dep/dep.go"), "package dep").unwrap();
        std::fs::write(root.join("testdata/fixture.go"), "package fixture").unwrap();
        std::fs::write(root.join(".hidden/h.go"), "package h").unwrap();

        let packages = discover_packages(root).unwrap();
        assert_eq!(packages, vec![root.to_path_buf(), root.join("pkg")]);
    }

    #[test]
    fn import_paths_join_relative_dirs() {
        let root = Path::new("/tmp/mod");
        assert_eq!(
            build_import_path("example.com/m", root, Path::new("/tmp/mod/sub/pkg")),
            "example.com/m/sub/pkg"
        );
        assert_eq!(
            build_import_path("example.com/m", root, Path::new("/tmp/mod")),
            "example.com/m"
        );
    }

    #[test]
    fn collect_symbols_covers_all_kinds() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("lib.go"),
            r#"// Package lib does things.
package lib

// Answer is the answer.
const Answer = 42

// Version names the release.
var Version = "1.0"

// Run runs.
func Run() {}

// Client talks.
type Client struct{}

// Do does.
func (c *Client) Do() {}
"#,
        )
        .unwrap();
        let pkg = godoc::parse_package(dir.path(), "example.com/lib")
            .unwrap()
            .unwrap();
        let (entries, symbols) = collect_symbols(&pkg);

        let kinds: Vec<_> = entries.iter().map(|e| e.kind.as_str()).collect();
        for kind in ["Package", "Func", "Type", "Method", "Var", "Const"] {
            assert!(kinds.contains(&kind), "missing {kind} in {kinds:?}");
        }

        let run = symbols.iter().find(|s| s.symbol == "Run").unwrap();
        assert_eq!(run.signature, "func Run()");
        assert_eq!(run.summary, "Run runs.");

        let method = symbols.iter().find(|s| s.symbol == "Client.Do").unwrap();
        assert_eq!(method.signature, "func (c *Client) Do()");

        let pkg_sym = symbols.iter().find(|s| s.symbol == "lib").unwrap();
        assert!(pkg_sym.signature.starts_with("package"));
    }
}
