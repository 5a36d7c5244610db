//! Rust crate ingestor.
//!
//! Downloads the rustdoc zip for a crate/version from the docs.rs archive
//! (whose zip entries use bzip2, method 12), picks the best target triple in
//! a declared preference order, parses `sidebar-items*.js` (a JavaScript
//! assignment whose right-hand side is JSON) into item lists, and extracts
//! each item's title, signature, and docblock paragraphs from its HTML page
//! into markdown. The crate index page is ingested as `rust/<crate>/index`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::archive;
use crate::cache::{self, Cache};
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::ingest::{insert_unit, EntryDraft};
use crate::store::{Document, Store, StoreTx};
use crate::text::first_line;

const TARGET_PREFERENCE: [&str; 3] = [
    "x86_64-unknown-linux-gnu",
    "x86_64-apple-darwin",
    "aarch64-unknown-linux-gnu",
];

pub struct RustOptions<'a> {
    pub krate: String,
    pub version: Option<String>,
    pub cache: Option<&'a mut Cache>,
}

pub async fn ingest_crate(store: &Store, opts: RustOptions<'_>) -> Result<()> {
    if opts.krate.is_empty() {
        return Err(Error::input("crate name is required"));
    }

    let fetcher = Fetcher::new();
    let version = match &opts.version {
        Some(version) => version.clone(),
        None => fetch_latest_version(&fetcher, &opts.krate).await?,
    };

    let (extract_dir, _scratch) =
        download_docs(&fetcher, &opts.krate, &version, opts.cache).await?;

    info!(crate_name = %opts.krate, %version, "rust crate ingest starting");

    let target = select_target(&extract_dir)?;
    let crate_name = opts.krate.replace('-', "_");
    let crate_dir = extract_dir.join(&target).join(&crate_name);
    if !crate_dir.is_dir() {
        return Err(Error::not_found(format!(
            "crate directory not found: {}",
            crate_dir.display()
        )));
    }

    let mut tx = store.begin().await?;
    ingest_crate_dir(&mut tx, &opts.krate, &version, &crate_dir).await?;
    tx.commit().await
}

#[derive(Deserialize)]
struct CratesIoResponse {
    #[serde(rename = "crate")]
    krate: CratesIoCrate,
}

#[derive(Deserialize)]
struct CratesIoCrate {
    #[serde(rename = "max_version")]
    version: String,
}

async fn fetch_latest_version(fetcher: &Fetcher, krate: &str) -> Result<String> {
    let url = format!("https://crates.io/api/v1/crates/{krate}");
    let response: CratesIoResponse = fetcher.get_json(&url).await?;
    if response.krate.version.is_empty() {
        return Err(Error::not_found(format!("no version found for crate {krate}")));
    }
    Ok(response.krate.version)
}

async fn download_docs(
    fetcher: &Fetcher,
    krate: &str,
    version: &str,
    cache: Option<&mut Cache>,
) -> Result<(PathBuf, tempfile::TempDir)> {
    let key = cache::rust_crate_key(krate, version);
    let url = format!("https://docs.rs/crate/{krate}/{version}/download");

    let zip_path: PathBuf;
    let mut _downloaded: Option<tempfile::NamedTempFile> = None;

    match cache {
        Some(cache) => {
            if let Ok((path, _)) = cache.get(&key) {
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
            let tmp = tempfile::NamedTempFile::new()?;
            std::fs::write(tmp.path(), &bytes)?;
            zip_path = tmp.path().to_path_buf();
            _downloaded = Some(tmp);
        }
    }

    let scratch = tempfile::Builder::new().prefix("usde-rust-").tempdir()?;
    archive::unzip(&zip_path, scratch.path())?;
    let dir = scratch.path().to_path_buf();
    Ok((dir, scratch))
}

/// Pick the target triple directory, preferring the declared order, then
/// any non-hidden directory.
fn select_target(extract_dir: &Path) -> Result<String> {
    let mut targets: Vec<String> = std::fs::read_dir(extract_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| !name.starts_with('.'))
        .collect();
    targets.sort();

    for preferred in TARGET_PREFERENCE {
        if let Some(target) = targets.iter().find(|t| t.starts_with(preferred)) {
            return Ok(target.clone());
        }
    }
    targets
        .into_iter()
        .next()
        .ok_or_else(|| Error::corruption("no targets found in rustdoc archive"))
}

#[derive(Debug, Default, Deserialize)]
struct SidebarItems {
    #[serde(rename = "mod", default)]
    modules: Vec<String>,
    #[serde(rename = "struct", default)]
    structs: Vec<String>,
    #[serde(rename = "enum", default)]
    enums: Vec<String>,
    #[serde(rename = "trait", default)]
    traits: Vec<String>,
    #[serde(rename = "fn", default)]
    funcs: Vec<String>,
    #[serde(rename = "type", default)]
    type_defs: Vec<String>,
    #[serde(rename = "constant", default)]
    constants: Vec<String>,
    #[serde(rename = "static", default)]
    statics: Vec<String>,
}

/// Parse `window.SIDEBAR_ITEMS = {...};` into item lists.
fn parse_sidebar_items(js: &str) -> Result<SidebarItems> {
    let json = js
        .trim()
        .trim_start_matches("window.SIDEBAR_ITEMS = ")
        .trim_end_matches(';');
    serde_json::from_str(json)
        .map_err(|err| Error::corruption(format!("sidebar items: {err}")))
}

fn find_sidebar_items(crate_dir: &Path) -> Option<PathBuf> {
    fn scan(dir: &Path) -> Option<PathBuf> {
        let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|name| name.starts_with("sidebar-items") && name.ends_with(".js"))
                    .unwrap_or(false)
            })
            .collect();
        matches.sort();
        matches.into_iter().next()
    }

    if let Some(path) = scan(crate_dir) {
        return Some(path);
    }
    // Some archives nest the sidebar one level down.
    let subdirs = std::fs::read_dir(crate_dir).ok()?;
    for entry in subdirs.filter_map(|e| e.ok()) {
        if entry.path().is_dir() {
            if let Some(path) = scan(&entry.path()) {
                return Some(path);
            }
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ItemKind {
    Module,
    Struct,
    Enum,
    Trait,
    Function,
    Type,
    Constant,
    Static,
}

impl ItemKind {
    fn label(self) -> &'static str {
        match self {
            ItemKind::Module => "Module",
            ItemKind::Struct => "Struct",
            ItemKind::Enum => "Enum",
            ItemKind::Trait => "Trait",
            ItemKind::Function => "Function",
            ItemKind::Type => "Type",
            ItemKind::Constant => "Constant",
            ItemKind::Static => "Static",
        }
    }

    /// Path of the item's HTML page relative to the crate directory.
    fn html_path(self, name: &str) -> String {
        match self {
            ItemKind::Module => format!("{name}/index.html"),
            ItemKind::Struct => format!("struct.{name}.html"),
            ItemKind::Enum => format!("enum.{name}.html"),
            ItemKind::Trait => format!("trait.{name}.html"),
            ItemKind::Function => format!("fn.{name}.html"),
            ItemKind::Type => format!("type.{name}.html"),
            ItemKind::Constant => format!("constant.{name}.html"),
            ItemKind::Static => format!("static.{name}.html"),
        }
    }
}

async fn ingest_crate_dir(
    tx: &mut StoreTx,
    krate: &str,
    version: &str,
    crate_dir: &Path,
) -> Result<()> {
    let sidebar_path = find_sidebar_items(crate_dir).ok_or_else(|| {
        Error::not_found(format!("sidebar-items.js not found in {}", crate_dir.display()))
    })?;
    let sidebar_js = std::fs::read_to_string(&sidebar_path)?;
    let items = parse_sidebar_items(&sidebar_js)?;

    let mut all_items: Vec<(String, ItemKind)> = Vec::new();
    let groups: [(&[String], ItemKind); 8] = [
        (&items.modules, ItemKind::Module),
        (&items.structs, ItemKind::Struct),
        (&items.enums, ItemKind::Enum),
        (&items.traits, ItemKind::Trait),
        (&items.funcs, ItemKind::Function),
        (&items.type_defs, ItemKind::Type),
        (&items.constants, ItemKind::Constant),
        (&items.statics, ItemKind::Static),
    ];
    for (names, kind) in groups {
        for name in names {
            all_items.push((name.clone(), kind));
        }
    }

    // Crate index page first.
    match extract_page_markdown(&crate_dir.join("index.html")) {
        Ok(markdown) if !markdown.is_empty() => {
            insert_crate_doc(tx, krate, version, &format!("rust/{krate}/index"), &markdown)
                .await?;
        }
        Ok(_) => {}
        Err(err) => warn!(%err, "failed to parse crate index"),
    }

    let mut processed = 0usize;
    for (name, kind) in &all_items {
        let html_path = crate_dir.join(kind.html_path(name));
        if !html_path.is_file() {
            continue;
        }

        let markdown = match extract_page_markdown(&html_path) {
            Ok(markdown) => markdown,
            Err(err) => {
                warn!(file = %html_path.display(), %err, "failed to parse rustdoc page");
                continue;
            }
        };
        if markdown.is_empty() {
            continue;
        }

        processed += 1;
        let doc_path = format!("rust/{krate}/{}/{name}", kind.label());
        let doc_id = match insert_crate_doc(tx, krate, version, &doc_path, &markdown).await {
            Ok(id) => id,
            Err(err) => {
                error!(path = %doc_path, %err, "failed to insert doc");
                return Err(err);
            }
        };

        let full_name = format!("{krate}::{name}");
        tx.insert_search_entry(&crate::store::SearchEntry {
            name: full_name.clone(),
            kind: kind.label().to_string(),
            body: format!("{full_name} {}", first_line(&markdown)),
            doc_id,
        })
        .await?;

        let signature = extract_signature(&markdown);
        if !signature.is_empty() {
            tx.insert_symbol_context(&crate::store::SymbolContext {
                doc_id,
                symbol: full_name,
                signature,
                summary: first_line(&markdown).to_string(),
            })
            .await?;
        }
    }

    info!(processed, total = all_items.len(), "ingestion complete");
    Ok(())
}

/// Insert one crate page; the body gets a `# <crate>` + `Version:` header.
async fn insert_crate_doc(
    tx: &mut StoreTx,
    krate: &str,
    version: &str,
    doc_path: &str,
    markdown: &str,
) -> Result<i64> {
    let full = format!("# {krate}\n\nVersion: {version}\n\n{markdown}");
    let doc = Document::from_markdown(doc_path, &full)?;
    let entries = if doc_path.ends_with("/index") {
        vec![EntryDraft::new(
            krate,
            "Crate",
            format!("{krate} {}", first_line(markdown)),
        )]
    } else {
        Vec::new()
    };
    insert_unit(tx, &doc, &entries, &[]).await
}

/// Title, item declaration, docblocks, and section headings of one rustdoc
/// HTML page, as markdown.
fn extract_page_markdown(html_path: &Path) -> Result<String> {
    let html = std::fs::read_to_string(html_path)?;
    Ok(extract_markdown_from_html(&html))
}

fn extract_markdown_from_html(html: &str) -> String {
    let doc = Html::parse_document(html);
    let main = Selector::parse("main").expect("main selector");
    let h1 = Selector::parse("h1").expect("h1 selector");
    let decl = Selector::parse("pre.rust.item-decl").expect("decl selector");
    let docblock = Selector::parse(".docblock").expect("docblock selector");
    let h2 = Selector::parse("h2").expect("h2 selector");

    let mut lines: Vec<String> = Vec::new();
    for main_el in doc.select(&main) {
        for el in main_el.select(&h1) {
            let title = element_text(&el);
            if !title.is_empty() {
                lines.push(format!("# {title}"));
            }
        }
        for el in main_el.select(&decl) {
            let code = element_text(&el);
            if !code.is_empty() {
                lines.push("```rust".to_string());
                lines.push(code);
                lines.push("```".to_string());
            }
        }
        for el in main_el.select(&docblock) {
            let body = element_text(&el);
            if !body.is_empty() {
                lines.push(body);
            }
        }
        for el in main_el.select(&h2) {
            let heading = element_text(&el);
            if !heading.is_empty() {
                lines.push(String::new());
                lines.push(format!("## {heading}"));
            }
        }
    }

    lines.join("\n").trim().to_string()
}

fn element_text(el: &scraper::ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// First declaration-looking line of the extracted markdown.
fn extract_signature(markdown: &str) -> String {
    for line in markdown.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            continue;
        }
        if trimmed.starts_with("pub ")
            || trimmed.starts_with("fn ")
            || trimmed.starts_with("struct ")
            || trimmed.starts_with("enum ")
            || trimmed.starts_with("trait ")
            || trimmed.starts_with("type ")
        {
            return trimmed
                .strip_prefix("pub ")
                .unwrap_or(trimmed)
                .trim_end_matches(';')
                .to_string();
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
    <html><body>
    <nav>ignored</nav>
    <main>
      <h1>Struct Client</h1>
      <pre class="rust item-decl"><code>pub struct Client { /* private fields */ }</code></pre>
      <div class="docblock"><p>An asynchronous HTTP client.</p></div>
      <h2>Implementations</h2>
    </main>
    </body></html>
    "#;

    #[test]
    fn extracts_title_decl_and_docblock() {
        let md = extract_markdown_from_html(PAGE);
        assert!(md.starts_with("# Struct Client"));
        assert!(md.contains("```rust\npub struct Client { /* private fields */ }\n```"));
        assert!(md.contains("An asynchronous HTTP client."));
        assert!(md.contains("## Implementations"));
        assert!(!md.contains("ignored"));
    }

    #[test]
    fn signature_strips_pub_and_semicolon() {
        let md = "# T\n```rust\npub struct Client { }\n```\ndoc";
        assert_eq!(extract_signature(md), "struct Client { }");

        let md = "# T\n```rust\npub fn spawn<T>(future: T) -> JoinHandle<T>;\n```";
        assert_eq!(extract_signature(md), "fn spawn<T>(future: T) -> JoinHandle<T>");

        assert_eq!(extract_signature("# T\nplain words only"), "");
    }

    #[test]
    fn parses_sidebar_assignment() {
        let js = r#"window.SIDEBAR_ITEMS = {"struct":["Client","Server"],"fn":["connect"],"mod":["io"]};"#;
        let items = parse_sidebar_items(js).unwrap();
        assert_eq!(items.structs, vec!["Client", "Server"]);
        assert_eq!(items.funcs, vec!["connect"]);
        assert_eq!(items.modules, vec!["io"]);
        assert!(items.enums.is_empty());

        assert!(parse_sidebar_items("not js").is_err());
    }

    #[test]
    fn item_kind_html_paths() {
        assert_eq!(ItemKind::Module.html_path("io"), "io/index.html");
        assert_eq!(ItemKind::Struct.html_path("Client"), "struct.Client.html");
        assert_eq!(ItemKind::Trait.html_path("Read"), "trait.Read.html");
        assert_eq!(ItemKind::Function.html_path("spawn"), "fn.spawn.html");
        assert_eq!(ItemKind::Constant.html_path("MAX"), "constant.MAX.html");
        assert_eq!(ItemKind::Static.html_path("GLOBAL"), "static.GLOBAL.html");
    }

    #[test]
    fn target_preference_order() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("aarch64-unknown-linux-gnu")).unwrap();
        std::fs::create_dir(tmp.path().join("x86_64-unknown-linux-gnu")).unwrap();
        std::fs::create_dir(tmp.path().join(".hidden")).unwrap();
        assert_eq!(select_target(tmp.path()).unwrap(), "x86_64-unknown-linux-gnu");

        let tmp2 = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp2.path().join("wasm32-unknown-unknown")).unwrap();
        assert_eq!(select_target(tmp2.path()).unwrap(), "wasm32-unknown-unknown");

        let empty = tempfile::tempdir().unwrap();
        assert!(select_target(empty.path()).is_err());
    }
}
