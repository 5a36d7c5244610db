//! Hex package ingestor (Elixir and Gleam).
//!
//! Downloads the documentation tarball from the Hex repository. Gleam
//! packages ship a structured `package-interface.json`; every function gets
//! a reconstructed Gleam signature from the JSON type expressions. Elixir
//! packages carry ExDoc output instead: the `search_data-*.js` bundle is
//! unwrapped from its `searchData = {...}` JavaScript binding and grouped
//! by page ref.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::info;

use crate::archive;
use crate::cache::{self, Cache};
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::ingest::{insert_unit, EntryDraft, SymbolDraft};
use crate::store::{Document, Store, StoreTx};
use crate::text::{capitalize, first_line};

pub struct HexOptions<'a> {
    pub package: String,
    pub version: Option<String>,
    pub cache: Option<&'a mut Cache>,
}

pub async fn ingest_package(store: &Store, opts: HexOptions<'_>) -> Result<()> {
    if opts.package.is_empty() {
        return Err(Error::input("package name is required"));
    }

    let fetcher = Fetcher::new();
    let version = match &opts.version {
        Some(version) => version.clone(),
        None => fetch_latest_version(&fetcher, &opts.package).await?,
    };

    let (docs_dir, _scratch) =
        download_docs(&fetcher, &opts.package, &version, opts.cache).await?;

    info!(package = %opts.package, %version, "hex package ingest starting");

    let mut tx = store.begin().await?;
    let interface_path = docs_dir.join("package-interface.json");
    if interface_path.is_file() {
        ingest_gleam(&mut tx, &opts.package, &interface_path).await?;
    } else {
        ingest_elixir(&mut tx, &opts.package, &docs_dir).await?;
    }
    tx.commit().await
}

#[derive(Deserialize)]
struct HexRelease {
    version: String,
}

#[derive(Deserialize)]
struct HexPackage {
    releases: Vec<HexRelease>,
}

async fn fetch_latest_version(fetcher: &Fetcher, pkg: &str) -> Result<String> {
    let url = format!("https://hex.pm/api/packages/{pkg}");
    let package: HexPackage = fetcher.get_json(&url).await?;
    package
        .releases
        .first()
        .map(|release| release.version.clone())
        .ok_or_else(|| Error::not_found(format!("no releases found for package {pkg}")))
}

async fn download_docs(
    fetcher: &Fetcher,
    pkg: &str,
    version: &str,
    cache: Option<&mut Cache>,
) -> Result<(PathBuf, tempfile::TempDir)> {
    let key = cache::hex_package_key(pkg, version);
    let url = format!("https://repo.hex.pm/docs/{pkg}-{version}.tar.gz");

    let scratch = tempfile::Builder::new().prefix("usde-hex-").tempdir()?;
    let tar_path: PathBuf;
    let mut _downloaded: Option<tempfile::NamedTempFile> = None;

    match cache {
        Some(cache) => {
            if let Ok((path, _)) = cache.get(&key) {
                tar_path = path;
            } else {
                let bytes = fetcher.get_bytes(&url).await?;
                cache.put(&key, &url, std::io::Cursor::new(bytes), Duration::ZERO)?;
                let (path, _) = cache.get(&key)?;
                tar_path = path;
            }
        }
        None => {
            let bytes = fetcher.get_bytes(&url).await?;
            let tmp = tempfile::NamedTempFile::new()?;
            std::fs::write(tmp.path(), &bytes)?;
            tar_path = tmp.path().to_path_buf();
            _downloaded = Some(tmp);
        }
    }

    archive::untar_gz(&tar_path, scratch.path())?;
    let dir = scratch.path().to_path_buf();
    Ok((dir, scratch))
}

// ---- Gleam package-interface.json model ----

/// Doc strings arrive as either a single string or a list of fragments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
pub enum DocString {
    #[default]
    #[serde(skip)]
    Empty,
    One(String),
    Many(Vec<String>),
    // `"documentation": null` shows up in real interfaces.
    Null(()),
}

impl DocString {
    pub fn text(&self) -> String {
        match self {
            DocString::One(s) => s.clone(),
            DocString::Many(parts) => parts.concat(),
            DocString::Empty | DocString::Null(()) => String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GleamInterface {
    #[allow(dead_code)]
    pub name: String,
    #[allow(dead_code)]
    pub version: String,
    #[serde(default)]
    pub modules: BTreeMap<String, GleamModule>,
}

#[derive(Debug, Deserialize)]
pub struct GleamModule {
    #[serde(default)]
    pub documentation: DocString,
    #[serde(default)]
    pub types: BTreeMap<String, GleamTypeDef>,
    #[serde(rename = "type-aliases", default)]
    pub type_aliases: BTreeMap<String, GleamAlias>,
    #[serde(default)]
    pub functions: BTreeMap<String, GleamFunction>,
}

#[derive(Debug, Deserialize)]
pub struct GleamTypeDef {
    #[serde(default)]
    pub documentation: DocString,
    #[serde(default)]
    pub parameters: usize,
    #[serde(default)]
    pub constructors: Vec<GleamConstructor>,
}

#[derive(Debug, Deserialize)]
pub struct GleamConstructor {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<GleamParam>,
}

#[derive(Debug, Deserialize)]
pub struct GleamAlias {
    #[serde(default)]
    pub documentation: DocString,
    pub alias: GleamTypeExpr,
}

#[derive(Debug, Deserialize)]
pub struct GleamFunction {
    #[serde(default)]
    pub documentation: DocString,
    #[serde(default)]
    pub parameters: Vec<GleamParam>,
    #[serde(rename = "return")]
    pub return_type: GleamTypeExpr,
}

#[derive(Debug, Deserialize)]
pub struct GleamParam {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub kind: GleamTypeExpr,
}

#[derive(Debug, Default, Deserialize)]
pub struct GleamTypeExpr {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<GleamTypeExpr>,
    #[serde(default)]
    pub elements: Vec<GleamTypeExpr>,
    #[serde(default)]
    pub id: usize,
    #[serde(rename = "return", default)]
    pub return_type: Option<Box<GleamTypeExpr>>,
}

const VAR_NAMES: [&str; 8] = ["a", "b", "c", "d", "e", "f", "g", "h"];

fn var_name(id: usize) -> String {
    VAR_NAMES
        .get(id)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("t{id}"))
}

/// Render a type expression in Gleam syntax. `named`, `variable`, `fn`, and
/// `tuple` kinds are supported; anything else renders as `?`.
pub fn render_gleam_type(t: &GleamTypeExpr) -> String {
    match t.kind.as_str() {
        "named" => {
            if t.parameters.is_empty() {
                t.name.clone()
            } else {
                let params: Vec<String> = t.parameters.iter().map(render_gleam_type).collect();
                format!("{}({})", t.name, params.join(", "))
            }
        }
        "variable" => var_name(t.id),
        "fn" => {
            let params: Vec<String> = t.parameters.iter().map(render_gleam_type).collect();
            let ret = t
                .return_type
                .as_deref()
                .map(render_gleam_type)
                .unwrap_or_else(|| "Nil".to_string());
            format!("fn({}) -> {}", params.join(", "), ret)
        }
        "tuple" => {
            let elems: Vec<String> = t.elements.iter().map(render_gleam_type).collect();
            format!("#({})", elems.join(", "))
        }
        _ => "?".to_string(),
    }
}

/// Reconstruct a Gleam function signature from its structured form.
pub fn render_gleam_signature(name: &str, func: &GleamFunction) -> String {
    let params: Vec<String> = func
        .parameters
        .iter()
        .map(|param| {
            let kind = render_gleam_type(&param.kind);
            match param.label.as_deref() {
                Some(label) if !label.is_empty() => format!("{label} {kind}"),
                _ => kind,
            }
        })
        .collect();
    format!(
        "fn {name}({}) -> {}",
        params.join(", "),
        render_gleam_type(&func.return_type)
    )
}

/// Reconstruct a custom type declaration with its constructors.
pub fn render_gleam_type_def(name: &str, def: &GleamTypeDef) -> String {
    let mut sig = format!("type {name}");
    if def.parameters > 0 {
        let params: Vec<String> = (0..def.parameters).map(var_name).collect();
        let _ = write!(sig, "({})", params.join(", "));
    }
    if !def.constructors.is_empty() {
        sig.push_str(" {\n");
        for ctor in &def.constructors {
            sig.push_str("  ");
            sig.push_str(&ctor.name);
            if !ctor.parameters.is_empty() {
                let params: Vec<String> = ctor
                    .parameters
                    .iter()
                    .map(|param| {
                        let kind = render_gleam_type(&param.kind);
                        match param.label.as_deref() {
                            Some(label) if !label.is_empty() => format!("{label}: {kind}"),
                            _ => kind,
                        }
                    })
                    .collect();
                let _ = write!(sig, "({})", params.join(", "));
            }
            sig.push('\n');
        }
        sig.push('}');
    }
    sig
}

async fn ingest_gleam(tx: &mut StoreTx, pkg: &str, interface_path: &Path) -> Result<()> {
    let data = std::fs::read(interface_path)?;
    let interface: GleamInterface = serde_json::from_slice(&data)
        .map_err(|err| Error::corruption(format!("package-interface.json: {err}")))?;

    for (mod_name, module) in &interface.modules {
        let mut md = format!("# {mod_name}\n\n");
        let mod_doc = module.documentation.text();
        if !mod_doc.is_empty() {
            md.push_str(&mod_doc);
            md.push_str("\n\n");
        }

        if !module.types.is_empty() {
            md.push_str("## Types\n\n");
            for (type_name, def) in &module.types {
                let sig = render_gleam_type_def(type_name, def);
                let _ = write!(md, "### {type_name}\n\n```gleam\n{sig}\n```\n\n");
                let doc = def.documentation.text();
                if !doc.is_empty() {
                    md.push_str(&doc);
                    md.push_str("\n\n");
                }
            }
        }

        if !module.type_aliases.is_empty() {
            md.push_str("## Type Aliases\n\n");
            for (alias_name, alias) in &module.type_aliases {
                let target = render_gleam_type(&alias.alias);
                let _ = write!(
                    md,
                    "### {alias_name}\n\n```gleam\ntype {alias_name} = {target}\n```\n\n"
                );
                let doc = alias.documentation.text();
                if !doc.is_empty() {
                    md.push_str(&doc);
                    md.push_str("\n\n");
                }
            }
        }

        if !module.functions.is_empty() {
            md.push_str("## Functions\n\n");
            for (fn_name, func) in &module.functions {
                let sig = render_gleam_signature(fn_name, func);
                let _ = write!(md, "### {fn_name}\n\n```gleam\n{sig}\n```\n\n");
                let doc = func.documentation.text();
                if !doc.is_empty() {
                    md.push_str(&doc);
                    md.push_str("\n\n");
                }
            }
        }

        let mut entries = vec![EntryDraft::new(
            mod_name,
            "Module",
            format!("{mod_name} {}", module.documentation.text()),
        )];
        let mut symbols = Vec::new();

        for (fn_name, func) in &module.functions {
            let symbol = format!("{mod_name}.{fn_name}");
            let sig = render_gleam_signature(fn_name, func);
            let doc = func.documentation.text();
            entries.push(EntryDraft::new(
                &symbol,
                "Function",
                format!("{symbol} {sig} {doc}"),
            ));
            symbols.push(SymbolDraft::new(&symbol, sig, first_line(&doc)));
        }

        for (type_name, def) in &module.types {
            let symbol = format!("{mod_name}.{type_name}");
            let sig = render_gleam_type_def(type_name, def);
            let doc = def.documentation.text();
            entries.push(EntryDraft::new(
                &symbol,
                "Type",
                format!("{symbol} {sig} {doc}"),
            ));
            symbols.push(SymbolDraft::new(&symbol, sig, first_line(&doc)));
        }

        for (alias_name, alias) in &module.type_aliases {
            let symbol = format!("{mod_name}.{alias_name}");
            let sig = format!("type {alias_name} = {}", render_gleam_type(&alias.alias));
            let doc = alias.documentation.text();
            entries.push(EntryDraft::new(
                &symbol,
                "TypeAlias",
                format!("{symbol} {sig} {doc}"),
            ));
        }

        let doc = Document::from_markdown(format!("hex/{pkg}/{mod_name}"), &md)?;
        insert_unit(tx, &doc, &entries, &symbols).await?;
    }

    Ok(())
}

// ---- Elixir (ExDoc) ----

#[derive(Debug, Deserialize)]
struct SearchData {
    items: Vec<SearchItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchItem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    doc: String,
    #[serde(rename = "ref", default)]
    reference: String,
}

/// Recover the JSON object from ExDoc's `searchData = {...}` JS binding.
fn unwrap_search_data(js: &str) -> Result<SearchData> {
    let re = Regex::new(r"searchData\s*=\s*(\{.*\})").expect("searchData regex");
    let caps = re
        .captures(js)
        .ok_or_else(|| Error::corruption("could not parse searchData JS"))?;
    serde_json::from_str(&caps[1])
        .map_err(|err| Error::corruption(format!("searchData JSON: {err}")))
}

async fn ingest_elixir(tx: &mut StoreTx, pkg: &str, docs_dir: &Path) -> Result<()> {
    let search_data_path = find_search_data(docs_dir).ok_or_else(|| {
        Error::not_found("could not find search_data in doc tarball".to_string())
    })?;
    let js = std::fs::read_to_string(&search_data_path)?;
    let search_data = unwrap_search_data(&js)?;

    // Group items by page: everything before the `#fragment` of the ref.
    let mut pages: BTreeMap<String, Vec<SearchItem>> = BTreeMap::new();
    for item in search_data.items {
        let page = item
            .reference
            .split('#')
            .next()
            .unwrap_or_default()
            .to_string();
        pages.entry(page).or_default().push(item);
    }

    for (page, items) in &pages {
        let doc_path = format!("hex/{pkg}/{}", page.trim_end_matches(".html"));

        // The page body is the doc of the fragment-less item, else the first.
        let page_doc = items
            .iter()
            .find(|item| !item.reference.contains('#'))
            .or_else(|| items.first())
            .map(|item| item.doc.clone())
            .unwrap_or_default();

        let mut entries = Vec::new();
        let mut symbols = Vec::new();
        for item in items {
            let name = if item.kind == "task" {
                format!("mix {}", item.title)
            } else {
                item.title.clone()
            };

            entries.push(EntryDraft::new(
                &name,
                capitalize(&item.kind),
                format!("{name} {}", item.doc),
            ));

            if item.kind != "module" && item.kind != "extras" {
                symbols.push(SymbolDraft::new(&name, &name, first_line(&item.doc)));
            }
        }

        let doc = Document::from_markdown(&doc_path, &page_doc)?;
        insert_unit(tx, &doc, &entries, &symbols).await?;
    }

    Ok(())
}

fn find_search_data(docs_dir: &Path) -> Option<PathBuf> {
    let dist = docs_dir.join("dist");
    let entries = std::fs::read_dir(dist).ok()?;
    let mut matches: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|name| name.starts_with("search_data-") && name.ends_with(".js"))
                .unwrap_or(false)
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_expr(json: &str) -> GleamTypeExpr {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn renders_named_types() {
        let t = type_expr(r#"{"kind":"named","name":"List","parameters":[{"kind":"named","name":"Int"}]}"#);
        assert_eq!(render_gleam_type(&t), "List(Int)");

        let plain = type_expr(r#"{"kind":"named","name":"String"}"#);
        assert_eq!(render_gleam_type(&plain), "String");
    }

    #[test]
    fn renders_variables_fns_and_tuples() {
        let var = type_expr(r#"{"kind":"variable","id":1}"#);
        assert_eq!(render_gleam_type(&var), "b");

        let deep = type_expr(r#"{"kind":"variable","id":12}"#);
        assert_eq!(render_gleam_type(&deep), "t12");

        let func = type_expr(
            r#"{"kind":"fn","parameters":[{"kind":"variable","id":0}],"return":{"kind":"named","name":"Bool"}}"#,
        );
        assert_eq!(render_gleam_type(&func), "fn(a) -> Bool");

        let tuple = type_expr(
            r#"{"kind":"tuple","elements":[{"kind":"named","name":"Int"},{"kind":"named","name":"String"}]}"#,
        );
        assert_eq!(render_gleam_type(&tuple), "#(Int, String)");

        let unknown = type_expr(r#"{"kind":"mystery"}"#);
        assert_eq!(render_gleam_type(&unknown), "?");
    }

    #[test]
    fn renders_function_signatures_with_labels() {
        let func: GleamFunction = serde_json::from_str(
            r#"{
                "documentation": "Maps a list.",
                "parameters": [
                    {"label": "over", "type": {"kind":"named","name":"List","parameters":[{"kind":"variable","id":0}]}},
                    {"label": "with", "type": {"kind":"fn","parameters":[{"kind":"variable","id":0}],"return":{"kind":"variable","id":1}}}
                ],
                "return": {"kind":"named","name":"List","parameters":[{"kind":"variable","id":1}]}
            }"#,
        )
        .unwrap();
        assert_eq!(
            render_gleam_signature("map", &func),
            "fn map(over List(a), with fn(a) -> b) -> List(b)"
        );
    }

    #[test]
    fn renders_type_defs_with_constructors() {
        let def: GleamTypeDef = serde_json::from_str(
            r#"{
                "parameters": 1,
                "constructors": [
                    {"name": "Some", "parameters": [{"type": {"kind":"variable","id":0}}]},
                    {"name": "None", "parameters": []}
                ]
            }"#,
        )
        .unwrap();
        let sig = render_gleam_type_def("Option", &def);
        assert_eq!(sig, "type Option(a) {\n  Some(a)\n  None\n}");
    }

    #[test]
    fn doc_string_accepts_string_or_list() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(default)]
            doc: DocString,
        }

        let one: Holder = serde_json::from_str(r#"{"doc": "single"}"#).unwrap();
        assert_eq!(one.doc.text(), "single");

        let many: Holder = serde_json::from_str(r#"{"doc": ["a", "b"]}"#).unwrap();
        assert_eq!(many.doc.text(), "ab");

        let missing: Holder = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(missing.doc.text(), "");

        let null: Holder = serde_json::from_str(r#"{"doc": null}"#).unwrap();
        assert_eq!(null.doc.text(), "");
    }

    #[test]
    fn unwraps_search_data_binding() {
        let js = r#"searchData={"items":[{"type":"module","title":"Enum","doc":"Enumerables.","ref":"Enum.html"},{"type":"function","title":"Enum.map/2","doc":"Maps.","ref":"Enum.html#map/2"},{"type":"task","title":"deps.get","doc":"Fetch deps.","ref":"Mix.Tasks.Deps.Get.html"}]}"#;
        let data = unwrap_search_data(js).unwrap();
        assert_eq!(data.items.len(), 3);
        assert_eq!(data.items[0].title, "Enum");
        assert_eq!(data.items[1].reference, "Enum.html#map/2");

        assert!(unwrap_search_data("var x = 1;").is_err());
    }
}
