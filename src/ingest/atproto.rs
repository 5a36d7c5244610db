//! AT Protocol ingestor.
//!
//! Shallow-clones three repositories (schemas, website, docs), caching by
//! commit SHA so re-ingesting an unchanged HEAD reuses the pinned commit.
//!
//! - Lexicon JSON schemas render to markdown tables under
//!   `atproto/lexicon/<nsid>`.
//! - Website `.md`/`.mdx` pages (English locale only) land under
//!   `atproto/spec/`.
//! - Docs-site pages land under `atproto/docs/`.
//!
//! MDX is reduced to plain markdown: YAML frontmatter, `import`/`export`
//! blocks, `{{...}}` interpolations, and recognized component tags are
//! stripped.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::cache::{self, Cache};
use crate::error::Result;
use crate::git_cache::{self, GitCache};
use crate::ingest::{insert_unit, EntryDraft, SymbolDraft};
use crate::store::{Document, Store, StoreTx};

const REPOS: [(&str, &str); 3] = [
    ("atproto", "https://github.com/bluesky-social/atproto"),
    ("atproto-website", "https://github.com/bluesky-social/atproto-website"),
    ("bsky-docs", "https://github.com/bluesky-social/bsky-docs"),
];

pub struct AtprotoOptions<'a> {
    /// Skip the website and docs repos, ingesting lexicons only.
    pub lexicons_only: bool,
    pub cache: Option<&'a mut Cache>,
}

pub async fn ingest_atproto(store: &Store, opts: AtprotoOptions<'_>) -> Result<()> {
    let scratch = tempfile::Builder::new().prefix("usde-atproto-").tempdir()?;
    let mut cache = opts.cache;

    for (name, url) in REPOS {
        if opts.lexicons_only && name != "atproto" {
            continue;
        }
        info!(repo = name, "fetching repository");
        let dest = scratch.path().join(name);

        match cache.as_deref_mut() {
            Some(cache) => {
                let key = cache::atproto_key(name);
                let pinned = GitCache::new(cache).get_commit(&key);

                if let Some(sha) = pinned {
                    info!(repo = name, commit = %sha, "using cached commit");
                    if git_cache::shallow_clone_at(url, &sha, &dest).is_ok() {
                        continue;
                    }
                    warn!(repo = name, "pinned-commit clone failed, cloning HEAD");
                    let _ = std::fs::remove_dir_all(&dest);
                }

                git_cache::shallow_clone(url, &dest)?;
                match git_cache::repo_head_commit(&dest) {
                    Ok(sha) => {
                        info!(repo = name, commit = %sha, "caching commit SHA");
                        let _ = GitCache::new(cache).put_commit(&key, &sha);
                    }
                    Err(err) => warn!(repo = name, %err, "failed to read commit SHA"),
                }
            }
            None => git_cache::shallow_clone(url, &dest)?,
        }
    }

    let mut tx = store.begin().await?;

    ingest_lexicons(&mut tx, &scratch.path().join("atproto/lexicons")).await?;
    if !opts.lexicons_only {
        ingest_markdown_tree(
            &mut tx,
            &scratch.path().join("atproto-website/src/app/[locale]"),
            "atproto/spec",
            "Spec",
            true,
        )
        .await?;
        ingest_markdown_tree(
            &mut tx,
            &scratch.path().join("bsky-docs/docs"),
            "atproto/docs",
            "Doc",
            false,
        )
        .await?;
    }

    tx.commit().await
}

// ---- Lexicon schema model ----

#[derive(Debug, Deserialize)]
pub struct Lexicon {
    #[allow(dead_code)]
    pub lexicon: i64,
    pub id: String,
    #[serde(default)]
    pub defs: BTreeMap<String, Definition>,
}

#[derive(Debug, Deserialize)]
pub struct Definition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<Schema>,
    #[serde(default)]
    pub input: Option<Schema>,
    #[serde(default)]
    pub output: Option<Schema>,
    #[serde(default)]
    pub record: Option<Schema>,
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
    #[serde(default)]
    pub required: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Schema {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
    #[serde(default)]
    pub required: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Property {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub refs: Vec<String>,
    #[serde(default)]
    pub items: Option<Box<Property>>,
    #[serde(default)]
    pub format: Option<String>,
}

/// Render one lexicon to markdown: a heading per definition, property
/// tables for records, queries, procedures, and objects.
pub fn lexicon_to_markdown(lex: &Lexicon) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# {}\n", lex.id);

    if let Some(def) = lex.defs.get("main") {
        render_definition(&mut md, &lex.id, "main", def);
    }
    for (name, def) in &lex.defs {
        if name == "main" {
            continue;
        }
        render_definition(&mut md, &lex.id, name, def);
    }

    md
}

fn render_definition(md: &mut String, nsid: &str, name: &str, def: &Definition) {
    if name == "main" {
        let _ = writeln!(md, "## Definition: {nsid}\n");
    } else {
        let _ = writeln!(md, "## Definition: {nsid}#{name}\n");
    }

    if let Some(desc) = &def.description {
        if !desc.is_empty() {
            md.push_str(desc);
            md.push_str("\n\n");
        }
    }
    let _ = writeln!(md, "- **Type**: {}", def.kind);

    match def.kind.as_str() {
        "record" => {
            if let Some(record) = &def.record {
                md.push_str("\n### Record Properties\n\n");
                render_properties(md, &record.properties, &record.required);
            }
        }
        "query" | "procedure" => {
            if let Some(params) = &def.parameters {
                if !params.properties.is_empty() {
                    md.push_str("\n### Parameters\n\n");
                    render_properties(md, &params.properties, &params.required);
                }
            }
            if let Some(input) = &def.input {
                if input.kind == "object" && !input.properties.is_empty() {
                    md.push_str("\n### Input\n\n");
                    render_properties(md, &input.properties, &input.required);
                }
            }
            if let Some(output) = &def.output {
                if output.kind == "object" && !output.properties.is_empty() {
                    md.push_str("\n### Output\n\n");
                    render_properties(md, &output.properties, &output.required);
                }
            }
        }
        "object" => {
            md.push_str("\n### Properties\n\n");
            render_properties(md, &def.properties, &def.required);
        }
        _ => {}
    }

    md.push('\n');
}

fn render_properties(md: &mut String, props: &BTreeMap<String, Property>, required: &[String]) {
    if props.is_empty() {
        return;
    }

    md.push_str("| Name | Type | Required | Description |\n");
    md.push_str("| ---- | ---- | -------- | ----------- |\n");

    for (name, prop) in props {
        let kind = if let Some(reference) = &prop.reference {
            format!("ref({reference})")
        } else if prop.kind == "union" {
            format!("union({})", prop.refs.join(", "))
        } else if prop.kind == "array" {
            match &prop.items {
                Some(items) => match &items.reference {
                    Some(reference) => format!("array of ref({reference})"),
                    None => format!("array of {}", items.kind),
                },
                None => "array".to_string(),
            }
        } else {
            prop.kind.clone()
        };

        let required = if required.contains(name) { "Yes" } else { "No" };

        let mut desc = prop.description.clone().unwrap_or_default();
        if let Some(format) = &prop.format {
            desc = format!("(Format: {format}) {desc}");
        }

        let _ = writeln!(md, "| {name} | {kind} | {required} | {desc} |");
    }
}

async fn ingest_lexicons(tx: &mut StoreTx, root: &Path) -> Result<()> {
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file()
            || entry.path().extension().and_then(|e| e.to_str()) != Some("json")
        {
            continue;
        }

        let data = std::fs::read(entry.path())?;
        let lex: Lexicon = match serde_json::from_slice(&data) {
            Ok(lex) => lex,
            Err(err) => {
                warn!(path = %entry.path().display(), %err, "failed to parse lexicon");
                continue;
            }
        };

        let markdown = lexicon_to_markdown(&lex);
        let doc = Document::from_markdown(format!("atproto/lexicon/{}", lex.id), &markdown)?;
        let entries = [EntryDraft::new(&lex.id, "Lexicon", &lex.id)];
        let symbols = [SymbolDraft::new(
            &lex.id,
            format!("lexicon {}", lex.id),
            format!("Lexicon definition for {}", lex.id),
        )];
        insert_unit(tx, &doc, &entries, &symbols).await?;
    }
    Ok(())
}

/// Ingest a tree of `.md`/`.mdx` files under `prefix`, tagging each search
/// entry with `kind`. With `english_only`, non-`en` locale pages under a
/// `[locale]` directory are skipped.
async fn ingest_markdown_tree(
    tx: &mut StoreTx,
    root: &Path,
    prefix: &str,
    kind: &str,
    english_only: bool,
) -> Result<()> {
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let ext = entry.path().extension().and_then(|e| e.to_str());
        if !matches!(ext, Some("md") | Some("mdx")) {
            continue;
        }

        let full = entry.path().to_string_lossy();
        if english_only
            && full.contains("[locale]")
            && !full.contains("/en/")
            && !full.ends_with("/en.mdx")
            && !full.ends_with("/en.md")
        {
            continue;
        }

        let data = std::fs::read_to_string(entry.path())?;
        let body = transform_mdx(&data);

        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        let mut doc_path = format!("{prefix}/{rel}");
        doc_path = doc_path.replacen("[locale]/", "", 1);
        doc_path = doc_path.replacen("/en.mdx", "", 1);
        doc_path = doc_path.replacen("/en.md", "", 1);
        doc_path = doc_path.replacen("/page.mdx", "", 1);
        if let Some(idx) = doc_path.rfind('.') {
            if doc_path[idx..].starts_with(".md") {
                doc_path.truncate(idx);
            }
        }

        let name = doc_path.rsplit('/').next().unwrap_or(&doc_path).to_string();
        let doc = Document::from_markdown(&doc_path, &body)?;
        let entries = [EntryDraft::new(&name, kind, &name)];
        insert_unit(tx, &doc, &entries, &[]).await?;
    }
    Ok(())
}

/// Reduce MDX to plain markdown.
pub fn transform_mdx(input: &str) -> String {
    let mut input = input.to_string();

    // YAML frontmatter.
    if input.starts_with("---") {
        let parts: Vec<&str> = input.splitn(3, "---").collect();
        if parts.len() == 3 {
            input = parts[2].to_string();
        }
    }

    // import/export statements, including multi-line `{ ... }` blocks.
    let mut out = Vec::new();
    let mut in_export = false;
    for line in input.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("export const") || trimmed.starts_with("import ") {
            if line.contains('{') && !line.contains('}') {
                in_export = true;
            }
            continue;
        }
        if in_export {
            if line.contains('}') {
                in_export = false;
            }
            continue;
        }
        out.push(line);
    }
    let mut input = out.join("\n");

    let interpolation = Regex::new(r"\{\{.*?\}\}").expect("interpolation regex");
    input = interpolation.replace_all(&input, "").into_owned();

    let open_tags =
        Regex::new(r"<(Tabs|TabItem|Admonition|video|img|br|hr|p|div|section)[^>]*>")
            .expect("open tag regex");
    input = open_tags.replace_all(&input, "").into_owned();

    let close_tags = Regex::new(r"</(Tabs|TabItem|Admonition|video|img|br|hr|p|div|section)>")
        .expect("close tag regex");
    input = close_tags.replace_all(&input, "").into_owned();

    input.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexicon_renders_property_tables() {
        let lex: Lexicon = serde_json::from_str(
            r##"{
                "lexicon": 1,
                "id": "app.bsky.feed.post",
                "defs": {
                    "main": {
                        "type": "record",
                        "description": "A post record.",
                        "record": {
                            "type": "object",
                            "required": ["text"],
                            "properties": {
                                "text": {"type": "string", "description": "Post text."},
                                "langs": {"type": "array", "items": {"type": "string"}},
                                "reply": {"ref": "#replyRef"},
                                "embed": {"type": "union", "refs": ["app.bsky.embed.images"]}
                            }
                        }
                    },
                    "replyRef": {
                        "type": "object",
                        "properties": {
                            "root": {"type": "string", "format": "at-uri"}
                        }
                    }
                }
            }"##,
        )
        .unwrap();

        let md = lexicon_to_markdown(&lex);
        assert!(md.starts_with("# app.bsky.feed.post"));
        // `main` renders first even though BTreeMap orders it after others.
        let main_pos = md.find("## Definition: app.bsky.feed.post\n").unwrap();
        let other_pos = md.find("## Definition: app.bsky.feed.post#replyRef").unwrap();
        assert!(main_pos < other_pos);

        assert!(md.contains("| text | string | Yes | Post text. |"));
        assert!(md.contains("| langs | array of string | No |"));
        assert!(md.contains("| reply | ref(#replyRef) | No |"));
        assert!(md.contains("| embed | union(app.bsky.embed.images) | No |"));
        assert!(md.contains("| root | string | No | (Format: at-uri)"));
    }

    #[test]
    fn query_renders_parameters_and_output() {
        let lex: Lexicon = serde_json::from_str(
            r#"{
                "lexicon": 1,
                "id": "app.bsky.feed.getTimeline",
                "defs": {
                    "main": {
                        "type": "query",
                        "parameters": {
                            "type": "params",
                            "properties": {"limit": {"type": "integer"}}
                        },
                        "output": {
                            "type": "object",
                            "properties": {"cursor": {"type": "string"}}
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        let md = lexicon_to_markdown(&lex);
        assert!(md.contains("### Parameters"));
        assert!(md.contains("| limit | integer | No |"));
        assert!(md.contains("### Output"));
        assert!(md.contains("| cursor | string | No |"));
    }

    #[test]
    fn mdx_strips_frontmatter_and_imports() {
        let input = "---\ntitle: Spec\n---\nimport {Tabs} from 'x'\nexport const meta = {\n  a: 1,\n}\n\n# Heading\n\nBody {{interp}} text.\n\n<Tabs group=\"x\">\ncontent\n</Tabs>\n";
        let output = transform_mdx(input);
        assert!(output.starts_with("# Heading"));
        assert!(!output.contains("import"));
        assert!(!output.contains("meta"));
        assert!(!output.contains("{{"));
        assert!(!output.contains("<Tabs"));
        assert!(!output.contains("</Tabs>"));
        assert!(output.contains("Body  text."));
        assert!(output.contains("content"));
    }

    #[test]
    fn mdx_keeps_plain_markdown() {
        let input = "# Title\n\nJust markdown with `code` and [links](x).\n";
        assert_eq!(transform_mdx(input), input.trim());
    }
}
