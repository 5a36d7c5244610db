//! GitHub repository ingestor.
//!
//! Fetches repository metadata to learn the default branch, requests the
//! recursive git tree, and ingests every `.md`/`.markdown` blob from the
//! raw-content host. When the tree response is truncated, falls back to a
//! shallow clone and walks the working tree instead. Titles come from YAML
//! frontmatter, the first H1, or the filename.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::cache::{self, Cache};
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::git_cache;
use crate::ingest::{insert_unit, EntryDraft};
use crate::store::{Document, Store, StoreTx};
use crate::text::{capitalize, first_line, normalize_line_endings};

pub struct GithubOptions<'a> {
    pub owner: String,
    pub repo: String,
    pub branch: Option<String>,
    pub cache: Option<&'a mut Cache>,
}

#[derive(Deserialize)]
struct RepoMetadata {
    default_branch: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    tree: Vec<TreeEntry>,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    #[serde(default)]
    title: Option<String>,
}

pub async fn ingest_repository(store: &Store, opts: GithubOptions<'_>) -> Result<()> {
    if opts.owner.is_empty() {
        return Err(Error::input("owner is required"));
    }
    if opts.repo.is_empty() {
        return Err(Error::input("repo is required"));
    }

    info!(owner = %opts.owner, repo = %opts.repo, "github repository ingest starting");
    let fetcher = Fetcher::new();

    let metadata: RepoMetadata = fetcher
        .get_json(&format!(
            "https://api.github.com/repos/{}/{}",
            opts.owner, opts.repo
        ))
        .await?;
    let branch = opts
        .branch
        .clone()
        .unwrap_or(metadata.default_branch);

    let tree: TreeResponse = fetcher
        .get_json(&format!(
            "https://api.github.com/repos/{}/{}/git/trees/{branch}?recursive=1",
            opts.owner, opts.repo
        ))
        .await?;

    if tree.truncated {
        info!(
            repo = format!("{}/{}", opts.owner, opts.repo),
            "tree truncated, falling back to clone"
        );
        let (root, _scratch) =
            clone_repository(&opts.owner, &opts.repo, &branch, opts.cache)?;
        let files = walk_markdown_files(&root);
        if files.is_empty() {
            return Err(Error::not_found("no markdown files found in repository"));
        }

        let repo_prefix = format!("github/{}/{}", opts.owner, opts.repo);
        let mut tx = store.begin().await?;
        for rel in &files {
            let content = match std::fs::read_to_string(root.join(rel)) {
                Ok(content) => content,
                Err(err) => {
                    warn!(path = %rel, %err, "failed to read file");
                    continue;
                }
            };
            if let Err(err) = process_markdown(&mut tx, &content, &repo_prefix, rel).await {
                warn!(path = %rel, %err, "failed to process markdown");
            }
        }
        return tx.commit().await;
    }

    let files: Vec<String> = tree
        .tree
        .into_iter()
        .filter(|entry| entry.kind == "blob" && is_markdown_file(&entry.path))
        .map(|entry| entry.path)
        .collect();
    if files.is_empty() {
        return Err(Error::not_found("no markdown files found in repository"));
    }

    let repo_prefix = format!("github/{}/{}", opts.owner, opts.repo);
    let mut tx = store.begin().await?;
    for path in &files {
        let url = format!(
            "https://raw.githubusercontent.com/{}/{}/{branch}/{path}",
            opts.owner, opts.repo
        );
        let content = match fetcher.get_text(&url).await {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %path, %err, "failed to fetch content");
                continue;
            }
        };
        if let Err(err) = process_markdown(&mut tx, &content, &repo_prefix, path).await {
            warn!(path = %path, %err, "failed to process markdown");
        }
    }
    tx.commit().await
}

/// Shallow-clone the repo, reusing a cached clone when present. Cached
/// clones live under the repo cache key and survive across runs.
fn clone_repository(
    owner: &str,
    repo: &str,
    branch: &str,
    cache: Option<&mut Cache>,
) -> Result<(PathBuf, Option<tempfile::TempDir>)> {
    let key = cache::github_repo_key(owner, repo, branch);
    let url = format!("https://github.com/{owner}/{repo}.git");

    if let Some(cache) = &cache {
        let cached = cache.dir().join(&key);
        if cached.is_dir() {
            info!(owner, repo, "using cached repository");
            return Ok((cached, None));
        }
    }

    let scratch = tempfile::Builder::new().prefix("usde-github-").tempdir()?;
    let clone_dir = scratch.path().join("repo");
    git_cache::shallow_clone_branch(&url, branch, &clone_dir)?;

    if let Some(cache) = cache {
        let cached = cache.dir().join(&key);
        if let Some(parent) = cached.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if std::fs::rename(&clone_dir, &cached).is_ok() {
            info!(owner, repo, key = %key, "cached repository");
            return Ok((cached, None));
        }
        warn!(owner, repo, "failed to cache repository, using scratch clone");
    }

    Ok((clone_dir, Some(scratch)))
}

fn walk_markdown_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        })
        .filter(|rel| is_markdown_file(rel))
        .collect();
    files.sort();
    files
}

fn is_markdown_file(path: &str) -> bool {
    let lower = path.to_lowercase();
    lower.ends_with(".md") || lower.ends_with(".markdown")
}

async fn process_markdown(
    tx: &mut StoreTx,
    content: &str,
    repo_prefix: &str,
    doc_path: &str,
) -> Result<()> {
    let (title, body) = extract_title_and_content(content);

    let doc = Document::from_markdown(format!("{repo_prefix}/{doc_path}"), &body)?;
    let title = if title.is_empty() {
        title_from_path(doc_path)
    } else {
        title
    };
    let entries = [EntryDraft::new(
        &title,
        "Document",
        format!("{title} {}", first_line(&body)),
    )];
    insert_unit(tx, &doc, &entries, &[]).await?;
    Ok(())
}

/// Split a title out of `content`.
///
/// A YAML frontmatter `title:` wins and the frontmatter is dropped from the
/// body; otherwise the first `# ` heading is the title and the body keeps
/// it; otherwise the title is empty.
pub fn extract_title_and_content(content: &str) -> (String, String) {
    let content = normalize_line_endings(content);
    let lines: Vec<&str> = content.lines().collect();

    if lines.len() >= 3 && lines[0].trim() == "---" {
        if let Some(end) = lines[1..].iter().position(|line| line.trim() == "---") {
            let end = end + 1;
            let frontmatter = lines[1..end].join("\n");
            if let Ok(fm) = serde_yaml::from_str::<FrontMatter>(&frontmatter) {
                if let Some(title) = fm.title.filter(|t| !t.is_empty()) {
                    let rest = lines[end + 1..].join("\n");
                    return (title, rest.trim().to_string());
                }
            }
        }
    }

    for line in &lines {
        let trimmed = line.trim();
        if let Some(title) = trimmed.strip_prefix("# ") {
            return (title.to_string(), content.clone());
        }
    }

    (String::new(), content)
}

/// `docs/getting-started.md` → `Getting Started`.
pub fn title_from_path(path: &str) -> String {
    let base = path.rsplit('/').next().unwrap_or(path);
    let stem = base.rsplit_once('.').map(|(s, _)| s).unwrap_or(base);
    capitalize(&stem.replace(['-', '_'], " "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontmatter_title_wins_and_is_stripped() {
        let content = "---\ntitle: My Guide\ntags: [a, b]\n---\n\n# Different Heading\n\nBody.";
        let (title, body) = extract_title_and_content(content);
        assert_eq!(title, "My Guide");
        assert!(body.starts_with("# Different Heading"));
        assert!(!body.contains("tags:"));
    }

    #[test]
    fn h1_title_keeps_body_intact() {
        let content = "Intro line.\n\n# The Title\n\nBody.";
        let (title, body) = extract_title_and_content(content);
        assert_eq!(title, "The Title");
        assert_eq!(body, content);
    }

    #[test]
    fn missing_title_is_empty() {
        let (title, body) = extract_title_and_content("Just text.\n");
        assert_eq!(title, "");
        assert_eq!(body, "Just text.\n");
    }

    #[test]
    fn frontmatter_without_title_falls_back_to_h1() {
        let content = "---\ndescription: x\n---\n# Real Title\nBody.";
        let (title, _) = extract_title_and_content(content);
        assert_eq!(title, "Real Title");
    }

    #[test]
    fn crlf_content_normalizes() {
        let content = "---\r\ntitle: Windows\r\n---\r\nBody.\r\n";
        let (title, body) = extract_title_and_content(content);
        assert_eq!(title, "Windows");
        assert_eq!(body, "Body.");
    }

    #[test]
    fn titles_from_paths() {
        assert_eq!(title_from_path("docs/getting-started.md"), "Getting Started");
        assert_eq!(title_from_path("README.md"), "README");
        assert_eq!(title_from_path("api_reference.markdown"), "Api Reference");
    }

    #[test]
    fn markdown_detection_is_case_insensitive() {
        assert!(is_markdown_file("README.md"));
        assert!(is_markdown_file("doc.MARKDOWN"));
        assert!(!is_markdown_file("main.rs"));
        assert!(!is_markdown_file("md.txt"));
    }
}
