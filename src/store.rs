//! Unified storage and search engine.
//!
//! One SQLite file (`.usde`) holds three tables:
//!
//! | Table | Purpose |
//! |-------|---------|
//! | `documents` | compressed markdown bodies keyed by virtual path |
//! | `search_index` | FTS5 virtual table, trigram-tokenized, BM25-ranked |
//! | `agent_context` | per-symbol signature + summary for cheap lookup |
//!
//! The trigram tokenizer indexes every 3-char substring of every token, so
//! `Println` matches `println`, `Print`, and `intln` without wildcards. BM25
//! with a heavy `name` column (5.0 vs 1.0) promotes symbol hits over body
//! hits, and an exact case-sensitive match on `name` earns a flat +100.
//!
//! Writes happen through [`StoreTx`]: one transaction per source unit,
//! document row first (upsert by path), then its search entries and symbol
//! contexts. The FTS virtual table does not cascade from `documents`, so the
//! upsert deletes stale `search_index` and `agent_context` rows by `doc_id`
//! inside the same transaction before fresh rows land.

use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Transaction};

use crate::cache::hash_bytes;
use crate::codec;
use crate::error::{Error, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    format TEXT NOT NULL,
    body BLOB NOT NULL,
    raw_html BLOB,
    hash TEXT NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS search_index USING fts5(
    name,
    type,
    body,
    doc_id UNINDEXED,
    tokenize = 'trigram'
);

CREATE TABLE IF NOT EXISTS agent_context (
    doc_id INTEGER NOT NULL,
    symbol TEXT NOT NULL,
    signature TEXT,
    summary TEXT,
    FOREIGN KEY (doc_id) REFERENCES documents(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_agent_context_symbol ON agent_context(symbol);
CREATE INDEX IF NOT EXISTS idx_documents_path ON documents(path);
"#;

/// One unit of reference material, stored compressed.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: String,
    pub format: String,
    /// zstd-compressed body bytes.
    pub body: Vec<u8>,
    /// Reserved; no ingestor populates it yet.
    pub raw_html: Option<Vec<u8>>,
    /// Hex SHA-256 of the uncompressed body.
    pub hash: String,
}

impl Document {
    /// Build a markdown document: compresses `body` and records the SHA-256
    /// of the uncompressed bytes.
    pub fn from_markdown(path: impl Into<String>, body: &str) -> Result<Document> {
        Ok(Document {
            path: path.into(),
            format: "markdown".to_string(),
            body: codec::compress(body.as_bytes())?,
            raw_html: None,
            hash: hash_bytes(body.as_bytes()),
        })
    }

    /// Decompressed body text.
    pub fn text(&self) -> Result<String> {
        let bytes = codec::decompress(&self.body)?;
        String::from_utf8(bytes).map_err(|err| Error::Corruption(format!("document body: {err}")))
    }
}

/// One row of the full-text index.
#[derive(Debug, Clone)]
pub struct SearchEntry {
    pub name: String,
    /// Semantic category (`Func`, `Type`, `Method`, `Package`, `Lexicon`, ...).
    pub kind: String,
    pub body: String,
    pub doc_id: i64,
}

/// Minimal per-symbol record answering "what is this symbol" without
/// decompressing the full document.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolContext {
    pub doc_id: i64,
    pub symbol: String,
    pub signature: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub doc_id: i64,
    pub score: f64,
}

/// A package grouping with its document count, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct PackageInfo {
    pub name: String,
    pub language: String,
    pub document_count: i64,
}

/// Namespaces recognized for implicit prefix extraction in queries.
const NAMESPACES: [&str; 5] = ["atproto", "go", "rust", "hex", "github"];

/// Handle to one `.usde` database. Cloning shares the connection pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `path`.
    pub async fn open(path: &Path) -> Result<Store> {
        if path.as_os_str().is_empty() {
            return Err(Error::input("db path is required"));
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(Error::Db)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Store { pool })
    }

    /// Create the schema. Idempotent.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Begin a write transaction.
    pub async fn begin(&self) -> Result<StoreTx> {
        Ok(StoreTx {
            tx: self.pool.begin().await?,
        })
    }

    /// Read a document by its virtual path.
    ///
    /// Exact match first; then a single `LIKE` fallback; then, for
    /// `rust/<crate>/...` shapes, a pattern with `%` spliced in after the
    /// crate segment (rustdoc archives nest items under a target triple the
    /// caller does not know).
    pub async fn read_document_by_path(&self, path: &str) -> Result<Document> {
        if let Some(doc) = self.fetch_document_where("path = ?", path).await? {
            return Ok(doc);
        }
        if let Some(doc) = self.fetch_document_where("path LIKE ?", path).await? {
            return Ok(doc);
        }

        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() >= 2 && parts[0] == "rust" {
            let fallback = if parts.len() >= 3 {
                format!("rust/{}/%/{}", parts[1], parts[2..].join("/"))
            } else {
                format!("rust/{}/%", parts[1])
            };
            if let Some(doc) = self.fetch_document_where("path LIKE ?", &fallback).await? {
                return Ok(doc);
            }
        }

        Err(Error::not_found(format!("document: {path}")))
    }

    pub async fn read_document_by_id(&self, id: i64) -> Result<Document> {
        let row = sqlx::query(
            "SELECT path, format, body, raw_html, hash FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(document_from_row)
            .ok_or_else(|| Error::not_found(format!("document id: {id}")))
    }

    async fn fetch_document_where(&self, clause: &str, arg: &str) -> Result<Option<Document>> {
        let sql = format!(
            "SELECT path, format, body, raw_html, hash FROM documents WHERE {clause} LIMIT 1"
        );
        let row = sqlx::query(&sql).bind(arg).fetch_optional(&self.pool).await?;
        Ok(row.map(document_from_row))
    }

    /// Search the whole index.
    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<SearchResult>> {
        self.search_package(query, "", limit).await
    }

    /// Search with an optional package path prefix.
    ///
    /// When no prefix is given and the query itself looks like a path
    /// (`rust/serde/Serialize`), the leading namespace and package segments
    /// are promoted into the prefix and the remainder becomes the query.
    pub async fn search_package(
        &self,
        query: &str,
        package_prefix: &str,
        limit: i64,
    ) -> Result<Vec<SearchResult>> {
        let limit = if limit <= 0 { 20 } else { limit };

        let (refined, prefix) = resolve_query(query, package_prefix);
        if refined.trim().is_empty() {
            return Err(Error::input("search query must not be empty"));
        }
        let sanitized = sanitize_query(&refined);

        let rows = if prefix.is_empty() {
            sqlx::query(
                r#"
                SELECT name, type, doc_id,
                       (CASE WHEN name = ? THEN 100 ELSE 0 END)
                         - bm25(search_index, 5.0, 1.0, 1.0) AS score
                FROM search_index
                WHERE search_index MATCH ?
                ORDER BY score DESC
                LIMIT ?
                "#,
            )
            .bind(&refined)
            .bind(&sanitized)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(
                r#"
                SELECT name, type, search_index.doc_id AS doc_id,
                       (CASE WHEN name = ? THEN 100 ELSE 0 END)
                         - bm25(search_index, 5.0, 1.0, 1.0) AS score
                FROM search_index
                JOIN documents ON search_index.doc_id = documents.id
                WHERE search_index MATCH ? AND documents.path LIKE ?
                ORDER BY score DESC
                LIMIT ?
                "#,
            )
            .bind(&refined)
            .bind(&sanitized)
            .bind(format!("{prefix}%"))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        };

        // FTS5 syntax errors from hostile queries are search failures, not
        // crashes.
        let rows = rows.map_err(|err| Error::input(format!("search query: {err}")))?;

        Ok(rows
            .into_iter()
            .map(|row| SearchResult {
                name: row.get("name"),
                kind: row.get("type"),
                doc_id: row.get("doc_id"),
                score: row.get("score"),
            })
            .collect())
    }

    /// Exact-match lookup in the symbol context table.
    pub async fn get_symbol(&self, symbol: &str) -> Result<SymbolContext> {
        let row = sqlx::query(
            "SELECT doc_id, symbol, signature, summary FROM agent_context WHERE symbol = ?",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| Error::not_found(format!("symbol: {symbol}")))?;
        Ok(SymbolContext {
            doc_id: row.get("doc_id"),
            symbol: row.get("symbol"),
            signature: row.get::<Option<String>, _>("signature").unwrap_or_default(),
            summary: row.get::<Option<String>, _>("summary").unwrap_or_default(),
        })
    }

    /// All packages grouped by language (first path segment) and package
    /// (first two segments), with document counts.
    pub async fn list_packages(&self) -> Result<Vec<PackageInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT
                CASE
                    WHEN path LIKE '%/%' THEN SUBSTR(path, 1, INSTR(path, '/') - 1)
                    ELSE path
                END AS language,
                CASE
                    WHEN path LIKE '%/%/%' THEN SUBSTR(path, 1, INSTR(SUBSTR(path, INSTR(path, '/') + 1), '/') + INSTR(path, '/') - 1)
                    WHEN path LIKE '%/%' THEN SUBSTR(path, 1, INSTR(path, '/') - 1)
                    ELSE path
                END AS package,
                COUNT(*) AS doc_count
            FROM documents
            GROUP BY language, package
            ORDER BY language, package
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PackageInfo {
                language: row.get("language"),
                name: row.get("package"),
                document_count: row.get("doc_count"),
            })
            .collect())
    }

    /// All document paths, sorted.
    pub async fn list_paths(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT path FROM documents ORDER BY path")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("path")).collect())
    }

    pub async fn count_documents(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM documents").await
    }

    pub async fn count_search_entries(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM search_index").await
    }

    pub async fn count_symbol_entries(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM agent_context").await
    }

    /// Distinct symbols recorded for the document at `path`.
    pub async fn count_symbols_for_path(&self, path: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(DISTINCT symbol) AS n
            FROM agent_context
            WHERE doc_id = (SELECT id FROM documents WHERE path = ?)
            "#,
        )
        .bind(path)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    pub async fn vacuum(&self) -> Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    async fn count(&self, sql: &str) -> Result<i64> {
        let n: i64 = sqlx::query_scalar(sql).fetch_one(&self.pool).await?;
        Ok(n)
    }
}

fn document_from_row(row: sqlx::sqlite::SqliteRow) -> Document {
    Document {
        path: row.get("path"),
        format: row.get("format"),
        body: row.get("body"),
        raw_html: row.get("raw_html"),
        hash: row.get("hash"),
    }
}

/// An open write transaction. Commit or the work rolls back on drop.
pub struct StoreTx {
    tx: Transaction<'static, sqlx::Sqlite>,
}

impl StoreTx {
    /// Insert or replace the document at `doc.path`, returning its id.
    ///
    /// A replaced document keeps its id; its old `search_index` and
    /// `agent_context` rows are deleted here so callers can insert fresh
    /// ones without duplicates.
    pub async fn upsert_document(&mut self, doc: &Document) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO documents (path, format, body, raw_html, hash)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                format = excluded.format,
                body = excluded.body,
                raw_html = excluded.raw_html,
                hash = excluded.hash
            RETURNING id
            "#,
        )
        .bind(&doc.path)
        .bind(&doc.format)
        .bind(&doc.body)
        .bind(&doc.raw_html)
        .bind(&doc.hash)
        .fetch_one(&mut *self.tx)
        .await?;
        let doc_id: i64 = row.get("id");

        sqlx::query("DELETE FROM search_index WHERE doc_id = ?")
            .bind(doc_id)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("DELETE FROM agent_context WHERE doc_id = ?")
            .bind(doc_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(doc_id)
    }

    pub async fn insert_search_entry(&mut self, entry: &SearchEntry) -> Result<()> {
        sqlx::query("INSERT INTO search_index (name, type, body, doc_id) VALUES (?, ?, ?, ?)")
            .bind(&entry.name)
            .bind(&entry.kind)
            .bind(&entry.body)
            .bind(entry.doc_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn insert_symbol_context(&mut self, ctx: &SymbolContext) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_context (doc_id, symbol, signature, summary) VALUES (?, ?, ?, ?)",
        )
        .bind(ctx.doc_id)
        .bind(&ctx.symbol)
        .bind(&ctx.signature)
        .bind(&ctx.summary)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Implicit-namespace extraction.
///
/// With an empty `package_prefix` and a slash in the query, a leading
/// recognized namespace becomes the prefix. `atproto` additionally promotes
/// a `lexicon`/`docs`/`spec` second segment; other namespaces promote the
/// next segment as the package name. Remaining parts are rejoined with
/// spaces. Returns `(refined_query, prefix)`.
pub fn resolve_query(query: &str, package_prefix: &str) -> (String, String) {
    if !package_prefix.is_empty() || !query.contains('/') {
        return (query.to_string(), package_prefix.to_string());
    }

    let parts: Vec<&str> = query.split('/').collect();
    if parts.len() < 2 || !NAMESPACES.contains(&parts[0]) {
        return (query.to_string(), package_prefix.to_string());
    }

    let ns = parts[0];
    let mut prefix = format!("{ns}/");
    let mut remaining = &parts[1..];

    if ns == "atproto" {
        for sub in ["lexicon", "docs", "spec"] {
            if remaining.len() >= 2 && remaining[0] == sub {
                prefix.push_str(sub);
                prefix.push('/');
                remaining = &remaining[1..];
                break;
            }
        }
    } else if remaining.len() >= 2 {
        prefix.push_str(remaining[0]);
        prefix.push('/');
        remaining = &remaining[1..];
    }

    (remaining.join(" "), prefix)
}

/// Quote terms that would break FTS5 syntax.
///
/// Already-quoted terms and `name:`/`type:`/`body:` column filters pass
/// through. Terms containing any of `/ - . * ( ) : "` become quoted phrases
/// with embedded double quotes doubled.
pub fn sanitize_query(q: &str) -> String {
    if q.is_empty() {
        return q.to_string();
    }
    if q.starts_with('"') && q.ends_with('"') {
        return q.to_string();
    }

    q.split_whitespace()
        .map(|term| {
            if term.starts_with('"') && term.ends_with('"') {
                return term.to_string();
            }
            let lower = term.to_lowercase();
            if lower.starts_with("name:") || lower.starts_with("type:") || lower.starts_with("body:")
            {
                return term.to_string();
            }
            if term.contains(['/', '-', '.', '*', '(', ')', ':', '"']) {
                format!("\"{}\"", term.replace('"', "\"\""))
            } else {
                term.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_passes_plain_terms() {
        assert_eq!(sanitize_query("Println"), "Println");
        assert_eq!(sanitize_query("http client"), "http client");
        assert_eq!(sanitize_query(""), "");
    }

    #[test]
    fn sanitize_quotes_special_chars() {
        assert_eq!(sanitize_query("http.Client"), "\"http.Client\"");
        assert_eq!(sanitize_query("net/http"), "\"net/http\"");
        assert_eq!(sanitize_query("foo-bar"), "\"foo-bar\"");
        assert_eq!(sanitize_query("Vec<T>(x)"), "\"Vec<T>(x)\"");
    }

    #[test]
    fn sanitize_preserves_column_filters() {
        assert_eq!(sanitize_query("type:Func Write"), "type:Func Write");
        assert_eq!(sanitize_query("NAME:main"), "NAME:main");
        assert_eq!(sanitize_query("body:tcp dial"), "body:tcp dial");
    }

    #[test]
    fn sanitize_keeps_quoted_terms() {
        assert_eq!(sanitize_query("\"already quoted\""), "\"already quoted\"");
        assert_eq!(sanitize_query("x \"a.b\""), "x \"a.b\"");
    }

    #[test]
    fn sanitize_doubles_embedded_quotes() {
        assert_eq!(sanitize_query("say\"hi"), "\"say\"\"hi\"");
    }

    #[test]
    fn resolve_rust_path_query() {
        let (q, prefix) = resolve_query("rust/serde/Serialize", "");
        assert_eq!(prefix, "rust/serde/");
        assert_eq!(q, "Serialize");
    }

    #[test]
    fn resolve_go_path_query() {
        let (q, prefix) = resolve_query("go/net/http/Client", "");
        assert_eq!(prefix, "go/net/");
        assert_eq!(q, "http Client");
    }

    #[test]
    fn resolve_atproto_subnamespaces() {
        let (q, prefix) = resolve_query("atproto/lexicon/app.bsky.feed.post", "");
        assert_eq!(prefix, "atproto/lexicon/");
        assert_eq!(q, "app.bsky.feed.post");

        let (q, prefix) = resolve_query("atproto/spec/oauth", "");
        assert_eq!(prefix, "atproto/spec/");
        assert_eq!(q, "oauth");
    }

    #[test]
    fn resolve_short_namespace_query() {
        // Only one segment after the namespace: nothing to promote.
        let (q, prefix) = resolve_query("go/fmt", "");
        assert_eq!(prefix, "go/");
        assert_eq!(q, "fmt");
    }

    #[test]
    fn resolve_ignores_unknown_namespaces() {
        let (q, prefix) = resolve_query("python/requests", "");
        assert_eq!(prefix, "");
        assert_eq!(q, "python/requests");
    }

    #[test]
    fn resolve_explicit_prefix_wins() {
        let (q, prefix) = resolve_query("rust/serde/Serialize", "go/net/");
        assert_eq!(prefix, "go/net/");
        assert_eq!(q, "rust/serde/Serialize");
    }

    #[test]
    fn lone_slash_is_not_a_namespace_trigger() {
        let (q, prefix) = resolve_query("/", "");
        assert_eq!(prefix, "");
        assert_eq!(q, "/");
    }
}
