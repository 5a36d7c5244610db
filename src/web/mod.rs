//! HTTP documentation server.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | package listing grouped by language |
//! | `GET` | `/doc/{path...}` | rendered document with H2/H3 table of contents |
//! | `GET` | `/search` | HTML results page |
//! | `GET` | `/api/search` | JSON search API |
//!
//! `/api/search` errors follow the `{error, code}` shape: `missing_param`
//! (400) for an empty query, `search_error` (500) otherwise.

pub mod markdown;
mod pages;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::snippet::generate_snippet;
use crate::store::Store;
use self::markdown::MarkdownRenderer;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

#[derive(Clone)]
struct AppState {
    store: Store,
    renderer: Arc<MarkdownRenderer>,
}

/// Serve the web UI on `addr` until ctrl-c.
pub async fn run_server(store: Store, addr: &str) -> anyhow::Result<()> {
    let state = AppState {
        store,
        renderer: Arc::new(MarkdownRenderer::new()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(handle_index))
        .route("/search", get(handle_search_page))
        .route("/api/search", get(handle_api_search))
        .route("/doc/{*path}", get(handle_doc))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "web interface listening");
    println!("Web interface listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

// ---- JSON API ----

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(default)]
    pkg: String,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SearchResultItem {
    pub path: String,
    pub title: String,
    pub snippet: String,
    pub score: f64,
    pub package: String,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    query: String,
    total: usize,
    results: Vec<SearchResultItem>,
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
    code: String,
}

impl ApiError {
    fn response(status: StatusCode, message: &str, code: &str) -> Response {
        let body = ApiError {
            error: message.to_string(),
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

async fn handle_api_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let query = params.q.trim().to_string();
    if query.is_empty() {
        return ApiError::response(
            StatusCode::BAD_REQUEST,
            "query parameter required",
            "missing_param",
        );
    }

    let (limit, offset) = clamp_paging(params.limit, params.offset);
    match perform_search(&state, &query, &params.pkg, limit, offset).await {
        Ok(results) => {
            let response = SearchResponse {
                query,
                total: results.len(),
                results,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            error!(%err, "search failed");
            ApiError::response(StatusCode::INTERNAL_SERVER_ERROR, "search failed", "search_error")
        }
    }
}

fn clamp_paging(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = match limit {
        Some(limit) if limit > 0 => limit.min(MAX_LIMIT),
        _ => DEFAULT_LIMIT,
    };
    let offset = offset.filter(|off| *off >= 0).unwrap_or(0);
    (limit, offset)
}

async fn perform_search(
    state: &AppState,
    query: &str,
    pkg: &str,
    limit: i64,
    offset: i64,
) -> crate::error::Result<Vec<SearchResultItem>> {
    let hits = state
        .store
        .search_package(query, pkg, limit + offset)
        .await?;

    let mut results = Vec::new();
    for hit in hits.into_iter().skip(offset as usize).take(limit as usize) {
        let doc = match state.store.read_document_by_id(hit.doc_id).await {
            Ok(doc) => doc,
            Err(_) => continue,
        };
        let body = doc.text().unwrap_or_default();

        results.push(SearchResultItem {
            package: package_of(&doc.path),
            path: doc.path,
            title: hit.name,
            snippet: generate_snippet(&body, query),
            score: hit.score,
        });
    }
    Ok(results)
}

/// First two path segments (`go/net/http` → `go/net`).
fn package_of(path: &str) -> String {
    let mut parts = path.splitn(3, '/');
    match (parts.next(), parts.next()) {
        (Some(a), Some(b)) => format!("{a}/{b}"),
        (Some(a), None) => a.to_string(),
        _ => String::new(),
    }
}

// ---- HTML pages ----

async fn handle_index(State(state): State<AppState>) -> Response {
    match state.store.list_packages().await {
        Ok(packages) => {
            let mut by_language: BTreeMap<String, Vec<_>> = BTreeMap::new();
            for pkg in packages {
                by_language.entry(pkg.language.clone()).or_default().push(pkg);
            }
            Html(pages::index_page(&by_language)).into_response()
        }
        Err(err) => {
            error!(%err, "failed to list packages");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load packages").into_response()
        }
    }
}

async fn handle_search_page(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let query = params.q.trim().to_string();
    let mut results = Vec::new();

    if !query.is_empty() {
        let (limit, offset) = clamp_paging(params.limit, params.offset);
        match perform_search(&state, &query, &params.pkg, limit, offset).await {
            Ok(found) => results = found,
            Err(err) => {
                error!(%err, "search failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Search failed").into_response();
            }
        }
    }

    Html(pages::search_page(&query, &params.pkg, &results)).into_response()
}

async fn handle_doc(State(state): State<AppState>, UrlPath(path): UrlPath<String>) -> Response {
    let path = path.trim_matches('/').to_string();
    if path.is_empty() {
        return (StatusCode::BAD_REQUEST, "Document path is required").into_response();
    }

    let doc = match state.store.read_document_by_path(&path).await {
        Ok(doc) => doc,
        Err(err) if err.is_not_found() => {
            return (StatusCode::NOT_FOUND, "Document not found").into_response();
        }
        Err(err) => {
            error!(%err, path, "failed to load document");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load document").into_response();
        }
    };

    let body = match doc.text() {
        Ok(body) => body,
        Err(err) => {
            error!(%err, path, "failed to decompress document");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render document")
                .into_response();
        }
    };

    let (content, toc) = state.renderer.render_with_toc(&body);
    let title = document_title(&body, &path);
    Html(pages::doc_page(&title, &path, &content, &toc)).into_response()
}

/// First `# ` heading of the body, else the last path segment.
fn document_title(body: &str, path: &str) -> String {
    if let Some(rest) = body.strip_prefix("# ") {
        let end = rest.find('\n').unwrap_or(rest.len());
        return rest[..end].trim().to_string();
    }
    path.rsplit('/').next().unwrap_or(path).to_string()
}
