//! Model Context Protocol server.
//!
//! Exposes exactly three tools over the query engine:
//!
//! | Tool | Behavior |
//! |------|----------|
//! | `search_docs` | ranked substring search, limit 20 |
//! | `read_doc` | full markdown body of one document |
//! | `get_symbol_context` | signature + summary for one symbol |
//!
//! Two transports share the same server value: line-delimited JSON-RPC over
//! stdio, and streamable HTTP mounted on `/mcp`. Both run until cancelled;
//! the HTTP listener shuts down gracefully on ctrl-c.

use std::net::SocketAddr;

use rmcp::{
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpService,
    },
    ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::{SearchResult, Store};

const SEARCH_LIMIT: i64 = 20;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchDocsRequest {
    /// Search query for documentation.
    pub query: String,
    /// Filter by package path prefix.
    #[serde(default)]
    pub package: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchDocsResponse {
    pub results: Vec<SearchResult>,
    pub total: usize,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadDocRequest {
    /// Document path (e.g. `go/net/http`).
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ReadDocResponse {
    pub content: String,
    pub format: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetSymbolRequest {
    /// Symbol name to look up.
    pub symbol: String,
}

#[derive(Debug, Serialize)]
pub struct GetSymbolResponse {
    pub symbol: String,
    pub signature: String,
    pub summary: String,
}

/// The MCP tool surface over one open store.
#[derive(Clone)]
pub struct DocsServer {
    store: Store,
    tool_router: ToolRouter<Self>,
}

impl DocsServer {
    pub fn new(store: Store) -> Self {
        DocsServer {
            store,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router(router = tool_router)]
impl DocsServer {
    #[tool(description = "Search for documentation symbols or guides")]
    async fn search_docs(
        &self,
        Parameters(req): Parameters<SearchDocsRequest>,
    ) -> Result<String, String> {
        info!(query = %req.query, package = req.package.as_deref().unwrap_or(""), "tool call: search_docs");
        let results = self
            .store
            .search_package(&req.query, req.package.as_deref().unwrap_or(""), SEARCH_LIMIT)
            .await
            .map_err(|err| err.to_string())?;

        let total = results.len();
        serde_json::to_string_pretty(&SearchDocsResponse { results, total })
            .map_err(|err| err.to_string())
    }

    #[tool(description = "Read full content of a specific documentation page")]
    async fn read_doc(
        &self,
        Parameters(req): Parameters<ReadDocRequest>,
    ) -> Result<String, String> {
        info!(path = %req.path, "tool call: read_doc");
        let doc = self
            .store
            .read_document_by_path(&req.path)
            .await
            .map_err(|err| err.to_string())?;
        let content = doc.text().map_err(|err| err.to_string())?;

        serde_json::to_string_pretty(&ReadDocResponse {
            content,
            format: "markdown".to_string(),
        })
        .map_err(|err| err.to_string())
    }

    #[tool(description = "Get type signature and summary for a symbol")]
    async fn get_symbol_context(
        &self,
        Parameters(req): Parameters<GetSymbolRequest>,
    ) -> Result<String, String> {
        info!(symbol = %req.symbol, "tool call: get_symbol_context");
        let ctx = self
            .store
            .get_symbol(&req.symbol)
            .await
            .map_err(|err| err.to_string())?;

        serde_json::to_string_pretty(&GetSymbolResponse {
            symbol: ctx.symbol,
            signature: ctx.signature,
            summary: ctx.summary,
        })
        .map_err(|err| err.to_string())
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for DocsServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "usde".to_string(),
                title: Some("USDE documentation browser".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Offline documentation search. Use search_docs to find symbols and \
                 guides, read_doc to fetch a page by its path, and get_symbol_context \
                 for a one-line signature and summary of a symbol."
                    .into(),
            ),
        }
    }
}

/// Serve MCP over stdio until the peer disconnects or ctrl-c.
pub async fn run_stdio(store: Store) -> anyhow::Result<()> {
    info!("starting MCP server on stdio");
    let server = DocsServer::new(store);
    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;
    Ok(())
}

/// Serve MCP over streamable HTTP at `addr`, path `/mcp`.
pub async fn run_http(store: Store, addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|err| anyhow::anyhow!("invalid listen address {addr}: {err}"))?;

    let server = DocsServer::new(store);
    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "starting MCP server on HTTP");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
