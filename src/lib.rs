//! # USDE
//!
//! **An offline, terminal-first documentation browser.**
//!
//! USDE ingests heterogeneous documentation sources — Go modules and the Go
//! standard library, AT Protocol schemas, Hex packages (Elixir and Gleam),
//! Rust crates, and GitHub repository markdown — into one self-contained
//! `.usde` database file, then serves it through three read surfaces: a
//! CLI, an MCP server for AI agents, and an HTTP/HTML server.
//!
//! ## Data Flow
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌───────────────┐
//! │ Ingestors  │──▶│  Cache   │──▶│    Store      │
//! │ go/rust/…  │   │ manifest │   │ SQLite + FTS5 │
//! └────────────┘   └──────────┘   └──────┬────────┘
//!                                        │
//!                        ┌───────────┬───┴────────┐
//!                        ▼           ▼            ▼
//!                   ┌────────┐  ┌────────┐  ┌─────────┐
//!                   │  CLI   │  │  MCP   │  │  Web    │
//!                   └────────┘  └────────┘  └─────────┘
//! ```
//!
//! 1. **Ingestors** ([`ingest`]) pull from upstream, stage payloads in the
//!    [`cache`], and transform each logical unit into a
//!    `(Document, SearchEntry[], SymbolContext[])` triple.
//! 2. The **[`store`]** lands every triple inside one transaction per
//!    source unit: compressed body, trigram-indexed search rows, and
//!    per-symbol context rows.
//! 3. Readers — the CLI, the **[`mcp`]** server, and the **[`web`]** server
//!    — consult the store exclusively; they never touch upstream or the
//!    cache.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`store`] | schema, transactional writes, ranked trigram search |
//! | [`codec`] | zstd compression for document bodies |
//! | [`cache`] | content-addressed download cache with a JSON manifest |
//! | [`git_cache`] | commit-SHA tracking and git process helpers |
//! | [`fetch`] | throttled, retrying HTTP client |
//! | [`archive`] | zip / tar.gz extraction with traversal guards |
//! | [`ingest`] | per-source pipelines (Go, stdlib, atproto, hex, rust, GitHub) |
//! | [`mcp`] | three-tool MCP server, stdio + streamable HTTP |
//! | [`web`] | HTML pages and the JSON search API |
//! | [`snippet`] | highlighted search snippets |
//! | [`section`] | heading-scoped markdown extraction |
//! | [`config`] | TOML configuration |
//! | [`registry`] | named-database registry |
//! | [`paths`] | XDG-style directory resolution |

pub mod archive;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod fetch;
pub mod git_cache;
pub mod ingest;
pub mod mcp;
pub mod paths;
pub mod registry;
pub mod section;
pub mod snippet;
pub mod store;
pub mod text;
pub mod web;
