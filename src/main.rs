//! `usde` — terminal-first documentation browser.
//!
//! Command dispatch lives here; everything substantive is in the library
//! crate. Exit code is 0 on success and 1 on any reported error.

use std::io::{IsTerminal, Write as _};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use owo_colors::{OwoColorize, Stream};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing_subscriber::EnvFilter;

use usde::cache::Cache;
use usde::config;
use usde::error::Error;
use usde::git_cache::GitCache;
use usde::ingest::atproto::{ingest_atproto, AtprotoOptions};
use usde::ingest::github::{ingest_repository, GithubOptions};
use usde::ingest::go_stdlib::{ingest_stdlib, StdlibOptions};
use usde::ingest::golang::{ingest_module, GoOptions};
use usde::ingest::hexpm::{ingest_package, HexOptions};
use usde::ingest::rustdoc::{ingest_crate, RustOptions};
use usde::registry::DatabaseRegistry;
use usde::section::{extract_section, SectionTool};
use usde::store::Store;
use usde::{mcp, paths, web};

#[derive(Parser)]
#[command(
    name = "usde",
    version,
    about = "A terminal-first documentation browser",
    long_about = "USDE ingests, stores, and searches technical documentation from \
various sources:\n\n\
  - Go modules (proxy.golang.org) and the standard library\n\
  - Rust crates (docs.rs)\n\
  - AT Protocol specifications and lexicons\n\
  - Hex.pm docs for Elixir & Gleam packages\n\
  - GitHub repository markdown files"
)]
struct Cli {
    /// Database path or name (default: $XDG_DATA_HOME/usde/default.usde).
    #[arg(short = 'd', long, global = true)]
    database: Option<String>,

    /// Enable verbose output.
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Suppress non-error output. Top-level only: `read section` reuses
    /// `-q` for its heading query.
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Disable colored output.
    #[arg(long = "no-color", global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new documentation database (.usde file).
    Init {
        /// Database name; resolves into the data directory.
        name: Option<String>,

        /// Explicit path for the database file.
        #[arg(short = 'p', long)]
        path: Option<PathBuf>,
    },

    /// Add documentation from a source to the database.
    ///
    /// Source types: go (module path, or --stdlib), rust (crate), hex
    /// (package), atproto (no source argument), github (owner/repo).
    Add {
        /// Source type: go, rust, hex, atproto, github.
        source_type: String,

        /// Source identifier (module path, crate, package, owner/repo).
        source: Option<String>,

        /// Version (module version, crate version, or Go toolchain tag).
        #[arg(long)]
        version: Option<String>,

        /// Go: ingest the standard library instead of a module.
        #[arg(long)]
        stdlib: bool,

        /// Go stdlib: start at a specific package path.
        #[arg(short = 's', long)]
        start: Option<String>,

        /// Go stdlib: limit the number of packages ingested.
        #[arg(short = 'm', long, default_value_t = 0)]
        max: usize,

        /// Atproto: only ingest lexicons.
        #[arg(long = "lexicons-only")]
        lexicons_only: bool,

        /// GitHub: branch to ingest (default branch when omitted).
        #[arg(long)]
        branch: Option<String>,
    },

    /// Search the full-text index.
    ///
    /// Results are BM25-ranked; exact name matches get a boost.
    Search {
        /// The search query.
        query: String,

        /// Maximum number of results.
        #[arg(short = 'l', long, default_value_t = 20)]
        limit: i64,

        /// Filter by symbol type (e.g. Func, Type, Package).
        #[arg(short = 't', long = "type")]
        kind: Option<String>,

        /// Output format: table, json, or paths.
        #[arg(short = 'f', long, default_value = "table")]
        format: String,

        /// Filter by package path prefix.
        #[arg(short = 'p', long)]
        package: Option<String>,

        /// Return only the top result.
        #[arg(short = '1', long)]
        first: bool,
    },

    /// Read documentation by path.
    Read(ReadArgs),

    /// List documentation paths in the database.
    List {
        /// Positional path prefix filter.
        prefix: Option<String>,

        /// Filter by type prefix (e.g. go, atproto).
        #[arg(short = 't', long = "type")]
        kind: Option<String>,

        /// Display as a tree.
        #[arg(long)]
        tree: bool,

        /// Print only the document count.
        #[arg(long)]
        count: bool,
    },

    /// Show metadata for a document.
    Info {
        /// Document path.
        path: String,
    },

    /// Manage the download cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show or edit configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Web interface.
    Web {
        #[command(subcommand)]
        action: WebAction,
    },

    /// Model Context Protocol server.
    Mcp {
        #[command(subcommand)]
        action: McpAction,
    },
}

#[derive(Args)]
#[command(args_conflicts_with_subcommands = true)]
struct ReadArgs {
    #[command(subcommand)]
    command: Option<ReadCommand>,

    /// Document path (e.g. go/net/http).
    path: Option<String>,

    /// Render markdown for the terminal.
    #[arg(short = 'r', long)]
    render: bool,

    /// Render width.
    #[arg(short = 'w', long, default_value_t = 0)]
    width: usize,

    /// Extract a section by heading match.
    #[arg(short = 's', long)]
    section: Option<String>,

    /// Force the pager on.
    #[arg(short = 'P', long)]
    pager: bool,

    /// Force the pager off.
    #[arg(short = 'p', long = "no-pager")]
    no_pager: bool,
}

#[derive(Subcommand)]
enum ReadCommand {
    /// Extract a markdown section by heading match.
    Section {
        /// Document path.
        path: String,

        /// Heading match text.
        #[arg(short = 'q', long)]
        query: String,

        /// Render markdown for the terminal.
        #[arg(short = 'r', long)]
        render: bool,

        /// Render width.
        #[arg(short = 'w', long, default_value_t = 0)]
        width: usize,

        /// Force ripgrep for the heading scan.
        #[arg(long = "rg")]
        force_rg: bool,

        /// Force grep for the heading scan.
        #[arg(long = "gr")]
        force_grep: bool,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show cache statistics.
    Status,
    /// List cached items.
    List {
        /// Key prefix filter.
        prefix: Option<String>,
        /// Filter by type prefix (e.g. go, rust).
        #[arg(long = "type")]
        kind: Option<String>,
    },
    /// Remove old or expired cache entries.
    Prune {
        /// Prune entries older than N days.
        #[arg(long, default_value_t = 0)]
        age: u64,
        /// Only prune a specific type prefix.
        #[arg(long = "type")]
        kind: Option<String>,
    },
    /// Clear all cache entries.
    Clear {
        /// Only clear a specific type prefix.
        #[arg(long = "type")]
        kind: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the full configuration.
    Show,
    /// Print one configuration value.
    Get { key: String },
    /// Set one configuration value.
    Set { key: String, value: String },
    /// Open the configuration file in $EDITOR.
    Edit,
    /// Print the configuration file path.
    Path,
}

#[derive(Subcommand)]
enum WebAction {
    /// Start the web documentation server.
    Serve {
        /// HTTP listen address.
        #[arg(long, default_value = "127.0.0.1:8080")]
        http: String,
    },
}

#[derive(Subcommand)]
enum McpAction {
    /// Start the MCP server.
    Serve {
        /// Use the stdio transport (default).
        #[arg(long)]
        stdio: bool,

        /// Use the streamable HTTP transport on this address.
        #[arg(long)]
        http: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        owo_colors::set_override(false);
    }

    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        eprintln!(
            "{} {err:#}",
            "error:".if_supports_color(Stream::Stderr, |t| t.red())
        );
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let quiet = cli.quiet;
    let database = cli.database.clone();

    match cli.command {
        Commands::Init { name, path } => run_init(database, name, path, quiet).await,
        Commands::Add {
            source_type,
            source,
            version,
            stdlib,
            start,
            max,
            lexicons_only,
            branch,
        } => {
            run_add(
                database,
                AddParams {
                    source_type,
                    source,
                    version,
                    stdlib,
                    start,
                    max,
                    lexicons_only,
                    branch,
                },
                quiet,
            )
            .await
        }
        Commands::Search {
            query,
            limit,
            kind,
            format,
            package,
            first,
        } => run_search(database, query, limit, kind, format, package, first, quiet).await,
        Commands::Read(args) => run_read(database, args).await,
        Commands::List {
            prefix,
            kind,
            tree,
            count,
        } => run_list(database, prefix, kind, tree, count).await,
        Commands::Info { path } => run_info(database, path).await,
        Commands::Cache { action } => run_cache(action, quiet),
        Commands::Config { action } => run_config(action),
        Commands::Web { action } => match action {
            WebAction::Serve { http } => {
                let store = open_store(database.as_deref()).await?;
                web::run_server(store, &normalize_addr(&http)).await
            }
        },
        Commands::Mcp { action } => match action {
            McpAction::Serve { stdio: _, http } => {
                let store = open_store(database.as_deref()).await?;
                match http {
                    Some(addr) => mcp::run_http(store, &normalize_addr(&addr)).await,
                    None => mcp::run_stdio(store).await,
                }
            }
        },
    }
}

struct AddParams {
    source_type: String,
    source: Option<String>,
    version: Option<String>,
    stdlib: bool,
    start: Option<String>,
    max: usize,
    lexicons_only: bool,
    branch: Option<String>,
}

async fn open_store(database: Option<&str>) -> Result<Store> {
    let path = config::resolve_database_path(database.unwrap_or(""))?;
    let store = Store::open(&path)
        .await
        .with_context(|| format!("open database {}", path.display()))?;
    Ok(store)
}

fn open_cache(quiet: bool) -> Option<Cache> {
    let dir = match paths::cache_dir() {
        Ok(dir) => dir,
        Err(err) => {
            if !quiet {
                eprintln!("Warning: cache unavailable, proceeding without it: {err}");
            }
            return None;
        }
    };
    match Cache::open(dir) {
        Ok(cache) => Some(cache),
        Err(err) => {
            if !quiet {
                eprintln!("Warning: cache initialization failed, proceeding without it: {err}");
            }
            None
        }
    }
}

/// Accept Go-style `:8080` listen addresses.
fn normalize_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

fn print_success(quiet: bool, msg: &str) {
    if !quiet {
        println!("{} {msg}", "✓".if_supports_color(Stream::Stdout, |t| t.green()));
    }
}

// ---- init ----

async fn run_init(
    database: Option<String>,
    name: Option<String>,
    path: Option<PathBuf>,
    quiet: bool,
) -> Result<()> {
    let (db_name, target) = if let Some(db) = database {
        let target = config::resolve_database_path(&db)?;
        (file_stem(&target), target)
    } else if let Some(path) = path {
        (file_stem(&path), path)
    } else if let Some(name) = name {
        let target = config::resolve_database_path(&name)?;
        (name, target)
    } else {
        ("default".to_string(), config::default_database()?)
    };

    if target.exists() {
        bail!("database already exists: {}", target.display());
    }

    config::ensure_database_dir(&target)?;
    let store = Store::open(&target).await?;
    store.init().await.context("failed to initialize database")?;
    store.close().await;

    if let Ok(mut registry) = DatabaseRegistry::load() {
        registry.add(&db_name, &target.display().to_string());
        let _ = registry.save();
    }

    print_success(quiet, &format!("Initialized {}", target.display()));
    Ok(())
}

fn file_stem(path: &std::path::Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "default".to_string())
}

// ---- add ----

async fn run_add(database: Option<String>, params: AddParams, quiet: bool) -> Result<()> {
    let db_path = config::resolve_database_path(database.as_deref().unwrap_or(""))?;
    config::ensure_database_dir(&db_path)?;
    let store = Store::open(&db_path).await?;
    store.init().await?;

    let mut cache = open_cache(quiet);

    match params.source_type.as_str() {
        "go" => {
            if params.stdlib {
                if params.source.is_some() {
                    bail!("module argument not allowed with --stdlib");
                }
                ingest_stdlib(
                    &store,
                    StdlibOptions {
                        version: params.version,
                        start: params.start,
                        max: params.max,
                        cache: cache.as_mut(),
                    },
                )
                .await?;
                print_success(quiet, "Ingested Go standard library");
            } else {
                let module = params
                    .source
                    .ok_or_else(|| Error::input("module argument is required unless --stdlib is set"))?;
                ingest_module(
                    &store,
                    GoOptions {
                        module: module.clone(),
                        version: params.version,
                        cache: cache.as_mut(),
                    },
                )
                .await?;
                print_success(quiet, &format!("Ingested {module}"));
            }
        }
        "rust" => {
            let krate = params
                .source
                .ok_or_else(|| Error::input("crate name is required"))?;
            ingest_crate(
                &store,
                RustOptions {
                    krate: krate.clone(),
                    version: params.version,
                    cache: cache.as_mut(),
                },
            )
            .await?;
            print_success(quiet, &format!("Ingested {krate}"));
        }
        "hex" => {
            let package = params
                .source
                .ok_or_else(|| Error::input("package name is required"))?;
            ingest_package(
                &store,
                HexOptions {
                    package: package.clone(),
                    version: params.version,
                    cache: cache.as_mut(),
                },
            )
            .await?;
            print_success(quiet, &format!("Ingested {package}"));
        }
        "atproto" => {
            ingest_atproto(
                &store,
                AtprotoOptions {
                    lexicons_only: params.lexicons_only,
                    cache: cache.as_mut(),
                },
            )
            .await?;
            print_success(quiet, "Ingested AT Protocol documentation");
        }
        "github" => {
            let source = params
                .source
                .ok_or_else(|| Error::input("repository is required (owner/repo)"))?;
            let (owner, repo) = source
                .split_once('/')
                .ok_or_else(|| Error::input("repository must be owner/repo"))?;
            ingest_repository(
                &store,
                GithubOptions {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    branch: params.branch,
                    cache: cache.as_mut(),
                },
            )
            .await?;
            print_success(quiet, &format!("Ingested {source}"));
        }
        other => bail!("unknown source type: {other}"),
    }

    store.close().await;
    Ok(())
}

// ---- search ----

#[derive(Tabled)]
struct SearchRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Doc ID")]
    doc_id: i64,
    #[tabled(rename = "Score (BM25 Relevance)")]
    score: String,
}

#[allow(clippy::too_many_arguments)]
async fn run_search(
    database: Option<String>,
    query: String,
    limit: i64,
    kind: Option<String>,
    format: String,
    package: Option<String>,
    first: bool,
    quiet: bool,
) -> Result<()> {
    let store = open_store(database.as_deref()).await?;

    let query = match kind {
        Some(kind) if !kind.is_empty() => format!("type:{kind} {query}"),
        _ => query,
    };
    let limit = if first { 1 } else { limit };

    let package = package.unwrap_or_default();
    let package = if !package.is_empty() && !package.contains('/') {
        format!("go/{package}")
    } else {
        package
    };

    let results = store.search_package(&query, &package, limit).await?;
    if results.is_empty() {
        if !quiet {
            eprintln!("No results found");
        }
        return Ok(());
    }

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string(&results)?),
        "paths" => {
            for result in &results {
                match store.read_document_by_id(result.doc_id).await {
                    Ok(doc) => println!("{}", doc.path),
                    Err(_) => continue,
                }
            }
        }
        _ => {
            let rows: Vec<SearchRow> = results
                .into_iter()
                .map(|r| SearchRow {
                    name: r.name,
                    kind: r.kind,
                    doc_id: r.doc_id,
                    score: format!("{:.4}", r.score),
                })
                .collect();
            println!("{}", Table::new(rows).with(Style::rounded()));
        }
    }

    Ok(())
}

// ---- read ----

async fn run_read(database: Option<String>, args: ReadArgs) -> Result<()> {
    if let Some(ReadCommand::Section {
        path,
        query,
        render,
        width,
        force_rg,
        force_grep,
    }) = args.command
    {
        if force_rg && force_grep {
            bail!("choose only one of --rg or --gr");
        }
        let tool = if force_rg {
            SectionTool::Ripgrep
        } else if force_grep {
            SectionTool::Grep
        } else {
            SectionTool::Auto
        };

        let store = open_store(database.as_deref()).await?;
        let doc = store.read_document_by_path(&path).await?;
        let body = doc.text()?;
        let section = extract_section(&body, &query, tool)?;

        let output = if render {
            render_markdown_ansi(&section, width)
        } else {
            section
        };
        return write_paged(output.as_bytes(), false, false);
    }

    let path = args
        .path
        .ok_or_else(|| Error::input("document path is required"))?;
    let store = open_store(database.as_deref()).await?;
    let doc = store.read_document_by_path(&path).await?;
    let body = doc.text()?;

    let body = match &args.section {
        Some(heading) => extract_section(&body, heading, SectionTool::Auto)?,
        None => body,
    };

    let output = if args.render {
        render_markdown_ansi(&body, args.width)
    } else {
        body
    };
    write_paged(output.as_bytes(), args.pager, args.no_pager)
}

fn render_markdown_ansi(input: &str, width: usize) -> String {
    let width = if width == 0 { 80 } else { width };
    let skin = termimad::MadSkin::default();
    termimad::FmtText::from(&skin, input, Some(width)).to_string()
}

/// Write through `$PAGER` when forced or when the output is large and
/// stdout is a terminal.
fn write_paged(data: &[u8], force: bool, suppress: bool) -> Result<()> {
    let use_pager = !suppress
        && (force || (std::io::stdout().is_terminal() && data.len() > 4096));

    if !use_pager {
        std::io::stdout().write_all(data)?;
        return Ok(());
    }

    let pager = std::env::var("PAGER").unwrap_or_else(|_| "less".to_string());
    let mut child = std::process::Command::new(&pager)
        .stdin(std::process::Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to start pager {pager}"))?;

    if let Some(stdin) = child.stdin.as_mut() {
        let _ = stdin.write_all(data);
    }
    child.wait()?;
    Ok(())
}

// ---- list ----

async fn run_list(
    database: Option<String>,
    prefix: Option<String>,
    kind: Option<String>,
    tree: bool,
    count: bool,
) -> Result<()> {
    let store = open_store(database.as_deref()).await?;
    let mut paths = store.list_paths().await?;

    let filter = match (kind, prefix) {
        (Some(kind), Some(prefix)) => format!("{kind}/{prefix}"),
        (Some(kind), None) => kind,
        (None, Some(prefix)) => prefix,
        (None, None) => String::new(),
    };
    if !filter.is_empty() {
        paths.retain(|path| path.starts_with(&filter));
    }

    if count {
        println!("{}", paths.len());
        return Ok(());
    }

    if tree {
        print_tree(&paths);
        return Ok(());
    }

    for path in paths {
        println!("{path}");
    }
    Ok(())
}

#[derive(Default)]
struct TreeNode {
    children: std::collections::BTreeMap<String, TreeNode>,
}

fn print_tree(paths: &[String]) {
    let mut root = TreeNode::default();
    for path in paths {
        let mut node = &mut root;
        for part in path.split('/').filter(|part| !part.is_empty()) {
            node = node.children.entry(part.to_string()).or_default();
        }
    }
    for (name, child) in &root.children {
        println!("{name}");
        print_tree_node(child, "");
    }
}

fn print_tree_node(node: &TreeNode, prefix: &str) {
    let count = node.children.len();
    for (idx, (name, child)) in node.children.iter().enumerate() {
        let is_last = idx + 1 == count;
        let connector = if is_last { "└── " } else { "├── " };
        println!("{prefix}{connector}{name}");

        let extension = if is_last { "    " } else { "│   " };
        print_tree_node(child, &format!("{prefix}{extension}"));
    }
}

// ---- info ----

async fn run_info(database: Option<String>, path: String) -> Result<()> {
    let store = open_store(database.as_deref()).await?;
    let doc = store.read_document_by_path(&path).await?;
    let body = doc.text()?;
    let symbols = store.count_symbols_for_path(&doc.path).await?;

    println!("{:<10} {}", "Path:", doc.path);
    println!("{:<10} {}", "Format:", doc.format);
    println!(
        "{:<10} {} bytes (compressed: {} bytes)",
        "Size:",
        body.len(),
        doc.body.len()
    );
    println!("{:<10} {}", "Hash:", doc.hash);
    println!("{:<10} {}", "Symbols:", symbols);
    Ok(())
}

// ---- cache ----

fn run_cache(action: CacheAction, quiet: bool) -> Result<()> {
    let dir = paths::cache_dir()?;
    let mut cache = Cache::open(&dir)?;

    match action {
        CacheAction::Status => {
            let entries = cache.list("");
            let file_count = entries
                .iter()
                .filter(|(key, entry)| key != usde::cache::GIT_META_KEY && !entry.is_expired())
                .count();
            let git_count = GitCache::new(&mut cache).count();

            println!("{:<18} {}", "Cache Directory:", dir.display());
            println!(
                "{:<18} {} ({} files)",
                "File Cache:",
                format_bytes(cache.size()),
                file_count
            );
            if git_count > 0 {
                println!("{:<18} {} tracked", "Git Repos:", git_count);
            }
        }
        CacheAction::List { prefix, kind } => {
            let mut prefix = prefix.unwrap_or_default();
            if let Some(kind) = &kind {
                prefix = format!("{kind}/{prefix}");
            }

            let commits = GitCache::new(&mut cache).list_commits();
            if !commits.is_empty() {
                println!("Git Repositories:");
                for (key, commit) in &commits {
                    if prefix.is_empty() || key.starts_with(&prefix) {
                        println!("  {key}");
                        println!("    Commit:   {commit}");
                        println!();
                    }
                }
            }

            for (key, entry) in cache.list(&prefix) {
                if key == usde::cache::GIT_META_KEY {
                    continue;
                }
                let age = chrono::Utc::now() - entry.fetched_at;
                println!("{}", entry.source);
                println!("  Key:       {key}");
                println!("  Size:      {}", format_bytes(entry.size));
                println!("  Age:       {}", format_age(age));
                println!("  Checksum:  {}", entry.checksum);
                if let Some(expires) = entry.expires_at {
                    println!("  Expires:   {}", expires.to_rfc3339());
                }
                println!();
            }
        }
        CacheAction::Prune { age, kind } => {
            let count = match kind {
                Some(kind) => {
                    let cutoff = chrono::Utc::now() - chrono::Duration::days(age as i64);
                    let doomed: Vec<String> = cache
                        .list(&format!("{kind}/"))
                        .into_iter()
                        .filter(|(_, entry)| {
                            entry.is_expired() || (age > 0 && entry.fetched_at < cutoff)
                        })
                        .map(|(key, _)| key)
                        .collect();
                    let mut count = 0;
                    for key in doomed {
                        if cache.delete(&key).is_ok() {
                            count += 1;
                        }
                    }
                    count
                }
                None => cache.prune(Duration::from_secs(age * 24 * 3600))?,
            };
            print_success(quiet, &format!("Pruned {count} cache entries"));
        }
        CacheAction::Clear { kind } => match kind {
            Some(kind) => {
                let doomed: Vec<String> = cache
                    .list(&format!("{kind}/"))
                    .into_iter()
                    .map(|(key, _)| key)
                    .collect();
                let mut count = 0;
                for key in doomed {
                    if cache.delete(&key).is_ok() {
                        count += 1;
                    }
                }
                print_success(quiet, &format!("Cleared {count} cache entries"));
            }
            None => {
                cache.clear()?;
                print_success(quiet, "Cache cleared");
            }
        },
    }
    Ok(())
}

fn format_bytes(bytes: i64) -> String {
    const UNIT: i64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1} {}iB", bytes as f64 / div as f64, b"KMGTPE"[exp] as char)
}

fn format_age(age: chrono::Duration) -> String {
    if age.num_minutes() < 1 {
        format!("{} seconds", age.num_seconds().max(0))
    } else if age.num_hours() < 1 {
        format!("{} minutes", age.num_minutes())
    } else if age.num_days() < 1 {
        format!("{} hours", age.num_hours())
    } else {
        format!("{} days", age.num_days())
    }
}

// ---- config ----

fn run_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let cfg = config::load()?;
            print!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigAction::Get { key } => {
            let cfg = config::load()?;
            println!("{}", config::get_value(&cfg, &key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut cfg = config::load()?;
            config::set_value(&mut cfg, &key, &value)?;
            config::save(&cfg)?;
        }
        ConfigAction::Edit => {
            let path = config::config_file_path()?;
            if !path.exists() {
                config::save(&config::load()?)?;
            }
            let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
            let status = std::process::Command::new(&editor)
                .arg(&path)
                .status()
                .with_context(|| format!("failed to start editor {editor}"))?;
            if !status.success() {
                bail!("editor exited with {status}");
            }
        }
        ConfigAction::Path => {
            println!("{}", config::config_file_path()?.display());
        }
    }
    Ok(())
}
