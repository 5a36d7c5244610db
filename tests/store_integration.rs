//! End-to-end tests over the store: init, ingest-shaped writes, search,
//! and reads against real temp databases.

use tempfile::TempDir;

use usde::cache::hash_bytes;
use usde::ingest::{insert_unit, EntryDraft, SymbolDraft};
use usde::store::{Document, Store};

async fn open_store(tmp: &TempDir) -> Store {
    let store = Store::open(&tmp.path().join("test.usde")).await.unwrap();
    store.init().await.unwrap();
    store
}

async fn insert_markdown(
    store: &Store,
    path: &str,
    body: &str,
    entries: &[EntryDraft],
    symbols: &[SymbolDraft],
) -> i64 {
    let doc = Document::from_markdown(path, body).unwrap();
    let mut tx = store.begin().await.unwrap();
    let doc_id = insert_unit(&mut tx, &doc, entries, symbols).await.unwrap();
    tx.commit().await.unwrap();
    doc_id
}

#[tokio::test]
async fn init_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store.init().await.unwrap();
    store.init().await.unwrap();
    assert_eq!(store.count_documents().await.unwrap(), 0);
}

#[tokio::test]
async fn add_search_read_round_trip() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let body = "# Title\n\nHello world.";
    insert_markdown(
        &store,
        "go/example/pkg",
        body,
        &[EntryDraft::new("pkg", "Package", "pkg Hello world.")],
        &[SymbolDraft::new("pkg", "package pkg", "Hello world.")],
    )
    .await;

    // list shows the path
    let paths = store.list_paths().await.unwrap();
    assert_eq!(paths, vec!["go/example/pkg"]);

    // search finds it with a positive score
    let results = store.search("Hello", 20).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "pkg");
    assert!(results[0].score > 0.0, "score was {}", results[0].score);

    // read returns the original markdown exactly
    let doc = store.read_document_by_path("go/example/pkg").await.unwrap();
    assert_eq!(doc.text().unwrap(), body);
    assert_eq!(doc.format, "markdown");
    assert_eq!(doc.hash, hash_bytes(body.as_bytes()));
}

#[tokio::test]
async fn upsert_replaces_all_rows_atomically() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let first = insert_markdown(
        &store,
        "go/example/pkg",
        "# v1\n\nold body",
        &[
            EntryDraft::new("pkg", "Package", "old body"),
            EntryDraft::new("OldFunc", "Func", "old func"),
        ],
        &[SymbolDraft::new("OldFunc", "func OldFunc()", "old")],
    )
    .await;

    let second = insert_markdown(
        &store,
        "go/example/pkg",
        "# v2\n\nnew body",
        &[EntryDraft::new("pkg", "Package", "new body")],
        &[SymbolDraft::new("NewFunc", "func NewFunc()", "new")],
    )
    .await;

    // Replaced documents keep their id and row counts reflect only the
    // fresh rows.
    assert_eq!(first, second);
    assert_eq!(store.count_documents().await.unwrap(), 1);
    assert_eq!(store.count_search_entries().await.unwrap(), 1);
    assert_eq!(store.count_symbol_entries().await.unwrap(), 1);

    let doc = store.read_document_by_path("go/example/pkg").await.unwrap();
    assert!(doc.text().unwrap().contains("new body"));

    // Stale search rows are gone.
    assert!(store.search("OldFunc", 20).await.unwrap().is_empty());
    assert!(store.get_symbol("OldFunc").await.is_err());
    assert!(store.get_symbol("NewFunc").await.is_ok());
}

#[tokio::test]
async fn reingest_identical_content_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let body = "# Stable\n\nsame bytes every time";
    let entries = [EntryDraft::new("Stable", "Document", "same bytes")];

    insert_markdown(&store, "github/o/r/README.md", body, &entries, &[]).await;
    let hash_before = store
        .read_document_by_path("github/o/r/README.md")
        .await
        .unwrap()
        .hash;
    let docs_before = store.count_documents().await.unwrap();
    let search_before = store.count_search_entries().await.unwrap();

    insert_markdown(&store, "github/o/r/README.md", body, &entries, &[]).await;

    assert_eq!(store.count_documents().await.unwrap(), docs_before);
    assert_eq!(store.count_search_entries().await.unwrap(), search_before);
    let after = store
        .read_document_by_path("github/o/r/README.md")
        .await
        .unwrap();
    assert_eq!(after.hash, hash_before);
    assert_eq!(after.text().unwrap(), body);
}

#[tokio::test]
async fn rollback_leaves_no_partial_state() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let doc = Document::from_markdown("go/x", "# x\n\nbody").unwrap();
    let mut tx = store.begin().await.unwrap();
    insert_unit(&mut tx, &doc, &[EntryDraft::new("x", "Package", "body")], &[])
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(store.count_documents().await.unwrap(), 0);
    assert_eq!(store.count_search_entries().await.unwrap(), 0);
    assert!(store.read_document_by_path("go/x").await.is_err());
}

#[tokio::test]
async fn package_prefix_restricts_results() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    insert_markdown(
        &store,
        "go/net/http",
        "# http\n\nHTTP client and server.",
        &[EntryDraft::new("http.Client", "Type", "http client sends requests")],
        &[],
    )
    .await;
    insert_markdown(
        &store,
        "rust/reqwest/Struct/Client",
        "# Client\n\nAn HTTP client.",
        &[EntryDraft::new("reqwest::Client", "Struct", "http client sends requests")],
        &[],
    )
    .await;

    let scoped = store.search_package("client", "go/net", 20).await.unwrap();
    assert!(!scoped.is_empty());
    for result in &scoped {
        let doc = store.read_document_by_id(result.doc_id).await.unwrap();
        assert!(doc.path.starts_with("go/net"), "leaked {}", doc.path);
    }

    let all = store.search("client", 20).await.unwrap();
    assert!(all.len() > scoped.len());
}

#[tokio::test]
async fn path_shaped_query_resolves_namespace() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    insert_markdown(
        &store,
        "rust/serde/Trait/Serialize",
        "# Serialize\n\nA data structure that can be serialized.",
        &[EntryDraft::new("serde::Serialize", "Trait", "Serialize serializes data")],
        &[],
    )
    .await;
    insert_markdown(
        &store,
        "go/fmt",
        "# fmt\n\nFormatted Serialize impostor.",
        &[EntryDraft::new("Serialize", "Func", "Serialize in the wrong namespace")],
        &[],
    )
    .await;

    // `rust/serde/Serialize` → prefix rust/serde/, query Serialize
    let results = store.search("rust/serde/Serialize", 20).await.unwrap();
    assert!(!results.is_empty());
    for result in &results {
        let doc = store.read_document_by_id(result.doc_id).await.unwrap();
        assert!(doc.path.starts_with("rust/serde/"), "leaked {}", doc.path);
    }
}

#[tokio::test]
async fn rust_path_fallback_skips_unknown_segment() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    insert_markdown(
        &store,
        "rust/tokio/Trait/AsyncRead",
        "# AsyncRead\n\nReads bytes asynchronously.",
        &[],
        &[],
    )
    .await;

    // Callers do not know the item-kind segment.
    let doc = store
        .read_document_by_path("rust/tokio/AsyncRead")
        .await
        .unwrap();
    assert_eq!(doc.path, "rust/tokio/Trait/AsyncRead");

    // Bare crate paths match any document under the crate.
    let doc = store.read_document_by_path("rust/tokio").await.unwrap();
    assert!(doc.path.starts_with("rust/tokio/"));

    // Non-rust misses stay misses.
    assert!(store.read_document_by_path("go/missing").await.is_err());
}

#[tokio::test]
async fn exact_name_match_gets_boost() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    insert_markdown(
        &store,
        "go/fmt",
        "# fmt",
        &[
            EntryDraft::new("Println", "Func", "Println formats and prints"),
            EntryDraft::new("Fprintln", "Func", "Fprintln writes Println output elsewhere"),
        ],
        &[],
    )
    .await;

    let results = store.search("Println", 20).await.unwrap();
    assert!(results.len() >= 2);
    assert_eq!(results[0].name, "Println");
    assert!(results[0].score >= 100.0);
    assert!(results[0].score > results[1].score);

    // Scores are non-increasing.
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn trigram_substring_matching() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    insert_markdown(
        &store,
        "go/fmt",
        "# fmt",
        &[EntryDraft::new("Println", "Func", "prints a line")],
        &[],
    )
    .await;

    // Substrings match without wildcards, case-insensitively.
    for query in ["println", "Print", "intln"] {
        let results = store.search(query, 20).await.unwrap();
        assert!(!results.is_empty(), "no match for {query}");
        assert_eq!(results[0].name, "Println");
    }
}

#[tokio::test]
async fn search_rejects_empty_and_defaults_limit() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    assert!(store.search("", 10).await.is_err());
    assert!(store.search("   ", 10).await.is_err());

    for i in 0..30 {
        insert_markdown(
            &store,
            &format!("go/pkg{i}"),
            "# pkg",
            &[EntryDraft::new(format!("Widget{i}"), "Type", "widget widget widget")],
            &[],
        )
        .await;
    }

    // limit <= 0 falls back to 20
    let results = store.search("widget", 0).await.unwrap();
    assert_eq!(results.len(), 20);
    let results = store.search("widget", -5).await.unwrap();
    assert_eq!(results.len(), 20);
    let results = store.search("widget", 5).await.unwrap();
    assert_eq!(results.len(), 5);
}

#[tokio::test]
async fn hostile_query_is_an_error_not_a_crash() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    insert_markdown(
        &store,
        "go/x",
        "# x",
        &[EntryDraft::new("x", "Package", "x")],
        &[],
    )
    .await;

    // Sanitization quotes these; whatever happens must be Ok or a typed
    // error, never a panic.
    for query in ["a AND OR", "\"unbalanced", "(((", "x NOT"] {
        let _ = store.search(query, 10).await;
    }
}

#[tokio::test]
async fn symbol_context_lookup() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    insert_markdown(
        &store,
        "go/example/stringutil",
        "# stringutil\n\nString helpers.",
        &[EntryDraft::new("stringutil", "Package", "String helpers.")],
        &[
            SymbolDraft::new("stringutil", "package stringutil", "String helpers."),
            SymbolDraft::new(
                "Reverse",
                "func Reverse(s string) string",
                "Reverse reverses a string.",
            ),
        ],
    )
    .await;

    let ctx = store.get_symbol("stringutil").await.unwrap();
    assert!(ctx.signature.starts_with("package"));

    let ctx = store.get_symbol("Reverse").await.unwrap();
    assert!(ctx.signature.starts_with("func"));
    assert_eq!(ctx.summary, "Reverse reverses a string.");

    let err = store.get_symbol("NoSuchSymbol").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn list_packages_groups_by_language() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    for path in ["go/net/http", "go/net/url", "go/fmt", "rust/serde/Trait/Serialize"] {
        insert_markdown(&store, path, "# d", &[], &[]).await;
    }

    let packages = store.list_packages().await.unwrap();
    let languages: Vec<&str> = packages.iter().map(|p| p.language.as_str()).collect();
    assert!(languages.contains(&"go"));
    assert!(languages.contains(&"rust"));

    let net = packages.iter().find(|p| p.name == "go/net").unwrap();
    assert_eq!(net.document_count, 2);
}

#[tokio::test]
async fn symbol_rows_cascade_on_document_delete() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    insert_markdown(
        &store,
        "go/x",
        "# x",
        &[],
        &[SymbolDraft::new("X", "func X()", "x")],
    )
    .await;
    assert_eq!(store.count_symbol_entries().await.unwrap(), 1);

    // Vacuum keeps working on a live database.
    store.vacuum().await.unwrap();
    assert_eq!(store.count_documents().await.unwrap(), 1);
}
