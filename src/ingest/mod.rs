//! Per-source ingestion pipelines.
//!
//! Every ingestor follows the same skeleton:
//!
//! 1. resolve the target identifier and version (fetching "latest" if the
//!    caller omitted it),
//! 2. consult the cache for `(source, identifier, version)`; on miss, fetch
//!    with retry/backoff and `put` the payload,
//! 3. extract the payload into a scratch directory (unzip, untar, JSON
//!    decode, or shallow clone),
//! 4. walk the payload producing one `(Document, SearchEntry[],
//!    SymbolContext[])` triple per logical unit,
//! 5. insert every triple through a single [`StoreTx`] per source unit —
//!    document first to obtain its id, then entries and contexts.
//!
//! A failed unit is logged and skipped; a failed initial fetch aborts the
//! whole ingest.

pub mod atproto;
pub mod github;
pub mod go_stdlib;
pub mod godoc;
pub mod golang;
pub mod hexpm;
pub mod rustdoc;

use crate::error::Result;
use crate::store::{Document, SearchEntry, StoreTx, SymbolContext};

/// A search-index row before its document id is known.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    pub name: String,
    pub kind: String,
    pub body: String,
}

impl EntryDraft {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, body: impl Into<String>) -> Self {
        EntryDraft {
            name: name.into(),
            kind: kind.into(),
            body: body.into(),
        }
    }
}

/// A symbol-context row before its document id is known.
#[derive(Debug, Clone)]
pub struct SymbolDraft {
    pub symbol: String,
    pub signature: String,
    pub summary: String,
}

impl SymbolDraft {
    pub fn new(
        symbol: impl Into<String>,
        signature: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        SymbolDraft {
            symbol: symbol.into(),
            signature: signature.into(),
            summary: summary.into(),
        }
    }
}

/// Insert one logical unit: the document, then its search entries and
/// symbol contexts, all inside the caller's transaction.
pub async fn insert_unit(
    tx: &mut StoreTx,
    doc: &Document,
    entries: &[EntryDraft],
    symbols: &[SymbolDraft],
) -> Result<i64> {
    let doc_id = tx.upsert_document(doc).await?;

    for entry in entries {
        tx.insert_search_entry(&SearchEntry {
            name: entry.name.clone(),
            kind: entry.kind.clone(),
            body: entry.body.clone(),
            doc_id,
        })
        .await?;
    }

    for symbol in symbols {
        tx.insert_symbol_context(&SymbolContext {
            doc_id,
            symbol: symbol.symbol.clone(),
            signature: symbol.signature.clone(),
            summary: symbol.summary.clone(),
        })
        .await?;
    }

    Ok(doc_id)
}
