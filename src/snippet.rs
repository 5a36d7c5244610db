//! Search result snippets.
//!
//! Given a document body and the user's query, pick a window around the
//! earliest term match and wrap every occurrence of every term in `<mark>`
//! tags. Consumed by the web search page and the JSON API.

use crate::text::truncate_text;

/// Window sizes around the earliest match, in bytes of normalized text.
const BEFORE: usize = 80;
const AFTER: usize = 120;
/// Fallback length when no term matches.
const FALLBACK_LEN: usize = 200;

/// Build a highlighted snippet of `body` for `query`.
pub fn generate_snippet(body: &str, query: &str) -> String {
    if body.is_empty() {
        return String::new();
    }

    let text = normalize_whitespace(body);
    let terms = extract_search_terms(query);
    if terms.is_empty() {
        return truncate_text(&text, FALLBACK_LEN);
    }

    let lower = text.to_lowercase();
    let mut match_index: Option<usize> = None;
    for term in &terms {
        if let Some(idx) = lower.find(&term.to_lowercase()) {
            match_index = Some(match match_index {
                Some(best) => best.min(idx),
                None => idx,
            });
        }
    }

    let match_index = match match_index {
        Some(idx) => idx,
        None => return truncate_text(&text, FALLBACK_LEN),
    };

    let start = floor_char_boundary(&text, match_index.saturating_sub(BEFORE));
    let end = floor_char_boundary(&text, (match_index + AFTER).min(text.len()));

    let mut snippet = text[start..end].to_string();
    if start > 0 {
        snippet = format!("...{snippet}");
    }
    if end < text.len() {
        snippet.push_str("...");
    }

    for term in &terms {
        snippet = highlight_term(&snippet, term);
    }
    snippet
}

/// Terms worth highlighting: whitespace-split words minus surrounding quotes
/// and minus `name:`/`type:`/`body:` column filters.
pub fn extract_search_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|word| word.trim_matches('"'))
        .filter(|word| {
            let lower = word.to_lowercase();
            !lower.starts_with("name:")
                && !lower.starts_with("type:")
                && !lower.starts_with("body:")
        })
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

/// Wrap each case-insensitive occurrence of `term` in `<mark>` tags,
/// preserving the original casing of the matched text.
fn highlight_term(text: &str, term: &str) -> String {
    if term.is_empty() {
        return text.to_string();
    }

    let lower_text = text.to_lowercase();
    let lower_term = term.to_lowercase();

    let mut result = String::with_capacity(text.len());
    let mut start = 0;
    while let Some(idx) = lower_text[start..].find(&lower_term) {
        let idx = start + idx;
        let end = idx + term.len();
        if !text.is_char_boundary(idx) || !text.is_char_boundary(end) {
            break;
        }
        result.push_str(&text[start..idx]);
        result.push_str("<mark>");
        result.push_str(&text[idx..end]);
        result.push_str("</mark>");
        start = end;
    }
    result.push_str(&text[start..]);
    result
}

fn normalize_whitespace(s: &str) -> String {
    let collapsed = s.replace('\n', " ").replace("  ", " ");
    collapsed.trim().to_string()
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
