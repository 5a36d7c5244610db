//! Small text helpers shared across ingestors and display code.

/// Title-case every word in `s` (ASCII-aware, good enough for filenames).
pub fn capitalize(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Everything before the first newline, or the whole string.
pub fn first_line(s: &str) -> &str {
    match s.split_once('\n') {
        Some((before, _)) => before,
        None => s,
    }
}

/// Convert CRLF and bare CR line endings to LF.
pub fn normalize_line_endings(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

/// Truncate `text` to at most `max_len` bytes, appending `...` when cut.
/// Respects char boundaries so multibyte text never splits mid-codepoint.
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
