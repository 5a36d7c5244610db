//! Markdown to HTML for the web surface.
//!
//! GitHub-flavored extensions (tables, strikethrough, task lists), auto
//! heading IDs with anchor links, and server-side syntax highlighting for
//! fenced code blocks. Unknown languages fall back to plain `<pre>` output
//! inside comrak's highlighter plugin.

use comrak::plugins::syntect::SyntectAdapter;
use comrak::{markdown_to_html_with_plugins, Options, Plugins};
use regex::Regex;
use serde::Serialize;

/// One table-of-contents entry extracted from an H2 or H3 heading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TocItem {
    pub level: u8,
    pub text: String,
    pub id: String,
}

pub struct MarkdownRenderer {
    adapter: SyntectAdapter,
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        MarkdownRenderer {
            adapter: SyntectAdapter::new(Some("base16-ocean.dark")),
        }
    }

    /// Render `source` to HTML.
    pub fn render(&self, source: &str) -> String {
        let mut options = Options::default();
        options.extension.table = true;
        options.extension.strikethrough = true;
        options.extension.tasklist = true;
        options.extension.autolink = true;
        options.extension.header_ids = Some(String::new());
        options.render.unsafe_ = true;

        let mut plugins = Plugins::default();
        plugins.render.codefence_syntax_highlighter = Some(&self.adapter);

        let html = markdown_to_html_with_plugins(source, &options, &plugins);
        add_anchor_glyphs(&html)
    }

    /// Render to HTML and extract the H2/H3 table of contents.
    pub fn render_with_toc(&self, source: &str) -> (String, Vec<TocItem>) {
        (self.render(source), extract_toc(source))
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Give the auto-generated heading anchors a visible `#` glyph.
fn add_anchor_glyphs(html: &str) -> String {
    let re = Regex::new(r##"(<a href="#[^"]*" aria-hidden="true" class="anchor" id="[^"]*">)</a>"##)
        .expect("anchor regex");
    re.replace_all(html, "$1#</a>").into_owned()
}

/// Headings of level 2 and 3 outside code fences, with the same slugs the
/// renderer assigns.
pub fn extract_toc(source: &str) -> Vec<TocItem> {
    let mut toc = Vec::new();
    let mut slugs = SlugCounter::default();
    let mut in_fence = false;

    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        let (level, text) = if let Some(rest) = trimmed.strip_prefix("### ") {
            (3u8, rest)
        } else if let Some(rest) = trimmed.strip_prefix("## ") {
            (2u8, rest)
        } else {
            // Level-1 headings and deeper levels still consume a slug so
            // later ids stay aligned with the renderer.
            if let Some(text) = heading_text(trimmed) {
                slugs.assign(&text);
            }
            continue;
        };

        let text = strip_inline_markup(text);
        let id = slugs.assign(&text);
        toc.push(TocItem { level, text, id });
    }

    toc
}

fn heading_text(line: &str) -> Option<String> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    rest.strip_prefix(' ').map(|text| strip_inline_markup(text))
}

fn strip_inline_markup(text: &str) -> String {
    text.replace(['`', '*'], "").trim().to_string()
}

/// Mirrors the renderer's anchorizer: lowercase, whitespace to `-`, strip
/// everything but alphanumerics, `-`, and `_`; duplicates get `-1`, `-2`...
#[derive(Default)]
struct SlugCounter {
    seen: std::collections::HashMap<String, usize>,
}

impl SlugCounter {
    fn assign(&mut self, text: &str) -> String {
        let base: String = text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_whitespace() { '-' } else { c })
            .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
            .collect();

        let count = self.seen.entry(base.clone()).or_insert(0);
        let slug = if *count == 0 {
            base.clone()
        } else {
            format!("{base}-{count}")
        };
        *count += 1;
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_gfm_tables() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.render("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>1</td>"));
    }

    #[test]
    fn renders_task_lists_and_strikethrough() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.render("- [x] done\n- [ ] todo\n\n~~gone~~\n");
        assert!(html.contains("type=\"checkbox\""));
        assert!(html.contains("<del>gone</del>"));
    }

    #[test]
    fn headings_get_ids_and_anchor_links() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.render("## Getting Started\n");
        assert!(html.contains("id=\"getting-started\""));
        assert!(html.contains("class=\"anchor\""));
        assert!(html.contains(">#</a>"));
    }

    #[test]
    fn code_fences_are_highlighted() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.render("```rust\nfn main() {}\n```\n");
        // Syntect emits inline-styled spans; unknown languages keep <pre>.
        assert!(html.contains("<pre") || html.contains("<code"));

        let fallback = renderer.render("```nosuchlanguage\nxyz\n```\n");
        assert!(fallback.contains("xyz"));
    }

    #[test]
    fn toc_covers_h2_and_h3_only() {
        let toc = extract_toc("# One\n\n## Two\n\ntext\n\n### Three\n\n#### Four\n");
        assert_eq!(
            toc,
            vec![
                TocItem { level: 2, text: "Two".into(), id: "two".into() },
                TocItem { level: 3, text: "Three".into(), id: "three".into() },
            ]
        );
    }

    #[test]
    fn toc_skips_fenced_headings() {
        let toc = extract_toc("## Real\n\n```\n## Not a heading\n```\n\n## Also Real\n");
        let texts: Vec<_> = toc.iter().map(|item| item.text.as_str()).collect();
        assert_eq!(texts, vec!["Real", "Also Real"]);
    }

    #[test]
    fn duplicate_headings_get_numbered_slugs() {
        let toc = extract_toc("## Usage\n\n## Usage\n");
        assert_eq!(toc[0].id, "usage");
        assert_eq!(toc[1].id, "usage-1");
    }

    #[test]
    fn slugs_drop_punctuation() {
        let toc = extract_toc("## func (c *Client) Do\n");
        assert_eq!(toc[0].id, "func-c-client-do");
    }
}
