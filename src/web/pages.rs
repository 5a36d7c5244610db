//! Minimal server-rendered pages. No template engine; the markup is small
//! enough to assemble directly.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::markdown::TocItem;
use super::SearchResultItem;
use crate::store::PackageInfo;

const STYLE: &str = r#"
body { font-family: ui-monospace, 'SF Mono', Menlo, monospace; margin: 0;
       background: #1f1f1f; color: #fafafa; }
a { color: #22c55e; text-decoration: none; }
a:hover { text-decoration: underline; }
header { padding: 1rem 2rem; border-bottom: 2px solid #333; }
header form { display: inline; margin-left: 2rem; }
input[type=search] { background: #111; color: #fafafa; border: 1px solid #444;
       padding: 0.4rem 0.6rem; width: 24rem; }
main { padding: 1.5rem 2rem; max-width: 70rem; }
mark { background: #a3e635; color: #111; }
table.doc-table, table { border-collapse: collapse; }
td, th { border: 1px solid #444; padding: 0.3rem 0.6rem; }
blockquote { border-left: 3px solid #22c55e; margin-left: 0; padding-left: 1rem;
       color: #a1a1aa; }
pre { background: #111; padding: 0.8rem; overflow-x: auto; }
code { background: #111; padding: 0 0.2rem; }
nav.toc { float: right; width: 16rem; border: 1px solid #333; padding: 0.8rem;
       margin: 0 0 1rem 1rem; font-size: 0.85rem; }
nav.toc .h3 { padding-left: 1rem; }
.result { margin-bottom: 1.2rem; }
.result .meta { color: #a1a1aa; font-size: 0.85rem; }
a.anchor { color: #525252; margin-right: 0.3rem; }
"#;

fn shell(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>{STYLE}</style>
</head>
<body>
<header>
  <a href="/"><strong>usde</strong></a>
  <form action="/search" method="get">
    <input type="search" name="q" placeholder="Search documentation...">
  </form>
</header>
<main>
{body}
</main>
</body>
</html>
"#,
        title = escape(title),
    )
}

pub fn index_page(by_language: &BTreeMap<String, Vec<PackageInfo>>) -> String {
    let mut body = String::from("<h1>Documentation</h1>\n");
    if by_language.is_empty() {
        body.push_str("<p>No documents yet. Ingest something with <code>usde add</code>.</p>\n");
    }
    for (language, packages) in by_language {
        let _ = writeln!(body, "<h2>{}</h2>\n<ul>", escape(language));
        for pkg in packages {
            let _ = writeln!(
                body,
                r#"<li><a href="/doc/{}">{}</a> <span class="meta">({} docs)</span></li>"#,
                escape_attr(&pkg.name),
                escape(&pkg.name),
                pkg.document_count
            );
        }
        body.push_str("</ul>\n");
    }
    shell("usde", &body)
}

pub fn search_page(query: &str, pkg: &str, results: &[SearchResultItem]) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<h1>Search</h1>");
    if !query.is_empty() {
        let _ = writeln!(
            body,
            "<p>{} result(s) for <strong>{}</strong>{}</p>",
            results.len(),
            escape(query),
            if pkg.is_empty() {
                String::new()
            } else {
                format!(" in <code>{}</code>", escape(pkg))
            }
        );
    }
    for result in results {
        // Snippets carry <mark> highlights; everything else is escaped
        // before the marks are restored.
        let snippet = escape(&result.snippet)
            .replace("&lt;mark&gt;", "<mark>")
            .replace("&lt;/mark&gt;", "</mark>");
        let _ = writeln!(
            body,
            r#"<div class="result">
  <a href="/doc/{path_attr}">{title}</a>
  <div class="meta">{path} &middot; {package} &middot; score {score:.2}</div>
  <div>{snippet}</div>
</div>"#,
            path_attr = escape_attr(&result.path),
            title = escape(&result.title),
            path = escape(&result.path),
            package = escape(&result.package),
            score = result.score,
        );
    }
    shell(&format!("Search: {query}"), &body)
}

pub fn doc_page(title: &str, path: &str, content: &str, toc: &[TocItem]) -> String {
    let mut body = String::new();

    if !toc.is_empty() {
        body.push_str("<nav class=\"toc\"><strong>Contents</strong>\n");
        for item in toc {
            let class = if item.level == 3 { "h3" } else { "h2" };
            let _ = writeln!(
                body,
                r##"<div class="{class}"><a href="#{id}">{text}</a></div>"##,
                id = escape_attr(&item.id),
                text = escape(&item.text),
            );
        }
        body.push_str("</nav>\n");
    }

    let _ = writeln!(body, "<div class=\"meta\">{}</div>", escape(&breadcrumbs(path)));
    body.push_str(content);
    shell(title, &body)
}

fn breadcrumbs(path: &str) -> String {
    path.split('/').collect::<Vec<_>>().join(" / ")
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape(s).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_page_restores_mark_tags_only() {
        let results = vec![SearchResultItem {
            path: "go/net/http".into(),
            title: "Client".into(),
            snippet: "an <mark>http</mark> client <script>alert(1)</script>".into(),
            score: 4.5,
            package: "go/net".into(),
        }];
        let html = search_page("http", "", &results);
        assert!(html.contains("<mark>http</mark>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn doc_page_renders_toc_levels() {
        let toc = vec![
            TocItem { level: 2, text: "Install".into(), id: "install".into() },
            TocItem { level: 3, text: "From Source".into(), id: "from-source".into() },
        ];
        let html = doc_page("Title", "go/x", "<p>hi</p>", &toc);
        assert!(html.contains(r##"<div class="h2"><a href="#install">Install</a></div>"##));
        assert!(html.contains(r##"<div class="h3"><a href="#from-source">From Source</a></div>"##));
    }

    #[test]
    fn index_page_groups_by_language() {
        let mut by_language = BTreeMap::new();
        by_language.insert(
            "go".to_string(),
            vec![PackageInfo {
                name: "go/net".into(),
                language: "go".into(),
                document_count: 12,
            }],
        );
        let html = index_page(&by_language);
        assert!(html.contains("<h2>go</h2>"));
        assert!(html.contains("(12 docs)"));
    }
}
