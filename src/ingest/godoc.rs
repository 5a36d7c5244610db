//! Go source documentation extraction.
//!
//! Reads the non-test `.go` files of one package directory and produces a
//! structured view of its exported surface: package doc, functions, types
//! with their methods, vars, and consts, each with its doc comment and a
//! one-line signature. The view renders to markdown with `<a name>` anchors
//! injected before each symbol heading for deep links.
//!
//! This is a documentation scanner, not a compiler. It tracks strings,
//! comments, and brace/paren depth well enough to find top-level
//! declarations and their doc comments; it does not type-check anything.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use crate::error::Result;
use crate::text::first_line;

#[derive(Debug, Default)]
pub struct GoPackage {
    pub name: String,
    pub import_path: String,
    pub doc: String,
    pub funcs: Vec<GoFunc>,
    pub types: Vec<GoType>,
    pub vars: Vec<GoValue>,
    pub consts: Vec<GoValue>,
}

#[derive(Debug, Clone)]
pub struct GoFunc {
    pub name: String,
    /// Receiver base type for methods, stripped of `*`.
    pub receiver: Option<String>,
    pub doc: String,
    /// Declaration text up to (exclusive) the body brace, one logical line.
    pub signature: String,
}

impl GoFunc {
    /// `Name` for functions, `Recv.Name` for methods.
    pub fn qualified_name(&self) -> String {
        match &self.receiver {
            Some(recv) => format!("{recv}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoType {
    pub name: String,
    pub doc: String,
    /// Full declaration text, braces included.
    pub decl: String,
    pub methods: Vec<GoFunc>,
}

/// One var or const spec; a grouped declaration yields one per spec line.
#[derive(Debug, Clone)]
pub struct GoValue {
    pub names: Vec<String>,
    pub doc: String,
    pub decl: String,
}

/// Collapse a declaration to one line: first line, with an opened block
/// abbreviated as `{ ... }`.
pub fn one_line_signature(decl: &str) -> String {
    let first = first_line(decl).trim_end();
    if let Some(stripped) = first.strip_suffix('{') {
        if decl.contains('\n') {
            return format!("{}{{ ... }}", stripped);
        }
    }
    first.to_string()
}

/// First sentence of a doc comment: the first paragraph, whitespace
/// collapsed, cut after the first period that ends a word.
pub fn synopsis(doc: &str) -> String {
    let paragraph: String = doc
        .lines()
        .take_while(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let collapsed = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");

    let bytes = collapsed.as_bytes();
    for (idx, &b) in bytes.iter().enumerate() {
        if b == b'.' && (idx + 1 == bytes.len() || bytes[idx + 1] == b' ') {
            return collapsed[..=idx].to_string();
        }
    }
    collapsed
}

/// Synopsis followed by the full text, as the search-index body.
pub fn summary_text(doc: &str) -> String {
    if doc.is_empty() {
        return String::new();
    }
    let summary = synopsis(doc);
    if summary.is_empty() {
        return doc.to_string();
    }
    format!("{summary}\n\n{doc}")
}

/// Parse every non-test `.go` file in `dir` into one package view.
/// Returns `None` when the directory holds no Go files.
pub fn parse_package(dir: &Path, import_path: &str) -> Result<Option<GoPackage>> {
    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            name.ends_with(".go") && !name.ends_with("_test.go")
        })
        .collect();
    files.sort();

    if files.is_empty() {
        return Ok(None);
    }

    let mut pkg = GoPackage {
        import_path: import_path.to_string(),
        ..Default::default()
    };
    let mut methods: Vec<GoFunc> = Vec::new();

    for file in &files {
        let source = std::fs::read_to_string(file)?;
        parse_file(&source, &mut pkg, &mut methods);
    }

    // Attach methods to their receiver types; methods of unknown receivers
    // stay as standalone funcs so nothing silently disappears.
    let mut by_type: BTreeMap<String, Vec<GoFunc>> = BTreeMap::new();
    for method in methods {
        by_type
            .entry(method.receiver.clone().unwrap_or_default())
            .or_default()
            .push(method);
    }
    for typ in &mut pkg.types {
        if let Some(mut list) = by_type.remove(&typ.name) {
            list.sort_by(|a, b| a.name.cmp(&b.name));
            typ.methods = list;
        }
    }
    for (_, leftover) in by_type {
        pkg.funcs.extend(leftover);
    }

    pkg.funcs.sort_by(|a, b| a.qualified_name().cmp(&b.qualified_name()));
    pkg.types.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Some(pkg))
}

/// Character-level scanner state carried across lines.
#[derive(Default)]
struct Scanner {
    in_block_comment: bool,
    in_raw_string: bool,
}

impl Scanner {
    /// The code portion of `line`: comments removed, string and rune
    /// literal contents blanked, so brace/paren counting is safe.
    fn code_of(&mut self, line: &str) -> String {
        let mut code = String::with_capacity(line.len());
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            if self.in_block_comment {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    self.in_block_comment = false;
                }
                continue;
            }
            if self.in_raw_string {
                if c == '`' {
                    self.in_raw_string = false;
                }
                continue;
            }
            match c {
                '/' if chars.peek() == Some(&'/') => break,
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    self.in_block_comment = true;
                }
                '`' => self.in_raw_string = true,
                '"' | '\'' => {
                    let quote = c;
                    while let Some(s) = chars.next() {
                        if s == '\\' {
                            chars.next();
                        } else if s == quote {
                            break;
                        }
                    }
                    code.push(' ');
                }
                _ => code.push(c),
            }
        }
        code
    }
}

fn delta(code: &str, open: char, close: char) -> i32 {
    let mut d = 0;
    for c in code.chars() {
        if c == open {
            d += 1;
        } else if c == close {
            d -= 1;
        }
    }
    d
}

struct Line {
    raw: String,
    code: String,
    is_comment: bool,
}

fn parse_file(source: &str, pkg: &mut GoPackage, methods: &mut Vec<GoFunc>) {
    let mut scanner = Scanner::default();
    let lines: Vec<Line> = source
        .lines()
        .map(|raw| {
            let in_comment_or_raw = scanner.in_block_comment || scanner.in_raw_string;
            let code = scanner.code_of(raw);
            let trimmed = raw.trim_start();
            Line {
                raw: raw.to_string(),
                code: code.clone(),
                is_comment: !in_comment_or_raw
                    && (trimmed.starts_with("//") && code.trim().is_empty()),
            }
        })
        .collect();

    let mut depth = 0i32;
    let mut parens = 0i32;
    let mut doc: Vec<String> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = &lines[i];
        let at_top = depth == 0 && parens == 0;

        if at_top && line.is_comment {
            let text = line.raw.trim_start().trim_start_matches("//");
            doc.push(text.strip_prefix(' ').unwrap_or(text).to_string());
            i += 1;
            continue;
        }

        if at_top && line.code.trim().is_empty() {
            doc.clear();
            i += 1;
            continue;
        }

        let code_trim = line.code.trim_start();

        if at_top && code_trim.starts_with("package ") {
            pkg.name = code_trim
                .split_whitespace()
                .nth(1)
                .unwrap_or_default()
                .to_string();
            if pkg.doc.is_empty() && !doc.is_empty() {
                pkg.doc = doc.join("\n");
            }
            doc.clear();
            depth += delta(&line.code, '{', '}');
            parens += delta(&line.code, '(', ')');
            i += 1;
            continue;
        }

        if at_top
            && (code_trim.starts_with("func ")
                || code_trim.starts_with("type ")
                || code_trim.starts_with("var ")
                || code_trim.starts_with("const "))
        {
            let doc_text = doc.join("\n");
            doc.clear();
            let consumed = parse_decl(&lines, i, &doc_text, pkg, methods);
            // Replay the consumed lines into the depth counters.
            for line in &lines[i..i + consumed] {
                depth += delta(&line.code, '{', '}');
                parens += delta(&line.code, '(', ')');
            }
            i += consumed;
            continue;
        }

        if at_top {
            doc.clear();
        }
        depth += delta(&line.code, '{', '}');
        parens += delta(&line.code, '(', ')');
        i += 1;
    }
}

/// Parse one top-level declaration starting at `start`; returns the number
/// of lines consumed.
fn parse_decl(
    lines: &[Line],
    start: usize,
    doc: &str,
    pkg: &mut GoPackage,
    methods: &mut Vec<GoFunc>,
) -> usize {
    let code_trim = lines[start].code.trim_start().to_string();

    // Collect the whole declaration: every line until braces and parens
    // return to zero relative to the declaration start.
    let mut depth = 0i32;
    let mut parens = 0i32;
    let mut end = start;
    loop {
        depth += delta(&lines[end].code, '{', '}');
        parens += delta(&lines[end].code, '(', ')');
        end += 1;
        if depth <= 0 && parens <= 0 {
            break;
        }
        if end >= lines.len() {
            break;
        }
    }
    let raw: Vec<&str> = lines[start..end].iter().map(|l| l.raw.as_str()).collect();

    if code_trim.starts_with("func ") {
        if let Some(func) = parse_func(&raw, doc) {
            if func.receiver.is_some() {
                methods.push(func);
            } else {
                pkg.funcs.push(func);
            }
        }
        return end - start;
    }

    if code_trim.starts_with("type ") {
        if code_trim.trim_start_matches("type").trim_start().starts_with('(') {
            parse_group(&lines[start..end], doc, |name, group_doc, decl| {
                pkg.types.push(GoType {
                    name,
                    doc: group_doc,
                    decl: format!("type {decl}"),
                    methods: Vec::new(),
                });
            });
        } else if let Some(name) = second_word(&code_trim) {
            pkg.types.push(GoType {
                name,
                doc: doc.to_string(),
                decl: raw.join("\n"),
                methods: Vec::new(),
            });
        }
        return end - start;
    }

    // var / const
    let keyword = if code_trim.starts_with("var ") { "var" } else { "const" };
    let is_const = keyword == "const";
    if code_trim
        .trim_start_matches(keyword)
        .trim_start()
        .starts_with('(')
    {
        parse_group(&lines[start..end], doc, |_name, group_doc, decl| {
            let value = GoValue {
                names: parse_value_names(&decl),
                doc: group_doc,
                decl: format!("{keyword} {decl}"),
            };
            if value.names.is_empty() {
                return;
            }
            if is_const {
                pkg.consts.push(value);
            } else {
                pkg.vars.push(value);
            }
        });
    } else {
        let spec = code_trim
            .trim_start_matches(keyword)
            .trim_start()
            .to_string();
        let value = GoValue {
            names: parse_value_names(&spec),
            doc: doc.to_string(),
            decl: raw.join("\n"),
        };
        if !value.names.is_empty() {
            if is_const {
                pkg.consts.push(value);
            } else {
                pkg.vars.push(value);
            }
        }
    }
    end - start
}

/// Parse a `func` declaration from its raw lines.
fn parse_func(raw: &[&str], doc: &str) -> Option<GoFunc> {
    let joined = raw.join("\n");
    let signature = match joined.find('{') {
        Some(idx) => joined[..idx].trim().replace('\n', " "),
        None => joined.trim().to_string(),
    };
    let signature = signature.split_whitespace().collect::<Vec<_>>().join(" ");

    let rest = signature.strip_prefix("func")?.trim_start();
    let (receiver, rest) = if let Some(after_paren) = rest.strip_prefix('(') {
        let close = after_paren.find(')')?;
        let recv = after_paren[..close].trim();
        let base = recv
            .split_whitespace()
            .last()
            .unwrap_or(recv)
            .trim_start_matches('*')
            .to_string();
        // Generic receivers: drop the type-parameter list.
        let base = base.split('[').next().unwrap_or(&base).to_string();
        (Some(base), after_paren[close + 1..].trim_start())
    } else {
        (None, rest)
    };

    let name: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        return None;
    }

    Some(GoFunc {
        name,
        receiver,
        doc: doc.to_string(),
        signature,
    })
}

/// Walk a parenthesized declaration group, invoking `emit` once per spec.
/// Specs keep the doc comments that immediately precede them inside the
/// group; the group's own doc applies when a spec has none.
fn parse_group(lines: &[Line], group_doc: &str, mut emit: impl FnMut(String, String, String)) {
    // Skip past the opening `(`.
    let mut idx = 0;
    while idx < lines.len() && !lines[idx].code.contains('(') {
        idx += 1;
    }
    idx += 1;

    let mut spec_doc: Vec<String> = Vec::new();
    while idx < lines.len() {
        let line = &lines[idx];
        let code_trim = line.code.trim();

        if line.is_comment {
            let text = line.raw.trim_start().trim_start_matches("//");
            spec_doc.push(text.strip_prefix(' ').unwrap_or(text).to_string());
            idx += 1;
            continue;
        }
        if code_trim.is_empty() {
            spec_doc.clear();
            idx += 1;
            continue;
        }
        if code_trim == ")" {
            break;
        }

        // A spec may itself open a block (struct types, composite literals).
        let mut depth = delta(&line.code, '{', '}');
        let mut end = idx + 1;
        while depth > 0 && end < lines.len() {
            depth += delta(&lines[end].code, '{', '}');
            end += 1;
        }
        let raw: Vec<&str> = lines[idx..end].iter().map(|l| l.raw.trim()).collect();
        let decl = raw.join("\n");

        let name = first_word(code_trim).unwrap_or_default();
        let doc = if spec_doc.is_empty() {
            group_doc.to_string()
        } else {
            spec_doc.join("\n")
        };
        emit(name, doc, decl);

        spec_doc.clear();
        idx = end;
    }
}

fn first_word(s: &str) -> Option<String> {
    let word: String = s
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    (!word.is_empty()).then_some(word)
}

fn second_word(s: &str) -> Option<String> {
    first_word(s.trim_start().split_whitespace().nth(1)?)
}

/// Identifiers declared by a var/const spec: leading comma-separated names
/// before the type or `=`.
fn parse_value_names(spec: &str) -> Vec<String> {
    let head = spec.split('=').next().unwrap_or(spec);
    let mut names = Vec::new();
    for part in head.split(',') {
        match first_word(part) {
            // A name list ends at the first token that is followed by a
            // type on the same comma-separated chunk.
            Some(word) => names.push(word),
            None => break,
        }
    }
    // `var x, y int` puts the type after the last name; first_word already
    // dropped it. `var x int` leaves just `x`.
    names
}

/// Render the package view to markdown, injecting `<a name="Symbol">`
/// anchors before each symbol heading.
pub fn render_markdown(pkg: &GoPackage) -> String {
    let mut md = String::new();

    let _ = writeln!(md, "# {}", pkg.import_path);
    md.push('\n');
    let _ = writeln!(md, "```go\nimport \"{}\"\n```", pkg.import_path);
    md.push('\n');

    if !pkg.doc.is_empty() {
        md.push_str(&pkg.doc);
        md.push_str("\n\n");
    }

    if !pkg.consts.is_empty() {
        md.push_str("## Constants\n\n");
        for value in &pkg.consts {
            render_value(&mut md, value);
        }
    }

    if !pkg.vars.is_empty() {
        md.push_str("## Variables\n\n");
        for value in &pkg.vars {
            render_value(&mut md, value);
        }
    }

    for func in &pkg.funcs {
        let _ = writeln!(md, "<a name=\"{}\"></a>", func.qualified_name());
        let _ = writeln!(md, "## {}", func.signature_heading());
        md.push('\n');
        let _ = writeln!(md, "```go\n{}\n```", func.signature);
        md.push('\n');
        if !func.doc.is_empty() {
            md.push_str(&func.doc);
            md.push_str("\n\n");
        }
    }

    for typ in &pkg.types {
        let _ = writeln!(md, "<a name=\"{}\"></a>", typ.name);
        let _ = writeln!(md, "## type {}", typ.name);
        md.push('\n');
        let _ = writeln!(md, "```go\n{}\n```", typ.decl);
        md.push('\n');
        if !typ.doc.is_empty() {
            md.push_str(&typ.doc);
            md.push_str("\n\n");
        }
        for method in &typ.methods {
            let _ = writeln!(md, "<a name=\"{}.{}\"></a>", typ.name, method.name);
            let _ = writeln!(md, "### {}", method.signature_heading());
            md.push('\n');
            let _ = writeln!(md, "```go\n{}\n```", method.signature);
            md.push('\n');
            if !method.doc.is_empty() {
                md.push_str(&method.doc);
                md.push_str("\n\n");
            }
        }
    }

    md.trim_end().to_string() + "\n"
}

fn render_value(md: &mut String, value: &GoValue) {
    if let Some(name) = value.names.first() {
        let _ = writeln!(md, "<a name=\"{name}\"></a>");
    }
    let _ = writeln!(md, "```go\n{}\n```", value.decl);
    md.push('\n');
    if !value.doc.is_empty() {
        md.push_str(&value.doc);
        md.push_str("\n\n");
    }
}

impl GoFunc {
    /// Heading text; keeps the receiver so anchors and headings agree with
    /// the `func (r Recv) Name` convention.
    fn signature_heading(&self) -> String {
        let sig = &self.signature;
        match sig.find('(') {
            Some(_) if self.receiver.is_some() => {
                // `func (r *T) Name(...)` → `func (r *T) Name`
                match sig.find(')') {
                    Some(close) => {
                        let rest = &sig[close + 1..];
                        let name_end = rest
                            .find('(')
                            .map(|p| close + 1 + p)
                            .unwrap_or(sig.len());
                        sig[..name_end].trim_end().to_string()
                    }
                    None => format!("func {}", self.qualified_name()),
                }
            }
            _ => format!("func {}", self.name),
        }
    }
}
