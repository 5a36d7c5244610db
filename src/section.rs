//! Markdown section extraction for `read section`.
//!
//! Finds the first heading line matching a query and returns everything
//! from that heading until (exclusive) the next heading of equal or
//! smaller level. The heading scan can be delegated to `rg` or `grep`
//! (matching their line-number output), with a built-in scan as the
//! fallback when neither is installed.

use std::io::Write as _;
use std::process::Command;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionTool {
    /// Try ripgrep, then grep, then the built-in scan.
    Auto,
    /// Require ripgrep.
    Ripgrep,
    /// Require grep.
    Grep,
}

/// Extract the section whose heading contains `query`.
pub fn extract_section(markdown: &str, query: &str, tool: SectionTool) -> Result<String> {
    if query.is_empty() {
        return Err(Error::input("heading query is required"));
    }

    let line_number = find_heading_line(markdown, query, tool)?;
    let lines: Vec<&str> = markdown.lines().collect();
    let start = line_number
        .checked_sub(1)
        .filter(|idx| *idx < lines.len())
        .ok_or_else(|| Error::corruption("heading line out of range"))?;

    let level = heading_level(lines[start])
        .ok_or_else(|| Error::corruption("matched line is not a heading"))?;

    let mut end = lines.len();
    for (offset, line) in lines[start + 1..].iter().enumerate() {
        if let Some(next_level) = heading_level(line) {
            if next_level <= level {
                end = start + 1 + offset;
                break;
            }
        }
    }

    Ok(lines[start..end].join("\n"))
}

/// 1-based line number of the first heading containing `query`.
fn find_heading_line(markdown: &str, query: &str, tool: SectionTool) -> Result<usize> {
    match tool {
        SectionTool::Ripgrep => scan_with_tool(markdown, query, "rg"),
        SectionTool::Grep => scan_with_tool(markdown, query, "grep"),
        SectionTool::Auto => {
            if which("rg") {
                if let Ok(line) = scan_with_tool(markdown, query, "rg") {
                    return Ok(line);
                }
            } else if which("grep") {
                if let Ok(line) = scan_with_tool(markdown, query, "grep") {
                    return Ok(line);
                }
            }
            scan_builtin(markdown, query)
        }
    }
}

fn scan_builtin(markdown: &str, query: &str) -> Result<usize> {
    for (idx, line) in markdown.lines().enumerate() {
        if heading_level(line).is_some() && line.contains(query) {
            return Ok(idx + 1);
        }
    }
    Err(Error::not_found(format!("no matching heading for {query:?}")))
}

fn scan_with_tool(markdown: &str, query: &str, tool: &str) -> Result<usize> {
    if !which(tool) {
        return Err(Error::input(format!("{tool} not found in PATH")));
    }

    let mut tmp = tempfile::Builder::new().suffix(".md").tempfile()?;
    tmp.write_all(markdown.as_bytes())?;
    tmp.flush()?;

    let pattern = format!("^#{{1,6}} .*{}.*$", regex::escape(query));
    let output = match tool {
        "rg" => Command::new("rg")
            .args(["--line-number", "--max-count", "1", &pattern])
            .arg(tmp.path())
            .output()?,
        _ => Command::new("grep")
            .args(["-n", "-m", "1", "-E", &pattern])
            .arg(tmp.path())
            .output()?,
    };

    if !output.status.success() {
        return Err(Error::not_found(format!("no matching heading for {query:?}")));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout
        .lines()
        .next()
        .ok_or_else(|| Error::not_found(format!("no matching heading for {query:?}")))?;
    first
        .split(':')
        .next()
        .and_then(|n| n.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| Error::corruption("invalid line number from search"))
}

fn which(tool: &str) -> bool {
    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| dir.join(tool).is_file())
}

/// `0` is "not a heading": a heading is 1-6 `#` followed by a space.
pub fn heading_level(line: &str) -> Option<usize> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    line[hashes..].starts_with(' ').then_some(hashes)
}
