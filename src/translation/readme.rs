//! README language switcher.
//!
//! The switcher is a block that starts at a `## 🌐` heading and ends at the
//! next `---` line. Rewriting removes every existing block and inserts a
//! single fresh one, so repeated runs leave the document unchanged.

use std::sync::LazyLock;

use regex::Regex;

use super::languages::language_name;
use super::path::get_translated_path;

/// Heading written at the top of a generated switcher block.
pub const SWITCHER_HEADING: &str = "## 🌐 Translations";

static SWITCHER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^##\s*🌐").expect("switcher heading pattern"));
static H2_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^##\s+").expect("h2 pattern"));
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#\s+").expect("title pattern"));

fn is_switcher_heading(line: &str) -> bool {
    SWITCHER_RE.is_match(line)
}

fn is_separator(line: &str) -> bool {
    line.trim() == "---"
}

/// Line index where the switcher block belongs.
///
/// In order of preference: an existing switcher heading, the first `##`
/// heading, the line after the first blank line following a `#` title, or
/// the top of the document.
pub fn find_insert_position(content: &str) -> usize {
    let lines: Vec<&str> = content.split('\n').collect();

    if let Some(i) = lines.iter().position(|l| is_switcher_heading(l)) {
        return i;
    }
    if let Some(i) = lines.iter().position(|l| H2_RE.is_match(l)) {
        return i;
    }

    let mut found_title = false;
    for (i, line) in lines.iter().enumerate() {
        if TITLE_RE.is_match(line) {
            found_title = true;
            continue;
        }
        if found_title && line.trim().is_empty() && i + 1 < lines.len() {
            return i + 1;
        }
    }

    0
}

/// Link line entry for one language.
fn language_link(lang: &str) -> String {
    format!("[{}](./{})", language_name(lang), get_translated_path("README.md", lang))
}

fn switcher_lines(languages: &[String]) -> Vec<String> {
    let links = languages
        .iter()
        .map(|l| language_link(l))
        .collect::<Vec<_>>()
        .join(" | ");

    vec![
        SWITCHER_HEADING.to_string(),
        String::new(),
        links,
        String::new(),
        "---".to_string(),
        String::new(),
    ]
}

/// Render the switcher block. Ends with a newline, so the block is followed by
/// exactly one blank line once spliced into a document.
pub fn generate_language_links(languages: &[String]) -> String {
    switcher_lines(languages).join("\n")
}

/// Drop every switcher block, keeping everything else byte for byte.
///
/// A block runs from its heading through the next `---` line, plus the one
/// blank line a generated block leaves after the separator. A heading with no
/// separator after it removes only the heading line.
pub fn remove_language_links(content: &str) -> String {
    strip_blocks(&content.split('\n').collect::<Vec<_>>()).join("\n")
}

fn strip_blocks<'a>(lines: &[&'a str]) -> Vec<&'a str> {
    let mut kept = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        if !is_switcher_heading(lines[i]) {
            kept.push(lines[i]);
            i += 1;
            continue;
        }

        match lines[i + 1..].iter().position(|l| is_separator(l)) {
            Some(offset) => {
                i += offset + 2;
                if i < lines.len() && lines[i].trim().is_empty() {
                    i += 1;
                }
            }
            None => i += 1,
        }
    }

    kept
}

/// Replace any switcher block with one linking `languages`, placed by
/// [`find_insert_position`].
pub fn insert_language_links(content: &str, languages: &[String]) -> String {
    let position = find_insert_position(content);
    insert_language_links_at(content, languages, position)
}

/// Replace any switcher block with one linking `languages` at line `position`
/// of the cleaned document. Positions past the end append.
pub fn insert_language_links_at(content: &str, languages: &[String], position: usize) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    let cleaned = strip_blocks(&lines);
    let position = position.min(cleaned.len());

    let block = switcher_lines(languages);
    let mut out: Vec<&str> = Vec::with_capacity(cleaned.len() + block.len());
    out.extend_from_slice(&cleaned[..position]);
    out.extend(block.iter().map(String::as_str));
    out.extend_from_slice(&cleaned[position..]);
    out.join("\n")
}

/// Whether `content` already contains a switcher heading.
pub fn has_language_links(content: &str) -> bool {
    content.split('\n').any(is_switcher_heading)
}
