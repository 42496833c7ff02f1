//! Text → `Document`.
//!
//! The parser never fails. Lines it cannot classify land in the header or in
//! the open group's preamble, verbatim.

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::COMMENT_MARKER;
use crate::model::{Document, Entry, Group};

const BOM: char = '\u{feff}';

static MARKER_REGEX: OnceLock<Regex> = OnceLock::new();

fn marker_regex() -> &'static Regex {
    MARKER_REGEX.get_or_init(|| {
        Regex::new(r"^\x{FEFF}?#*\s*===.*===\s*$").expect("Invalid group marker Regex")
    })
}

/// Where the next line goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    InHeader,
    /// Group is open and has not seen an entry yet.
    InGroupPreamble(usize),
    InGroupItems(usize),
}

/// Classification of a non-blank, non-marker line inside a group.
#[derive(Debug, PartialEq, Eq)]
pub enum LineKind {
    Entry(Entry),
    Preamble,
    /// Looked like an entry but nothing was left of the identifier.
    EmptyIdentifier,
}

pub fn parse(text: &str) -> Document {
    let cleaned = text.replace('\r', "");
    let body = cleaned.trim_start_matches(BOM);

    let mut doc = Document::default();
    let cursor = body
        .split('\n')
        .enumerate()
        .fold(Cursor::InHeader, |cursor, (idx, line)| {
            step(&mut doc, cursor, idx + 1, line)
        });
    close(&mut doc, cursor);

    debug!(
        header_lines = doc.header.len(),
        groups = doc.groups.len(),
        "parsed document"
    );
    doc
}

/// `# === Title ===`, any number of leading `#`, optional BOM.
pub fn is_group_marker(line: &str) -> bool {
    marker_regex().is_match(line.trim())
}

/// Classify a trimmed line that sits inside a group.
pub fn classify(trimmed: &str) -> LineKind {
    let (markers, rest) = strip_markers(trimmed);
    if rest.is_empty() || rest.starts_with('=') || !rest.contains('.') {
        return LineKind::Preamble;
    }

    let (raw_identifier, raw_metadata) = rest.split_once(COMMENT_MARKER).unwrap_or((rest, ""));
    let identifier = clean_identifier(raw_identifier);
    if identifier.is_empty() {
        return LineKind::EmptyIdentifier;
    }
    if identifier.starts_with('=') || !identifier.contains('.') {
        return LineKind::Preamble;
    }

    let metadata = raw_metadata
        .trim()
        .trim_start_matches(COMMENT_MARKER)
        .trim();

    LineKind::Entry(Entry {
        identifier: identifier.to_string(),
        metadata: metadata.to_string(),
        enabled: markers == 0,
        ignored: markers >= 2,
    })
}

fn step(doc: &mut Document, cursor: Cursor, line_no: usize, line: &str) -> Cursor {
    let trimmed = line.trim();

    if trimmed.is_empty() {
        match cursor {
            Cursor::InHeader => doc.header.push(String::new()),
            Cursor::InGroupPreamble(g) => doc.groups[g].preamble.push(String::new()),
            // Blank lines between entries are layout, not content.
            Cursor::InGroupItems(_) => {}
        }
        return cursor;
    }

    if marker_regex().is_match(trimmed) {
        close(doc, cursor);
        doc.groups.push(Group::new(marker_title(trimmed)));
        return Cursor::InGroupPreamble(doc.groups.len() - 1);
    }

    let group = match cursor {
        Cursor::InHeader => {
            doc.header.push(line.to_string());
            return cursor;
        }
        Cursor::InGroupPreamble(g) | Cursor::InGroupItems(g) => g,
    };

    match classify(trimmed) {
        LineKind::Entry(entry) => {
            doc.groups[group].items.push(entry);
            Cursor::InGroupItems(group)
        }
        LineKind::Preamble => {
            doc.groups[group].preamble.push(line.to_string());
            cursor
        }
        LineKind::EmptyIdentifier => {
            warn!(line = line_no, raw = %line, "skipping entry with empty identifier");
            cursor
        }
    }
}

/// Trailing blank lines of the header, and of a group that never got an
/// entry, are the separator the serializer emits before the next group.
fn close(doc: &mut Document, cursor: Cursor) {
    match cursor {
        Cursor::InHeader => trim_trailing_blank(&mut doc.header),
        Cursor::InGroupPreamble(g) => trim_trailing_blank(&mut doc.groups[g].preamble),
        Cursor::InGroupItems(_) => {}
    }
}

fn trim_trailing_blank(lines: &mut Vec<String>) {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
}

fn marker_title(trimmed: &str) -> String {
    trimmed
        .trim_start_matches(BOM)
        .trim_start_matches(COMMENT_MARKER)
        .trim()
        .to_string()
}

/// Strip leading comment markers one at a time, skipping whitespace after
/// each. Returns how many were removed.
fn strip_markers(line: &str) -> (usize, &str) {
    let mut rest = line;
    let mut count = 0;
    while let Some(stripped) = rest.strip_prefix(COMMENT_MARKER) {
        count += 1;
        rest = stripped.trim_start();
    }
    (count, rest)
}

fn clean_identifier(raw: &str) -> &str {
    raw.trim_matches(|c: char| c.is_whitespace() || is_invisible(c))
}

fn is_invisible(c: char) -> bool {
    matches!(c, '\u{200b}'..='\u{200d}' | '\u{2060}' | BOM)
}
