//! `Document` → text.
//!
//! Never drops a group, a preamble line or an entry (entries with an empty
//! identifier excepted, which `parse` never produces).

use crate::model::{Document, Entry, Group};
use crate::{COMMENT_MARKER, METADATA_SEPARATOR, UNTITLED_GROUP};

pub fn serialize(doc: &Document) -> String {
    let mut lines: Vec<String> = doc.header.clone();
    if lines.last().is_some_and(|l| !l.trim().is_empty()) {
        lines.push(String::new());
    }

    for (index, group) in doc.groups.iter().enumerate() {
        lines.push(marker_line(group));
        lines.extend(group.preamble.iter().cloned());
        lines.extend(group.items.iter().filter_map(entry_line));

        let is_last = index + 1 == doc.groups.len();
        if !is_last && lines.last().is_some_and(|l| !l.trim().is_empty()) {
            lines.push(String::new());
        }
    }

    let mut text = lines.join("\n");
    let kept = text.trim_end_matches('\n').len();
    text.truncate(kept);
    text.push('\n');
    text
}

/// `# === Title ===`. Titles read from a file already carry the `===`.
pub fn marker_line(group: &Group) -> String {
    let title = group.title.trim();
    if title.is_empty() {
        format!("{COMMENT_MARKER} === {UNTITLED_GROUP} ===")
    } else if title.len() >= 6 && title.starts_with("===") && title.ends_with("===") {
        format!("{COMMENT_MARKER} {title}")
    } else {
        format!("{COMMENT_MARKER} === {title} ===")
    }
}

/// `#` for disabled, `##` for ignored, nothing for enabled.
pub fn entry_line(entry: &Entry) -> Option<String> {
    let identifier = entry.identifier.trim();
    if identifier.is_empty() {
        return None;
    }

    let prefix = if entry.ignored {
        "##"
    } else if !entry.enabled {
        "#"
    } else {
        ""
    };

    let metadata = entry.metadata.trim();
    if metadata.is_empty() {
        Some(format!("{prefix}{identifier}"))
    } else {
        Some(format!("{prefix}{identifier}{METADATA_SEPARATOR}{metadata}"))
    }
}
