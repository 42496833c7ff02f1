//! # Debloat Codec
//!
//! The `packages.txt` document: a header of free-form lines followed by
//! `# === Title ===` groups, each holding one package identifier per line.
//! A leading `#` disables an entry, `##` marks it ignored.
//!
//! The codec is total: every input parses, and `parse(serialize(d)) == d` for
//! every document `parse` can produce.

pub mod model;
pub mod parser;
pub mod serializer;

pub use model::{Counts, Document, Entry, EntryState, Group};
pub use parser::parse;
pub use serializer::serialize;

/// Comment marker used for disabled/ignored entries and group markers.
pub const COMMENT_MARKER: char = '#';

/// Separator emitted between an identifier and its metadata.
pub const METADATA_SEPARATOR: &str = " # ";

/// Display name for a group whose marker carries no title.
pub const UNTITLED_GROUP: &str = "未分组";
