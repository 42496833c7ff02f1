//! Document model.
//!
//! A `Document` is rebuilt from scratch on every load. The UI only ever flips
//! `Entry::enabled` in place; everything else is carried through untouched so
//! the next save regenerates the same text.

use serde::{Deserialize, Serialize};

use crate::UNTITLED_GROUP;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Raw lines before the first group marker.
    pub header: Vec<String>,
    /// Groups in file order (also the display and regeneration order).
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Marker text with the leading `#` marks stripped, e.g. `=== Core ===`.
    pub title: String,
    /// Non-entry lines of the group, verbatim.
    pub preamble: Vec<String>,
    pub items: Vec<Entry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub identifier: String,
    /// Trailing text after the separator; empty when absent.
    pub metadata: String,
    pub enabled: bool,
    /// Two stacked markers: kept on save, hidden from the editor.
    pub ignored: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryState {
    Enabled,
    Disabled,
    Ignored,
}

/// Enabled/disabled tallies. Ignored entries never count as either.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub enabled: usize,
    pub disabled: usize,
    pub ignored: usize,
}

impl Counts {
    pub fn visible(&self) -> usize {
        self.enabled + self.disabled
    }

    fn add(&mut self, entry: &Entry) {
        match entry.state() {
            EntryState::Enabled => self.enabled += 1,
            EntryState::Disabled => self.disabled += 1,
            EntryState::Ignored => self.ignored += 1,
        }
    }
}

impl Entry {
    pub fn new(identifier: impl Into<String>, enabled: bool) -> Self {
        Self {
            identifier: identifier.into(),
            metadata: String::new(),
            enabled,
            ignored: false,
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }

    pub fn ignored(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            metadata: String::new(),
            enabled: false,
            ignored: true,
        }
    }

    pub fn state(&self) -> EntryState {
        if self.ignored {
            EntryState::Ignored
        } else if self.enabled {
            EntryState::Enabled
        } else {
            EntryState::Disabled
        }
    }

    /// First whitespace-delimited token of the metadata.
    pub fn label(&self) -> &str {
        self.metadata.split_whitespace().next().unwrap_or("")
    }

    /// Metadata after the label.
    pub fn description(&self) -> &str {
        let trimmed = self.metadata.trim();
        match trimmed.find(char::is_whitespace) {
            Some(idx) => trimmed[idx..].trim(),
            None => "",
        }
    }
}

impl Group {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Title without the surrounding `===` and whitespace.
    pub fn display_title(&self) -> &str {
        let trimmed = self
            .title
            .trim_matches(|c: char| c == '=' || c.is_whitespace());
        if trimmed.is_empty() {
            UNTITLED_GROUP
        } else {
            trimmed
        }
    }

    /// Entries shown by the editor (ignored ones are skipped).
    pub fn visible_items(&self) -> impl Iterator<Item = (usize, &Entry)> {
        self.items.iter().enumerate().filter(|(_, e)| !e.ignored)
    }

    pub fn counts(&self) -> Counts {
        let mut counts = Counts::default();
        for entry in &self.items {
            counts.add(entry);
        }
        counts
    }
}

impl Document {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn counts(&self) -> Counts {
        let mut counts = Counts::default();
        for entry in self.groups.iter().flat_map(|g| g.items.iter()) {
            counts.add(entry);
        }
        counts
    }

    /// Flip one entry. Returns false for unknown positions and ignored entries.
    pub fn set_enabled(&mut self, group: usize, item: usize, enabled: bool) -> bool {
        match self
            .groups
            .get_mut(group)
            .and_then(|g| g.items.get_mut(item))
        {
            Some(entry) if !entry.ignored => {
                entry.enabled = enabled;
                true
            }
            _ => false,
        }
    }

    /// Flip every visible entry of a group; returns how many changed.
    pub fn set_group_enabled(&mut self, group: usize, enabled: bool) -> usize {
        let Some(group) = self.groups.get_mut(group) else {
            return 0;
        };
        let mut changed = 0;
        for entry in group.items.iter_mut().filter(|e| !e.ignored) {
            if entry.enabled != enabled {
                entry.enabled = enabled;
                changed += 1;
            }
        }
        changed
    }

    /// First non-ignored entry with this identifier, in file order.
    pub fn find_entry_mut(&mut self, identifier: &str) -> Option<&mut Entry> {
        self.groups
            .iter_mut()
            .flat_map(|g| g.items.iter_mut())
            .find(|e| !e.ignored && e.identifier == identifier)
    }
}
