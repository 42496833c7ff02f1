//! # Debloat Core
//!
//! The editor session behind the WebUI: load the package list through the
//! root manager bridge (or the read-only static copy), let the user toggle
//! entries, write the document back and optionally run the apply script.

pub mod commands;
pub mod config;
pub mod editor;
pub mod error;
pub mod logging;
pub mod source;
pub mod status;
pub mod steplog;

pub use config::{EditorConfig, ReadMode, SaveStrategy};
pub use editor::{ApplyMode, ApplyOutcome, Editor, LoadReport, LoadSource, SaveReport};
pub use error::EditorError;
pub use source::{HttpSource, StaticSource};
pub use status::{Status, StatusSink, TracingStatus};
pub use steplog::{Step, StepLog};

pub use debloat_bridge::{Bridge, CommandRunner, DiscoveryConfig, HostGlobals};
pub use debloat_codec::{Counts, Document, Entry, EntryState, Group};
