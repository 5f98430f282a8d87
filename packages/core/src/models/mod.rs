//! Data Models
//!
//! This module contains the core data structures of a silo:
//!
//! - `Note` - a markdown file and its metadata, identified by path
//! - `TreeEntry` / `TreeSnapshot` - directory layout and its persisted form
//! - `Backlink` / `BacklinkMatch` - derived references between notes

mod backlink;
mod note;
pub mod tree;

pub use backlink::{Backlink, BacklinkMatch, LinePath};
pub use note::{Note, NoteUpdate, ValidationError};
pub use tree::{EntryKind, NoteMeta, TreeEntry, TreeSnapshot, SNAPSHOT_VERSION};
