//! Tree entry and snapshot types
//!
//! The tree mirrors the silo directory layout: directory entries keyed by
//! their path and note entries keyed by note id. A [`TreeSnapshot`] is the
//! persisted form, one JSON document per root directory, rewritten wholesale
//! after every structural mutation.

use crate::models::Note;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Dir,
    Note,
}

/// One node of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeEntry {
    /// Directory path or note id
    pub id: String,
    /// Note title, or the directory's final path component
    pub title: String,
    pub kind: EntryKind,
    /// Containing directory; `None` only for the root directory
    pub parent: Option<String>,
}

impl TreeEntry {
    pub fn dir(id: impl Into<String>, title: impl Into<String>, parent: Option<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: EntryKind::Dir,
            parent,
        }
    }

    pub fn note(note: &Note, parent: impl Into<String>) -> Self {
        Self {
            id: note.id.clone(),
            title: note.title.clone(),
            kind: EntryKind::Note,
            parent: Some(parent.into()),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// Note metadata as persisted in the snapshot. Content lives in the note's
/// own file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteMeta {
    pub id: String,
    pub title: String,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_pub: bool,
    #[serde(default)]
    pub is_daily: bool,
    #[serde(default)]
    pub is_wiki: bool,
}

impl NoteMeta {
    /// Rehydrate a note from its metadata and file content.
    pub fn into_note(self, content: String) -> Note {
        Note {
            id: self.id,
            title: self.title,
            content,
            file_path: self.file_path,
            created_at: self.created_at,
            updated_at: self.updated_at,
            is_pub: self.is_pub,
            is_daily: self.is_daily,
            is_wiki: self.is_wiki,
            not_process: false,
        }
    }
}

/// Persisted tree for one root directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    pub root_dir: String,
    pub saved_at: DateTime<Utc>,
    pub entries: Vec<TreeEntry>,
    pub notes: Vec<NoteMeta>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl TreeSnapshot {
    pub fn new(root_dir: impl Into<String>, entries: Vec<TreeEntry>, notes: Vec<NoteMeta>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            root_dir: root_dir.into(),
            saved_at: Utc::now(),
            entries,
            notes,
        }
    }

    /// Look up persisted metadata for a note id.
    pub fn note_meta(&self, id: &str) -> Option<&NoteMeta> {
        self.notes.iter().find(|meta| meta.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serialization_contract() {
        let note = Note::new("/silo/A.md", "A", "body");
        let snapshot = TreeSnapshot::new(
            "/silo",
            vec![
                TreeEntry::dir("/silo", "silo", None),
                TreeEntry::note(&note, "/silo"),
            ],
            vec![note.meta()],
        );

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["rootDir"], "/silo");
        assert_eq!(value["version"], 1);
        assert_eq!(value["entries"][0]["kind"], "dir");
        assert_eq!(value["entries"][1]["kind"], "note");
        assert_eq!(value["entries"][1]["parent"], "/silo");
        assert!(value["notes"][0].get("content").is_none());

        let parsed: TreeSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_meta_into_note() {
        let mut note = Note::new("/silo/A.md", "A", "");
        note.is_wiki = true;
        let restored = note.meta().into_note("loaded".to_string());
        assert_eq!(restored.id, note.id);
        assert!(restored.is_wiki);
        assert_eq!(restored.content, "loaded");
        assert!(!restored.not_process);
    }
}
