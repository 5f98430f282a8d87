//! Note Data Structures
//!
//! A `Note` is a markdown file on disk plus the metadata the app tracks for
//! it. Its identity *is* its file path: `id == file_path` at every committed
//! state, so renaming or moving a note never mutates it in place. Instead a
//! new `Note` is derived with [`Note::renamed`] or [`Note::relocated`] and the
//! old identity is removed.
//!
//! # Examples
//!
//! ```rust
//! use mdsilo_core::models::Note;
//!
//! let note = Note::new("/silo/Project Plan.md", "Project Plan", "# Goals");
//! assert_eq!(note.id, note.file_path);
//! assert!(!note.is_daily);
//!
//! let daily = Note::new("/silo/2024-03-01.md", "2024-03-01", " ");
//! assert!(daily.is_daily);
//! ```

use crate::fs::path::normalize_slash;
use crate::models::tree::NoteMeta;
use crate::utils::text::is_daily_title;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for Note operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Note id must not be empty")]
    EmptyId,

    #[error("Note id {id} does not match its file path {file_path}")]
    IdPathMismatch { id: String, file_path: String },

    #[error("Note title must not be empty")]
    EmptyTitle,

    #[error("Title '{title}' is already used by {existing_id}")]
    TitleConflict { title: String, existing_id: String },

    #[error("A note already exists at {path}")]
    PathConflict { path: String },

    #[error("Invalid note path: {0}")]
    InvalidPath(String),

    #[error("Title '{0}' contains a character reserved for paths or links")]
    InvalidTitle(String),
}

impl ValidationError {
    pub fn title_conflict(title: impl Into<String>, existing_id: impl Into<String>) -> Self {
        Self::TitleConflict {
            title: title.into(),
            existing_id: existing_id.into(),
        }
    }

    pub fn path_conflict(path: impl Into<String>) -> Self {
        Self::PathConflict { path: path.into() }
    }

    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn invalid_title(title: impl Into<String>) -> Self {
        Self::InvalidTitle(title.into())
    }
}

/// A single note.
///
/// # Fields
///
/// - `id`: Normalized file path, the note's identity
/// - `title`: Display title, unique case-insensitively among non-wiki notes
/// - `content`: Raw markdown
/// - `file_path`: Always equal to `id`
/// - `is_pub`: Published flag
/// - `is_daily`: Title is a date (`YYYY-M-D`)
/// - `is_wiki`: Wiki notes are exempt from title uniqueness
/// - `not_process`: Dirty marker, set on every content edit until the
///   content is processed again
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_pub: bool,
    #[serde(default)]
    pub is_daily: bool,
    #[serde(default)]
    pub is_wiki: bool,
    #[serde(default)]
    pub not_process: bool,
}

impl Note {
    /// Create a note stored at `path`.
    ///
    /// The path is normalized to forward slashes and used for both `id` and
    /// `file_path`. `is_daily` is derived from the title.
    pub fn new(path: impl AsRef<str>, title: impl Into<String>, content: impl Into<String>) -> Self {
        let path = normalize_slash(path.as_ref());
        let title = title.into();
        let now = Utc::now();
        Self {
            id: path.clone(),
            is_daily: is_daily_title(&title),
            title,
            content: content.into(),
            file_path: path,
            created_at: now,
            updated_at: now,
            is_pub: false,
            is_wiki: false,
            not_process: false,
        }
    }

    /// Builder-style wiki flag.
    pub fn with_wiki(mut self, is_wiki: bool) -> Self {
        self.is_wiki = is_wiki;
        self
    }

    /// Copy of this note under a new identity, title unchanged.
    pub fn relocated(&self, new_path: &str) -> Self {
        let path = normalize_slash(new_path);
        Self {
            id: path.clone(),
            file_path: path,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Copy of this note with a new title and identity.
    pub fn renamed(&self, new_title: &str, new_path: &str) -> Self {
        let mut note = self.relocated(new_path);
        note.title = new_title.to_string();
        note.is_daily = is_daily_title(new_title);
        note
    }

    /// Replace the content and mark the note dirty.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.not_process = true;
        self.updated_at = Utc::now();
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::EmptyId);
        }
        if self.id != self.file_path {
            return Err(ValidationError::IdPathMismatch {
                id: self.id.clone(),
                file_path: self.file_path.clone(),
            });
        }
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        Ok(())
    }

    /// Metadata persisted in the tree snapshot (everything but content).
    pub fn meta(&self) -> NoteMeta {
        NoteMeta {
            id: self.id.clone(),
            title: self.title.clone(),
            file_path: self.file_path.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            is_pub: self.is_pub,
            is_daily: self.is_daily,
            is_wiki: self.is_wiki,
        }
    }
}

/// Partial flag update for an existing note.
///
/// Title and content changes go through the rename protocol and
/// `update_content` respectively, since both have side effects beyond the
/// note itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_pub: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_wiki: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_daily: Option<bool>,
}

impl NoteUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pub(mut self, is_pub: bool) -> Self {
        self.is_pub = Some(is_pub);
        self
    }

    pub fn with_wiki(mut self, is_wiki: bool) -> Self {
        self.is_wiki = Some(is_wiki);
        self
    }

    pub fn with_daily(mut self, is_daily: bool) -> Self {
        self.is_daily = Some(is_daily);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.is_pub.is_none() && self.is_wiki.is_none() && self.is_daily.is_none()
    }

    /// Apply to `note`, returning whether anything changed.
    pub fn apply(&self, note: &mut Note) -> bool {
        let before = (note.is_pub, note.is_wiki, note.is_daily);
        if let Some(is_pub) = self.is_pub {
            note.is_pub = is_pub;
        }
        if let Some(is_wiki) = self.is_wiki {
            note.is_wiki = is_wiki;
        }
        if let Some(is_daily) = self.is_daily {
            note.is_daily = is_daily;
        }
        let changed = before != (note.is_pub, note.is_wiki, note.is_daily);
        if changed {
            note.updated_at = Utc::now();
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_note_uses_path_as_identity() {
        let note = Note::new("C:\\silo\\Ideas.md", "Ideas", "");
        assert_eq!(note.id, "C:/silo/Ideas.md");
        assert_eq!(note.file_path, note.id);
        assert!(note.validate().is_ok());
    }

    #[test]
    fn test_renamed_derives_new_identity() {
        let mut note = Note::new("/silo/Old.md", "Old", "body");
        note.is_pub = true;
        let renamed = note.renamed("2024-01-02", "/silo/2024-01-02.md");

        assert_eq!(renamed.id, "/silo/2024-01-02.md");
        assert_eq!(renamed.file_path, renamed.id);
        assert_eq!(renamed.title, "2024-01-02");
        assert!(renamed.is_daily);
        assert!(renamed.is_pub);
        assert_eq!(renamed.content, "body");
        // Original untouched
        assert_eq!(note.id, "/silo/Old.md");
    }

    #[test]
    fn test_validate_rejects_broken_identity() {
        let mut note = Note::new("/silo/A.md", "A", "");
        note.file_path = "/silo/B.md".to_string();
        assert!(matches!(
            note.validate(),
            Err(ValidationError::IdPathMismatch { .. })
        ));

        let blank = Note::new("/silo/B.md", "  ", "");
        assert_eq!(blank.validate(), Err(ValidationError::EmptyTitle));
    }

    #[test]
    fn test_set_content_marks_dirty() {
        let mut note = Note::new("/silo/A.md", "A", "");
        assert!(!note.not_process);
        note.set_content("hello");
        assert!(note.not_process);
        assert_eq!(note.content, "hello");
    }

    #[test]
    fn test_note_update_apply() {
        let mut note = Note::new("/silo/A.md", "A", "");
        assert!(!NoteUpdate::new().apply(&mut note));
        assert!(NoteUpdate::new().with_pub(true).apply(&mut note));
        assert!(note.is_pub);
        assert!(!NoteUpdate::new().with_pub(true).apply(&mut note));
    }

    #[test]
    fn test_serde_field_names() {
        let note = Note::new("/silo/A.md", "A", "x");
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["file_path"], "/silo/A.md");
        assert_eq!(value["not_process"], false);
    }
}
