//! Rename/Move Protocol
//!
//! A note's identity is its path, so renaming or moving it touches the store,
//! the tree, the backlink index, other notes' content and the disk. This
//! module holds the protocol's vocabulary and the pure state transforms;
//! `NoteService` drives the steps.
//!
//! # States
//!
//! `Idle → Validating → Persisting → Reindexing → Committed`. Any failure
//! returns the run to `Idle`; nothing of the in-memory identity change is
//! visible until `Committed`.
//!
//! # Steps
//!
//! Once validation passes an [`Intent`] is recorded in the journal and the
//! steps run strictly in order, each advancing [`Intent::completed`]:
//!
//! 1. rewrite references to the old title in other notes
//! 2. write the content to the new path
//! 3. persist the tree snapshot
//! 4. delete the old file
//! 5. swap the identity in store, tree and backlinks, navigate
//!
//! Every step is idempotent, so a journal entry can be replayed from its last
//! completed step after a crash or a storage failure.
//!
//! A run that fails before the new file is written is rolled back: rewritten
//! references are restored and the journal entry dropped, leaving the note
//! under its old identity. Later failures keep the entry for replay; the
//! owner may instead abandon it, which undoes the disk steps already taken.

use crate::db::TreeError;
use crate::fs::path::dir_path;
use crate::models::Note;
use crate::services::note_service::SiloState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of one protocol run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolState {
    Idle,
    Validating,
    Persisting,
    Reindexing,
    Committed,
}

impl ProtocolState {
    /// Forward transitions follow the declaration order one state at a time;
    /// any state may fall back to `Idle`.
    pub fn can_transition(self, to: ProtocolState) -> bool {
        use ProtocolState::*;
        matches!(
            (self, to),
            (Idle, Validating)
                | (Validating, Persisting)
                | (Persisting, Reindexing)
                | (Reindexing, Committed)
                | (Validating | Persisting | Reindexing, Idle)
        )
    }
}

/// Last completed step of a recorded intent, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolStep {
    Recorded,
    BacklinksUpdated,
    NewFileWritten,
    SnapshotWritten,
    OldFileDeleted,
    Committed,
}

impl fmt::Display for ProtocolStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolStep::Recorded => "recorded",
            ProtocolStep::BacklinksUpdated => "backlinks-updated",
            ProtocolStep::NewFileWritten => "new-file-written",
            ProtocolStep::SnapshotWritten => "snapshot-written",
            ProtocolStep::OldFileDeleted => "old-file-deleted",
            ProtocolStep::Committed => "committed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    Rename,
    Move,
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentKind::Rename => f.write_str("rename"),
            IntentKind::Move => f.write_str("move"),
        }
    }
}

/// A recorded identity change, persisted in the journal until committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub id: Uuid,
    pub kind: IntentKind,
    pub old_id: String,
    pub new_id: String,
    pub old_title: String,
    pub new_title: String,
    /// The note as it was when the intent was recorded
    pub note: Note,
    pub completed: ProtocolStep,
    /// Notes whose references were rewritten in step 1
    #[serde(default)]
    pub rewritten: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

impl Intent {
    pub fn rename(note: &Note, new_title: &str, new_id: &str) -> Self {
        Self::build(IntentKind::Rename, note, new_title, new_id)
    }

    pub fn relocate(note: &Note, new_id: &str) -> Self {
        Self::build(IntentKind::Move, note, &note.title, new_id)
    }

    fn build(kind: IntentKind, note: &Note, new_title: &str, new_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            old_id: note.id.clone(),
            new_id: new_id.to_string(),
            old_title: note.title.clone(),
            new_title: new_title.to_string(),
            note: note.clone(),
            completed: ProtocolStep::Recorded,
            rewritten: Vec::new(),
            recorded_at: Utc::now(),
        }
    }

    /// Directory the note lives in after the change.
    pub fn parent_dir(&self) -> String {
        dir_path(&self.new_id)
    }

    pub fn involves(&self, id: &str) -> bool {
        self.old_id == id || self.new_id == id
    }

    /// Identity-lock keys a run of this intent must hold.
    pub fn lock_keys(&self) -> Vec<String> {
        let mut keys = vec![path_key(&self.old_id), path_key(&self.new_id)];
        if self.kind == IntentKind::Rename {
            keys.push(title_key(&self.old_title));
            keys.push(title_key(&self.new_title));
        }
        keys.sort();
        keys.dedup();
        keys
    }

    /// The same change in the other direction, used to undo a swap.
    pub fn reversed(&self) -> Intent {
        Intent {
            old_id: self.new_id.clone(),
            new_id: self.old_id.clone(),
            old_title: self.new_title.clone(),
            new_title: self.old_title.clone(),
            ..self.clone()
        }
    }

    /// `source` under this intent's new identity.
    pub fn derive(&self, source: &Note) -> Note {
        match self.kind {
            IntentKind::Rename => source.renamed(&self.new_title, &self.new_id),
            IntentKind::Move => source.relocated(&self.new_id),
        }
    }
}

/// Lock key for a note path. Case-folded so two paths that differ only in
/// case, which may be the same file on disk, serialize.
pub fn path_key(id: &str) -> String {
    format!("path:{}", id.to_lowercase())
}

/// Lock key for a title.
pub fn title_key(title: &str) -> String {
    format!("title:{}", title.trim().to_lowercase())
}

/// Summary of a committed rename or move
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolReport {
    pub intent_id: Uuid,
    pub kind: IntentKind,
    pub old_id: String,
    pub new_id: String,
    pub old_title: String,
    pub new_title: String,
    /// Notes whose content was rewritten to point at the new title
    pub rewritten: Vec<String>,
}

impl ProtocolReport {
    pub(crate) fn new(intent: &Intent, rewritten: Vec<String>) -> Self {
        Self {
            intent_id: intent.id,
            kind: intent.kind,
            old_id: intent.old_id.clone(),
            new_id: intent.new_id.clone(),
            old_title: intent.old_title.clone(),
            new_title: intent.new_title.clone(),
            rewritten,
        }
    }
}

/// Result of a rename or move request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolOutcome {
    /// Nothing to do: same title, or same resolved path
    Unchanged,
    Committed(ProtocolReport),
}

impl ProtocolOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    pub fn report(&self) -> Option<&ProtocolReport> {
        match self {
            Self::Committed(report) => Some(report),
            Self::Unchanged => None,
        }
    }
}

/// State tracker for one protocol run.
#[derive(Debug)]
pub struct ProtocolRun {
    subject: String,
    state: ProtocolState,
}

impl ProtocolRun {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            state: ProtocolState::Idle,
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Move to `to`. Out-of-order transitions are ignored and logged.
    pub fn transition(&mut self, to: ProtocolState) -> bool {
        if !self.state.can_transition(to) {
            tracing::warn!(
                "Ignoring protocol transition {:?} -> {:?} for {}",
                self.state,
                to,
                self.subject
            );
            return false;
        }
        tracing::debug!("Protocol {:?} -> {:?} for {}", self.state, to, self.subject);
        self.state = to;
        true
    }

    /// Fall back to `Idle` after a failure.
    pub fn abort(&mut self) {
        if self.state != ProtocolState::Idle && self.state != ProtocolState::Committed {
            self.transition(ProtocolState::Idle);
        }
    }
}

/// Content to persist at the new path: the live note's content if it is
/// still in the store under either identity, else the recorded copy.
pub(crate) fn resolve_content(state: &SiloState, intent: &Intent) -> String {
    state
        .notes
        .get(&intent.old_id)
        .or_else(|| state.notes.get(&intent.new_id))
        .map(|note| note.content.clone())
        .unwrap_or_else(|| intent.note.content.clone())
}

/// The note as it should exist once `intent` is committed.
pub(crate) fn target_note(state: &SiloState, intent: &Intent) -> Note {
    if let Some(old) = state.notes.get(&intent.old_id) {
        intent.derive(old)
    } else if let Some(existing) = state.notes.get(&intent.new_id) {
        existing.clone()
    } else {
        intent.derive(&intent.note)
    }
}

/// Swap the identity in store, tree and backlink index. Idempotent: an
/// intent whose swap already happened only re-places the tree entry.
pub(crate) fn commit_intent(state: &mut SiloState, intent: &Intent) -> Result<Note, TreeError> {
    let note = target_note(state, intent);
    let parent = intent.parent_dir();
    state.tree.ensure_directory(&parent)?;
    state.tree.relocate(&intent.old_id, &note, &parent)?;

    state.notes.delete(&intent.old_id);
    state.backlinks.remove_source(&intent.old_id);
    state
        .backlinks
        .rebuild_references_for(&note.id, &note.content);
    state.notes.upsert(note.clone());
    Ok(note)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BacklinkIndex, NoteStore, NoteTreeIndex};

    fn state_with(note: &Note) -> SiloState {
        let mut tree = NoteTreeIndex::new("/silo");
        tree.upsert_tree_entry(note, "/silo").unwrap();
        let mut notes = NoteStore::new();
        notes.upsert(note.clone());
        SiloState {
            backlinks: BacklinkIndex::rebuild_all(notes.get_all()),
            notes,
            tree,
            current_note: None,
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut run = ProtocolRun::new("/silo/a.md");
        assert!(!run.transition(ProtocolState::Persisting));
        assert!(run.transition(ProtocolState::Validating));
        assert!(run.transition(ProtocolState::Persisting));
        run.abort();
        assert_eq!(run.state(), ProtocolState::Idle);

        for state in [
            ProtocolState::Validating,
            ProtocolState::Persisting,
            ProtocolState::Reindexing,
            ProtocolState::Committed,
        ] {
            assert!(run.transition(state));
        }
        run.abort();
        assert_eq!(run.state(), ProtocolState::Committed);
    }

    #[test]
    fn test_steps_are_ordered() {
        assert!(ProtocolStep::Recorded < ProtocolStep::BacklinksUpdated);
        assert!(ProtocolStep::NewFileWritten < ProtocolStep::SnapshotWritten);
        assert!(ProtocolStep::OldFileDeleted < ProtocolStep::Committed);
    }

    #[test]
    fn test_lock_keys() {
        let note = Note::new("/silo/Old.md", "Old", "");
        let rename = Intent::rename(&note, "New", "/silo/New.md");
        assert_eq!(
            rename.lock_keys(),
            vec!["path:/silo/new.md", "path:/silo/old.md", "title:new", "title:old"]
        );

        let moved = Intent::relocate(&note, "/silo/a/Old.md");
        assert_eq!(moved.lock_keys().len(), 2);
        assert_eq!(moved.new_title, "Old");
        assert_eq!(moved.parent_dir(), "/silo/a");
    }

    #[test]
    fn test_commit_intent_is_idempotent() {
        let note = Note::new("/silo/Old.md", "Old", "links to [[Other]]");
        let mut state = state_with(&note);
        let intent = Intent::rename(&note, "New", "/silo/New.md");

        let committed = commit_intent(&mut state, &intent).unwrap();
        assert_eq!(committed.id, "/silo/New.md");
        assert_eq!(committed.title, "New");
        assert!(!state.notes.contains("/silo/Old.md"));
        assert!(!state.tree.contains("/silo/Old.md"));
        assert_eq!(state.backlinks.sources_for("Other"), vec!["/silo/New.md"]);

        let again = commit_intent(&mut state, &intent).unwrap();
        assert_eq!(again.id, committed.id);
        assert_eq!(state.notes.len(), 1);
        assert_eq!(state.tree.children("/silo").len(), 1);
    }

    #[test]
    fn test_reversed_commit_restores_identity() {
        let note = Note::new("/silo/Old.md", "Old", "body");
        let mut state = state_with(&note);
        let intent = Intent::relocate(&note, "/silo/a/Old.md");
        commit_intent(&mut state, &intent).unwrap();

        let back = commit_intent(&mut state, &intent.reversed()).unwrap();
        assert_eq!(back.id, "/silo/Old.md");
        assert_eq!(back.content, "body");
        assert!(state.notes.contains("/silo/Old.md"));
        assert!(!state.tree.contains("/silo/a/Old.md"));
    }

    #[test]
    fn test_intent_serialization() {
        let note = Note::new("/silo/Old.md", "Old", "");
        let intent = Intent::rename(&note, "New", "/silo/New.md");
        let value = serde_json::to_value(&intent).unwrap();
        assert_eq!(value["kind"], "rename");
        assert_eq!(value["completed"], "recorded");
        assert_eq!(value["oldId"], "/silo/Old.md");
    }
}
