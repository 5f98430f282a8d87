//! Note Service - Silo State Manager
//!
//! This module provides the main business logic layer of a silo:
//!
//! - Loading a silo from disk (snapshot, note files, intent journal)
//! - Note and directory creation, content edits, flag updates, deletion
//! - The rename/move protocol (see [`rename_protocol`](super::rename_protocol))
//! - Link creation, link search, link opening and backlink listing
//! - Title search
//!
//! # State
//!
//! `NoteService` owns the [`SiloState`] (note store, tree index, backlink
//! index, current view) behind a `tokio::sync::RwLock`. Readers only ever see
//! committed states: every mutation performs its disk writes first and then
//! applies the in-memory change under one write lock.
//!
//! The service is cheap to clone; clones share state. It is created with
//! [`NoteService::new`] or [`NoteService::open`] and passed to whatever needs
//! it, never stored in a global.
//!
//! # Ordering
//!
//! Structural mutations hold a write gate while they write the tree snapshot
//! and apply the matching in-memory change, so snapshots are written in the
//! same order as the changes they describe. Renames and moves of different
//! notes interleave freely between steps; the same identity is protected by
//! [`IdentityLocks`].
//!
//! Read-modify-write of one note's content (edits, link rewrites, the new
//! file step and the commit of a rename) runs under that note's
//! [`ContentLocks`] entry. Lock order is content lock, then write gate, then
//! state.

use crate::config::SiloConfig;
use crate::db::{BacklinkIndex, DomainEvent, NoteStore, NoteTreeIndex, TreeError};
use crate::fs::path::{dir_path, file_name, join_path, normalize_dir, normalize_slash, same_path_ci};
use crate::fs::FileSystem;
use crate::models::{Backlink, BacklinkMatch, EntryKind, Note, NoteMeta, NoteUpdate, TreeSnapshot, ValidationError};
use crate::services::editor_events::{
    EditorEvent, EditorResponse, LinkAction, LinkSuggestion, MoveOption, MoveTarget,
};
use crate::services::error::NoteServiceError;
use crate::services::identity_lock::{ContentLocks, IdentityGuard, IdentityLocks};
use crate::services::journal::IntentJournal;
use crate::services::rename_protocol::{
    commit_intent, path_key, resolve_content, target_note, title_key, Intent, IntentKind,
    ProtocolOutcome, ProtocolReport, ProtocolRun, ProtocolState, ProtocolStep,
};
use crate::services::search::{NoteSearch, SearchOptions, SearchResults};
use crate::utils::links::{href_to_title, rewrite_links, title_to_href};
use crate::utils::text::{ci_string_equal, is_url};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

/// Capacity of the domain event broadcast channel
const DOMAIN_EVENT_CHANNEL_CAPACITY: usize = 128;

/// File extension of note files
const NOTE_EXTENSION: &str = "md";

/// Characters that end or split a wiki link target
const RESERVED_TITLE_CHARS: [char; 4] = ['|', '#', '[', ']'];

/// In-memory state of one silo
#[derive(Debug, Clone)]
pub struct SiloState {
    pub notes: NoteStore,
    pub tree: NoteTreeIndex,
    pub backlinks: BacklinkIndex,
    /// Note shown in the current view
    pub current_note: Option<String>,
}

impl SiloState {
    pub fn new(root_dir: &str) -> Self {
        Self {
            notes: NoteStore::new(),
            tree: NoteTreeIndex::new(root_dir),
            backlinks: BacklinkIndex::new(),
            current_note: None,
        }
    }
}

/// Tree change folded into a snapshot before it is applied in memory
enum TreeChange<'a> {
    None,
    UpsertNote { note: &'a Note, parent: &'a str },
    EnsureDir(&'a str),
    Remove { id: &'a str, recursive: bool },
    /// Drop a pending intent being rolled back
    Revert(&'a Intent),
}

/// A note rewritten by a rename, kept so a failed run can put it back
struct RewriteRecord {
    id: String,
    before: Option<String>,
    after: Option<String>,
}

impl RewriteRecord {
    /// Only the id is known, e.g. from the journal.
    fn recorded(id: &str) -> Self {
        Self {
            id: id.to_string(),
            before: None,
            after: None,
        }
    }
}

#[derive(Clone)]
pub struct NoteService {
    config: Arc<SiloConfig>,
    fs: Arc<dyn FileSystem>,
    state: Arc<RwLock<SiloState>>,
    journal: Arc<IntentJournal>,
    locks: IdentityLocks,
    content_locks: ContentLocks,
    write_gate: Arc<Mutex<()>>,
    event_tx: broadcast::Sender<DomainEvent>,
}

impl NoteService {
    /// Create a service for an empty silo.
    ///
    /// Nothing is read from disk; use [`open`](Self::open) to load an
    /// existing silo.
    pub fn new(config: SiloConfig, fs: Arc<dyn FileSystem>) -> Result<Self, NoteServiceError> {
        config.validate().map_err(NoteServiceError::InvalidConfig)?;
        let journal = IntentJournal::new(Arc::clone(&fs), config.journal_path());
        let state = SiloState::new(&config.root_dir);
        Ok(Self::assemble(config, fs, state, journal))
    }

    /// Load a silo: tree snapshot, every note file it lists, the backlink
    /// index and the intent journal.
    ///
    /// Notes whose file cannot be read, or whose metadata does not describe
    /// a valid note at its own path, are dropped from the tree with a
    /// warning. Pending intents are loaded but not replayed; call
    /// [`resume_pending`](Self::resume_pending) for that.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use mdsilo_core::{LocalFileSystem, NoteService, SiloConfig};
    /// use std::sync::Arc;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let service = NoteService::open(
    ///     SiloConfig::new("/home/me/mdsilo"),
    ///     Arc::new(LocalFileSystem::new()),
    /// )
    /// .await?;
    /// let replayed = service.resume_pending().await?;
    /// println!("replayed {} interrupted renames", replayed.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn open(config: SiloConfig, fs: Arc<dyn FileSystem>) -> Result<Self, NoteServiceError> {
        config.validate().map_err(NoteServiceError::InvalidConfig)?;
        let root = config.root_dir.clone();
        let mut state = SiloState::new(&root);

        let snapshot = fs
            .read_json_file(&root)
            .await
            .map_err(|e| NoteServiceError::storage("read tree snapshot", e))?;

        if let Some(snapshot) = snapshot {
            let mut tree = NoteTreeIndex::restore(&root, &snapshot.entries);
            let note_ids: Vec<String> = tree.note_ids().into_iter().map(String::from).collect();
            for id in note_ids {
                match fs.read_file(&id).await {
                    Ok(content) => {
                        let note = match snapshot.note_meta(&id) {
                            Some(meta) => meta.clone().into_note(content),
                            None => Note::new(&id, title_from_path(&id), content),
                        };
                        if let Err(e) = note.validate() {
                            tracing::warn!("Dropping note {} from tree, invalid metadata: {}", id, e);
                            let _ = tree.delete_tree_entry(&id, false);
                            continue;
                        }
                        state.notes.upsert(note);
                    }
                    Err(e) => {
                        tracing::warn!("Dropping note {} from tree, file unreadable: {}", id, e);
                        let _ = tree.delete_tree_entry(&id, false);
                    }
                }
            }
            state.tree = tree;
        }
        state.backlinks = BacklinkIndex::rebuild_all(state.notes.get_all());

        let journal = IntentJournal::load(Arc::clone(&fs), config.journal_path())
            .await
            .map_err(|e| NoteServiceError::storage("read intent journal", e))?;

        tracing::info!("Opened silo {} with {} notes", root, state.notes.len());
        Ok(Self::assemble(config, fs, state, journal))
    }

    fn assemble(
        config: SiloConfig,
        fs: Arc<dyn FileSystem>,
        state: SiloState,
        journal: IntentJournal,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(DOMAIN_EVENT_CHANNEL_CAPACITY);
        Self {
            config: Arc::new(config),
            fs,
            state: Arc::new(RwLock::new(state)),
            journal: Arc::new(journal),
            locks: IdentityLocks::new(),
            content_locks: ContentLocks::new(),
            write_gate: Arc::new(Mutex::new(())),
            event_tx,
        }
    }

    pub fn config(&self) -> &SiloConfig {
        &self.config
    }

    /// Subscribe to domain events
    ///
    /// Events are only sent for committed changes.
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.event_tx.subscribe()
    }

    /// Emit a domain event to all subscribers
    ///
    /// Ignores errors if no subscribers.
    fn emit_event(&self, event: DomainEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Read the committed state.
    pub async fn select<R>(&self, f: impl FnOnce(&SiloState) -> R) -> R {
        let state = self.state.read().await;
        f(&state)
    }

    pub async fn get_note(&self, id: &str) -> Option<Note> {
        self.state.read().await.notes.get(id).cloned()
    }

    pub async fn find_by_title(&self, title: &str) -> Option<Note> {
        self.state.read().await.notes.find_by_title(title).cloned()
    }

    pub async fn current_note(&self) -> Option<Note> {
        let state = self.state.read().await;
        state
            .current_note
            .as_deref()
            .and_then(|id| state.notes.get(id))
            .cloned()
    }

    /// Point the current view at note `id`.
    pub async fn navigate(&self, id: &str) -> Result<(), NoteServiceError> {
        {
            let mut state = self.state.write().await;
            if !state.notes.contains(id) {
                return Err(NoteServiceError::note_not_found(id));
            }
            state.current_note = Some(id.to_string());
        }
        self.emit_event(DomainEvent::Navigated {
            id: Some(id.to_string()),
        });
        Ok(())
    }

    // ========================================================================
    // Creation and edits
    // ========================================================================

    /// Create a note titled `title` in directory `parent_dir`.
    ///
    /// An empty title becomes `Untitled` (or `Untitled N`). The file is
    /// written before the note appears in the store.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` when another non-wiki note already has the title
    ///   or a note already lives at the derived path
    /// - `Tree` when `parent_dir` is not a directory of the silo
    /// - `Storage` when the file or snapshot write fails
    pub async fn create_note(
        &self,
        parent_dir: &str,
        title: &str,
        content: &str,
    ) -> Result<Note, NoteServiceError> {
        let parent_dir = normalize_dir(parent_dir);
        let title = {
            let state = self.state.read().await;
            self.resolve_title(&state, title, None)
        };
        check_title_chars(&title)?;
        let path = note_path(&parent_dir, &title);
        let _guard = self.acquire(vec![path_key(&path), title_key(&title)])?;

        {
            let state = self.state.read().await;
            check_directory(&state.tree, &parent_dir)?;
            if let Some(existing) = state.notes.title_conflict(&title, None) {
                return Err(ValidationError::title_conflict(&title, &existing.id).into());
            }
            if path_taken(&state, &path, None) {
                return Err(ValidationError::path_conflict(&path).into());
            }
        }
        if let Some(owner) = self.pending_title_owner(&title, None).await {
            return Err(ValidationError::title_conflict(&title, owner).into());
        }

        let note = Note::new(&path, &title, content);
        self.fs
            .write_file(&path, content)
            .await
            .map_err(|e| NoteServiceError::storage(format!("write note {}", path), e))?;

        {
            let _gate = self.write_gate.lock().await;
            self.write_snapshot(TreeChange::UpsertNote {
                note: &note,
                parent: &parent_dir,
            })
            .await?;

            let mut state = self.state.write().await;
            state.tree.upsert_tree_entry(&note, &parent_dir)?;
            state.backlinks.rebuild_references_for(&note.id, &note.content);
            state.notes.upsert(note.clone());
        }

        tracing::info!("Created note {} ({})", note.title, note.id);
        self.emit_event(DomainEvent::NoteCreated(note.clone()));
        self.emit_tree_changed();
        Ok(note)
    }

    /// Create directory `name` inside `parent_dir`, returning its path.
    pub async fn create_directory(&self, parent_dir: &str, name: &str) -> Result<String, NoteServiceError> {
        let parent_dir = normalize_dir(parent_dir);
        let name = name.trim();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(ValidationError::invalid_path(name).into());
        }
        let path = join_path(&parent_dir, &[name]);
        let _guard = self.acquire(vec![path_key(&path)])?;

        {
            let state = self.state.read().await;
            check_directory(&state.tree, &parent_dir)?;
            if let Some(existing) = state.tree.get(&path) {
                if existing.is_dir() {
                    return Ok(path);
                }
                return Err(ValidationError::path_conflict(&path).into());
            }
        }

        self.fs
            .create_dir(&path)
            .await
            .map_err(|e| NoteServiceError::storage(format!("create directory {}", path), e))?;

        {
            let _gate = self.write_gate.lock().await;
            self.write_snapshot(TreeChange::EnsureDir(&path)).await?;
            self.state.write().await.tree.ensure_directory(&path)?;
        }

        tracing::info!("Created directory {}", path);
        self.emit_tree_changed();
        Ok(path)
    }

    /// Replace the content of note `id`.
    ///
    /// Sets the dirty flag, rebuilds the note's outgoing references and
    /// writes the note file and the snapshot. A note whose rename or move was
    /// interrupted stays editable under its current identity.
    pub async fn update_content(&self, id: &str, content: &str) -> Result<Note, NoteServiceError> {
        let _guard = self.acquire(vec![path_key(id)])?;
        let _content = self.content_locks.lock(&path_key(id)).await;

        let (mut note, parent) = {
            let state = self.state.read().await;
            let note = state
                .notes
                .get(id)
                .cloned()
                .ok_or_else(|| NoteServiceError::note_not_found(id))?;
            let parent = parent_dir_of(&state.tree, id);
            (note, parent)
        };
        note.set_content(content);
        self.write_note_content(id, content).await?;

        {
            let _gate = self.write_gate.lock().await;
            self.write_snapshot(TreeChange::UpsertNote {
                note: &note,
                parent: &parent,
            })
            .await?;

            let mut state = self.state.write().await;
            state.backlinks.rebuild_references_for(&note.id, &note.content);
            state.notes.upsert(note.clone());
        }

        tracing::debug!("Updated content of {}", id);
        self.emit_event(DomainEvent::NoteUpdated(note.clone()));
        Ok(note)
    }

    /// Update the flags of note `id`.
    ///
    /// Clearing `is_wiki` re-enters the note into title uniqueness, so it is
    /// rejected when another non-wiki note already uses the title.
    pub async fn update_note(&self, id: &str, update: NoteUpdate) -> Result<Note, NoteServiceError> {
        let _guard = self.acquire(vec![path_key(id)])?;
        let _content = self.content_locks.lock(&path_key(id)).await;

        let (mut note, parent) = {
            let state = self.state.read().await;
            let note = state
                .notes
                .get(id)
                .cloned()
                .ok_or_else(|| NoteServiceError::note_not_found(id))?;
            if note.is_wiki && update.is_wiki == Some(false) {
                if let Some(existing) = state.notes.title_conflict(&note.title, Some(id)) {
                    return Err(ValidationError::title_conflict(&note.title, &existing.id).into());
                }
            }
            (note, parent_dir_of(&state.tree, id))
        };

        if !update.apply(&mut note) {
            return Ok(note);
        }

        {
            let _gate = self.write_gate.lock().await;
            self.write_snapshot(TreeChange::UpsertNote {
                note: &note,
                parent: &parent,
            })
            .await?;
            self.state.write().await.notes.upsert(note.clone());
        }

        self.emit_event(DomainEvent::NoteUpdated(note.clone()));
        Ok(note)
    }

    /// Clear the dirty flag of note `id` once its content has been processed.
    pub async fn mark_processed(&self, id: &str) -> Result<(), NoteServiceError> {
        let mut state = self.state.write().await;
        let note = state
            .notes
            .get_mut(id)
            .ok_or_else(|| NoteServiceError::note_not_found(id))?;
        note.not_process = false;
        Ok(())
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Delete note `id`.
    ///
    /// References to the note in other notes are left as they are and
    /// resolve as unresolved links until a note with that title exists
    /// again. Deleting a missing note is a no-op.
    pub async fn delete_note(&self, id: &str) -> Result<Vec<String>, NoteServiceError> {
        self.delete_entry(id, false).await
    }

    /// Delete a note or directory.
    ///
    /// A non-empty directory requires `recursive`; without it the call fails
    /// with a structural violation before anything is touched. An unfinished
    /// rename or move of a removed note is abandoned first. Returns the ids
    /// of the removed notes.
    pub async fn delete_entry(&self, id: &str, recursive: bool) -> Result<Vec<String>, NoteServiceError> {
        let id = normalize_dir(id);
        let Some((mut is_dir, mut removed_notes)) = self.plan_delete(&id, recursive).await? else {
            return Ok(Vec::new());
        };

        let mut abandoned = false;
        for note_id in &removed_notes {
            abandoned |= self.abandon_pending(note_id).await?.is_some();
        }
        if abandoned {
            let Some(plan) = self.plan_delete(&id, recursive).await? else {
                return Ok(Vec::new());
            };
            (is_dir, removed_notes) = plan;
        }

        let mut keys: Vec<String> = removed_notes.iter().map(|note_id| path_key(note_id)).collect();
        keys.push(path_key(&id));
        keys.sort();
        keys.dedup();
        let _guard = self.acquire(keys.clone())?;
        // Sorted, so concurrent deletes cannot deadlock
        let mut content_guards = Vec::with_capacity(keys.len());
        for key in &keys {
            content_guards.push(self.content_locks.lock(key).await);
        }

        let result = if is_dir {
            self.fs.delete_dir(&id).await
        } else {
            self.fs.delete_file(&id).await
        };
        match result {
            Ok(()) => {}
            Err(e) if e.is_not_found() => tracing::debug!("{} already gone from disk", id),
            Err(e) => return Err(NoteServiceError::storage(format!("delete {}", id), e)),
        }

        let navigated_away = {
            let _gate = self.write_gate.lock().await;
            self.write_snapshot(TreeChange::Remove {
                id: &id,
                recursive,
            })
            .await?;

            let mut state = self.state.write().await;
            state.tree.delete_tree_entry(&id, recursive)?;
            for note_id in &removed_notes {
                state.notes.delete(note_id);
                state.backlinks.remove_source(note_id);
            }
            let current_removed = state
                .current_note
                .as_ref()
                .is_some_and(|current| removed_notes.contains(current));
            if current_removed {
                state.current_note = None;
            }
            current_removed
        };

        tracing::info!("Deleted {} ({} notes)", id, removed_notes.len());
        for note_id in &removed_notes {
            self.emit_event(DomainEvent::NoteDeleted {
                id: note_id.clone(),
            });
        }
        self.emit_tree_changed();
        if navigated_away {
            self.emit_event(DomainEvent::Navigated { id: None });
        }
        Ok(removed_notes)
    }

    /// Whether `id` is a directory and the notes deleting it would remove.
    /// `None` when `id` is not in the tree.
    async fn plan_delete(&self, id: &str, recursive: bool) -> Result<Option<(bool, Vec<String>)>, NoteServiceError> {
        let state = self.state.read().await;
        let Some(entry) = state.tree.get(id) else {
            tracing::debug!("Delete of {} skipped, not in tree", id);
            return Ok(None);
        };
        let is_dir = entry.is_dir();
        // Dry run on a copy surfaces structural violations up front
        let removed = state.tree.clone().delete_tree_entry(id, recursive)?;
        let notes = removed
            .into_iter()
            .filter(|entry| entry.kind == EntryKind::Note)
            .map(|entry| entry.id)
            .collect();
        Ok(Some((is_dir, notes)))
    }

    // ========================================================================
    // Rename / move protocol
    // ========================================================================

    /// Rename note `id` to `new_title`.
    ///
    /// The new identity is `<same directory>/<new title>.md`. Every reference
    /// to the old title in other notes is rewritten, then the content is
    /// written to the new path, the snapshot is persisted, the old file is
    /// deleted and the store, tree and backlink index switch to the new
    /// identity. The current view follows the note.
    ///
    /// An empty title becomes `Untitled` (or `Untitled N`). Wiki notes skip
    /// the title uniqueness check. Titles may not contain path separators or
    /// the characters `|`, `#`, `[` and `]`, which would break links to them.
    ///
    /// Renaming again to the title of an interrupted rename resumes it; any
    /// other rename or move of the note abandons the interrupted one first.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` on a title or path collision; nothing changes
    /// - `IdentityBusy` when the note or either title is in use by another
    ///   rename or move
    /// - `ProtocolIncomplete` when a storage step fails after validation; the
    ///   note keeps its old identity. A run that had not yet written the new
    ///   file is rolled back; a later one stays in the journal for replay
    pub async fn rename_note(&self, id: &str, new_title: &str) -> Result<ProtocolOutcome, NoteServiceError> {
        let id = normalize_slash(id);
        let mut run = ProtocolRun::new(&id);
        run.transition(ProtocolState::Validating);

        let (mut note, title) = {
            let state = self.state.read().await;
            let note = state
                .notes
                .get(&id)
                .cloned()
                .ok_or_else(|| NoteServiceError::note_not_found(&id))?;
            let title = self.resolve_title(&state, new_title, Some(id.as_str()));
            (note, title)
        };
        if title != note.title {
            if let Err(e) = check_title_chars(&title) {
                run.abort();
                return Err(e.into());
            }
        }

        if let Some(pending) = self.journal.involving(&id).await {
            if pending.kind == IntentKind::Rename && pending.old_id == id && pending.new_title == title {
                tracing::info!("Resuming pending rename of {}", id);
                return self.resume_intent(pending).await.map(ProtocolOutcome::Committed);
            }
            if let Err(e) = self.abandon(pending).await {
                run.abort();
                return Err(e);
            }
            note = self.get_note(&id).await.ok_or_else(|| {
                run.abort();
                NoteServiceError::note_not_found(&id)
            })?;
        }

        if title == note.title {
            run.abort();
            return Ok(ProtocolOutcome::Unchanged);
        }

        let new_path = note_path(&dir_path(&id), &title);
        let intent = Intent::rename(&note, &title, &new_path);
        let guard = self.acquire(intent.lock_keys()).inspect_err(|_| run.abort())?;

        if let Err(e) = self.validate_rename(&intent).await {
            run.abort();
            return Err(e);
        }

        self.start(intent, run, guard).await.map(ProtocolOutcome::Committed)
    }

    /// Move note `id` into `target`, keeping its title.
    ///
    /// Moving into the directory the note already lives in is a no-op: no
    /// store change and no file operation.
    pub async fn move_note(&self, id: &str, target: MoveTarget) -> Result<ProtocolOutcome, NoteServiceError> {
        let id = normalize_slash(id);
        let mut run = ProtocolRun::new(&id);
        run.transition(ProtocolState::Validating);

        let (mut note, target_dir) = {
            let state = self.state.read().await;
            let note = state
                .notes
                .get(&id)
                .cloned()
                .ok_or_else(|| NoteServiceError::note_not_found(&id))?;
            let target_dir = match &target {
                MoveTarget::Root => state.tree.root().to_string(),
                MoveTarget::Dir(path) => normalize_dir(path),
            };
            check_directory(&state.tree, &target_dir)?;
            (note, target_dir)
        };

        let new_path = join_path(&target_dir, &[&file_name(&id)]);
        if new_path == id {
            run.abort();
            return Ok(ProtocolOutcome::Unchanged);
        }
        if let Some(pending) = self.journal.involving(&id).await {
            if pending.kind == IntentKind::Move && pending.old_id == id && pending.new_id == new_path {
                tracing::info!("Resuming pending move of {}", id);
                return self.resume_intent(pending).await.map(ProtocolOutcome::Committed);
            }
            if let Err(e) = self.abandon(pending).await {
                run.abort();
                return Err(e);
            }
            note = self.get_note(&id).await.ok_or_else(|| {
                run.abort();
                NoteServiceError::note_not_found(&id)
            })?;
        }

        let intent = Intent::relocate(&note, &new_path);
        let guard = self.acquire(intent.lock_keys()).inspect_err(|_| run.abort())?;

        {
            let state = self.state.read().await;
            if !state.notes.contains(&id) {
                run.abort();
                return Err(NoteServiceError::note_not_found(&id));
            }
            if path_taken(&state, &new_path, Some(id.as_str())) {
                run.abort();
                return Err(ValidationError::path_conflict(&new_path).into());
            }
        }

        self.start(intent, run, guard).await.map(ProtocolOutcome::Committed)
    }

    /// Replay every intent left in the journal by an interrupted or failed
    /// rename or move, from its last completed step.
    pub async fn resume_pending(&self) -> Result<Vec<ProtocolReport>, NoteServiceError> {
        let mut reports = Vec::new();
        for intent in self.journal.pending().await {
            tracing::info!(
                "Resuming {} {} -> {} after step {}",
                intent.kind,
                intent.old_id,
                intent.new_id,
                intent.completed
            );
            reports.push(self.resume_intent(intent).await?);
        }
        Ok(reports)
    }

    /// Intents recorded but not yet committed.
    pub async fn pending_intents(&self) -> Vec<Intent> {
        self.journal.pending().await
    }

    async fn resume_intent(&self, intent: Intent) -> Result<ProtocolReport, NoteServiceError> {
        let mut run = ProtocolRun::new(&intent.old_id);
        run.transition(ProtocolState::Validating);
        let guard = self.acquire(intent.lock_keys()).inspect_err(|_| run.abort())?;
        if !self.is_pending(&intent).await {
            // Finished by another caller before we got the locks
            run.abort();
            return Err(NoteServiceError::identity_busy(&intent.old_id));
        }
        run.transition(ProtocolState::Persisting);
        self.spawn_drive(intent, run, guard).await
    }

    /// Roll back the unfinished rename or move of note `id` (under its old or
    /// new identity) and drop it from the journal. The note ends up under its
    /// original identity with references to it restored.
    ///
    /// Returns the abandoned intent, `None` when nothing was pending.
    pub async fn abandon_pending(&self, id: &str) -> Result<Option<Intent>, NoteServiceError> {
        match self.journal.involving(id).await {
            Some(intent) => self.abandon(intent).await.map(Some),
            None => Ok(None),
        }
    }

    async fn abandon(&self, intent: Intent) -> Result<Intent, NoteServiceError> {
        let _guard = self.acquire(intent.lock_keys())?;
        if !self.is_pending(&intent).await {
            return Err(NoteServiceError::identity_busy(&intent.old_id));
        }
        tracing::info!(
            "Abandoning {} {} -> {} after step {}",
            intent.kind,
            intent.old_id,
            intent.new_id,
            intent.completed
        );
        self.revert_intent(&intent, Vec::new()).await?;
        Ok(intent)
    }

    async fn is_pending(&self, intent: &Intent) -> bool {
        self.journal
            .pending()
            .await
            .iter()
            .any(|pending| pending.id == intent.id)
    }

    /// Re-check a rename under its identity locks.
    async fn validate_rename(&self, intent: &Intent) -> Result<(), NoteServiceError> {
        {
            let state = self.state.read().await;
            let note = state
                .notes
                .get(&intent.old_id)
                .ok_or_else(|| NoteServiceError::note_not_found(&intent.old_id))?;
            if !note.is_wiki {
                let exclude = Some(intent.old_id.as_str());
                if let Some(existing) = state.notes.title_conflict(&intent.new_title, exclude) {
                    return Err(ValidationError::title_conflict(&intent.new_title, &existing.id).into());
                }
            }
            if path_taken(&state, &intent.new_id, Some(intent.old_id.as_str())) {
                return Err(ValidationError::path_conflict(&intent.new_id).into());
            }
        }
        if !intent.note.is_wiki {
            if let Some(owner) = self
                .pending_title_owner(&intent.new_title, Some(intent.old_id.as_str()))
                .await
            {
                return Err(ValidationError::title_conflict(&intent.new_title, owner).into());
            }
        }
        Ok(())
    }

    /// Record the intent, then drive it.
    async fn start(
        &self,
        intent: Intent,
        mut run: ProtocolRun,
        guard: IdentityGuard,
    ) -> Result<ProtocolReport, NoteServiceError> {
        if let Err(e) = self.journal.record(&intent).await {
            run.abort();
            return Err(NoteServiceError::storage(format!("record {} intent", intent.kind), e));
        }
        run.transition(ProtocolState::Persisting);
        self.spawn_drive(intent, run, guard).await
    }

    /// Drive the steps on their own task: once validation has passed, the
    /// run is not cancelled by the caller going away.
    async fn spawn_drive(
        &self,
        intent: Intent,
        run: ProtocolRun,
        guard: IdentityGuard,
    ) -> Result<ProtocolReport, NoteServiceError> {
        let service = self.clone();
        tokio::spawn(async move { service.drive(intent, run, guard).await })
            .await
            .map_err(|e| NoteServiceError::TaskFailed(e.to_string()))?
    }

    async fn drive(
        &self,
        mut intent: Intent,
        mut run: ProtocolRun,
        guard: IdentityGuard,
    ) -> Result<ProtocolReport, NoteServiceError> {
        let mut records = Vec::new();
        let result = match self.run_steps(&mut intent, &mut run, &mut records).await {
            Ok(report) => Ok(report),
            Err(e) => {
                run.abort();
                tracing::warn!(
                    "{} {} -> {} stopped after step {}: {}",
                    intent.kind,
                    intent.old_id,
                    intent.new_id,
                    intent.completed,
                    e
                );
                if intent.completed < ProtocolStep::NewFileWritten {
                    if let Err(rollback) = self.revert_intent(&intent, records).await {
                        tracing::warn!("Rollback of {} failed, kept for replay: {}", intent.old_id, rollback);
                    }
                }
                Err(NoteServiceError::protocol_incomplete(intent.id, intent.kind, intent.completed, e))
            }
        };
        drop(guard);
        result
    }

    async fn run_steps(
        &self,
        intent: &mut Intent,
        run: &mut ProtocolRun,
        records: &mut Vec<RewriteRecord>,
    ) -> Result<ProtocolReport, NoteServiceError> {
        let case_only = same_path_ci(&intent.old_id, &intent.new_id);

        if intent.completed < ProtocolStep::BacklinksUpdated {
            if intent.kind == IntentKind::Rename {
                self.rewrite_backlinks(
                    &intent.old_title,
                    &intent.new_title,
                    Some(intent.old_id.as_str()),
                    records,
                )
                .await?;
                intent.rewritten = records.iter().map(|record| record.id.clone()).collect();
            }
            self.advance(intent, ProtocolStep::BacklinksUpdated).await;
        }

        if intent.completed < ProtocolStep::NewFileWritten {
            let _content = self.content_locks.lock(&path_key(&intent.old_id)).await;
            if case_only {
                // Same file on case-insensitive volumes: move it, the old file is current
                match self.fs.rename_file(&intent.old_id, &intent.new_id).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {
                        tracing::debug!("{} already renamed to {}", intent.old_id, intent.new_id)
                    }
                    Err(e) => {
                        return Err(NoteServiceError::storage(
                            format!("rename note {}", intent.old_id),
                            e,
                        ))
                    }
                }
            } else {
                let content = {
                    let state = self.state.read().await;
                    resolve_content(&state, intent)
                };
                self.fs
                    .write_file(&intent.new_id, &content)
                    .await
                    .map_err(|e| NoteServiceError::storage(format!("write note {}", intent.new_id), e))?;
            }
            self.advance(intent, ProtocolStep::NewFileWritten).await;
        }

        if intent.completed < ProtocolStep::SnapshotWritten {
            let _gate = self.write_gate.lock().await;
            self.write_snapshot(TreeChange::None).await?;
            self.advance(intent, ProtocolStep::SnapshotWritten).await;
        }

        if intent.completed < ProtocolStep::OldFileDeleted {
            // A case-only rename already moved the file
            if !case_only {
                match self.fs.delete_file(&intent.old_id).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {
                        tracing::debug!("Old file {} already removed", intent.old_id)
                    }
                    Err(e) => {
                        return Err(NoteServiceError::storage(
                            format!("delete note {}", intent.old_id),
                            e,
                        ))
                    }
                }
            }
            self.advance(intent, ProtocolStep::OldFileDeleted).await;
        }

        run.transition(ProtocolState::Reindexing);
        let (note, navigated) = {
            let _content = self.content_locks.lock(&path_key(&intent.old_id)).await;
            let _gate = self.write_gate.lock().await;
            let committed = {
                let mut state = self.state.write().await;
                let note = commit_intent(&mut state, intent)?;
                let follow = intent.kind == IntentKind::Rename
                    || state.current_note.as_deref() == Some(intent.old_id.as_str());
                if follow {
                    state.current_note = Some(note.id.clone());
                }
                (note, follow)
            };
            self.journal.complete(intent.id).await;
            committed
        };
        intent.completed = ProtocolStep::Committed;
        run.transition(ProtocolState::Committed);

        match intent.kind {
            IntentKind::Rename => {
                tracing::info!(
                    "Renamed {} to {} ({} references rewritten)",
                    intent.old_title,
                    intent.new_title,
                    intent.rewritten.len()
                );
                self.emit_event(DomainEvent::NoteRenamed {
                    old_id: intent.old_id.clone(),
                    new_id: note.id.clone(),
                    old_title: intent.old_title.clone(),
                    new_title: intent.new_title.clone(),
                });
            }
            IntentKind::Move => {
                tracing::info!("Moved {} to {}", intent.old_id, intent.new_id);
                self.emit_event(DomainEvent::NoteMoved {
                    old_id: intent.old_id.clone(),
                    new_id: note.id.clone(),
                });
            }
        }
        self.emit_tree_changed();
        if navigated {
            self.emit_event(DomainEvent::Navigated {
                id: Some(note.id.clone()),
            });
        }

        let rewritten = intent.rewritten.clone();
        Ok(ProtocolReport::new(intent, rewritten))
    }

    async fn advance(&self, intent: &mut Intent, step: ProtocolStep) {
        tracing::debug!("{} {}: {}", intent.kind, intent.old_id, step);
        intent.completed = step;
        self.journal.advance(intent).await;
    }

    /// Undo what `intent` has done so far and drop it from the journal.
    ///
    /// `records` carries the exact content of notes rewritten by this run;
    /// without them the notes listed in the intent get their links pointed
    /// back at the old title.
    async fn revert_intent(&self, intent: &Intent, records: Vec<RewriteRecord>) -> Result<(), NoteServiceError> {
        if intent.kind == IntentKind::Rename {
            let records = if records.is_empty() {
                intent.rewritten.iter().map(|id| RewriteRecord::recorded(id)).collect()
            } else {
                records
            };
            self.restore_rewrites(intent, records).await?;
        }

        if intent.completed < ProtocolStep::NewFileWritten {
            self.journal.complete(intent.id).await;
            tracing::info!("Rolled back {} of {}", intent.kind, intent.old_id);
            return Ok(());
        }

        let case_only = same_path_ci(&intent.old_id, &intent.new_id);
        {
            let _content = self.content_locks.lock(&path_key(&intent.old_id)).await;
            if case_only {
                match self.fs.rename_file(&intent.new_id, &intent.old_id).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {
                        tracing::debug!("{} already back at {}", intent.new_id, intent.old_id)
                    }
                    Err(e) => {
                        return Err(NoteServiceError::storage(
                            format!("rename note {}", intent.new_id),
                            e,
                        ))
                    }
                }
            } else if intent.completed >= ProtocolStep::OldFileDeleted {
                let content = {
                    let state = self.state.read().await;
                    resolve_content(&state, intent)
                };
                self.fs
                    .write_file(&intent.old_id, &content)
                    .await
                    .map_err(|e| NoteServiceError::storage(format!("write note {}", intent.old_id), e))?;
            }

            let _gate = self.write_gate.lock().await;
            self.write_snapshot(TreeChange::Revert(intent)).await?;
            {
                // Only a reopened silo can hold the note under its new identity
                let mut state = self.state.write().await;
                if !state.notes.contains(&intent.old_id) && state.notes.contains(&intent.new_id) {
                    let note = commit_intent(&mut state, &intent.reversed())?;
                    if state.current_note.as_deref() == Some(intent.new_id.as_str()) {
                        state.current_note = Some(note.id);
                    }
                }
            }
            self.journal.complete(intent.id).await;
        }

        if !case_only {
            match self.fs.delete_file(&intent.new_id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => tracing::warn!("Left {} behind after rollback: {}", intent.new_id, e),
            }
        }

        tracing::info!("Rolled back {} {} -> {}", intent.kind, intent.old_id, intent.new_id);
        self.emit_tree_changed();
        Ok(())
    }

    /// Point links rewritten by `intent` back at its old title.
    async fn restore_rewrites(&self, intent: &Intent, records: Vec<RewriteRecord>) -> Result<(), NoteServiceError> {
        for record in records.into_iter().rev() {
            let _content = self.content_locks.lock(&path_key(&record.id)).await;
            let current = self.state.read().await.notes.get(&record.id).map(|note| note.content.clone());
            let Some(current) = current else {
                continue;
            };
            let restored = match record.before {
                Some(before) if record.after.as_deref() == Some(current.as_str()) => Some(before),
                _ => rewrite_links(&current, &intent.new_title, &intent.old_title),
            };
            if let Some(content) = restored {
                self.apply_content(&record.id, content).await?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Backlinks
    // ========================================================================

    /// Point every reference to `old_title` at `new_title`.
    ///
    /// Each affected note is rewritten on disk, updated in the store and
    /// marked dirty. Matching is exact on the whole link target, ignoring
    /// case. Calling this twice has the same effect as calling it once.
    /// Returns the ids of the rewritten notes.
    pub async fn update_backlinks(&self, old_title: &str, new_title: &str) -> Result<Vec<String>, NoteServiceError> {
        let mut records = Vec::new();
        self.rewrite_backlinks(old_title, new_title, None, &mut records).await?;
        Ok(records.into_iter().map(|record| record.id).collect())
    }

    async fn rewrite_backlinks(
        &self,
        old_title: &str,
        new_title: &str,
        exclude: Option<&str>,
        records: &mut Vec<RewriteRecord>,
    ) -> Result<(), NoteServiceError> {
        // Notes may change identity while we work; plan again until a pass
        // neither rewrites nor misses a note
        loop {
            let candidates: Vec<String> = {
                let state = self.state.read().await;
                state
                    .backlinks
                    .plan_rewrites(&state.notes, old_title, new_title, exclude)
                    .into_iter()
                    .map(|(id, _)| id)
                    .collect()
            };

            let mut again = false;
            for id in candidates {
                let _content = self.content_locks.lock(&path_key(&id)).await;

                // Re-read under the lock; content may have moved on
                let current = self.state.read().await.notes.get(&id).map(|note| note.content.clone());
                let Some(before) = current else {
                    again = true;
                    continue;
                };
                let Some(after) = rewrite_links(&before, old_title, new_title) else {
                    continue;
                };

                if self.apply_content(&id, after.clone()).await?.is_some() {
                    tracing::debug!("Rewrote links to {} in {}", old_title, id);
                    records.push(RewriteRecord {
                        id,
                        before: Some(before),
                        after: Some(after),
                    });
                    again = true;
                }
            }
            if !again {
                return Ok(());
            }
        }
    }

    /// Persist `content` for note `id` and apply it in memory. Callers hold
    /// the note's content lock.
    async fn apply_content(&self, id: &str, content: String) -> Result<Option<Note>, NoteServiceError> {
        self.write_note_content(id, &content).await?;
        let updated = {
            let mut state = self.state.write().await;
            let updated = state.notes.get_mut(id).map(|note| {
                note.set_content(content.clone());
                note.clone()
            });
            if updated.is_some() {
                state.backlinks.rebuild_references_for(id, &content);
            }
            updated
        };
        if let Some(note) = &updated {
            self.emit_event(DomainEvent::NoteUpdated(note.clone()));
        }
        Ok(updated)
    }

    /// Write the file of note `id`.
    ///
    /// While a rename or move of the note is pending past its new-file step,
    /// the new file gets the content as well, and the old one only as long
    /// as it has not been deleted or moved.
    async fn write_note_content(&self, id: &str, content: &str) -> Result<(), NoteServiceError> {
        let pending = self
            .journal
            .pending()
            .await
            .into_iter()
            .find(|intent| intent.old_id == id && intent.completed >= ProtocolStep::NewFileWritten);
        let write_old = pending.as_ref().map_or(true, |intent| {
            intent.completed < ProtocolStep::OldFileDeleted && !same_path_ci(&intent.old_id, &intent.new_id)
        });

        if write_old {
            self.fs
                .write_file(id, content)
                .await
                .map_err(|e| NoteServiceError::storage(format!("write note {}", id), e))?;
        }
        if let Some(intent) = pending {
            self.fs
                .write_file(&intent.new_id, content)
                .await
                .map_err(|e| NoteServiceError::storage(format!("write note {}", intent.new_id), e))?;
        }
        Ok(())
    }

    /// Notes referencing note `id`, grouped per referencing note.
    pub async fn backlinks_for(&self, id: &str) -> Result<Vec<Backlink>, NoteServiceError> {
        let state = self.state.read().await;
        let note = state
            .notes
            .get(id)
            .ok_or_else(|| NoteServiceError::note_not_found(id))?;

        Ok(state
            .backlinks
            .references_to(&note.title)
            .into_iter()
            .filter(|(source, _)| *source != id)
            .map(|(source, matches)| Backlink {
                note_id: source.to_string(),
                title: state
                    .notes
                    .get(source)
                    .map(|n| n.title.clone())
                    .unwrap_or_else(|| title_from_path(source)),
                matches: matches.to_vec(),
            })
            .collect())
    }

    /// Excerpt of a backlink line around `target`, at the configured length.
    pub fn backlink_excerpt(&self, found: &BacklinkMatch, target: &str) -> String {
        found.excerpt(target, self.config.excerpt_length)
    }

    // ========================================================================
    // Links and search
    // ========================================================================

    /// Title search over notes (and directories with `search_dir`).
    pub async fn search(&self, query: &str, options: &SearchOptions) -> SearchResults {
        let state = self.state.read().await;
        NoteSearch::search(&state.notes, &state.tree, query, options)
    }

    /// Link autocomplete suggestions for `query`.
    pub async fn search_link(&self, query: &str) -> Vec<LinkSuggestion> {
        let options = SearchOptions::new(self.config.link_search_results);
        self.search(query, &options)
            .await
            .into_vec()
            .into_iter()
            .map(|hit| LinkSuggestion {
                url: title_to_href(&hit.title),
                title: hit.title,
            })
            .collect()
    }

    /// Resolve a link inserted in note `from_id` to `title`, creating the
    /// target note next to `from_id` when no note has that title yet.
    /// Returns the link href.
    pub async fn create_link(&self, from_id: &str, title: &str) -> Result<String, NoteServiceError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }

        let parent = {
            let state = self.state.read().await;
            if let Some(existing) = state.notes.find_by_title(title) {
                return Ok(title_to_href(&existing.title));
            }
            if !state.notes.contains(from_id) {
                return Err(NoteServiceError::note_not_found(from_id));
            }
            parent_dir_of(&state.tree, from_id)
        };

        let note = self.create_note(&parent, title, " ").await?;
        Ok(title_to_href(&note.title))
    }

    /// Open a link: URLs are external, anything else is looked up by title.
    /// A miss is a no-op.
    pub async fn open_link(&self, href: &str) -> LinkAction {
        let href = href.trim();
        if is_url(href) {
            return LinkAction::External {
                url: href.to_string(),
            };
        }

        let target = href.split('#').next().unwrap_or(href);
        let title = href_to_title(target);
        let Some(note) = self.find_by_title(&title).await else {
            tracing::debug!("No note titled {}", title);
            return LinkAction::Unresolved { title };
        };

        match self.navigate(&note.id).await {
            Ok(()) => LinkAction::Navigate { note_id: note.id },
            Err(_) => LinkAction::Unresolved { title },
        }
    }

    /// Destinations offered for moving note `id`.
    ///
    /// With an empty query: the root, then the first directories sorted by
    /// title. Otherwise: directories matching the query.
    pub async fn move_options(&self, id: &str, query: &str) -> Vec<MoveOption> {
        if query.trim().is_empty() {
            let state = self.state.read().await;
            let mut options = vec![MoveOption {
                title: "/".to_string(),
                target: MoveTarget::Root,
            }];
            options.extend(
                state
                    .tree
                    .top_directories(Some(id), self.config.move_option_dirs)
                    .into_iter()
                    .map(|dir| MoveOption {
                        title: dir.title.clone(),
                        target: MoveTarget::Dir(dir.id.clone()),
                    }),
            );
            return options;
        }

        let options = SearchOptions::new(usize::MAX).with_dirs(true);
        self.search(query, &options)
            .await
            .iter()
            .filter(|hit| hit.kind == EntryKind::Dir && hit.id != id)
            .take(self.config.move_option_dirs)
            .map(|hit| MoveOption {
                title: hit.title.clone(),
                target: MoveTarget::Dir(hit.id.clone()),
            })
            .collect()
    }

    /// Handle one editor event.
    pub async fn handle(&self, event: EditorEvent) -> Result<EditorResponse, NoteServiceError> {
        match event {
            EditorEvent::ContentChanged { note_id, content } => self
                .update_content(&note_id, &content)
                .await
                .map(EditorResponse::Saved),
            EditorEvent::TitleChanged { note_id, title } => self
                .rename_note(&note_id, &title)
                .await
                .map(EditorResponse::Renamed),
            EditorEvent::SearchLink { query } => {
                Ok(EditorResponse::Suggestions(self.search_link(&query).await))
            }
            EditorEvent::CreateLink { note_id, title } => self
                .create_link(&note_id, &title)
                .await
                .map(|href| EditorResponse::LinkCreated { href }),
            EditorEvent::OpenLink { href } => Ok(EditorResponse::Link(self.open_link(&href).await)),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn acquire(&self, keys: Vec<String>) -> Result<IdentityGuard, NoteServiceError> {
        self.locks.try_acquire(keys).map_err(|busy| {
            let id = busy.split_once(':').map_or(busy.as_str(), |(_, rest)| rest);
            NoteServiceError::identity_busy(id)
        })
    }

    /// New id of a pending rename that claims `title`.
    async fn pending_title_owner(&self, title: &str, exclude: Option<&str>) -> Option<String> {
        self.journal
            .pending()
            .await
            .into_iter()
            .filter(|intent| intent.kind == IntentKind::Rename && !intent.note.is_wiki)
            .filter(|intent| Some(intent.old_id.as_str()) != exclude)
            .find(|intent| ci_string_equal(&intent.new_title, title))
            .map(|intent| intent.new_id)
    }

    /// Trimmed title, or a generated `Untitled` title when empty.
    fn resolve_title(&self, state: &SiloState, raw: &str, exclude: Option<&str>) -> String {
        let title = raw.trim();
        if title.is_empty() {
            return state
                .notes
                .untitled_title(&self.config.untitled_title, exclude);
        }
        title.to_string()
    }

    /// Write the snapshot of the committed state, with pending protocol runs
    /// that already wrote their new file and `change` applied.
    ///
    /// Callers hold the write gate.
    async fn write_snapshot(&self, change: TreeChange<'_>) -> Result<(), NoteServiceError> {
        let pending = self.journal.pending().await;
        let snapshot = {
            let state = self.state.read().await;
            build_snapshot(&state, &pending, change)?
        };
        self.fs
            .write_json_file(&snapshot)
            .await
            .map_err(|e| NoteServiceError::storage("write tree snapshot", e))
    }

    fn emit_tree_changed(&self) {
        self.emit_event(DomainEvent::TreeChanged {
            root_dir: self.config.root_dir.clone(),
        });
    }
}

fn build_snapshot(state: &SiloState, pending: &[Intent], change: TreeChange<'_>) -> Result<TreeSnapshot, TreeError> {
    let mut tree = state.tree.clone();
    let mut metas: HashMap<String, NoteMeta> = state
        .notes
        .get_all()
        .into_iter()
        .map(|note| (note.id.clone(), note.meta()))
        .collect();

    let mut reverted = None;
    match change {
        TreeChange::None => {}
        TreeChange::UpsertNote { note, parent } => {
            tree.upsert_tree_entry(note, parent)?;
            metas.insert(note.id.clone(), note.meta());
        }
        TreeChange::EnsureDir(path) => tree.ensure_directory(path)?,
        TreeChange::Remove { id, recursive } => {
            for entry in tree.delete_tree_entry(id, recursive)? {
                metas.remove(&entry.id);
            }
        }
        TreeChange::Revert(intent) => {
            reverted = Some(intent.id);
            if !metas.contains_key(&intent.old_id) && metas.contains_key(&intent.new_id) {
                let back = intent.reversed();
                let note = target_note(state, &back);
                let parent = back.parent_dir();
                tree.ensure_directory(&parent)?;
                tree.relocate(&back.old_id, &note, &parent)?;
                metas.remove(&back.old_id);
                metas.insert(note.id.clone(), note.meta());
            }
        }
    }

    // Pending runs past their new-file step are persisted under the new
    // identity, with the latest metadata of the old one
    for intent in pending
        .iter()
        .filter(|intent| intent.completed >= ProtocolStep::NewFileWritten)
        .filter(|intent| Some(intent.id) != reverted)
    {
        let note = match metas.remove(&intent.old_id) {
            Some(meta) => intent.derive(&meta.into_note(String::new())),
            None => target_note(state, intent),
        };
        let parent = intent.parent_dir();
        tree.ensure_directory(&parent)?;
        tree.relocate(&intent.old_id, &note, &parent)?;
        metas.insert(note.id.clone(), note.meta());
    }

    Ok(tree.snapshot_with(|id| metas.get(id).cloned()))
}

fn note_path(dir: &str, title: &str) -> String {
    join_path(dir, &[&format!("{}.{}", title, NOTE_EXTENSION)])
}

/// Title implied by a note path: file name without the `.md` extension.
fn title_from_path(path: &str) -> String {
    let name = file_name(path);
    let suffix = format!(".{}", NOTE_EXTENSION);
    name.strip_suffix(&suffix).unwrap_or(&name).to_string()
}

fn parent_dir_of(tree: &NoteTreeIndex, id: &str) -> String {
    tree.parent_of(id)
        .map(str::to_string)
        .unwrap_or_else(|| dir_path(id))
}

/// Titles become file names and link targets.
fn check_title_chars(title: &str) -> Result<(), ValidationError> {
    if title.contains(['/', '\\']) {
        return Err(ValidationError::invalid_path(title));
    }
    if title.contains(RESERVED_TITLE_CHARS) {
        return Err(ValidationError::invalid_title(title));
    }
    Ok(())
}

fn check_directory(tree: &NoteTreeIndex, dir: &str) -> Result<(), TreeError> {
    match tree.get(dir) {
        Some(entry) if entry.is_dir() => Ok(()),
        Some(_) => Err(TreeError::not_a_directory(dir)),
        None => Err(TreeError::parent_not_found(dir)),
    }
}

/// Whether another note or a directory already occupies `path`, comparing
/// case-insensitively.
fn path_taken(state: &SiloState, path: &str, exclude: Option<&str>) -> bool {
    let note_clash = state
        .notes
        .get_all()
        .into_iter()
        .filter(|note| Some(note.id.as_str()) != exclude)
        .any(|note| same_path_ci(&note.id, path));
    note_clash || state.tree.get(path).is_some_and(|entry| entry.is_dir())
}
