//! Note Tree Index
//!
//! Hierarchical index of directories and notes under one root directory.
//! Every entry except the root has a parent directory; every note entry
//! resolves to a note in the [`NoteStore`](crate::db::NoteStore).
//!
//! Placement is always by directory path. Upserting an entry that already
//! exists detaches it from its previous parent first, so an id is never
//! listed twice.

use crate::db::error::TreeError;
use crate::db::note_store::NoteStore;
use crate::fs::path::{dir_path, file_name, normalize_dir};
use crate::models::{EntryKind, Note, NoteMeta, TreeEntry, TreeSnapshot};
use crate::utils::text::ci_string_compare;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct NoteTreeIndex {
    root: String,
    entries: HashMap<String, TreeEntry>,
    children: HashMap<String, BTreeSet<String>>,
}

impl NoteTreeIndex {
    /// Empty tree holding only the root directory.
    pub fn new(root_dir: &str) -> Self {
        let root = normalize_dir(root_dir);
        let mut entries = HashMap::new();
        entries.insert(
            root.clone(),
            TreeEntry::dir(root.clone(), file_name(&root), None),
        );
        let mut children = HashMap::new();
        children.insert(root.clone(), BTreeSet::new());
        Self {
            root,
            entries,
            children,
        }
    }

    /// Rebuild a tree from persisted entries.
    ///
    /// Missing intermediate directories are recreated; entries outside the
    /// root are skipped.
    pub fn restore(root_dir: &str, entries: &[TreeEntry]) -> Self {
        let mut tree = Self::new(root_dir);
        let (dirs, notes): (Vec<&TreeEntry>, Vec<&TreeEntry>) =
            entries.iter().partition(|entry| entry.is_dir());

        for dir in dirs {
            if let Err(e) = tree.ensure_directory(&dir.id) {
                tracing::warn!("Skipping directory {} from snapshot: {}", dir.id, e);
            }
        }
        for entry in notes {
            let parent = entry
                .parent
                .clone()
                .unwrap_or_else(|| dir_path(&entry.id));
            if let Err(e) = tree
                .ensure_directory(&parent)
                .and_then(|_| tree.place(entry.clone(), &parent))
            {
                tracing::warn!("Skipping note {} from snapshot: {}", entry.id, e);
            }
        }
        tree
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn get(&self, id: &str) -> Option<&TreeEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.entries.get(id).and_then(|entry| entry.parent.as_deref())
    }

    /// Make sure `path` and all of its ancestors up to the root exist as
    /// directory entries.
    pub fn ensure_directory(&mut self, path: &str) -> Result<(), TreeError> {
        let path = normalize_dir(path);
        if let Some(existing) = self.entries.get(&path) {
            return if existing.is_dir() {
                Ok(())
            } else {
                Err(TreeError::not_a_directory(path))
            };
        }
        if !self.is_under_root(&path) {
            return Err(TreeError::outside_root(path, self.root.clone()));
        }

        let parent = dir_path(&path);
        self.ensure_directory(&parent)?;
        let entry = TreeEntry::dir(path.clone(), file_name(&path), None);
        self.place(entry, &parent)
    }

    /// Place `note` under `parent_dir`, removing any prior placement first.
    pub fn upsert_tree_entry(&mut self, note: &Note, parent_dir: &str) -> Result<(), TreeError> {
        let parent_dir = normalize_dir(parent_dir);
        self.check_parent(&parent_dir)?;
        if let Some(existing) = self.entries.get(&note.id) {
            if existing.is_dir() {
                return Err(TreeError::not_a_note(note.id.clone()));
            }
        }
        self.place(TreeEntry::note(note, parent_dir.clone()), &parent_dir)
    }

    /// Replace the note entry `old_id` with `note` under `parent_dir`.
    ///
    /// Used when a note changes identity; the old entry is gone afterwards
    /// even when the new one lands in the same directory.
    pub fn relocate(&mut self, old_id: &str, note: &Note, parent_dir: &str) -> Result<(), TreeError> {
        let parent_dir = normalize_dir(parent_dir);
        self.check_parent(&parent_dir)?;
        match self.entries.get(old_id) {
            Some(entry) if entry.is_dir() => return Err(TreeError::not_a_note(old_id)),
            Some(_) => {
                self.detach(old_id);
                self.entries.remove(old_id);
            }
            None => {}
        }
        self.place(TreeEntry::note(note, parent_dir.clone()), &parent_dir)
    }

    /// Remove an entry. Directories with children require `recursive`.
    ///
    /// Returns every removed entry, descendants first.
    pub fn delete_tree_entry(&mut self, id: &str, recursive: bool) -> Result<Vec<TreeEntry>, TreeError> {
        if id == self.root {
            return Err(TreeError::RootRemoval {
                root: self.root.clone(),
            });
        }
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| TreeError::entry_not_found(id))?;

        if entry.is_dir() {
            let child_count = self.children.get(id).map_or(0, BTreeSet::len);
            if child_count > 0 && !recursive {
                return Err(TreeError::directory_not_empty(id, child_count));
            }
        }

        let mut removed = Vec::new();
        for descendant in self.descendant_ids(id).into_iter().rev() {
            if let Some(entry) = self.entries.remove(&descendant) {
                self.children.remove(&descendant);
                removed.push(entry);
            }
        }
        self.detach(id);
        if let Some(entry) = self.entries.remove(id) {
            self.children.remove(id);
            removed.push(entry);
        }
        Ok(removed)
    }

    /// Direct children of `dir`, sorted case-insensitively by title.
    pub fn children(&self, dir: &str) -> Vec<&TreeEntry> {
        let mut children: Vec<&TreeEntry> = self
            .children
            .get(dir)
            .into_iter()
            .flatten()
            .filter_map(|id| self.entries.get(id))
            .collect();
        sort_entries(&mut children);
        children
    }

    /// All directories except the root and `exclude`, sorted
    /// case-insensitively by title and capped at `limit`.
    pub fn top_directories(&self, exclude: Option<&str>, limit: usize) -> Vec<&TreeEntry> {
        let mut dirs: Vec<&TreeEntry> = self
            .entries
            .values()
            .filter(|entry| entry.is_dir())
            .filter(|entry| entry.id != self.root)
            .filter(|entry| Some(entry.id.as_str()) != exclude)
            .collect();
        sort_entries(&mut dirs);
        dirs.truncate(limit);
        dirs
    }

    /// Every entry ordered by id.
    pub fn entries(&self) -> Vec<&TreeEntry> {
        let mut entries: Vec<&TreeEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    pub fn note_ids(&self) -> Vec<&str> {
        self.entries
            .values()
            .filter(|entry| entry.kind == EntryKind::Note)
            .map(|entry| entry.id.as_str())
            .collect()
    }

    /// Persistable form of the tree, with metadata for every note entry the
    /// store knows about.
    pub fn snapshot(&self, store: &NoteStore) -> TreeSnapshot {
        self.snapshot_with(|id| store.get(id).map(Note::meta))
    }

    /// Like [`snapshot`](Self::snapshot), with note metadata supplied by
    /// `lookup`. Note entries `lookup` does not know are left out.
    pub fn snapshot_with(&self, lookup: impl Fn(&str) -> Option<NoteMeta>) -> TreeSnapshot {
        let mut entries = Vec::new();
        let mut notes = Vec::new();
        for entry in self.entries() {
            if entry.is_dir() {
                entries.push(entry.clone());
            } else if let Some(meta) = lookup(&entry.id) {
                entries.push(entry.clone());
                notes.push(meta);
            }
        }
        TreeSnapshot::new(self.root.clone(), entries, notes)
    }

    fn is_under_root(&self, path: &str) -> bool {
        let prefix = format!("{}/", self.root.trim_end_matches('/'));
        path.starts_with(&prefix)
    }

    fn check_parent(&self, parent_dir: &str) -> Result<(), TreeError> {
        match self.entries.get(parent_dir) {
            Some(entry) if entry.is_dir() => Ok(()),
            Some(_) => Err(TreeError::not_a_directory(parent_dir)),
            None => Err(TreeError::parent_not_found(parent_dir)),
        }
    }

    fn place(&mut self, mut entry: TreeEntry, parent_dir: &str) -> Result<(), TreeError> {
        self.check_parent(parent_dir)?;
        self.detach(&entry.id);
        entry.parent = Some(parent_dir.to_string());
        if entry.is_dir() {
            self.children.entry(entry.id.clone()).or_default();
        }
        self.children
            .entry(parent_dir.to_string())
            .or_default()
            .insert(entry.id.clone());
        self.entries.insert(entry.id.clone(), entry);
        Ok(())
    }

    fn detach(&mut self, id: &str) {
        if let Some(parent) = self.entries.get(id).and_then(|e| e.parent.clone()) {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.remove(id);
            }
        }
    }

    fn descendant_ids(&self, dir: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![dir.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(children) = self.children.get(&current) {
                for child in children {
                    out.push(child.clone());
                    stack.push(child.clone());
                }
            }
        }
        out
    }
}

fn sort_entries(entries: &mut [&TreeEntry]) {
    entries.sort_by(|a, b| ci_string_compare(&a.title, &b.title).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(path: &str, title: &str) -> Note {
        Note::new(path, title, "")
    }

    #[test]
    fn test_ensure_directory_creates_ancestors() {
        let mut tree = NoteTreeIndex::new("/silo");
        tree.ensure_directory("/silo/a/b").unwrap();

        assert!(tree.get("/silo/a").unwrap().is_dir());
        assert_eq!(tree.parent_of("/silo/a/b"), Some("/silo/a"));
        assert_eq!(tree.parent_of("/silo/a"), Some("/silo"));
        assert!(matches!(
            tree.ensure_directory("/elsewhere"),
            Err(TreeError::OutsideRoot { .. })
        ));
    }

    #[test]
    fn test_upsert_moves_existing_entry() {
        let mut tree = NoteTreeIndex::new("/silo");
        tree.ensure_directory("/silo/a").unwrap();
        let n = note("/silo/x.md", "x");

        tree.upsert_tree_entry(&n, "/silo").unwrap();
        tree.upsert_tree_entry(&n, "/silo/a").unwrap();

        assert!(tree.children("/silo").iter().all(|e| e.id != n.id));
        assert_eq!(tree.children("/silo/a").len(), 1);
        assert_eq!(tree.parent_of(&n.id), Some("/silo/a"));
    }

    #[test]
    fn test_upsert_requires_existing_parent() {
        let mut tree = NoteTreeIndex::new("/silo");
        let n = note("/silo/missing/x.md", "x");
        assert_eq!(
            tree.upsert_tree_entry(&n, "/silo/missing"),
            Err(TreeError::parent_not_found("/silo/missing"))
        );
    }

    #[test]
    fn test_children_sorted_case_insensitively() {
        let mut tree = NoteTreeIndex::new("/silo");
        for title in ["banana", "Apple", "cherry"] {
            tree.upsert_tree_entry(&note(&format!("/silo/{title}.md"), title), "/silo")
                .unwrap();
        }
        let titles: Vec<_> = tree.children("/silo").iter().map(|e| e.title.clone()).collect();
        assert_eq!(titles, vec!["Apple", "banana", "cherry"]);
    }

    #[test]
    fn test_relocate_replaces_identity() {
        let mut tree = NoteTreeIndex::new("/silo");
        let old = note("/silo/Old.md", "Old");
        tree.upsert_tree_entry(&old, "/silo").unwrap();

        let new = old.renamed("New", "/silo/New.md");
        tree.relocate(&old.id, &new, "/silo").unwrap();

        assert!(!tree.contains("/silo/Old.md"));
        assert_eq!(tree.get("/silo/New.md").unwrap().title, "New");
        assert_eq!(tree.children("/silo").len(), 1);
    }

    #[test]
    fn test_delete_non_empty_directory_requires_recursive() {
        let mut tree = NoteTreeIndex::new("/silo");
        tree.ensure_directory("/silo/a/b").unwrap();
        tree.upsert_tree_entry(&note("/silo/a/b/n.md", "n"), "/silo/a/b")
            .unwrap();

        let err = tree.delete_tree_entry("/silo/a", false).unwrap_err();
        assert!(err.is_structural_violation());
        assert!(tree.contains("/silo/a/b/n.md"));

        let removed = tree.delete_tree_entry("/silo/a", true).unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(removed.last().unwrap().id, "/silo/a");
        assert!(!tree.contains("/silo/a/b"));
        assert!(tree.children("/silo").is_empty());
    }

    #[test]
    fn test_delete_root_and_missing() {
        let mut tree = NoteTreeIndex::new("/silo/");
        assert_eq!(tree.root(), "/silo");
        assert!(matches!(
            tree.delete_tree_entry("/silo", true),
            Err(TreeError::RootRemoval { .. })
        ));
        assert!(matches!(
            tree.delete_tree_entry("/silo/nope.md", false),
            Err(TreeError::EntryNotFound { .. })
        ));
    }

    #[test]
    fn test_top_directories_excludes_and_caps() {
        let mut tree = NoteTreeIndex::new("/silo");
        for name in ["zeta", "Alpha", "beta", "gamma"] {
            tree.ensure_directory(&format!("/silo/{name}")).unwrap();
        }
        let dirs: Vec<_> = tree
            .top_directories(Some("/silo/beta"), 2)
            .iter()
            .map(|e| e.title.clone())
            .collect();
        assert_eq!(dirs, vec!["Alpha", "gamma"]);
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut tree = NoteTreeIndex::new("/silo");
        let mut store = NoteStore::new();
        tree.ensure_directory("/silo/a").unwrap();
        let n = note("/silo/a/n.md", "n");
        tree.upsert_tree_entry(&n, "/silo/a").unwrap();
        store.upsert(n.clone());

        let snapshot = tree.snapshot(&store);
        assert_eq!(snapshot.notes.len(), 1);

        let restored = NoteTreeIndex::restore(&snapshot.root_dir, &snapshot.entries);
        assert_eq!(restored.entries(), tree.entries());
    }
}
