//! Note Store
//!
//! In-memory `id → Note` map, the authoritative cache of every note in the
//! silo. The store is a dumb keyed container: it never rejects a write.
//! Title uniqueness is enforced by callers, using the lookup helpers here.
//!
//! # Title rules
//!
//! - Titles compare case-insensitively
//! - Only non-wiki notes take part in uniqueness checks
//! - Lookups that can match several notes resolve deterministically (non-wiki
//!   first, then lowest id)

use crate::models::Note;
use crate::utils::text::ci_string_equal;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct NoteStore {
    notes: HashMap<String, Note>,
}

impl NoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the note under its id, returning the previous value.
    pub fn upsert(&mut self, note: Note) -> Option<Note> {
        self.notes.insert(note.id.clone(), note)
    }

    pub fn delete(&mut self, id: &str) -> Option<Note> {
        self.notes.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Note> {
        self.notes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Note> {
        self.notes.get_mut(id)
    }

    /// All notes ordered by id.
    pub fn get_all(&self) -> Vec<&Note> {
        let mut notes: Vec<&Note> = self.notes.values().collect();
        notes.sort_by(|a, b| a.id.cmp(&b.id));
        notes
    }

    pub fn contains(&self, id: &str) -> bool {
        self.notes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Note whose title matches `title` case-insensitively.
    pub fn find_by_title(&self, title: &str) -> Option<&Note> {
        let title = title.trim();
        self.notes
            .values()
            .filter(|note| ci_string_equal(&note.title, title))
            .min_by(|a, b| (a.is_wiki, &a.id).cmp(&(b.is_wiki, &b.id)))
    }

    /// Non-wiki note other than `exclude` that already uses `title`.
    pub fn title_conflict(&self, title: &str, exclude: Option<&str>) -> Option<&Note> {
        let title = title.trim();
        self.notes
            .values()
            .filter(|note| !note.is_wiki)
            .filter(|note| Some(note.id.as_str()) != exclude)
            .filter(|note| ci_string_equal(&note.title, title))
            .min_by(|a, b| a.id.cmp(&b.id))
    }

    pub fn is_title_unique(&self, title: &str, exclude: Option<&str>) -> bool {
        self.title_conflict(title, exclude).is_none()
    }

    /// `base`, or `base N` with the smallest `N` that no other non-wiki note
    /// uses.
    pub fn untitled_title(&self, base: &str, exclude: Option<&str>) -> String {
        if self.is_title_unique(base, exclude) {
            return base.to_string();
        }
        let mut n = 1usize;
        loop {
            let candidate = format!("{} {}", base, n);
            if self.is_title_unique(&candidate, exclude) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(titles: &[&str]) -> NoteStore {
        let mut store = NoteStore::new();
        for title in titles {
            store.upsert(Note::new(format!("/silo/{}.md", title), *title, ""));
        }
        store
    }

    #[test]
    fn test_upsert_get_delete() {
        let mut store = NoteStore::new();
        assert!(store.upsert(Note::new("/silo/A.md", "A", "one")).is_none());
        let previous = store.upsert(Note::new("/silo/A.md", "A", "two")).unwrap();
        assert_eq!(previous.content, "one");
        assert_eq!(store.get("/silo/A.md").unwrap().content, "two");
        assert_eq!(store.len(), 1);

        assert!(store.delete("/silo/A.md").is_some());
        assert!(store.delete("/silo/A.md").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_find_by_title_is_case_insensitive() {
        let store = store_with(&["Project Plan", "Other"]);
        assert_eq!(
            store.find_by_title("project plan").unwrap().id,
            "/silo/Project Plan.md"
        );
        assert!(store.find_by_title("Missing").is_none());
    }

    #[test]
    fn test_find_by_title_prefers_non_wiki() {
        let mut store = NoteStore::new();
        store.upsert(Note::new("/silo/a/Topic.md", "Topic", "").with_wiki(true));
        store.upsert(Note::new("/silo/b/Topic.md", "Topic", ""));
        assert_eq!(store.find_by_title("topic").unwrap().id, "/silo/b/Topic.md");
    }

    #[test]
    fn test_title_conflict_ignores_wiki_and_excluded() {
        let mut store = store_with(&["Draft"]);
        store.upsert(Note::new("/silo/wiki/Draft2.md", "Draft2", "").with_wiki(true));

        assert!(store.title_conflict("DRAFT", None).is_some());
        assert!(store.title_conflict("draft", Some("/silo/Draft.md")).is_none());
        assert!(store.title_conflict("Draft2", None).is_none());
    }

    #[test]
    fn test_untitled_title_picks_smallest_free_number() {
        let store = store_with(&["Untitled", "Untitled 1", "Untitled 3"]);
        assert_eq!(store.untitled_title("Untitled", None), "Untitled 2");
        assert_eq!(
            store.untitled_title("Untitled", Some("/silo/Untitled.md")),
            "Untitled"
        );
        assert_eq!(NoteStore::new().untitled_title("Untitled", None), "Untitled");
    }
}
