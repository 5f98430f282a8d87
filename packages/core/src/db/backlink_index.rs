//! Backlink Index
//!
//! Derived index from a referenced title to the notes that reference it.
//! Entries are keyed by lowercased title rather than note id, so a link to a
//! title that does not exist (yet, or any more) is still tracked and shows up
//! again once a note with that title appears.
//!
//! The index is rebuilt incrementally: every content change replaces all
//! references originating from the changed note in one call.

use crate::db::note_store::NoteStore;
use crate::models::{BacklinkMatch, LinePath, Note};
use crate::utils::links::{extract_links, rewrite_links};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
pub struct BacklinkIndex {
    /// lowercased title -> source note id -> matches
    by_title: HashMap<String, BTreeMap<String, Vec<BacklinkMatch>>>,
    /// source note id -> lowercased titles it references
    by_source: HashMap<String, BTreeSet<String>>,
}

fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

impl BacklinkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every note from scratch.
    pub fn rebuild_all<'a>(notes: impl IntoIterator<Item = &'a Note>) -> Self {
        let mut index = Self::new();
        for note in notes {
            index.rebuild_references_for(&note.id, &note.content);
        }
        index
    }

    /// Replace all references originating from `note_id` with those found in
    /// `content`.
    pub fn rebuild_references_for(&mut self, note_id: &str, content: &str) {
        self.remove_source(note_id);

        let mut grouped: BTreeMap<String, Vec<BacklinkMatch>> = BTreeMap::new();
        for link in extract_links(content) {
            grouped
                .entry(title_key(&link.title))
                .or_default()
                .push(BacklinkMatch {
                    line_path: LinePath::new(link.line, link.column),
                    line_element: link.line_text,
                });
        }
        if grouped.is_empty() {
            return;
        }

        let titles: BTreeSet<String> = grouped.keys().cloned().collect();
        for (title, matches) in grouped {
            self.by_title
                .entry(title)
                .or_default()
                .insert(note_id.to_string(), matches);
        }
        self.by_source.insert(note_id.to_string(), titles);
    }

    /// Drop every reference originating from `note_id`.
    pub fn remove_source(&mut self, note_id: &str) {
        let Some(titles) = self.by_source.remove(note_id) else {
            return;
        };
        for title in titles {
            if let Some(sources) = self.by_title.get_mut(&title) {
                sources.remove(note_id);
                if sources.is_empty() {
                    self.by_title.remove(&title);
                }
            }
        }
    }

    /// References to `title`, grouped by source note id in id order.
    pub fn references_to(&self, title: &str) -> Vec<(&str, &[BacklinkMatch])> {
        self.by_title
            .get(&title_key(title))
            .map(|sources| {
                sources
                    .iter()
                    .map(|(id, matches)| (id.as_str(), matches.as_slice()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ids of notes referencing `title`.
    pub fn sources_for(&self, title: &str) -> Vec<String> {
        self.by_title
            .get(&title_key(title))
            .map(|sources| sources.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Lowercased titles referenced by `note_id`.
    pub fn outgoing(&self, note_id: &str) -> Vec<String> {
        self.by_source
            .get(note_id)
            .map(|titles| titles.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_referenced(&self, title: &str) -> bool {
        self.by_title.contains_key(&title_key(title))
    }

    /// Content rewrites needed to point every reference to `old_title` at
    /// `new_title`, as `(note id, new content)` pairs in id order.
    ///
    /// Pure planning: nothing in the index or the store changes. Notes whose
    /// content would not change are left out, which keeps the rewrite
    /// idempotent.
    pub fn plan_rewrites(
        &self,
        store: &NoteStore,
        old_title: &str,
        new_title: &str,
        exclude: Option<&str>,
    ) -> Vec<(String, String)> {
        self.sources_for(old_title)
            .into_iter()
            .filter(|id| Some(id.as_str()) != exclude)
            .filter_map(|id| {
                let note = store.get(&id)?;
                let rewritten = rewrite_links(&note.content, old_title, new_title)?;
                (rewritten != note.content).then_some((id, rewritten))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebuild_replaces_previous_references() {
        let mut index = BacklinkIndex::new();
        index.rebuild_references_for("/silo/a.md", "[[Target]] and [[Other]]");
        assert_eq!(index.sources_for("target"), vec!["/silo/a.md"]);

        index.rebuild_references_for("/silo/a.md", "only [[Other]]");
        assert!(index.sources_for("Target").is_empty());
        assert!(!index.is_referenced("Target"));
        assert_eq!(index.outgoing("/silo/a.md"), vec!["other"]);
    }

    #[test]
    fn test_references_grouped_by_source() {
        let mut index = BacklinkIndex::new();
        index.rebuild_references_for("/silo/b.md", "x\n[[Topic]] here\n[t](Topic)");
        index.rebuild_references_for("/silo/a.md", "[[topic]]");

        let refs = index.references_to("TOPIC");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].0, "/silo/a.md");
        assert_eq!(refs[1].0, "/silo/b.md");
        assert_eq!(refs[1].1.len(), 2);
        assert_eq!(refs[1].1[0].line_path, LinePath::new(1, 0));
        assert_eq!(refs[1].1[0].line_element, "[[Topic]] here");
    }

    #[test]
    fn test_remove_source() {
        let mut index = BacklinkIndex::new();
        index.rebuild_references_for("/silo/new.md", "[[Target]]");
        assert_eq!(index.sources_for("Target"), vec!["/silo/new.md"]);

        index.remove_source("/silo/new.md");
        assert!(index.references_to("Target").is_empty());
        assert!(index.outgoing("/silo/new.md").is_empty());
    }

    #[test]
    fn test_plan_rewrites_skips_excluded_and_unchanged() {
        let mut store = NoteStore::new();
        let a = Note::new("/silo/a.md", "a", "see [[Old]]");
        let b = Note::new("/silo/b.md", "b", "also [[Old|alias]]");
        let old = Note::new("/silo/Old.md", "Old", "self [[Old]]");
        let index = BacklinkIndex::rebuild_all([&a, &b, &old]);
        for note in [a, b, old] {
            store.upsert(note);
        }

        let plan = index.plan_rewrites(&store, "Old", "New", Some("/silo/Old.md"));
        assert_eq!(
            plan,
            vec![
                ("/silo/a.md".to_string(), "see [[New]]".to_string()),
                ("/silo/b.md".to_string(), "also [[New|alias]]".to_string()),
            ]
        );
    }
}
