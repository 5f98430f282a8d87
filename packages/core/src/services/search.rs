//! Note Search
//!
//! Fuzzy title lookup over notes (and optionally directories). Pure read:
//! a search captures the candidate titles when it is created and ranks them
//! on first iteration. The resulting [`SearchResults`] can be iterated any
//! number of times and always yields the same ranked, capped sequence.
//!
//! # Ranking
//!
//! Case-insensitive. Higher scores first:
//!
//! - exact title match
//! - prefix match (shorter titles first)
//! - substring match (earlier occurrences first)
//! - subsequence match, with bonuses for consecutive characters and for
//!   matches at word starts
//!
//! Ties break on title (case-insensitive), then id, so ranking is
//! deterministic.

use crate::db::{NoteStore, NoteTreeIndex};
use crate::models::EntryKind;
use crate::utils::text::ci_string_compare;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const EXACT_SCORE: i32 = 1000;
const PREFIX_SCORE: i32 = 900;
const SUBSTRING_SCORE: i32 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    /// Maximum number of results
    pub num_of_results: usize,
    /// Include directories alongside notes
    pub search_dir: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            num_of_results: 10,
            search_dir: false,
        }
    }
}

impl SearchOptions {
    pub fn new(num_of_results: usize) -> Self {
        Self {
            num_of_results,
            ..Self::default()
        }
    }

    pub fn with_dirs(mut self, search_dir: bool) -> Self {
        self.search_dir = search_dir;
        self
    }
}

/// One ranked result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub kind: EntryKind,
    pub score: i32,
}

/// Lazily ranked, restartable search results
#[derive(Debug)]
pub struct SearchResults {
    query: String,
    limit: usize,
    candidates: Vec<(String, String, EntryKind)>,
    ranked: OnceLock<Vec<SearchHit>>,
}

impl SearchResults {
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Iterate the ranked results from the start.
    pub fn iter(&self) -> std::slice::Iter<'_, SearchHit> {
        self.ranked().iter()
    }

    pub fn len(&self) -> usize {
        self.ranked().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked().is_empty()
    }

    pub fn into_vec(self) -> Vec<SearchHit> {
        self.ranked();
        self.ranked.into_inner().unwrap_or_default()
    }

    fn ranked(&self) -> &Vec<SearchHit> {
        self.ranked.get_or_init(|| {
            let mut hits: Vec<SearchHit> = self
                .candidates
                .iter()
                .filter_map(|(id, title, kind)| {
                    fuzzy_score(title, &self.query).map(|score| SearchHit {
                        id: id.clone(),
                        title: title.clone(),
                        kind: *kind,
                        score,
                    })
                })
                .collect();
            hits.sort_by(|a, b| {
                b.score
                    .cmp(&a.score)
                    .then_with(|| ci_string_compare(&a.title, &b.title))
                    .then_with(|| a.id.cmp(&b.id))
            });
            hits.truncate(self.limit);
            hits
        })
    }
}

impl<'a> IntoIterator for &'a SearchResults {
    type Item = &'a SearchHit;
    type IntoIter = std::slice::Iter<'a, SearchHit>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Search entry point over a store and tree.
pub struct NoteSearch;

impl NoteSearch {
    /// Capture candidates for `query`; ranking happens on first iteration.
    pub fn search(
        notes: &NoteStore,
        tree: &NoteTreeIndex,
        query: &str,
        options: &SearchOptions,
    ) -> SearchResults {
        let mut candidates: Vec<(String, String, EntryKind)> = notes
            .get_all()
            .into_iter()
            .map(|note| (note.id.clone(), note.title.clone(), EntryKind::Note))
            .collect();

        if options.search_dir {
            candidates.extend(
                tree.entries()
                    .into_iter()
                    .filter(|entry| entry.is_dir() && entry.id != tree.root())
                    .map(|entry| (entry.id.clone(), entry.title.clone(), EntryKind::Dir)),
            );
        }

        SearchResults {
            query: query.trim().to_string(),
            limit: options.num_of_results,
            candidates,
            ranked: OnceLock::new(),
        }
    }
}

/// Score `text` against `query`; `None` when it does not match.
pub fn fuzzy_score(text: &str, query: &str) -> Option<i32> {
    if query.is_empty() {
        return Some(0);
    }
    let text_lower = text.to_lowercase();
    let query_lower = query.to_lowercase();

    if text_lower == query_lower {
        return Some(EXACT_SCORE);
    }

    if text_lower.starts_with(&query_lower) {
        let len = text_lower.chars().count() as i32;
        return Some(PREFIX_SCORE + (99 - len).max(0));
    }

    if let Some(pos) = text_lower.find(&query_lower) {
        let pos = text_lower[..pos].chars().count() as i32;
        return Some(SUBSTRING_SCORE + (99 - pos).max(0));
    }

    let text_chars: Vec<char> = text_lower.chars().collect();
    let query_chars: Vec<char> = query_lower.chars().collect();
    let mut query_idx = 0;
    let mut score: i32 = 0;
    let mut prev_matched = false;

    for (text_idx, ch) in text_chars.iter().enumerate() {
        if query_idx == query_chars.len() {
            break;
        }
        if *ch == query_chars[query_idx] {
            score += (20 - text_idx as i32).max(1);
            if prev_matched {
                score += 10;
            }
            if text_idx == 0 || matches!(text_chars[text_idx - 1], ' ' | '_' | '-' | '/') {
                score += 15;
            }
            prev_matched = true;
            query_idx += 1;
        } else {
            prev_matched = false;
        }
    }

    (query_idx == query_chars.len()).then(|| score.min(SUBSTRING_SCORE - 1))
}
