//! Backlink types
//!
//! A backlink is a line in some note that references another note's title.
//! Matches are fully derived from note content and recomputed whenever the
//! referencing note changes.

use crate::utils::text::shorten_string;
use serde::{Deserialize, Serialize};

/// Structural location of a referencing line within a note.
///
/// The first element is the zero-based line index; the second, when present,
/// is the character column of the link on that line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinePath(pub Vec<usize>);

impl LinePath {
    pub fn new(line: usize, column: usize) -> Self {
        Self(vec![line, column])
    }

    pub fn line(&self) -> usize {
        self.0.first().copied().unwrap_or_default()
    }
}

/// One referencing line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklinkMatch {
    pub line_path: LinePath,
    /// Content of the referencing line (read only)
    pub line_element: String,
}

impl BacklinkMatch {
    /// Excerpt of the line centred on `target`.
    pub fn excerpt(&self, target: &str, max_len: usize) -> String {
        shorten_string(&self.line_element, target, max_len)
    }
}

/// All matches from one referencing note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backlink {
    pub note_id: String,
    pub title: String,
    pub matches: Vec<BacklinkMatch>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_excerpt_marks_target() {
        let m = BacklinkMatch {
            line_path: LinePath::new(3, 6),
            line_element: "See [[Roadmap]] for details".to_string(),
        };
        assert_eq!(m.line_path.line(), 3);
        assert_eq!(m.excerpt("Roadmap", 100), "See [[==Roadmap==]] for details");
    }

    #[test]
    fn test_serialization_contract() {
        let m = BacklinkMatch {
            line_path: LinePath::new(0, 2),
            line_element: "a [[B]]".to_string(),
        };
        let value = serde_json::to_value(&m).unwrap();
        assert_eq!(value["linePath"], serde_json::json!([0, 2]));
        assert_eq!(value["lineElement"], "a [[B]]");
    }
}
