//! Editor-facing event and response types
//!
//! The editor reports user actions as [`EditorEvent`]s; `NoteService::handle`
//! turns each into a call on the service and answers with an
//! [`EditorResponse`].

use crate::models::Note;
use crate::services::rename_protocol::ProtocolOutcome;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EditorEvent {
    /// Note body edited
    #[serde(rename_all = "camelCase")]
    ContentChanged { note_id: String, content: String },

    /// Title field committed
    #[serde(rename_all = "camelCase")]
    TitleChanged { note_id: String, title: String },

    /// Link autocomplete query typed
    SearchLink { query: String },

    /// Link to `title` inserted in note `note_id`
    #[serde(rename_all = "camelCase")]
    CreateLink { note_id: String, title: String },

    /// Link clicked
    OpenLink { href: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorResponse {
    Saved(Note),
    Renamed(ProtocolOutcome),
    Suggestions(Vec<LinkSuggestion>),
    LinkCreated { href: String },
    Link(LinkAction),
}

/// Link autocomplete entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSuggestion {
    pub title: String,
    /// Title with whitespace encoded as `_`
    pub url: String,
}

/// What opening a link resolved to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum LinkAction {
    /// Open outside the app
    External { url: String },
    /// The current view moved to this note
    #[serde(rename_all = "camelCase")]
    Navigate { note_id: String },
    /// No note with this title; nothing happened
    Unresolved { title: String },
}

/// Destination of a move
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "camelCase")]
pub enum MoveTarget {
    /// The silo root directory
    Root,
    Dir(String),
}

/// Entry of the move-to picker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveOption {
    pub title: String,
    pub target: MoveTarget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_editor_event_wire_format() {
        let event: EditorEvent = serde_json::from_str(
            r#"{"type":"contentChanged","noteId":"/silo/A.md","content":"hi"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            EditorEvent::ContentChanged {
                note_id: "/silo/A.md".to_string(),
                content: "hi".to_string()
            }
        );
    }

    #[test]
    fn test_move_target_wire_format() {
        assert_eq!(
            serde_json::to_value(MoveTarget::Root).unwrap(),
            serde_json::json!({"kind": "root"})
        );
        assert_eq!(
            serde_json::to_value(MoveTarget::Dir("/silo/a".to_string())).unwrap(),
            serde_json::json!({"kind": "dir", "path": "/silo/a"})
        );
    }
}
