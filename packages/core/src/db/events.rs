//! Domain Events for NoteService
//!
//! This module defines the domain events emitted by `NoteService` when a
//! silo changes. Events follow the observer pattern so other parts of the
//! app (the UI layer, a file watcher) can react to changes without coupling
//! to the service internals.
//!
//! # Event Flow
//!
//! 1. NoteService commits a mutation (create, content change, rename, ...)
//! 2. Domain events are emitted via a tokio broadcast channel
//! 3. All subscribers receive the events asynchronously
//!
//! Events are only emitted for committed states. A failed rename emits
//! nothing.

use crate::models::Note;
use serde::{Deserialize, Serialize};

/// Domain events emitted by NoteService
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    /// A new note was created
    #[serde(rename = "note:created")]
    NoteCreated(Note),

    /// Content or flags of an existing note changed
    #[serde(rename = "note:updated")]
    NoteUpdated(Note),

    /// A note was deleted
    #[serde(rename = "note:deleted")]
    NoteDeleted { id: String },

    /// A note changed title and identity
    #[serde(rename = "note:renamed", rename_all = "camelCase")]
    NoteRenamed {
        old_id: String,
        new_id: String,
        old_title: String,
        new_title: String,
    },

    /// A note changed directory
    #[serde(rename = "note:moved", rename_all = "camelCase")]
    NoteMoved { old_id: String, new_id: String },

    /// The tree structure changed and its snapshot was rewritten
    #[serde(rename = "tree:changed", rename_all = "camelCase")]
    TreeChanged { root_dir: String },

    /// The current view moved to another note (or to none)
    #[serde(rename = "view:navigated")]
    Navigated { id: Option<String> },
}

impl DomainEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            DomainEvent::NoteCreated(_) => "note:created",
            DomainEvent::NoteUpdated(_) => "note:updated",
            DomainEvent::NoteDeleted { .. } => "note:deleted",
            DomainEvent::NoteRenamed { .. } => "note:renamed",
            DomainEvent::NoteMoved { .. } => "note:moved",
            DomainEvent::TreeChanged { .. } => "tree:changed",
            DomainEvent::Navigated { .. } => "view:navigated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Contract test: the `type` field matches `event_type()` and struct
    /// variants are flat, camelCase objects.
    #[test]
    fn test_event_serialization_contract() {
        let event = DomainEvent::NoteRenamed {
            old_id: "/silo/Old.md".to_string(),
            new_id: "/silo/New.md".to_string(),
            old_title: "Old".to_string(),
            new_title: "New".to_string(),
        };

        let parsed = serde_json::to_value(&event).unwrap();
        assert_eq!(parsed.get("type").unwrap(), event.event_type());
        assert_eq!(parsed.get("oldId").unwrap(), "/silo/Old.md");
        assert_eq!(parsed.get("newTitle").unwrap(), "New");
        assert!(parsed.get("noteRenamed").is_none());
    }

    #[test]
    fn test_note_event_round_trip() {
        let event = DomainEvent::NoteCreated(Note::new("/silo/A.md", "A", "body"));
        let json = serde_json::to_string(&event).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.get("type").unwrap(), "note:created");
        assert_eq!(parsed.get("title").unwrap(), "A");

        let back: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
