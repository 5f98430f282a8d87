//! Business Services
//!
//! This module contains the core business logic of a silo:
//!
//! - `NoteService` - loading, creation, edits, deletion, links and search
//! - `rename_protocol` - the journaled rename/move state machine
//! - `IntentJournal` - durable record of in-flight renames and moves
//! - `IdentityLocks` - single-flight guards per note path and title
//! - `NoteSearch` - fuzzy title search
//!
//! Services coordinate between the in-memory indexes (`db`) and the file
//! system (`fs`), implementing business rules and orchestrating multi-step
//! operations.

pub mod editor_events;
pub mod error;
pub mod identity_lock;
pub mod journal;
pub mod note_service;
pub mod rename_protocol;
pub mod search;

pub use editor_events::{EditorEvent, EditorResponse, LinkAction, LinkSuggestion, MoveOption, MoveTarget};
pub use error::NoteServiceError;
pub use identity_lock::{ContentGuard, ContentLocks, IdentityGuard, IdentityLocks};
pub use journal::IntentJournal;
pub use note_service::{NoteService, SiloState};
pub use rename_protocol::{
    Intent, IntentKind, ProtocolOutcome, ProtocolReport, ProtocolRun, ProtocolState, ProtocolStep,
};
pub use search::{NoteSearch, SearchHit, SearchOptions, SearchResults};
