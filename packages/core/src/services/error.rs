//! Service Layer Error Types
//!
//! This module defines error types for service-layer operations, providing
//! detailed error handling for silo mutations and the rename/move protocol.

use crate::db::TreeError;
use crate::fs::FsError;
use crate::models::ValidationError;
use crate::services::rename_protocol::{IntentKind, ProtocolStep};
use thiserror::Error;
use uuid::Uuid;

/// Service operation errors
///
/// Validation and structural errors are raised before any external effect.
/// Storage errors are retryable; a failed rename or move additionally keeps
/// its intent in the journal and reports how far it got.
#[derive(Error, Debug)]
pub enum NoteServiceError {
    /// Note not found by id or title
    #[error("Note not found: {id}")]
    NoteNotFound { id: String },

    /// Validation failed for note
    #[error("Note validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// Tree structure violated
    #[error("Tree operation failed: {0}")]
    Tree(#[from] TreeError),

    /// File system write/delete failed
    #[error("Storage failed while trying to {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: FsError,
    },

    /// A rename/move stopped part way; its intent stays in the journal
    #[error("{kind} {intent_id} stopped after step {completed}: {source}")]
    ProtocolIncomplete {
        intent_id: Uuid,
        kind: IntentKind,
        completed: ProtocolStep,
        #[source]
        source: Box<NoteServiceError>,
    },

    /// Another operation on the same identity is in flight
    #[error("Note is busy with another operation: {id}")]
    IdentityBusy { id: String },

    /// Configuration rejected at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A protocol task panicked or was aborted by the runtime
    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl NoteServiceError {
    /// Create a note not found error
    pub fn note_not_found(id: impl Into<String>) -> Self {
        Self::NoteNotFound { id: id.into() }
    }

    /// Create a storage error with the action that failed
    pub fn storage(context: impl Into<String>, source: FsError) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }

    /// Create an identity busy error
    pub fn identity_busy(id: impl Into<String>) -> Self {
        Self::IdentityBusy { id: id.into() }
    }

    /// Create a protocol incomplete error
    pub fn protocol_incomplete(
        intent_id: Uuid,
        kind: IntentKind,
        completed: ProtocolStep,
        source: NoteServiceError,
    ) -> Self {
        Self::ProtocolIncomplete {
            intent_id,
            kind,
            completed,
            source: Box::new(source),
        }
    }

    /// Whether retrying the same call (or `resume_pending`) can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::ProtocolIncomplete { .. } | Self::IdentityBusy { .. }
        )
    }

    /// Last completed protocol step, for incomplete renames and moves
    pub fn completed_step(&self) -> Option<ProtocolStep> {
        match self {
            Self::ProtocolIncomplete { completed, .. } => Some(*completed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let storage = NoteServiceError::storage("write note", FsError::unavailable("write_file", "/a.md"));
        assert!(storage.is_retryable());
        assert!(storage.to_string().contains("write note"));

        let validation: NoteServiceError = ValidationError::EmptyTitle.into();
        assert!(!validation.is_retryable());

        let tree: NoteServiceError = TreeError::directory_not_empty("/silo/a", 2).into();
        assert!(!tree.is_retryable());
    }

    #[test]
    fn test_protocol_incomplete_reports_progress() {
        let err = NoteServiceError::protocol_incomplete(
            Uuid::new_v4(),
            IntentKind::Rename,
            ProtocolStep::NewFileWritten,
            NoteServiceError::storage("write snapshot", FsError::unavailable("write_json_file", "/silo")),
        );
        assert!(err.is_retryable());
        assert_eq!(err.completed_step(), Some(ProtocolStep::NewFileWritten));
        assert!(err.to_string().contains("new-file-written"));
    }
}
