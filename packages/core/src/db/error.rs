//! Tree Index Error Types
//!
//! Structural failures of the note tree: missing entries, bad parents and
//! attempts to remove a non-empty directory without asking for recursion.

use thiserror::Error;

/// Note tree operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// No entry with this id
    #[error("Tree entry not found: {id}")]
    EntryNotFound { id: String },

    /// Parent directory is not in the tree
    #[error("Parent directory not found: {parent}")]
    ParentNotFound { parent: String },

    /// Expected a directory entry, found a note
    #[error("Not a directory: {id}")]
    NotADirectory { id: String },

    /// Expected a note entry, found a directory
    #[error("Not a note: {id}")]
    NotANote { id: String },

    /// Structural violation: a directory with children was removed without
    /// `recursive`
    #[error("Directory {id} is not empty ({children} entries)")]
    DirectoryNotEmpty { id: String, children: usize },

    /// Path does not live under the tree root
    #[error("Path {path} is outside the root directory {root}")]
    OutsideRoot { path: String, root: String },

    /// The root directory itself cannot be removed
    #[error("Cannot remove the root directory {root}")]
    RootRemoval { root: String },
}

impl TreeError {
    pub fn entry_not_found(id: impl Into<String>) -> Self {
        Self::EntryNotFound { id: id.into() }
    }

    pub fn parent_not_found(parent: impl Into<String>) -> Self {
        Self::ParentNotFound {
            parent: parent.into(),
        }
    }

    pub fn not_a_directory(id: impl Into<String>) -> Self {
        Self::NotADirectory { id: id.into() }
    }

    pub fn not_a_note(id: impl Into<String>) -> Self {
        Self::NotANote { id: id.into() }
    }

    pub fn directory_not_empty(id: impl Into<String>, children: usize) -> Self {
        Self::DirectoryNotEmpty {
            id: id.into(),
            children,
        }
    }

    pub fn outside_root(path: impl Into<String>, root: impl Into<String>) -> Self {
        Self::OutsideRoot {
            path: path.into(),
            root: root.into(),
        }
    }

    /// True for the structural violation raised by non-recursive deletes
    pub fn is_structural_violation(&self) -> bool {
        matches!(self, Self::DirectoryNotEmpty { .. })
    }
}
