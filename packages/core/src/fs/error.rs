//! File System Error Types

use std::io;
use thiserror::Error;

/// File system collaborator errors
#[derive(Error, Debug)]
pub enum FsError {
    /// Nothing exists at the path
    #[error("File not found: {path}")]
    NotFound { path: String },

    /// Underlying I/O failure
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// JSON encode/decode failure
    #[error("Serialization failed for {path}: {source}")]
    Serialization {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Backend refused the operation
    #[error("File system unavailable for {op} at {path}")]
    Unavailable { op: String, path: String },
}

impl FsError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Wrap an I/O error, mapping `NotFound` to [`FsError::NotFound`].
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            return Self::NotFound { path };
        }
        Self::Io { path, source }
    }

    pub fn serialization(path: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            path: path.into(),
            source,
        }
    }

    pub fn unavailable(op: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Unavailable {
            op: op.into(),
            path: path.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
