//! File System Collaborator
//!
//! Notes live as markdown files on disk; the tree lives as one JSON snapshot
//! per root directory. Services reach disk only through the [`FileSystem`]
//! trait so the protocol can run against a real directory
//! ([`LocalFileSystem`]) or an in-memory double with failure injection
//! ([`MemoryFileSystem`]).
//!
//! Every method is async: each call is a suspension point for the caller.

mod error;
mod local;
mod memory;
pub mod path;

pub use error::FsError;
pub use local::LocalFileSystem;
pub use memory::{FsCall, FsOp, MemoryFileSystem};

use crate::models::TreeSnapshot;
use async_trait::async_trait;

/// Default directory (relative to a root) holding app data
pub const DEFAULT_DATA_DIR: &str = ".mdsilo";

/// Default file name of the tree snapshot inside the data directory
pub const DEFAULT_SNAPSHOT_FILE: &str = "tree.json";

/// Abstraction over note and snapshot persistence
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; `NoteService` shares one instance
/// across tasks.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<String, FsError>;

    /// Write `content`, creating parent directories as needed.
    async fn write_file(&self, path: &str, content: &str) -> Result<(), FsError>;

    /// Remove a file. Fails with [`FsError::NotFound`] when it is absent.
    async fn delete_file(&self, path: &str) -> Result<(), FsError>;

    /// Move a file to `to`, replacing any file there. Works for paths that
    /// differ only in letter case. Fails with [`FsError::NotFound`] when
    /// `from` is absent.
    async fn rename_file(&self, from: &str, to: &str) -> Result<(), FsError>;

    async fn create_dir(&self, path: &str) -> Result<(), FsError>;

    /// Remove a directory and everything below it.
    async fn delete_dir(&self, path: &str) -> Result<(), FsError>;

    async fn exists(&self, path: &str) -> Result<bool, FsError>;

    /// Persist the snapshot for `snapshot.root_dir`, replacing any previous
    /// one wholesale.
    async fn write_json_file(&self, snapshot: &TreeSnapshot) -> Result<(), FsError>;

    /// Load the snapshot for `root_dir`, `None` when none was written yet.
    async fn read_json_file(&self, root_dir: &str) -> Result<Option<TreeSnapshot>, FsError>;
}

/// Location of the snapshot for `root_dir`.
pub fn snapshot_path(root_dir: &str, data_dir: &str, snapshot_file: &str) -> String {
    path::join_path(root_dir, &[data_dir, snapshot_file])
}
