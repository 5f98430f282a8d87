//! mdSilo Core Note Graph
//!
//! This crate provides the note graph behind an mdSilo workspace: a silo is a
//! root directory of Markdown notes, and the core keeps an in-memory model of
//! it in sync with the files on disk.
//!
//! # Architecture
//!
//! - **Path identity**: a note's id is its normalized file path
//! - **Title-keyed backlinks**: references are indexed by the title they name,
//!   so they survive the referenced note being deleted and recreated
//! - **Journaled renames**: renames and moves record an intent before touching
//!   disk and can be replayed after a crash
//! - **Disk first**: every mutation writes files before the in-memory state
//!   changes, so readers only observe committed states
//!
//! # Modules
//!
//! - [`models`] - Data structures (Note, TreeEntry, TreeSnapshot, Backlink)
//! - [`db`] - In-memory indexes (note store, tree index, backlink index)
//! - [`fs`] - File system abstraction with local and in-memory backends
//! - [`services`] - Business services (NoteService, rename protocol, search)
//! - [`utils`] - Link parsing and rewriting, string helpers
//! - [`config`] - Silo configuration
//! - [`preferences`] - Persisted UI preferences

pub mod config;
pub mod db;
pub mod fs;
pub mod models;
pub mod preferences;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::SiloConfig;
pub use fs::{FileSystem, FsError, LocalFileSystem, MemoryFileSystem};
pub use models::*;
pub use preferences::Preferences;
pub use services::*;
