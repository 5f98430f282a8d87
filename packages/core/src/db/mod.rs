//! In-memory indexes
//!
//! The three indexes a silo is served from:
//!
//! - [`NoteStore`] - `id → Note`, the authoritative cache of all notes
//! - [`NoteTreeIndex`] - directories and notes, keyed by path
//! - [`BacklinkIndex`] - referenced title → referencing notes, derived from
//!   content
//!
//! None of them touch the file system. `NoteService` owns all three and keeps
//! them consistent with each other and with disk.

mod backlink_index;
mod error;
pub mod events;
mod note_store;
mod tree_index;

pub use backlink_index::BacklinkIndex;
pub use error::TreeError;
pub use events::DomainEvent;
pub use note_store::NoteStore;
pub use tree_index::NoteTreeIndex;
