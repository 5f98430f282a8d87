//! Durable intent journal
//!
//! Every rename and move is recorded here before its first external effect
//! and removed once committed. The journal is one JSON document rewritten
//! wholesale through the [`FileSystem`] on every change; on startup the
//! entries still present are the runs that need replaying.
//!
//! Recording is the only write whose failure aborts a run. Later write
//! failures are logged: replay is idempotent, so an entry that lags behind
//! the real progress only causes steps to be repeated.

use crate::fs::{FileSystem, FsError};
use crate::services::rename_protocol::Intent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const JOURNAL_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct JournalFile {
    version: u32,
    intents: Vec<Intent>,
}

pub struct IntentJournal {
    fs: Arc<dyn FileSystem>,
    path: String,
    intents: Mutex<Vec<Intent>>,
}

impl IntentJournal {
    /// Empty journal persisted at `path`.
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<String>) -> Self {
        Self {
            fs,
            path: path.into(),
            intents: Mutex::new(Vec::new()),
        }
    }

    /// Load the journal at `path`. A missing file is an empty journal; an
    /// unreadable one is logged and treated as empty.
    pub async fn load(fs: Arc<dyn FileSystem>, path: impl Into<String>) -> Result<Self, FsError> {
        let path = path.into();
        let intents = match fs.read_file(&path).await {
            Ok(json) => match serde_json::from_str::<JournalFile>(&json) {
                Ok(file) => file.intents,
                Err(e) => {
                    tracing::warn!("Ignoring unreadable intent journal {}: {}", path, e);
                    Vec::new()
                }
            },
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };

        if !intents.is_empty() {
            tracing::info!("Loaded {} pending intents from {}", intents.len(), path);
        }

        Ok(Self {
            fs,
            path,
            intents: Mutex::new(intents),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Append `intent` and persist. On failure the intent is not kept.
    pub async fn record(&self, intent: &Intent) -> Result<(), FsError> {
        let mut intents = self.intents.lock().await;
        intents.push(intent.clone());
        if let Err(e) = self.persist(&intents).await {
            intents.retain(|pending| pending.id != intent.id);
            return Err(e);
        }
        Ok(())
    }

    /// Persist the progress of `intent`: its last completed step and the
    /// notes it rewrote. Progress never moves backwards.
    pub async fn advance(&self, intent: &Intent) {
        let mut intents = self.intents.lock().await;
        let Some(pending) = intents.iter_mut().find(|pending| pending.id == intent.id) else {
            return;
        };
        if pending.completed >= intent.completed && pending.rewritten == intent.rewritten {
            return;
        }
        pending.completed = pending.completed.max(intent.completed);
        pending.rewritten = intent.rewritten.clone();
        if let Err(e) = self.persist(&intents).await {
            tracing::warn!("Failed to persist journal progress for {}: {}", intent.id, e);
        }
    }

    /// Drop intent `id` once committed or rolled back.
    pub async fn complete(&self, id: Uuid) {
        let mut intents = self.intents.lock().await;
        let before = intents.len();
        intents.retain(|intent| intent.id != id);
        if intents.len() == before {
            return;
        }
        if let Err(e) = self.persist(&intents).await {
            tracing::warn!("Failed to remove committed intent {} from journal: {}", id, e);
        }
    }

    pub async fn pending(&self) -> Vec<Intent> {
        self.intents.lock().await.clone()
    }

    /// Pending intent touching note `id` under its old or new identity.
    pub async fn involving(&self, id: &str) -> Option<Intent> {
        self.intents
            .lock()
            .await
            .iter()
            .find(|intent| intent.involves(id))
            .cloned()
    }

    async fn persist(&self, intents: &[Intent]) -> Result<(), FsError> {
        let file = JournalFile {
            version: JOURNAL_VERSION,
            intents: intents.to_vec(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| FsError::serialization(self.path.clone(), e))?;
        self.fs.write_file(&self.path, &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{FsOp, MemoryFileSystem};
    use crate::models::Note;
    use crate::services::rename_protocol::ProtocolStep;

    const PATH: &str = "/silo/.mdsilo/journal.json";

    fn intent() -> Intent {
        Intent::rename(&Note::new("/silo/Old.md", "Old", "x"), "New", "/silo/New.md")
    }

    #[tokio::test]
    async fn test_record_advance_complete_survive_reload() {
        let fs = MemoryFileSystem::new();
        let journal = IntentJournal::load(Arc::new(fs.clone()), PATH).await.unwrap();
        let mut intent = intent();

        journal.record(&intent).await.unwrap();
        intent.completed = ProtocolStep::NewFileWritten;
        intent.rewritten = vec!["/silo/Source.md".to_string()];
        journal.advance(&intent).await;
        // Never moves backwards
        intent.completed = ProtocolStep::BacklinksUpdated;
        journal.advance(&intent).await;

        let reloaded = IntentJournal::load(Arc::new(fs.clone()), PATH).await.unwrap();
        let pending = reloaded.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].completed, ProtocolStep::NewFileWritten);
        assert_eq!(pending[0].rewritten, vec!["/silo/Source.md".to_string()]);
        assert!(reloaded.involving("/silo/New.md").await.is_some());

        reloaded.complete(intent.id).await;
        let reloaded = IntentJournal::load(Arc::new(fs), PATH).await.unwrap();
        assert!(reloaded.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_record_keeps_nothing() {
        let fs = MemoryFileSystem::new();
        fs.fail_on(FsOp::Write, PATH);
        let journal = IntentJournal::new(Arc::new(fs.clone()), PATH);

        assert!(journal.record(&intent()).await.is_err());
        assert!(journal.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_journal_loads_empty() {
        let fs = MemoryFileSystem::with_files([(PATH, "{not json")]);
        let journal = IntentJournal::load(Arc::new(fs), PATH).await.unwrap();
        assert!(journal.pending().await.is_empty());
    }
}
