//! In-memory file system
//!
//! Test double for the [`FileSystem`] trait. Keeps files in a map, records
//! every call in order and can be told to fail specific operations, which is
//! how the rename protocol's failure and replay paths are exercised.

use super::{snapshot_path, FileSystem, FsError, DEFAULT_DATA_DIR, DEFAULT_SNAPSHOT_FILE};
use crate::models::TreeSnapshot;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Operations of the [`FileSystem`] trait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsOp {
    Read,
    Write,
    Delete,
    Rename,
    CreateDir,
    DeleteDir,
    Exists,
    WriteJson,
    ReadJson,
}

impl fmt::Display for FsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FsOp::Read => "read_file",
            FsOp::Write => "write_file",
            FsOp::Delete => "delete_file",
            FsOp::Rename => "rename_file",
            FsOp::CreateDir => "create_dir",
            FsOp::DeleteDir => "delete_dir",
            FsOp::Exists => "exists",
            FsOp::WriteJson => "write_json_file",
            FsOp::ReadJson => "read_json_file",
        };
        f.write_str(name)
    }
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsCall {
    pub op: FsOp,
    pub path: String,
}

#[derive(Default)]
struct MemoryState {
    files: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
    /// `(op, path)` pairs that fail; `None` path fails every call of `op`
    failures: Vec<(FsOp, Option<String>)>,
    calls: Vec<FsCall>,
}

#[derive(Clone)]
pub struct MemoryFileSystem {
    state: Arc<Mutex<MemoryState>>,
    data_dir: String,
    snapshot_file: String,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            data_dir: DEFAULT_DATA_DIR.to_string(),
            snapshot_file: DEFAULT_SNAPSHOT_FILE.to_string(),
        }
    }

    /// Seed files without recording calls.
    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let fs = Self::new();
        {
            let mut state = fs.lock_state();
            for (path, content) in files {
                state.files.insert(path.into(), content.into());
            }
        }
        fs
    }

    fn lock_state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every `op` on `path` fail until [`clear_failures`](Self::clear_failures).
    pub fn fail_on(&self, op: FsOp, path: impl Into<String>) {
        self.lock_state().failures.push((op, Some(path.into())));
    }

    /// Make every call of `op` fail, whatever the path.
    pub fn fail_all(&self, op: FsOp) {
        self.lock_state().failures.push((op, None));
    }

    pub fn clear_failures(&self) {
        self.lock_state().failures.clear();
    }

    pub fn calls(&self) -> Vec<FsCall> {
        self.lock_state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock_state().calls.clear();
    }

    /// Recorded calls of one kind.
    pub fn calls_of(&self, op: FsOp) -> Vec<String> {
        self.lock_state()
            .calls
            .iter()
            .filter(|call| call.op == op)
            .map(|call| call.path.clone())
            .collect()
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.lock_state().files.get(path).cloned()
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.lock_state().files.contains_key(path)
    }

    pub fn file_paths(&self) -> Vec<String> {
        self.lock_state().files.keys().cloned().collect()
    }

    /// Record the call and check injected failures.
    fn enter(&self, op: FsOp, path: &str) -> Result<MutexGuard<'_, MemoryState>, FsError> {
        let mut state = self.lock_state();
        state.calls.push(FsCall {
            op,
            path: path.to_string(),
        });
        let fails = state
            .failures
            .iter()
            .any(|(fail_op, fail_path)| *fail_op == op && fail_path.as_deref().map_or(true, |p| p == path));
        if fails {
            return Err(FsError::unavailable(op.to_string(), path));
        }
        Ok(state)
    }

    fn snapshot_path(&self, root_dir: &str) -> String {
        snapshot_path(root_dir, &self.data_dir, &self.snapshot_file)
    }
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn read_file(&self, path: &str) -> Result<String, FsError> {
        let state = self.enter(FsOp::Read, path)?;
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| FsError::not_found(path))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        let mut state = self.enter(FsOp::Write, path)?;
        state.files.insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<(), FsError> {
        let mut state = self.enter(FsOp::Delete, path)?;
        state
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| FsError::not_found(path))
    }

    /// Recorded under `from`.
    async fn rename_file(&self, from: &str, to: &str) -> Result<(), FsError> {
        let mut state = self.enter(FsOp::Rename, from)?;
        let content = state
            .files
            .remove(from)
            .ok_or_else(|| FsError::not_found(from))?;
        state.files.insert(to.to_string(), content);
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<(), FsError> {
        let mut state = self.enter(FsOp::CreateDir, path)?;
        state.dirs.insert(path.to_string());
        Ok(())
    }

    async fn delete_dir(&self, path: &str) -> Result<(), FsError> {
        let mut state = self.enter(FsOp::DeleteDir, path)?;
        let prefix = format!("{}/", path.trim_end_matches('/'));
        state.files.retain(|file, _| !file.starts_with(&prefix));
        state
            .dirs
            .retain(|dir| dir != path && !dir.starts_with(&prefix));
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, FsError> {
        let state = self.enter(FsOp::Exists, path)?;
        Ok(state.files.contains_key(path) || state.dirs.contains(path))
    }

    async fn write_json_file(&self, snapshot: &TreeSnapshot) -> Result<(), FsError> {
        let path = self.snapshot_path(&snapshot.root_dir);
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| FsError::serialization(path.clone(), e))?;
        let mut state = self.enter(FsOp::WriteJson, &path)?;
        state.files.insert(path, json);
        Ok(())
    }

    async fn read_json_file(&self, root_dir: &str) -> Result<Option<TreeSnapshot>, FsError> {
        let path = self.snapshot_path(root_dir);
        let state = self.enter(FsOp::ReadJson, &path)?;
        match state.files.get(&path) {
            Some(json) => serde_json::from_str(json)
                .map(Some)
                .map_err(|e| FsError::serialization(path.clone(), e)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls_in_order() {
        let fs = MemoryFileSystem::new();
        fs.write_file("/silo/A.md", "a").await.unwrap();
        fs.delete_file("/silo/A.md").await.unwrap();

        assert_eq!(
            fs.calls(),
            vec![
                FsCall {
                    op: FsOp::Write,
                    path: "/silo/A.md".to_string()
                },
                FsCall {
                    op: FsOp::Delete,
                    path: "/silo/A.md".to_string()
                },
            ]
        );
        assert!(!fs.has_file("/silo/A.md"));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let fs = MemoryFileSystem::with_files([("/silo/A.md", "a")]);
        fs.fail_on(FsOp::Delete, "/silo/A.md");

        let err = fs.delete_file("/silo/A.md").await.unwrap_err();
        assert!(matches!(err, FsError::Unavailable { .. }));
        assert!(fs.has_file("/silo/A.md"));

        fs.clear_failures();
        fs.delete_file("/silo/A.md").await.unwrap();
        assert!(fs.delete_file("/silo/A.md").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rename_moves_content() {
        let fs = MemoryFileSystem::with_files([("/silo/draft.md", "d")]);
        fs.rename_file("/silo/draft.md", "/silo/Draft.md").await.unwrap();

        assert_eq!(fs.file_paths(), vec!["/silo/Draft.md".to_string()]);
        assert_eq!(fs.calls_of(FsOp::Rename), vec!["/silo/draft.md".to_string()]);
        let err = fs.rename_file("/silo/draft.md", "/silo/x.md").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_snapshot_lives_in_data_dir() {
        let fs = MemoryFileSystem::new();
        let snapshot = TreeSnapshot::new("/silo", Vec::new(), Vec::new());
        fs.write_json_file(&snapshot).await.unwrap();

        assert!(fs.has_file("/silo/.mdsilo/tree.json"));
        assert_eq!(fs.read_json_file("/silo").await.unwrap(), Some(snapshot));
        assert_eq!(fs.read_json_file("/other").await.unwrap(), None);
    }
}
