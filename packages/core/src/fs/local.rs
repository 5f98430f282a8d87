//! Disk-backed file system using `tokio::fs`.

use super::path::dir_path;
use super::{snapshot_path, FileSystem, FsError, DEFAULT_DATA_DIR, DEFAULT_SNAPSHOT_FILE};
use crate::models::TreeSnapshot;
use async_trait::async_trait;
use tokio::fs;

#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    data_dir: String,
    snapshot_file: String,
}

impl LocalFileSystem {
    pub fn new() -> Self {
        Self::with_layout(DEFAULT_DATA_DIR, DEFAULT_SNAPSHOT_FILE)
    }

    /// Use a custom data directory and snapshot file name.
    pub fn with_layout(data_dir: impl Into<String>, snapshot_file: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            snapshot_file: snapshot_file.into(),
        }
    }

    async fn ensure_parent(path: &str) -> Result<(), FsError> {
        let parent = dir_path(path);
        if parent.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&parent)
            .await
            .map_err(|e| FsError::io(parent, e))
    }

    /// Write-to-temp then rename so readers never see a half-written file.
    async fn write_atomic(path: &str, content: &str) -> Result<(), FsError> {
        Self::ensure_parent(path).await?;
        let temp = format!("{}.tmp", path);
        fs::write(&temp, content)
            .await
            .map_err(|e| FsError::io(temp.clone(), e))?;
        fs::rename(&temp, path)
            .await
            .map_err(|e| FsError::io(path, e))
    }
}

impl Default for LocalFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read_file(&self, path: &str) -> Result<String, FsError> {
        fs::read_to_string(path)
            .await
            .map_err(|e| FsError::io(path, e))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        Self::ensure_parent(path).await?;
        fs::write(path, content)
            .await
            .map_err(|e| FsError::io(path, e))
    }

    async fn delete_file(&self, path: &str) -> Result<(), FsError> {
        fs::remove_file(path)
            .await
            .map_err(|e| FsError::io(path, e))
    }

    async fn rename_file(&self, from: &str, to: &str) -> Result<(), FsError> {
        Self::ensure_parent(to).await?;
        // Through a temp name, otherwise case-insensitive volumes keep the old casing
        let temp = format!("{}.renaming", to);
        fs::rename(from, &temp)
            .await
            .map_err(|e| FsError::io(from, e))?;
        if let Err(e) = fs::rename(&temp, to).await {
            let _ = fs::rename(&temp, from).await;
            return Err(FsError::io(to, e));
        }
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<(), FsError> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| FsError::io(path, e))
    }

    async fn delete_dir(&self, path: &str) -> Result<(), FsError> {
        fs::remove_dir_all(path)
            .await
            .map_err(|e| FsError::io(path, e))
    }

    async fn exists(&self, path: &str) -> Result<bool, FsError> {
        fs::try_exists(path)
            .await
            .map_err(|e| FsError::io(path, e))
    }

    async fn write_json_file(&self, snapshot: &TreeSnapshot) -> Result<(), FsError> {
        let path = snapshot_path(&snapshot.root_dir, &self.data_dir, &self.snapshot_file);
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| FsError::serialization(path.clone(), e))?;
        Self::write_atomic(&path, &json).await
    }

    async fn read_json_file(&self, root_dir: &str) -> Result<Option<TreeSnapshot>, FsError> {
        let path = snapshot_path(root_dir, &self.data_dir, &self.snapshot_file);
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(FsError::io(path, e)),
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| FsError::serialization(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::path::normalize_slash;
    use crate::models::{Note, TreeEntry};
    use tempfile::TempDir;

    fn root_of(dir: &TempDir) -> String {
        normalize_slash(&dir.path().to_string_lossy())
    }

    #[tokio::test]
    async fn test_write_read_delete_file() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        let path = format!("{}/nested/A.md", root_of(&dir));

        fs.write_file(&path, "hello").await.unwrap();
        assert!(fs.exists(&path).await.unwrap());
        assert_eq!(fs.read_file(&path).await.unwrap(), "hello");

        fs.delete_file(&path).await.unwrap();
        assert!(fs.delete_file(&path).await.unwrap_err().is_not_found());
        assert!(fs.read_file(&path).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rename_file_changes_case() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        let old = format!("{}/draft.md", root_of(&dir));
        let new = format!("{}/Draft.md", root_of(&dir));
        fs.write_file(&old, "body").await.unwrap();

        fs.rename_file(&old, &new).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Draft.md".to_string()]);
        assert_eq!(fs.read_file(&new).await.unwrap(), "body");
        assert!(fs.rename_file(&old, &new).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = TempDir::new().unwrap();
        let root = root_of(&dir);
        let fs = LocalFileSystem::new();

        assert!(fs.read_json_file(&root).await.unwrap().is_none());

        let note = Note::new(format!("{}/A.md", root), "A", "");
        let snapshot = TreeSnapshot::new(
            root.clone(),
            vec![TreeEntry::note(&note, root.clone())],
            vec![note.meta()],
        );
        fs.write_json_file(&snapshot).await.unwrap();

        let loaded = fs.read_json_file(&root).await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert!(dir.path().join(".mdsilo").join("tree.json").exists());
    }

    #[tokio::test]
    async fn test_delete_dir_removes_contents() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        let sub = format!("{}/sub", root_of(&dir));
        fs.write_file(&format!("{}/x.md", sub), "x").await.unwrap();

        fs.delete_dir(&sub).await.unwrap();
        assert!(!fs.exists(&sub).await.unwrap());
    }
}
