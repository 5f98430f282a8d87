//! User preferences
//!
//! Values behind the settings modal. Stored as JSON in the silo's data
//! directory; every field has a serde default so older files keep loading
//! when new settings are added.

use std::path::Path;
use tokio::fs;

/// App-wide preferences structure
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub dark_mode: bool,

    /// Right-to-left text direction
    #[serde(default)]
    pub is_rtl: bool,

    #[serde(default = "default_true")]
    pub spell_check: bool,

    /// Edit raw markdown instead of the rich editor
    #[serde(default)]
    pub raw_mode: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            dark_mode: false,
            is_rtl: false,
            spell_check: true,
            raw_mode: false,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Preferences {
    /// Load preferences, or defaults when the file does not exist yet.
    pub async fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read preferences: {}", e))?;

        serde_json::from_str(&contents).map_err(|e| format!("Failed to parse preferences: {}", e))
    }

    /// Save preferences with an atomic write (write-to-temp, then rename).
    pub async fn save(&self, path: &Path) -> Result<(), String> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| format!("Failed to create preferences directory: {}", e))?;
        }

        let temp_file = path.with_extension("json.tmp");
        let serialized = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize preferences: {}", e))?;

        fs::write(&temp_file, serialized)
            .await
            .map_err(|e| format!("Failed to write preferences: {}", e))?;

        fs::rename(&temp_file, path)
            .await
            .map_err(|e| format!("Failed to save preferences: {}", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let prefs = Preferences::load(&dir.path().join("preferences.json"))
            .await
            .unwrap();
        assert_eq!(prefs, Preferences::default());
        assert!(prefs.spell_check);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".mdsilo").join("preferences.json");
        let prefs = Preferences {
            dark_mode: true,
            is_rtl: true,
            ..Preferences::default()
        };

        prefs.save(&path).await.unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(Preferences::load(&path).await.unwrap(), prefs);
    }

    #[test]
    fn test_old_files_fill_new_fields() {
        let prefs: Preferences = serde_json::from_str(r#"{"dark_mode": true}"#).unwrap();
        assert!(prefs.dark_mode);
        assert!(prefs.spell_check);
        assert!(!prefs.raw_mode);
    }
}
