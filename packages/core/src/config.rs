//! Silo configuration
use crate::fs::path::{join_path, normalize_dir};
use crate::fs::{DEFAULT_DATA_DIR, DEFAULT_SNAPSHOT_FILE};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the silo root directory
pub const ROOT_ENV_VAR: &str = "MDSILO_ROOT";

/// Upper bound for any result cap, keeps UI lists sane
const MAX_RESULT_CAP: usize = 1000;

/// Configuration for one silo (a root directory of notes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiloConfig {
    /// Root directory holding the notes
    pub root_dir: String,

    /// Directory, relative to the root, for app data (snapshot, journal)
    pub data_dir: String,

    /// Tree snapshot file name inside `data_dir`
    pub snapshot_file: String,

    /// Rename/move intent journal file name inside `data_dir`
    pub journal_file: String,

    /// Number of suggestions returned by link search
    pub link_search_results: usize,

    /// Number of directories offered as move targets for an empty query
    pub move_option_dirs: usize,

    /// Character budget of backlink excerpts
    pub excerpt_length: usize,

    /// Title given to notes renamed to an empty title
    pub untitled_title: String,
}

impl Default for SiloConfig {
    fn default() -> Self {
        Self {
            root_dir: String::new(),
            data_dir: DEFAULT_DATA_DIR.to_string(),
            snapshot_file: DEFAULT_SNAPSHOT_FILE.to_string(),
            journal_file: "journal.json".to_string(),
            link_search_results: 10,
            move_option_dirs: 9,
            excerpt_length: 100,
            untitled_title: "Untitled".to_string(),
        }
    }
}

impl SiloConfig {
    /// Defaults for a silo rooted at `root_dir`.
    pub fn new(root_dir: impl AsRef<str>) -> Self {
        Self {
            root_dir: normalize_dir(root_dir.as_ref()),
            ..Self::default()
        }
    }

    /// Resolve the root from `MDSILO_ROOT`, falling back to `~/mdsilo`.
    pub fn from_env() -> Result<Self, String> {
        if let Ok(root) = std::env::var(ROOT_ENV_VAR) {
            if !root.trim().is_empty() {
                return Ok(Self::new(root));
            }
        }

        let home_dir = dirs::home_dir().ok_or_else(|| "Cannot determine home directory".to_string())?;
        Ok(Self::new(home_dir.join("mdsilo").to_string_lossy()))
    }

    /// App data directory of this silo.
    pub fn data_path(&self) -> String {
        join_path(&self.root_dir, &[&self.data_dir])
    }

    pub fn snapshot_path(&self) -> String {
        join_path(&self.data_path(), &[&self.snapshot_file])
    }

    pub fn journal_path(&self) -> String {
        join_path(&self.data_path(), &[&self.journal_file])
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.root_dir.trim().is_empty() {
            return Err("root_dir cannot be empty".to_string());
        }

        for (name, value) in [
            ("data_dir", &self.data_dir),
            ("snapshot_file", &self.snapshot_file),
            ("journal_file", &self.journal_file),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{} cannot be empty", name));
            }
            if value.contains(['/', '\\']) {
                return Err(format!("{} must be a single path component", name));
            }
        }

        if self.snapshot_file == self.journal_file {
            return Err("snapshot_file and journal_file must differ".to_string());
        }

        for (name, value) in [
            ("link_search_results", self.link_search_results),
            ("move_option_dirs", self.move_option_dirs),
            ("excerpt_length", self.excerpt_length),
        ] {
            if value == 0 {
                return Err(format!("{} must be greater than 0", name));
            }
            if value > MAX_RESULT_CAP {
                return Err(format!("{} cannot exceed {}", name, MAX_RESULT_CAP));
            }
        }

        if self.untitled_title.trim().is_empty() {
            return Err("untitled_title cannot be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SiloConfig::new("/home/me/silo/");
        assert_eq!(config.root_dir, "/home/me/silo");
        assert_eq!(config.link_search_results, 10);
        assert_eq!(config.move_option_dirs, 9);
        assert_eq!(config.excerpt_length, 100);
        assert_eq!(config.untitled_title, "Untitled");
        assert_eq!(config.data_path(), "/home/me/silo/.mdsilo");
        assert_eq!(config.snapshot_path(), "/home/me/silo/.mdsilo/tree.json");
        assert_eq!(config.journal_path(), "/home/me/silo/.mdsilo/journal.json");
    }

    #[test]
    fn test_config_validation() {
        let mut config = SiloConfig::new("/silo");

        // Valid config
        assert!(config.validate().is_ok());

        // Invalid: nested data dir
        config.data_dir = "a/b".to_string();
        assert!(config.validate().is_err());

        // Invalid: journal would overwrite the snapshot
        config.data_dir = ".mdsilo".to_string();
        config.journal_file = config.snapshot_file.clone();
        assert!(config.validate().is_err());

        // Invalid: zero result cap
        config.journal_file = "journal.json".to_string();
        config.link_search_results = 0;
        assert!(config.validate().is_err());

        // Invalid: no root
        assert!(SiloConfig::default().validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SiloConfig = serde_json::from_str(r#"{"root_dir": "/silo"}"#).unwrap();
        assert_eq!(config.excerpt_length, 100);
        assert_eq!(config.data_dir, ".mdsilo");
    }
}
