//! Sync Configuration Module
//!
//! Settings shared by every engine operation, loaded from a TOML file.

use crate::error::{SyncError, SyncResult};
use crate::model::path_depth;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Name of the advisory lock file created in a working directory
pub const DEFAULT_LOCK_FILE_NAME: &str = ".apisync.lock";

/// How directory paths are ordered for creation and deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryOrder {
    /// Shallower paths first, ties broken lexicographically
    #[default]
    Depth,
    /// Plain string order
    Lexicographic,
}

impl DirectoryOrder {
    /// Sort paths so every parent precedes its descendants
    pub fn sort_for_creation(self, paths: &mut [String]) {
        paths.sort_by(|a, b| self.compare(a, b));
    }

    /// Sort paths so every descendant precedes its parent
    pub fn sort_for_deletion(self, paths: &mut [String]) {
        paths.sort_by(|a, b| self.compare(b, a));
    }

    /// Creation order of two paths
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            DirectoryOrder::Depth => path_depth(a).cmp(&path_depth(b)).then_with(|| a.cmp(b)),
            DirectoryOrder::Lexicographic => a.cmp(b),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// SQLite file holding workspace snapshots
    pub snapshot_path: PathBuf,
    /// Glob patterns (relative to the working directory) excluded from scans
    pub ignored_patterns: Vec<String>,
    /// Ordering used for directory creation and deletion
    pub directory_order: DirectoryOrder,
    /// Advisory lock file name inside the working directory
    pub lock_file_name: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            ignored_patterns: vec![
                "**/node_modules/**".to_string(),
                "**/*.tmp".to_string(),
                "**/*.swp".to_string(),
                "**/*~".to_string(),
                "**/Thumbs.db".to_string(),
            ],
            directory_order: DirectoryOrder::Depth,
            lock_file_name: DEFAULT_LOCK_FILE_NAME.to_string(),
        }
    }
}

impl SyncConfig {
    /// Default configuration file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("apisync")
            .join("config.toml")
    }

    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist
    pub fn load(path: &Path) -> SyncResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: SyncConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> SyncResult<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> SyncResult<()> {
        let name = &self.lock_file_name;
        if !name.starts_with('.')
            || name == "."
            || name == ".."
            || name.contains(['/', '\\'])
        {
            return Err(SyncError::Config(format!(
                "lock_file_name must be a hidden file name, got {:?}",
                self.lock_file_name
            )));
        }
        for pattern in &self.ignored_patterns {
            glob::Pattern::new(pattern).map_err(|e| {
                SyncError::Config(format!("Invalid ignored pattern {:?}: {}", pattern, e))
            })?;
        }
        Ok(())
    }
}

fn default_snapshot_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("apisync")
        .join("workspaces.db")
}
