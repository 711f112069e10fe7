//! Local Tree Scanner
//!
//! Lists files and directories under a working directory and hashes file
//! content. Paths are reported slash-rooted and relative to the root.
//! Hidden entries, and everything below a hidden or ignored directory, are
//! skipped.

use crate::error::{SyncError, SyncResult};
use crate::model::to_local_path;
use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Files and directories found by a single walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalListing {
    /// Slash-rooted file paths, sorted
    pub files: Vec<String>,
    /// Slash-rooted directory paths, sorted
    pub directories: Vec<String>,
}

/// View of a local working directory
#[derive(Debug, Clone)]
pub struct LocalTree {
    root: PathBuf,
    ignored: Vec<Pattern>,
    /// Prefixes of `dir/**` patterns, matched against directories themselves
    ignored_dirs: Vec<Pattern>,
}

impl LocalTree {
    /// Create a tree rooted at `root` with glob patterns to exclude
    pub fn new(root: impl Into<PathBuf>, ignored_patterns: &[String]) -> SyncResult<Self> {
        let mut ignored = Vec::with_capacity(ignored_patterns.len());
        let mut ignored_dirs = Vec::new();

        for raw in ignored_patterns {
            let pattern = Pattern::new(raw)
                .map_err(|e| SyncError::Config(format!("Invalid ignored pattern {:?}: {}", raw, e)))?;
            ignored.push(pattern);

            if let Some(prefix) = raw.strip_suffix("/**") {
                if !prefix.is_empty() {
                    let pattern = Pattern::new(prefix).map_err(|e| {
                        SyncError::Config(format!("Invalid ignored pattern {:?}: {}", raw, e))
                    })?;
                    ignored_dirs.push(pattern);
                }
            }
        }

        Ok(Self {
            root: root.into(),
            ignored,
            ignored_dirs,
        })
    }

    /// Root directory of the tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hex BLAKE3 digest of a byte buffer
    pub fn digest(data: &[u8]) -> String {
        blake3::hash(data).to_hex().to_string()
    }

    /// Walk the tree once, collecting files and directories
    pub async fn scan(&self) -> SyncResult<LocalListing> {
        let mut listing = LocalListing::default();
        self.scan_directory(&self.root, "", &mut listing).await?;
        listing.files.sort();
        listing.directories.sort();
        Ok(listing)
    }

    /// All non-hidden files, recursively
    pub async fn list_files(&self) -> SyncResult<Vec<String>> {
        Ok(self.scan().await?.files)
    }

    /// All non-hidden directories, recursively, including empty ones
    pub async fn list_directories(&self) -> SyncResult<Vec<String>> {
        Ok(self.scan().await?.directories)
    }

    async fn scan_directory(
        &self,
        current: &Path,
        prefix: &str,
        listing: &mut LocalListing,
    ) -> SyncResult<()> {
        let mut entries = fs::read_dir(current).await.map_err(|e| {
            SyncError::FileSystem(format!("Failed to read directory {}: {}", current.display(), e))
        })?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SyncError::FileSystem(format!("Failed to read entry: {}", e)))?
        {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!(
                        "Skipping non-UTF-8 entry {:?} in {}",
                        raw,
                        current.display()
                    );
                    continue;
                }
            };
            if name.starts_with('.') {
                continue;
            }

            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };

            let file_type = entry
                .file_type()
                .await
                .map_err(|e| SyncError::FileSystem(format!("Failed to get file type: {}", e)))?;

            if file_type.is_dir() {
                if self.is_ignored_dir(&relative) {
                    debug!("Ignoring directory: {}", relative);
                    continue;
                }
                listing.directories.push(format!("/{}", relative));
                Box::pin(self.scan_directory(&entry.path(), &relative, listing)).await?;
            } else if file_type.is_file() {
                if self.is_ignored_file(&relative) {
                    debug!("Ignoring: {}", relative);
                    continue;
                }
                listing.files.push(format!("/{}", relative));
            }
        }

        Ok(())
    }

    fn is_ignored_file(&self, relative: &str) -> bool {
        self.ignored
            .iter()
            .any(|p| p.matches_with(relative, MATCH_OPTIONS))
    }

    fn is_ignored_dir(&self, relative: &str) -> bool {
        self.is_ignored_file(relative)
            || self
                .ignored_dirs
                .iter()
                .any(|p| p.matches_with(relative, MATCH_OPTIONS))
    }

    /// Whether a scan would report `path`.
    ///
    /// False for hidden entries, ignored entries and anything below a hidden
    /// or ignored directory.
    pub fn is_tracked(&self, path: &str, is_directory: bool) -> bool {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() || segments.iter().any(|s| s.starts_with('.')) {
            return false;
        }

        for end in 1..segments.len() {
            if self.is_ignored_dir(&segments[..end].join("/")) {
                return false;
            }
        }

        let relative = segments.join("/");
        if is_directory {
            !self.is_ignored_dir(&relative)
        } else {
            !self.is_ignored_file(&relative)
        }
    }

    /// On-disk location of a workspace path
    pub fn local_path(&self, path: &str) -> SyncResult<PathBuf> {
        to_local_path(&self.root, path)
    }

    /// Digest of a file's current content
    pub async fn hash(&self, path: &str) -> SyncResult<String> {
        let data = self.read(path).await?;
        Ok(Self::digest(&data))
    }

    /// Read a file's content
    pub async fn read(&self, path: &str) -> SyncResult<Vec<u8>> {
        let local = self.local_path(path)?;
        fs::read(&local).await.map_err(|e| {
            SyncError::FileSystem(format!("Failed to read {}: {}", local.display(), e))
        })
    }

    /// Write a file, creating missing parent directories
    pub async fn write(&self, path: &str, data: &[u8]) -> SyncResult<()> {
        let local = self.local_path(path)?;
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&local, data).await.map_err(|e| {
            SyncError::FileSystem(format!("Failed to write {}: {}", local.display(), e))
        })
    }

    /// Create a directory and any missing parents
    pub async fn create_dir(&self, path: &str) -> SyncResult<()> {
        let local = self.local_path(path)?;
        fs::create_dir_all(&local).await.map_err(|e| {
            SyncError::FileSystem(format!("Failed to create {}: {}", local.display(), e))
        })
    }

    /// Whether a regular file exists at a workspace path
    pub async fn file_exists(&self, path: &str) -> SyncResult<bool> {
        match fs::metadata(self.local_path(path)?).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
