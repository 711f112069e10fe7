//! Workspace Data Model
//!
//! The persisted snapshot binding a local directory to a remote project,
//! and the ephemeral view of remote resources fetched per operation.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Remote project coordinates: business group, API and API version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// Business group (organization) identifier
    pub business_group_id: String,
    /// API (project) identifier
    pub api_id: String,
    /// API version identifier
    pub api_version_id: String,
}

impl Scope {
    /// Create a new scope
    pub fn new(
        business_group_id: impl Into<String>,
        api_id: impl Into<String>,
        api_version_id: impl Into<String>,
    ) -> Self {
        Self {
            business_group_id: business_group_id.into(),
            api_id: api_id.into(),
            api_version_id: api_version_id.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.business_group_id, self.api_id, self.api_version_id
        )
    }
}

/// Remote-side audit timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    /// When the resource was created on the remote
    pub created: DateTime<Utc>,
    /// When the resource was last modified on the remote
    pub updated: DateTime<Utc>,
}

/// A file known to exist on both sides at the last sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Slash-rooted path relative to the working directory
    pub path: String,
    /// Remote identifier
    pub id: String,
    /// Hex BLAKE3 digest of the content at last sync
    pub hash: String,
    /// Remote audit timestamps at last sync
    pub audit: Audit,
}

/// A directory known to exist on both sides at the last sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    /// Slash-rooted path relative to the working directory
    pub path: String,
    /// Remote identifier
    pub id: String,
}

/// A resource as currently listed by the remote store. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteResource {
    /// Remote identifier
    pub id: String,
    /// Slash-rooted path
    pub path: String,
    /// Whether the resource is a directory
    pub is_directory: bool,
    /// Remote audit timestamps
    pub audit: Audit,
}

/// Persisted snapshot for one local working directory.
///
/// The directory path is the identity key; the snapshot store holds at most
/// one workspace per directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Local working directory
    pub directory: PathBuf,
    /// Remote project this directory is bound to, once set up
    pub scope: Option<Scope>,
    /// Files known at last sync
    pub files: Vec<FileRecord>,
    /// Directories known at last sync
    pub directories: Vec<DirectoryRecord>,
    /// Path of the project's root file
    pub root_file_path: Option<String>,
}

impl Workspace {
    /// Create an empty, unbound workspace for a directory
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            scope: None,
            files: Vec::new(),
            directories: Vec::new(),
            root_file_path: None,
        }
    }

    /// The bound scope, or an error if the directory was never set up
    pub fn scope(&self) -> SyncResult<&Scope> {
        self.scope
            .as_ref()
            .ok_or_else(|| SyncError::WorkspaceNotConfigured(self.directory.clone()))
    }

    /// Look up a file record by path
    pub fn file(&self, path: &str) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Look up a directory record by path
    pub fn directory_record(&self, path: &str) -> Option<&DirectoryRecord> {
        self.directories.iter().find(|d| d.path == path)
    }

    /// Insert a file record, replacing any record with the same path
    pub fn upsert_file(&mut self, record: FileRecord) {
        match self.files.iter_mut().find(|f| f.path == record.path) {
            Some(existing) => *existing = record,
            None => self.files.push(record),
        }
    }

    /// Remove a file record by path
    pub fn remove_file(&mut self, path: &str) -> Option<FileRecord> {
        let index = self.files.iter().position(|f| f.path == path)?;
        Some(self.files.remove(index))
    }

    /// Insert a directory record, replacing any record with the same path
    pub fn upsert_directory(&mut self, record: DirectoryRecord) {
        match self.directories.iter_mut().find(|d| d.path == record.path) {
            Some(existing) => *existing = record,
            None => self.directories.push(record),
        }
    }

    /// Remove a directory record by path
    pub fn remove_directory(&mut self, path: &str) -> Option<DirectoryRecord> {
        let index = self.directories.iter().position(|d| d.path == path)?;
        Some(self.directories.remove(index))
    }

    /// Whether `path` is the project's root file
    pub fn is_root_file(&self, path: &str) -> bool {
        self.root_file_path.as_deref() == Some(path)
    }
}

/// Parent directory of a slash-rooted path, `None` when the parent is the root.
///
/// `"/a/b/c.raml"` has parent `"/a/b"`; `"/c.raml"` has none.
pub fn parent_path(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => None,
        Some(index) => Some(&trimmed[..index]),
    }
}

/// Number of segments in a slash-rooted path
pub fn path_depth(path: &str) -> usize {
    path.split('/').filter(|segment| !segment.is_empty()).count()
}

/// Normalize a user supplied path into the slash-rooted workspace form.
///
/// Backslashes become slashes, duplicate separators collapse, and `.`/`..`
/// segments are rejected.
pub fn normalize_path(path: &str) -> SyncResult<String> {
    let mut segments = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" => continue,
            "." | ".." => return Err(SyncError::InvalidPath(path.to_string())),
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return Err(SyncError::InvalidPath(path.to_string()));
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Convert a workspace path into an on-disk path under `base`.
///
/// Paths that could leave `base` (`.`/`..` segments, backslashes or no
/// segments at all) are rejected.
pub fn to_local_path(base: &Path, path: &str) -> SyncResult<PathBuf> {
    let mut local = base.to_path_buf();
    let mut segments = 0;
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        if segment == "." || segment == ".." || segment.contains('\\') {
            return Err(SyncError::InvalidPath(path.to_string()));
        }
        local.push(segment);
        segments += 1;
    }
    if segments == 0 {
        return Err(SyncError::InvalidPath(path.to_string()));
    }
    Ok(local)
}
