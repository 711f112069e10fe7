//! Local Status (Diff Engine)
//!
//! Compares the local tree against the workspace snapshot. Every local path
//! and every recorded path lands in exactly one bucket.

use crate::error::SyncResult;
use crate::model::{DirectoryRecord, FileRecord, Workspace};
use crate::scanner::{LocalListing, LocalTree};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Difference between the local tree and the last snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Local files with no record
    pub added: Vec<String>,
    /// Recorded files whose local content hash changed
    pub changed: Vec<String>,
    /// Recorded files missing locally
    pub deleted: Vec<String>,
    /// Recorded files whose local content hash matches
    pub unchanged: Vec<String>,
    /// Local directories with no record
    pub added_directories: Vec<String>,
    /// Recorded directories missing locally
    pub deleted_directories: Vec<String>,
}

impl Status {
    /// Classify local files and directories against the snapshot records.
    ///
    /// `local_hashes` must hold the current digest of every local file that
    /// also has a record; other entries are ignored.
    pub fn from_parts(
        records: &[FileRecord],
        local_files: &[String],
        local_hashes: &HashMap<String, String>,
        directory_records: &[DirectoryRecord],
        local_directories: &[String],
    ) -> Self {
        let mut status = Status::default();
        let mut pending: BTreeSet<&str> = local_files.iter().map(String::as_str).collect();

        for record in records {
            if pending.remove(record.path.as_str()) {
                match local_hashes.get(&record.path) {
                    Some(hash) if *hash == record.hash => status.unchanged.push(record.path.clone()),
                    _ => status.changed.push(record.path.clone()),
                }
            } else {
                status.deleted.push(record.path.clone());
            }
        }
        status.added = pending.into_iter().map(str::to_string).collect();

        let mut pending_dirs: BTreeSet<&str> =
            local_directories.iter().map(String::as_str).collect();
        for record in directory_records {
            if !pending_dirs.remove(record.path.as_str()) {
                status.deleted_directories.push(record.path.clone());
            }
        }
        status.added_directories = pending_dirs.into_iter().map(str::to_string).collect();

        status
    }

    /// Whether a push would have nothing to do
    pub fn is_clean(&self) -> bool {
        self.added.is_empty()
            && self.changed.is_empty()
            && self.deleted.is_empty()
            && self.added_directories.is_empty()
            && self.deleted_directories.is_empty()
    }
}

/// Compute the status of a workspace's directory.
///
/// Hashes are only computed for local files that have a record.
pub async fn compute_status(workspace: &Workspace, tree: &LocalTree) -> SyncResult<Status> {
    let LocalListing { files, directories } = tree.scan().await?;

    let local: BTreeSet<&str> = files.iter().map(String::as_str).collect();
    let mut local_hashes = HashMap::new();
    for record in &workspace.files {
        if local.contains(record.path.as_str()) {
            local_hashes.insert(record.path.clone(), tree.hash(&record.path).await?);
        }
    }

    let status = Status::from_parts(
        &workspace.files,
        &files,
        &local_hashes,
        &workspace.directories,
        &directories,
    );

    debug!(
        "Status for {}: {} added, {} changed, {} deleted, {} unchanged",
        workspace.directory.display(),
        status.added.len(),
        status.changed.len(),
        status.deleted.len(),
        status.unchanged.len()
    );
    Ok(status)
}
