//! Retrieval (pull)
//!
//! Downloads the remote tree into the working directory and rebuilds the
//! workspace records from it. Pull overwrites; it never merges.

use crate::config::DirectoryOrder;
use crate::error::SyncResult;
use crate::model::{DirectoryRecord, FileRecord, RemoteResource, Workspace, parent_path};
use crate::remote::RemoteClient;
use crate::scanner::LocalTree;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Paths written by a pull
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullSummary {
    /// Files now recorded, in remote listing order
    pub files: Vec<String>,
    /// Directories now recorded, parents first
    pub directories: Vec<String>,
}

/// Fetch the remote tree for the workspace's scope into `tree`.
///
/// `workspace` is only replaced once every file has been written; on error
/// it is left untouched. Remote paths that would resolve outside `tree`
/// fail the pull before anything is written. Resources a scan of `tree`
/// would not report (hidden or ignored) are neither written nor recorded.
pub async fn pull<R: RemoteClient + ?Sized>(
    remote: &R,
    tree: &LocalTree,
    order: DirectoryOrder,
    workspace: &mut Workspace,
) -> SyncResult<PullSummary> {
    let scope = workspace.scope()?.clone();
    let listing = remote.list_resources(&scope).await?;
    let root_file_path = remote.root_file_path(&scope).await?;

    for resource in &listing {
        tree.local_path(&resource.path)?;
    }
    let tracked: Vec<&RemoteResource> = listing
        .iter()
        .filter(|r| {
            let keep = tree.is_tracked(&r.path, r.is_directory);
            if !keep {
                debug!("Skipping untracked remote path {}", r.path);
            }
            keep
        })
        .collect();

    let mut directories: Vec<DirectoryRecord> = tracked
        .iter()
        .filter(|r| r.is_directory)
        .map(|r| DirectoryRecord {
            path: r.path.clone(),
            id: r.id.clone(),
        })
        .collect();
    directories.sort_by(|a, b| order.compare(&a.path, &b.path));

    for directory in &directories {
        tree.create_dir(&directory.path).await?;
        debug!("Created local directory {}", directory.path);
    }

    let mut files = Vec::new();
    for resource in tracked.iter().filter(|r| !r.is_directory) {
        let content = remote.fetch_file(&scope, resource).await?;
        tree.write(&resource.path, &content).await?;
        debug!("Wrote {} ({} bytes)", resource.path, content.len());

        files.push(FileRecord {
            path: resource.path.clone(),
            id: resource.id.clone(),
            hash: LocalTree::digest(&content),
            audit: resource.audit,
        });
    }

    let summary = PullSummary {
        files: files.iter().map(|f| f.path.clone()).collect(),
        directories: directories.iter().map(|d| d.path.clone()).collect(),
    };

    workspace.files = files;
    workspace.directories = directories;
    match root_file_path {
        Some(root) if parent_path(&root).is_some() => {
            warn!("Ignoring nested remote root file {}", root);
        }
        Some(root) if !tree.is_tracked(&root, false) => {
            warn!("Ignoring untracked remote root file {}", root);
        }
        Some(root) => workspace.root_file_path = Some(root),
        None => {}
    }

    info!(
        "Pulled {} file(s) and {} dir(s) for {}",
        summary.files.len(),
        summary.directories.len(),
        scope
    );
    Ok(summary)
}
