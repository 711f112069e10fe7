//! Force Reconciliation
//!
//! Recovery path for irreconcilable conflicts: every remote resource except
//! the project's root file is deleted, the root file is re-uploaded from the
//! local tree and the workspace is reset to that single record. A normal
//! push afterwards repopulates the remote from the local tree.

use crate::config::DirectoryOrder;
use crate::error::{SyncError, SyncResult};
use crate::model::{FileRecord, RemoteResource, Workspace};
use crate::reconcile::Reconciler;
use crate::remote::{NewFile, RemoteClient};
use crate::scanner::LocalTree;
use tracing::{info, warn};

/// Discard remote state and reset `workspace` to the root file alone.
///
/// The workspace is updated after each remote deletion, so a failure part
/// way through leaves it describing what still exists.
pub async fn force_push<R: RemoteClient + ?Sized>(
    remote: &R,
    tree: &LocalTree,
    order: DirectoryOrder,
    workspace: &mut Workspace,
) -> SyncResult<FileRecord> {
    let scope = workspace.scope()?.clone();
    let root_path = workspace.root_file_path.clone().ok_or_else(|| {
        SyncError::Config(format!(
            "No root file designated for {}",
            workspace.directory.display()
        ))
    })?;

    if !tree.file_exists(&root_path).await? {
        return Err(SyncError::RootFileDeleted(root_path));
    }

    let listing = remote.list_resources(&scope).await?;
    let (mut directories, files): (Vec<&RemoteResource>, Vec<&RemoteResource>) =
        listing.iter().partition(|r| r.is_directory);

    let mut root_resource = None;
    for resource in files {
        if resource.path == root_path {
            root_resource = Some(resource);
            continue;
        }
        remote.delete_file(&scope, resource).await?;
        info!("Force deleted file {}", resource.path);
        workspace.remove_file(&resource.path);
    }

    directories.sort_by(|a, b| order.compare(&b.path, &a.path));
    for resource in directories {
        remote.delete_directory(&scope, resource).await?;
        info!("Force deleted directory {}", resource.path);
        workspace.remove_directory(&resource.path);
    }
    workspace.files.retain(|f| f.path == root_path);
    workspace.directories.clear();

    let record = match root_resource {
        Some(resource) => {
            Reconciler::new(remote, tree, order)
                .update_file(&scope, resource, workspace.file(&root_path))
                .await?
        }
        None => {
            warn!("Root file {} missing remotely, recreating it", root_path);
            let content = tree.read(&root_path).await?;
            let hash = LocalTree::digest(&content);
            let created = remote
                .create_file(
                    &scope,
                    NewFile {
                        path: root_path.clone(),
                        parent_id: None,
                        content,
                    },
                )
                .await?;
            FileRecord {
                path: root_path.clone(),
                id: created.id,
                hash,
                audit: created.audit,
            }
        }
    };

    workspace.files = vec![record.clone()];
    info!("Force push reset {} to {}", scope, root_path);
    Ok(record)
}
