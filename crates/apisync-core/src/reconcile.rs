//! Push Reconciliation
//!
//! Applies a [`Status`] to the remote store in dependency order:
//! directories are created parents first, then files are created, updated
//! and deleted, and finally directories are deleted deepest first. The
//! workspace is mutated after every successful remote call, so on failure
//! it describes exactly what was applied.

use crate::config::DirectoryOrder;
use crate::error::{SyncError, SyncResult};
use crate::model::{Audit, DirectoryRecord, FileRecord, RemoteResource, Scope, Workspace, parent_path};
use crate::remote::{FileUpdate, NewDirectory, NewFile, RemoteClient};
use crate::scanner::LocalTree;
use crate::status::Status;
use std::collections::HashMap;
use tracing::{debug, info};

/// Drives the remote calls of a single push
pub struct Reconciler<'a, R: RemoteClient + ?Sized> {
    remote: &'a R,
    tree: &'a LocalTree,
    order: DirectoryOrder,
}

impl<'a, R: RemoteClient + ?Sized> Reconciler<'a, R> {
    /// Create a reconciler for one working directory
    pub fn new(remote: &'a R, tree: &'a LocalTree, order: DirectoryOrder) -> Self {
        Self {
            remote,
            tree,
            order,
        }
    }

    /// Push `status` to the remote, recording progress in `workspace`.
    ///
    /// `listing` is the remote listing taken before the push. Returns the
    /// applied status, without the unchanged bucket.
    pub async fn push(
        &self,
        workspace: &mut Workspace,
        status: &Status,
        listing: &[RemoteResource],
    ) -> SyncResult<Status> {
        let scope = workspace.scope()?.clone();
        let remote_by_path: HashMap<&str, &RemoteResource> =
            listing.iter().map(|r| (r.path.as_str(), r)).collect();
        let mut directory_ids: HashMap<String, String> = listing
            .iter()
            .filter(|r| r.is_directory)
            .map(|r| (r.path.clone(), r.id.clone()))
            .collect();

        self.create_directories(&scope, workspace, &status.added_directories, &mut directory_ids)
            .await?;
        self.create_files(&scope, workspace, &status.added, &directory_ids)
            .await?;
        self.update_files(&scope, workspace, &status.changed, &remote_by_path)
            .await?;
        self.delete_files(&scope, workspace, &status.deleted, &remote_by_path)
            .await?;
        self.delete_directories(&scope, workspace, &status.deleted_directories, &remote_by_path)
            .await?;

        Ok(Status {
            unchanged: Vec::new(),
            ..status.clone()
        })
    }

    async fn create_directories(
        &self,
        scope: &Scope,
        workspace: &mut Workspace,
        added: &[String],
        directory_ids: &mut HashMap<String, String>,
    ) -> SyncResult<()> {
        let mut paths = added.to_vec();
        self.order.sort_for_creation(&mut paths);

        for path in paths {
            if let Some(id) = directory_ids.get(&path) {
                debug!("Directory {} already exists remotely", path);
                workspace.upsert_directory(DirectoryRecord {
                    path: path.clone(),
                    id: id.clone(),
                });
                continue;
            }

            let parent_id = resolve_parent(&path, directory_ids)?;
            let created = self
                .remote
                .create_directory(
                    scope,
                    NewDirectory {
                        path: path.clone(),
                        parent_id,
                    },
                )
                .await?;
            info!("Created directory {}", path);

            directory_ids.insert(path.clone(), created.id.clone());
            workspace.upsert_directory(DirectoryRecord {
                path,
                id: created.id,
            });
        }
        Ok(())
    }

    async fn create_files(
        &self,
        scope: &Scope,
        workspace: &mut Workspace,
        added: &[String],
        directory_ids: &HashMap<String, String>,
    ) -> SyncResult<()> {
        for path in added {
            let content = self.tree.read(path).await?;
            let hash = LocalTree::digest(&content);
            let parent_id = resolve_parent(path, directory_ids)?;

            let created = self
                .remote
                .create_file(
                    scope,
                    NewFile {
                        path: path.clone(),
                        parent_id,
                        content,
                    },
                )
                .await?;
            info!("Created file {}", path);

            workspace.upsert_file(FileRecord {
                path: path.clone(),
                id: created.id,
                hash,
                audit: created.audit,
            });
        }
        Ok(())
    }

    async fn update_files(
        &self,
        scope: &Scope,
        workspace: &mut Workspace,
        changed: &[String],
        remote_by_path: &HashMap<&str, &RemoteResource>,
    ) -> SyncResult<()> {
        for path in changed {
            let resource = remote_by_path
                .get(path.as_str())
                .filter(|r| !r.is_directory)
                .ok_or_else(|| SyncError::RemoteResourceMissing(path.clone()))?;
            let record = self.update_file(scope, resource, workspace.file(path)).await?;
            workspace.upsert_file(record);
        }
        Ok(())
    }

    /// Upload a file's current local content over an existing remote file.
    ///
    /// The returned record keeps the `created` time of `previous` (or of the
    /// remote resource when there is no previous record) and adopts the
    /// remote's new `updated` time.
    pub(crate) async fn update_file(
        &self,
        scope: &Scope,
        resource: &RemoteResource,
        previous: Option<&FileRecord>,
    ) -> SyncResult<FileRecord> {
        let content = self.tree.read(&resource.path).await?;
        let hash = LocalTree::digest(&content);

        let updated = self
            .remote
            .update_file(
                scope,
                FileUpdate {
                    id: resource.id.clone(),
                    path: resource.path.clone(),
                    content,
                },
            )
            .await?;
        info!("Updated file {}", resource.path);

        let created = previous
            .map(|record| record.audit.created)
            .unwrap_or(resource.audit.created);

        Ok(FileRecord {
            path: resource.path.clone(),
            id: resource.id.clone(),
            hash,
            audit: Audit {
                created,
                updated: updated.audit.updated,
            },
        })
    }

    async fn delete_files(
        &self,
        scope: &Scope,
        workspace: &mut Workspace,
        deleted: &[String],
        remote_by_path: &HashMap<&str, &RemoteResource>,
    ) -> SyncResult<()> {
        for path in deleted {
            match remote_by_path.get(path.as_str()) {
                Some(resource) if !resource.is_directory => {
                    self.remote.delete_file(scope, resource).await?;
                    info!("Deleted file {}", path);
                }
                _ => debug!("File {} already absent remotely", path),
            }
            workspace.remove_file(path);
        }
        Ok(())
    }

    async fn delete_directories(
        &self,
        scope: &Scope,
        workspace: &mut Workspace,
        deleted: &[String],
        remote_by_path: &HashMap<&str, &RemoteResource>,
    ) -> SyncResult<()> {
        let mut paths = deleted.to_vec();
        self.order.sort_for_deletion(&mut paths);

        for path in paths {
            match remote_by_path.get(path.as_str()) {
                Some(resource) if resource.is_directory => {
                    self.remote.delete_directory(scope, resource).await?;
                    info!("Deleted directory {}", path);
                }
                _ => debug!("Directory {} already absent remotely", path),
            }
            workspace.remove_directory(&path);
        }
        Ok(())
    }
}

/// Remote id of a path's parent directory; `None` for top-level paths
fn resolve_parent(
    path: &str,
    directory_ids: &HashMap<String, String>,
) -> SyncResult<Option<String>> {
    match parent_path(path) {
        None => Ok(None),
        Some(parent) => directory_ids
            .get(parent)
            .cloned()
            .map(Some)
            .ok_or_else(|| SyncError::ParentNotFound(parent.to_string())),
    }
}
