//! Sync Engine
//!
//! Entry point for every operation on a working directory. Each call loads
//! the directory's workspace from the snapshot store, threads it through
//! the diff, conflict and reconciliation stages and persists the result.
//! Mutating calls hold the directory's lock file for their whole duration.

use crate::config::SyncConfig;
use crate::conflicts::{Conflicts, detect_conflicts};
use crate::error::{SyncError, SyncResult};
use crate::force::force_push;
use crate::lock::WorkspaceLock;
use crate::model::{FileRecord, Scope, Workspace, normalize_path, parent_path};
use crate::pull::{PullSummary, pull};
use crate::reconcile::Reconciler;
use crate::remote::RemoteClient;
use crate::scanner::LocalTree;
use crate::snapshot::SnapshotStore;
use crate::status::{Status, compute_status};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Reconciliation engine bound to one remote client and snapshot store
pub struct SyncEngine<R: RemoteClient> {
    remote: Arc<R>,
    store: Arc<SnapshotStore>,
    config: SyncConfig,
}

impl<R: RemoteClient> SyncEngine<R> {
    /// Create an engine over an already opened store
    pub fn new(remote: Arc<R>, store: Arc<SnapshotStore>, config: SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            remote,
            store,
            config,
        })
    }

    /// Create an engine, opening the store at `config.snapshot_path`
    pub fn open(remote: Arc<R>, config: SyncConfig) -> SyncResult<Self> {
        let store = SnapshotStore::open(&config.snapshot_path)?;
        info!("Opened snapshot store at {}", config.snapshot_path.display());
        Self::new(remote, Arc::new(store), config)
    }

    /// Remote client in use
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Snapshot store in use
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Active configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // MARK: - Workspace lifecycle

    /// Bind a working directory to a remote project.
    ///
    /// `root_file_path` designates the project's root file and must be a
    /// top-level path. Rebinding to a different scope drops the old records.
    pub async fn init(
        &self,
        directory: &Path,
        scope: Scope,
        root_file_path: Option<&str>,
    ) -> SyncResult<Workspace> {
        let directory = self.resolve(directory).await?;
        let root_file_path = root_file_path.map(normalize_path).transpose()?;
        if let Some(root) = &root_file_path {
            if parent_path(root).is_some() {
                return Err(SyncError::InvalidPath(format!(
                    "root file must be top-level: {}",
                    root
                )));
            }
        }

        let _lock = self.lock(&directory)?;
        let mut workspace = self.store.get(&directory)?;
        if workspace.scope.as_ref() != Some(&scope) {
            workspace.files.clear();
            workspace.directories.clear();
        }
        workspace.scope = Some(scope);
        workspace.root_file_path = root_file_path;
        self.store.update(&workspace)?;

        info!(
            "Initialized workspace {} for {}",
            directory.display(),
            workspace.scope()?
        );
        Ok(workspace)
    }

    /// Whether a workspace exists for a directory
    pub async fn exists(&self, directory: &Path) -> SyncResult<bool> {
        let directory = self.key(directory).await;
        Ok(self.store.exists(&directory)?)
    }

    /// The stored workspace for a directory, if any
    pub async fn workspace(&self, directory: &Path) -> SyncResult<Option<Workspace>> {
        let directory = self.key(directory).await;
        Ok(self.store.load(&directory)?)
    }

    /// Every directory with a stored workspace
    pub fn workspaces(&self) -> SyncResult<Vec<PathBuf>> {
        Ok(self.store.list()?)
    }

    /// Delete a directory's workspace; the directory itself is untouched
    pub async fn cleanup(&self, directory: &Path) -> SyncResult<()> {
        let directory = self.key(directory).await;
        self.store.delete(&directory)?;
        info!("Removed workspace {}", directory.display());
        Ok(())
    }

    // MARK: - Inspection

    /// Local changes since the last sync
    pub async fn status(&self, directory: &Path) -> SyncResult<Status> {
        let directory = self.resolve(directory).await?;
        let workspace = self.load(&directory)?;
        let tree = self.tree(&directory)?;
        compute_status(&workspace, &tree).await
    }

    /// Local changes and their divergence from the live remote
    pub async fn conflicts(&self, directory: &Path) -> SyncResult<(Status, Conflicts)> {
        let directory = self.resolve(directory).await?;
        let workspace = self.load(&directory)?;
        let tree = self.tree(&directory)?;

        let status = compute_status(&workspace, &tree).await?;
        let listing = self.remote.list_resources(workspace.scope()?).await?;
        let conflicts = detect_conflicts(&status, &workspace, &listing);
        Ok((status, conflicts))
    }

    // MARK: - Reconciliation

    /// Push local changes to the remote.
    ///
    /// Fails with [`SyncError::ConflictsFound`] before any remote mutation
    /// when a blocking conflict exists. Otherwise the workspace is persisted
    /// whether or not every step succeeded, and the first error is returned.
    pub async fn push(&self, directory: &Path) -> SyncResult<Status> {
        let directory = self.resolve(directory).await?;
        let _lock = self.lock(&directory)?;
        let mut workspace = self.load(&directory)?;
        let tree = self.tree(&directory)?;

        let status = compute_status(&workspace, &tree).await?;
        if status.is_clean() {
            info!("Nothing to push for {}", directory.display());
            return Ok(Status {
                unchanged: Vec::new(),
                ..status
            });
        }

        let listing = self.remote.list_resources(workspace.scope()?).await?;
        let conflicts = detect_conflicts(&status, &workspace, &listing);
        if conflicts.is_blocking() {
            warn!("Push of {} blocked: {}", directory.display(), conflicts);
            return Err(SyncError::ConflictsFound(conflicts));
        }

        let result = Reconciler::new(self.remote.as_ref(), &tree, self.config.directory_order)
            .push(&mut workspace, &status, &listing)
            .await;
        let applied = self.persist_after(&workspace, result)?;

        info!(
            "Pushed {}: {} added, {} changed, {} deleted",
            directory.display(),
            applied.added.len(),
            applied.changed.len(),
            applied.deleted.len()
        );
        Ok(applied)
    }

    /// Replace remote state with the root file alone, ignoring conflicts.
    ///
    /// Progress is persisted whether or not the operation completes.
    pub async fn force_push(&self, directory: &Path) -> SyncResult<FileRecord> {
        let directory = self.resolve(directory).await?;
        let _lock = self.lock(&directory)?;
        let mut workspace = self.load(&directory)?;
        let tree = self.tree(&directory)?;

        let result = force_push(
            self.remote.as_ref(),
            &tree,
            self.config.directory_order,
            &mut workspace,
        )
        .await;
        self.persist_after(&workspace, result)
    }

    /// Download the remote tree and rebuild the workspace from it
    pub async fn pull(&self, directory: &Path) -> SyncResult<PullSummary> {
        let directory = self.resolve(directory).await?;
        let _lock = self.lock(&directory)?;
        let mut workspace = self.load(&directory)?;
        let tree = self.tree(&directory)?;

        let summary = pull(
            self.remote.as_ref(),
            &tree,
            self.config.directory_order,
            &mut workspace,
        )
        .await?;
        self.store.update(&workspace)?;
        Ok(summary)
    }

    // MARK: - Helpers

    /// Persist `workspace`, then return `result`; an operation error wins
    /// over a persistence error
    fn persist_after<T>(&self, workspace: &Workspace, result: SyncResult<T>) -> SyncResult<T> {
        match (result, self.store.update(workspace)) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(persist_err)) => {
                warn!(
                    "Failed to persist {} after error: {:#}",
                    workspace.directory.display(),
                    persist_err
                );
                Err(e)
            }
        }
    }

    async fn resolve(&self, directory: &Path) -> SyncResult<PathBuf> {
        tokio::fs::canonicalize(directory).await.map_err(|e| {
            SyncError::FileSystem(format!(
                "Failed to resolve {}: {}",
                directory.display(),
                e
            ))
        })
    }

    /// Store key for a directory that may no longer exist on disk
    async fn key(&self, directory: &Path) -> PathBuf {
        tokio::fs::canonicalize(directory)
            .await
            .unwrap_or_else(|_| directory.to_path_buf())
    }

    fn load(&self, directory: &Path) -> SyncResult<Workspace> {
        let workspace = self
            .store
            .load(directory)?
            .ok_or_else(|| SyncError::WorkspaceNotConfigured(directory.to_path_buf()))?;
        workspace.scope()?;
        Ok(workspace)
    }

    fn tree(&self, directory: &Path) -> SyncResult<LocalTree> {
        LocalTree::new(directory, &self.config.ignored_patterns)
    }

    fn lock(&self, directory: &Path) -> SyncResult<WorkspaceLock> {
        WorkspaceLock::acquire(directory, &self.config.lock_file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::memory_remote::{MemoryRemote, RemoteOp};
    use tempfile::{TempDir, tempdir};

    fn scope() -> Scope {
        Scope::new("bg", "api", "v1")
    }

    fn engine() -> SyncEngine<MemoryRemote> {
        let store = SnapshotStore::open_in_memory().unwrap();
        SyncEngine::new(
            Arc::new(MemoryRemote::new(scope())),
            Arc::new(store),
            SyncConfig::default(),
        )
        .unwrap()
    }

    fn touch(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    async fn initialized(engine: &SyncEngine<MemoryRemote>) -> TempDir {
        let dir = tempdir().unwrap();
        touch(dir.path(), "api.raml", b"#%RAML 1.0");
        engine
            .init(dir.path(), scope(), Some("api.raml"))
            .await
            .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_init_rejects_nested_root() {
        let engine = engine();
        let dir = tempdir().unwrap();
        let err = engine
            .init(dir.path(), scope(), Some("/types/api.raml"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidPath(_)));
        assert!(!engine.exists(dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_unconfigured_directory() {
        let engine = engine();
        let dir = tempdir().unwrap();
        assert!(matches!(
            engine.status(dir.path()).await,
            Err(SyncError::WorkspaceNotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_push_persists_and_is_idempotent() {
        let engine = engine();
        let dir = initialized(&engine).await;
        touch(dir.path(), "types/user.raml", b"user");

        let applied = engine.push(dir.path()).await.unwrap();
        assert_eq!(applied.added, vec!["/api.raml", "/types/user.raml"]);
        assert_eq!(applied.added_directories, vec!["/types"]);

        let stored = engine.workspace(dir.path()).await.unwrap().unwrap();
        assert_eq!(stored.files.len(), 2);
        assert_eq!(stored.directories.len(), 1);

        engine.remote().clear_calls();
        let second = engine.push(dir.path()).await.unwrap();
        assert!(second.is_clean());
        assert!(engine.remote().calls().is_empty());
        assert!(!dir.path().join(".apisync.lock").exists());
    }

    #[tokio::test]
    async fn test_push_blocked_by_remote_change() {
        let engine = engine();
        let dir = initialized(&engine).await;
        touch(dir.path(), "x.raml", b"v1");
        engine.push(dir.path()).await.unwrap();

        engine.remote().touch("/x.raml", b"theirs");
        touch(dir.path(), "x.raml", b"mine");
        engine.remote().clear_calls();

        let err = engine.push(dir.path()).await.unwrap_err();
        let conflicts = err.conflicts().unwrap();
        assert_eq!(conflicts.changed_remotely, vec!["/x.raml"]);
        assert!(engine.remote().mutation_calls().is_empty());
        assert_eq!(engine.remote().content("/x.raml").unwrap(), b"theirs");
    }

    #[tokio::test]
    async fn test_failed_push_persists_progress() {
        let engine = engine();
        let dir = initialized(&engine).await;
        touch(dir.path(), "b.raml", b"b");
        touch(dir.path(), "c.raml", b"c");
        engine.remote().fail_on(
            RemoteOp::CreateFile,
            Some("/b.raml"),
            RemoteError::Transport("reset".into()),
        );

        assert!(engine.push(dir.path()).await.is_err());
        let stored = engine.workspace(dir.path()).await.unwrap().unwrap();
        assert_eq!(stored.files.len(), 1);
        assert!(stored.file("/api.raml").is_some());

        engine.remote().clear_failures();
        let retry = engine.push(dir.path()).await.unwrap();
        assert_eq!(retry.added, vec!["/b.raml", "/c.raml"]);
    }

    #[tokio::test]
    async fn test_conflicts_report() {
        let engine = engine();
        let dir = initialized(&engine).await;
        engine.remote().insert_file("/api.raml", b"already there");

        let (status, conflicts) = engine.conflicts(dir.path()).await.unwrap();
        assert_eq!(status.added, vec!["/api.raml"]);
        assert_eq!(conflicts.added_already_exists, vec!["/api.raml"]);
    }

    #[tokio::test]
    async fn test_force_push_then_push() {
        let engine = engine();
        let dir = initialized(&engine).await;
        touch(dir.path(), "x.raml", b"v1");
        engine.push(dir.path()).await.unwrap();
        engine.remote().touch("/x.raml", b"theirs");
        engine.remote().insert_file("/stray/s.raml", b"s");
        touch(dir.path(), "x.raml", b"mine");

        engine.force_push(dir.path()).await.unwrap();
        let stored = engine.workspace(dir.path()).await.unwrap().unwrap();
        assert_eq!(stored.files.len(), 1);
        assert!(stored.directories.is_empty());
        assert_eq!(engine.remote().paths(), vec!["/api.raml"]);

        engine.push(dir.path()).await.unwrap();
        assert_eq!(engine.remote().content("/x.raml").unwrap(), b"mine");
    }

    #[tokio::test]
    async fn test_pull_persists() {
        let engine = engine();
        let dir = tempdir().unwrap();
        engine.init(dir.path(), scope(), None).await.unwrap();
        engine.remote().insert_file("/api.raml", b"#%RAML 1.0");
        engine.remote().insert_file("/types/t.raml", b"t");
        engine.remote().set_root_file_path(Some("/api.raml"));

        let summary = engine.pull(dir.path()).await.unwrap();
        assert_eq!(summary.files.len(), 2);

        let stored = engine.workspace(dir.path()).await.unwrap().unwrap();
        assert_eq!(stored.root_file_path.as_deref(), Some("/api.raml"));
        assert!(engine.status(dir.path()).await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_locked_directory() {
        let engine = engine();
        let dir = initialized(&engine).await;
        let canonical = std::fs::canonicalize(dir.path()).unwrap();
        let _held = WorkspaceLock::acquire(&canonical, ".apisync.lock").unwrap();

        assert!(matches!(
            engine.push(dir.path()).await,
            Err(SyncError::WorkspaceLocked(_))
        ));
        assert!(engine.status(dir.path()).await.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup() {
        let engine = engine();
        let dir = initialized(&engine).await;
        assert!(engine.exists(dir.path()).await.unwrap());
        assert_eq!(engine.workspaces().unwrap().len(), 1);

        engine.cleanup(dir.path()).await.unwrap();
        assert!(!engine.exists(dir.path()).await.unwrap());
        assert!(dir.path().join("api.raml").exists());
    }
}
