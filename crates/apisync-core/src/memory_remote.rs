//! In-Memory Remote Store
//!
//! A complete [`RemoteClient`] held in process memory. It enforces the same
//! structural rules a real remote does (parents before children, empty
//! directories before deletion, unique paths) and records every call, which
//! makes it suitable for tests and for embedding the engine offline.

use crate::error::RemoteError;
use crate::model::{Audit, RemoteResource, Scope, parent_path};
use crate::remote::{
    CreatedDirectory, CreatedFile, FileUpdate, NewDirectory, NewFile, RemoteClient, UpdatedFile,
};
use crate::scanner::LocalTree;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Kind of remote operation, used for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    ListResources,
    CreateDirectory,
    CreateFile,
    UpdateFile,
    DeleteFile,
    DeleteDirectory,
    FetchFile,
    RootFilePath,
}

/// A call received by the store, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    ListResources,
    CreateDirectory { path: String, parent_id: Option<String> },
    CreateFile { path: String, parent_id: Option<String> },
    UpdateFile { path: String },
    DeleteFile { path: String },
    DeleteDirectory { path: String },
    FetchFile { path: String },
    RootFilePath,
}

impl RemoteCall {
    /// Whether the call changes remote state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            RemoteCall::CreateDirectory { .. }
                | RemoteCall::CreateFile { .. }
                | RemoteCall::UpdateFile { .. }
                | RemoteCall::DeleteFile { .. }
                | RemoteCall::DeleteDirectory { .. }
        )
    }

    /// Path the call targeted, if any
    pub fn path(&self) -> Option<&str> {
        match self {
            RemoteCall::CreateDirectory { path, .. }
            | RemoteCall::CreateFile { path, .. }
            | RemoteCall::UpdateFile { path }
            | RemoteCall::DeleteFile { path }
            | RemoteCall::DeleteDirectory { path }
            | RemoteCall::FetchFile { path } => Some(path),
            RemoteCall::ListResources | RemoteCall::RootFilePath => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    is_directory: bool,
    content: Vec<u8>,
    audit: Audit,
}

#[derive(Debug, Clone)]
struct Failure {
    op: RemoteOp,
    path: Option<String>,
    error: RemoteError,
}

#[derive(Debug)]
struct MemoryState {
    entries: BTreeMap<String, Entry>,
    next_id: u64,
    ticks: i64,
    calls: Vec<RemoteCall>,
    failures: Vec<Failure>,
    root_file_path: Option<String>,
    authorized: bool,
}

impl MemoryState {
    fn now(&mut self, epoch: DateTime<Utc>) -> DateTime<Utc> {
        self.ticks += 1;
        epoch + Duration::seconds(self.ticks)
    }

    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("res-{}", self.next_id)
    }

    fn check(&self, op: RemoteOp, path: Option<&str>) -> Result<(), RemoteError> {
        if !self.authorized {
            return Err(RemoteError::Unauthorized);
        }
        let injected = self.failures.iter().find(|f| {
            f.op == op && (f.path.is_none() || f.path.as_deref() == path)
        });
        match injected {
            Some(failure) => Err(failure.error.clone()),
            None => Ok(()),
        }
    }

    fn check_parent(&self, path: &str, parent_id: Option<&str>) -> Result<(), RemoteError> {
        match (parent_path(path), parent_id) {
            (None, None) => Ok(()),
            (Some(parent), Some(id)) => match self.entries.get(parent) {
                Some(entry) if entry.is_directory && entry.id == id => Ok(()),
                _ => Err(RemoteError::Rejected(format!(
                    "parent {} of {} does not match id {}",
                    parent, path, id
                ))),
            },
            (Some(parent), None) => Err(RemoteError::Rejected(format!(
                "missing parent id for {} (expected {})",
                path, parent
            ))),
            (None, Some(id)) => Err(RemoteError::Rejected(format!(
                "top-level resource {} given parent id {}",
                path, id
            ))),
        }
    }

    fn resource(&self, path: &str, entry: &Entry) -> RemoteResource {
        RemoteResource {
            id: entry.id.clone(),
            path: path.to_string(),
            is_directory: entry.is_directory,
            audit: entry.audit,
        }
    }

    fn insert(&mut self, epoch: DateTime<Utc>, path: &str, is_directory: bool, content: Vec<u8>) {
        if let Some(parent) = parent_path(path) {
            if !self.entries.contains_key(parent) {
                self.insert(epoch, parent, true, Vec::new());
            }
        }
        let now = self.now(epoch);
        let id = self.allocate_id();
        self.entries.insert(
            path.to_string(),
            Entry {
                id,
                is_directory,
                content,
                audit: Audit {
                    created: now,
                    updated: now,
                },
            },
        );
    }
}

/// Remote store kept entirely in memory for a single project scope
#[derive(Debug)]
pub struct MemoryRemote {
    scope: Scope,
    epoch: DateTime<Utc>,
    state: Mutex<MemoryState>,
}

impl MemoryRemote {
    /// Create an empty project
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            epoch: Utc::now(),
            state: Mutex::new(MemoryState {
                entries: BTreeMap::new(),
                next_id: 0,
                ticks: 0,
                calls: Vec::new(),
                failures: Vec::new(),
                root_file_path: None,
                authorized: true,
            }),
        }
    }

    /// The project this store serves
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Designate the project's root file
    pub fn set_root_file_path(&self, path: Option<&str>) {
        self.state.lock().root_file_path = path.map(str::to_string);
    }

    /// Simulate an expired or revoked session
    pub fn set_authorized(&self, authorized: bool) {
        self.state.lock().authorized = authorized;
    }

    /// Fail every matching call with `error` until cleared.
    ///
    /// With `path` set, only calls targeting that path fail.
    pub fn fail_on(&self, op: RemoteOp, path: Option<&str>, error: RemoteError) {
        self.state.lock().failures.push(Failure {
            op,
            path: path.map(str::to_string),
            error,
        });
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    /// Calls that change remote state
    pub fn mutation_calls(&self) -> Vec<RemoteCall> {
        self.calls().into_iter().filter(RemoteCall::is_mutation).collect()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Out-of-band: add a file, creating missing parent directories
    pub fn insert_file(&self, path: &str, content: &[u8]) {
        self.state.lock().insert(self.epoch, path, false, content.to_vec());
    }

    /// Out-of-band: add a directory, creating missing parent directories
    pub fn insert_directory(&self, path: &str) {
        self.state.lock().insert(self.epoch, path, true, Vec::new());
    }

    /// Out-of-band: replace a file's content, advancing its `updated` time
    pub fn touch(&self, path: &str, content: &[u8]) -> bool {
        let mut state = self.state.lock();
        let now = state.now(self.epoch);
        match state.entries.get_mut(path) {
            Some(entry) if !entry.is_directory => {
                entry.content = content.to_vec();
                entry.audit.updated = now;
                true
            }
            _ => false,
        }
    }

    /// Out-of-band: remove a resource and everything beneath it
    pub fn remove(&self, path: &str) -> bool {
        let mut state = self.state.lock();
        let prefix = format!("{}/", path);
        state.entries.retain(|p, _| !p.starts_with(&prefix));
        state.entries.remove(path).is_some()
    }

    /// Current listing without recording a call
    pub fn resources(&self) -> Vec<RemoteResource> {
        let state = self.state.lock();
        state
            .entries
            .iter()
            .map(|(path, entry)| state.resource(path, entry))
            .collect()
    }

    /// A single resource by path
    pub fn resource(&self, path: &str) -> Option<RemoteResource> {
        let state = self.state.lock();
        state.entries.get(path).map(|entry| state.resource(path, entry))
    }

    /// Content of a file by path
    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .entries
            .get(path)
            .filter(|entry| !entry.is_directory)
            .map(|entry| entry.content.clone())
    }

    /// All paths, sorted
    pub fn paths(&self) -> Vec<String> {
        self.state.lock().entries.keys().cloned().collect()
    }

    fn check_scope(&self, scope: &Scope) -> Result<(), RemoteError> {
        if *scope == self.scope {
            Ok(())
        } else {
            Err(RemoteError::NotFound(format!("project {}", scope)))
        }
    }

    fn lookup<'a>(
        state: &'a MemoryState,
        resource: &RemoteResource,
        is_directory: bool,
    ) -> Result<&'a Entry, RemoteError> {
        state
            .entries
            .get(&resource.path)
            .filter(|entry| entry.id == resource.id && entry.is_directory == is_directory)
            .ok_or_else(|| RemoteError::NotFound(resource.path.clone()))
    }
}

#[async_trait]
impl RemoteClient for MemoryRemote {
    async fn list_resources(&self, scope: &Scope) -> Result<Vec<RemoteResource>, RemoteError> {
        self.check_scope(scope)?;
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::ListResources);
        state.check(RemoteOp::ListResources, None)?;
        Ok(state
            .entries
            .iter()
            .map(|(path, entry)| state.resource(path, entry))
            .collect())
    }

    async fn create_directory(
        &self,
        scope: &Scope,
        request: NewDirectory,
    ) -> Result<CreatedDirectory, RemoteError> {
        self.check_scope(scope)?;
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::CreateDirectory {
            path: request.path.clone(),
            parent_id: request.parent_id.clone(),
        });
        state.check(RemoteOp::CreateDirectory, Some(&request.path))?;
        if state.entries.contains_key(&request.path) {
            return Err(RemoteError::AlreadyExists(request.path));
        }
        state.check_parent(&request.path, request.parent_id.as_deref())?;

        let now = state.now(self.epoch);
        let id = state.allocate_id();
        state.entries.insert(
            request.path.clone(),
            Entry {
                id: id.clone(),
                is_directory: true,
                content: Vec::new(),
                audit: Audit {
                    created: now,
                    updated: now,
                },
            },
        );
        Ok(CreatedDirectory {
            id,
            path: request.path,
        })
    }

    async fn create_file(
        &self,
        scope: &Scope,
        request: NewFile,
    ) -> Result<CreatedFile, RemoteError> {
        self.check_scope(scope)?;
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::CreateFile {
            path: request.path.clone(),
            parent_id: request.parent_id.clone(),
        });
        state.check(RemoteOp::CreateFile, Some(&request.path))?;
        if state.entries.contains_key(&request.path) {
            return Err(RemoteError::AlreadyExists(request.path));
        }
        state.check_parent(&request.path, request.parent_id.as_deref())?;

        let now = state.now(self.epoch);
        let id = state.allocate_id();
        let audit = Audit {
            created: now,
            updated: now,
        };
        let hash = LocalTree::digest(&request.content);
        state.entries.insert(
            request.path.clone(),
            Entry {
                id: id.clone(),
                is_directory: false,
                content: request.content,
                audit,
            },
        );
        Ok(CreatedFile {
            id,
            path: request.path,
            hash,
            audit,
        })
    }

    async fn update_file(
        &self,
        scope: &Scope,
        request: FileUpdate,
    ) -> Result<UpdatedFile, RemoteError> {
        self.check_scope(scope)?;
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::UpdateFile {
            path: request.path.clone(),
        });
        state.check(RemoteOp::UpdateFile, Some(&request.path))?;

        let now = state.now(self.epoch);
        let entry = state
            .entries
            .get_mut(&request.path)
            .filter(|entry| entry.id == request.id && !entry.is_directory)
            .ok_or_else(|| RemoteError::NotFound(request.path.clone()))?;
        entry.audit.updated = now;
        let hash = LocalTree::digest(&request.content);
        entry.content = request.content;

        Ok(UpdatedFile {
            path: request.path,
            hash,
            audit: entry.audit,
        })
    }

    async fn delete_file(
        &self,
        scope: &Scope,
        resource: &RemoteResource,
    ) -> Result<String, RemoteError> {
        self.check_scope(scope)?;
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::DeleteFile {
            path: resource.path.clone(),
        });
        state.check(RemoteOp::DeleteFile, Some(&resource.path))?;
        Self::lookup(&state, resource, false)?;
        state.entries.remove(&resource.path);
        Ok(resource.path.clone())
    }

    async fn delete_directory(
        &self,
        scope: &Scope,
        resource: &RemoteResource,
    ) -> Result<String, RemoteError> {
        self.check_scope(scope)?;
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::DeleteDirectory {
            path: resource.path.clone(),
        });
        state.check(RemoteOp::DeleteDirectory, Some(&resource.path))?;
        Self::lookup(&state, resource, true)?;

        let prefix = format!("{}/", resource.path);
        if state.entries.keys().any(|p| p.starts_with(&prefix)) {
            return Err(RemoteError::Rejected(format!(
                "directory {} is not empty",
                resource.path
            )));
        }
        state.entries.remove(&resource.path);
        Ok(resource.path.clone())
    }

    async fn fetch_file(
        &self,
        scope: &Scope,
        resource: &RemoteResource,
    ) -> Result<Vec<u8>, RemoteError> {
        self.check_scope(scope)?;
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::FetchFile {
            path: resource.path.clone(),
        });
        state.check(RemoteOp::FetchFile, Some(&resource.path))?;
        Ok(Self::lookup(&state, resource, false)?.content.clone())
    }

    async fn root_file_path(&self, scope: &Scope) -> Result<Option<String>, RemoteError> {
        self.check_scope(scope)?;
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::RootFilePath);
        state.check(RemoteOp::RootFilePath, None)?;
        Ok(state.root_file_path.clone())
    }
}
