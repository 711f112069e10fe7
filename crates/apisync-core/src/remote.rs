//! Remote Metadata Client
//!
//! Boundary to the authoritative remote store. Implementations own
//! transport, encoding, authentication and timeouts; the engine only relies
//! on the semantics below and issues every call sequentially.

use crate::error::RemoteError;
use crate::model::{Audit, RemoteResource, Scope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request to create a directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDirectory {
    /// Slash-rooted path of the new directory
    pub path: String,
    /// Remote id of the parent directory, `None` for the project root
    pub parent_id: Option<String>,
}

/// Directory created on the remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedDirectory {
    /// Assigned remote id
    pub id: String,
    /// Path as stored by the remote
    pub path: String,
}

/// Request to create a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFile {
    /// Slash-rooted path of the new file
    pub path: String,
    /// Remote id of the parent directory, `None` for the project root
    pub parent_id: Option<String>,
    /// File content
    pub content: Vec<u8>,
}

/// File created on the remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedFile {
    /// Assigned remote id
    pub id: String,
    /// Path as stored by the remote
    pub path: String,
    /// Content hash as reported by the remote
    pub hash: String,
    /// Remote audit timestamps
    pub audit: Audit,
}

/// Request to replace a file's content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpdate {
    /// Remote id of the file
    pub id: String,
    /// Slash-rooted path of the file
    pub path: String,
    /// New content
    pub content: Vec<u8>,
}

/// File updated on the remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatedFile {
    /// Path as stored by the remote
    pub path: String,
    /// Content hash as reported by the remote
    pub hash: String,
    /// Remote audit timestamps after the update
    pub audit: Audit,
}

/// Operations the engine needs from the remote store
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Flat list of every file and directory in the project
    async fn list_resources(&self, scope: &Scope) -> Result<Vec<RemoteResource>, RemoteError>;

    /// Create a directory under an existing parent
    async fn create_directory(
        &self,
        scope: &Scope,
        request: NewDirectory,
    ) -> Result<CreatedDirectory, RemoteError>;

    /// Create a file under an existing parent
    async fn create_file(&self, scope: &Scope, request: NewFile)
    -> Result<CreatedFile, RemoteError>;

    /// Replace a file's content
    async fn update_file(
        &self,
        scope: &Scope,
        request: FileUpdate,
    ) -> Result<UpdatedFile, RemoteError>;

    /// Delete a file, returning its path
    async fn delete_file(
        &self,
        scope: &Scope,
        resource: &RemoteResource,
    ) -> Result<String, RemoteError>;

    /// Delete an empty directory, returning its path
    async fn delete_directory(
        &self,
        scope: &Scope,
        resource: &RemoteResource,
    ) -> Result<String, RemoteError>;

    /// Download a file's content
    async fn fetch_file(
        &self,
        scope: &Scope,
        resource: &RemoteResource,
    ) -> Result<Vec<u8>, RemoteError>;

    /// Path of the project's designated root file, if the project has one
    async fn root_file_path(&self, scope: &Scope) -> Result<Option<String>, RemoteError>;
}

