//! Error types for apisync

use crate::conflicts::Conflicts;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a [`RemoteClient`](crate::remote::RemoteClient).
///
/// The engine never interprets these beyond wrapping them; retry and
/// re-login decisions belong to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Not authorized, login required")]
    Unauthorized,

    #[error("Remote resource not found: {0}")]
    NotFound(String),

    #[error("Remote resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Remote rejected request: {0}")]
    Rejected(String),

    #[error("Remote transport error: {0}")]
    Transport(String),
}

/// Engine error type
#[derive(Debug, Error)]
pub enum SyncError {
    /// Blocking divergence between local intent and remote state
    #[error("Conflicts found: {0}")]
    ConflictsFound(Conflicts),

    /// The project's root file no longer exists locally
    #[error("Root file was deleted locally: {0}")]
    RootFileDeleted(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Snapshot store error: {0}")]
    Snapshot(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Workspace not set up for directory: {}", .0.display())]
    WorkspaceNotConfigured(PathBuf),

    #[error("Workspace is locked by another invocation: {}", .0.display())]
    WorkspaceLocked(PathBuf),

    #[error("Parent directory not found on remote: {0}")]
    ParentNotFound(String),

    #[error("Remote resource missing for path: {0}")]
    RemoteResourceMissing(String),

    #[error("Invalid workspace path: {0}")]
    InvalidPath(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Whether the remote rejected the call for lack of authentication
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SyncError::Remote(RemoteError::Unauthorized))
    }

    /// The conflicts carried by a [`SyncError::ConflictsFound`]
    pub fn conflicts(&self) -> Option<&Conflicts> {
        match self {
            SyncError::ConflictsFound(conflicts) => Some(conflicts),
            _ => None,
        }
    }
}

impl Serialize for SyncError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(e: rusqlite::Error) -> Self {
        SyncError::Snapshot(e.to_string())
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(e: anyhow::Error) -> Self {
        SyncError::Snapshot(format!("{:#}", e))
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(e: toml::de::Error) -> Self {
        SyncError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(e: toml::ser::Error) -> Self {
        SyncError::Config(e.to_string())
    }
}

/// Engine result type
pub type SyncResult<T> = Result<T, SyncError>;
