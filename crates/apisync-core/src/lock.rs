//! Workspace Lock
//!
//! Advisory lock file inside a working directory. At most one mutating
//! operation runs per directory; a second invocation fails fast.

use crate::error::{SyncError, SyncResult};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Held lock; the file is removed on drop
#[derive(Debug)]
pub struct WorkspaceLock {
    path: PathBuf,
    _file: File,
}

impl WorkspaceLock {
    /// Acquire the lock for `directory`, failing if another holder exists
    pub fn acquire(directory: &Path, file_name: &str) -> SyncResult<Self> {
        let path = directory.join(file_name);
        let mut file = match OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(SyncError::WorkspaceLocked(directory.to_path_buf()));
            }
            Err(err) => {
                return Err(SyncError::FileSystem(format!(
                    "Failed to create lock {}: {}",
                    path.display(),
                    err
                )));
            }
        };

        // Holder pid, for diagnosing stale locks
        writeln!(file, "{}", std::process::id())?;
        debug!("Acquired lock {}", path.display());

        Ok(Self { path, _file: file })
    }

    /// Location of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}
