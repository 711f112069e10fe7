//! SQLite Snapshot Store
//!
//! Persists one workspace snapshot per local working directory: the bound
//! remote scope, the root file and the last known file/directory records.

use crate::model::{Audit, DirectoryRecord, FileRecord, Scope, Workspace};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

/// Snapshot store backed by a SQLite connection
pub struct SnapshotStore {
    conn: Mutex<Connection>,
}

impl SnapshotStore {
    /// Open or create the snapshot database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open snapshot store {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::from_connection(conn)
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS workspaces (
                directory TEXT PRIMARY KEY,
                business_group_id TEXT,
                api_id TEXT,
                api_version_id TEXT,
                root_file_path TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS workspace_files (
                directory TEXT NOT NULL,
                path TEXT NOT NULL,
                resource_id TEXT NOT NULL,
                hash TEXT NOT NULL,
                created TEXT NOT NULL,
                updated TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (directory, path),
                FOREIGN KEY (directory) REFERENCES workspaces(directory) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS workspace_directories (
                directory TEXT NOT NULL,
                path TEXT NOT NULL,
                resource_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (directory, path),
                FOREIGN KEY (directory) REFERENCES workspaces(directory) ON DELETE CASCADE
            );",
        )
        .context("Failed to create snapshot tables")
    }

    /// Load the workspace for a directory, creating an empty one if absent
    pub fn get(&self, directory: &Path) -> Result<Workspace> {
        if let Some(workspace) = self.load(directory)? {
            return Ok(workspace);
        }

        let now = Utc::now().timestamp();
        self.conn
            .lock()
            .execute(
                "INSERT OR IGNORE INTO workspaces (directory, created_at, updated_at)
                 VALUES (?1, ?2, ?2)",
                params![key(directory), now],
            )
            .context("Failed to create workspace")?;

        Ok(Workspace::new(directory))
    }

    /// Load the workspace for a directory if one exists
    pub fn load(&self, directory: &Path) -> Result<Option<Workspace>> {
        let conn = self.conn.lock();
        let dir_key = key(directory);

        let header = conn
            .query_row(
                "SELECT business_group_id, api_id, api_version_id, root_file_path
                 FROM workspaces WHERE directory = ?1",
                params![dir_key],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()
            .context("Failed to load workspace")?;

        let Some((business_group_id, api_id, api_version_id, root_file_path)) = header else {
            return Ok(None);
        };

        let scope = match (business_group_id, api_id, api_version_id) {
            (Some(business_group_id), Some(api_id), Some(api_version_id)) => Some(Scope {
                business_group_id,
                api_id,
                api_version_id,
            }),
            _ => None,
        };

        let mut stmt = conn.prepare(
            "SELECT path, resource_id, hash, created, updated
             FROM workspace_files WHERE directory = ?1
             ORDER BY position ASC",
        )?;
        let files = stmt
            .query_map(params![dir_key], |row| {
                Ok(FileRecord {
                    path: row.get(0)?,
                    id: row.get(1)?,
                    hash: row.get(2)?,
                    audit: Audit {
                        created: row.get::<_, DateTime<Utc>>(3)?,
                        updated: row.get::<_, DateTime<Utc>>(4)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to load file records")?;

        let mut stmt = conn.prepare(
            "SELECT path, resource_id
             FROM workspace_directories WHERE directory = ?1
             ORDER BY position ASC",
        )?;
        let directories = stmt
            .query_map(params![dir_key], |row| {
                Ok(DirectoryRecord {
                    path: row.get(0)?,
                    id: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to load directory records")?;

        Ok(Some(Workspace {
            directory: directory.to_path_buf(),
            scope,
            files,
            directories,
            root_file_path,
        }))
    }

    /// Replace the stored snapshot for the workspace's directory
    pub fn update(&self, workspace: &Workspace) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let dir_key = key(&workspace.directory);
        let now = Utc::now().timestamp();

        tx.execute(
            "INSERT INTO workspaces (directory, business_group_id, api_id, api_version_id,
                                     root_file_path, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(directory) DO UPDATE SET
               business_group_id = excluded.business_group_id,
               api_id = excluded.api_id,
               api_version_id = excluded.api_version_id,
               root_file_path = excluded.root_file_path,
               updated_at = excluded.updated_at",
            params![
                dir_key,
                workspace.scope.as_ref().map(|s| s.business_group_id.as_str()),
                workspace.scope.as_ref().map(|s| s.api_id.as_str()),
                workspace.scope.as_ref().map(|s| s.api_version_id.as_str()),
                workspace.root_file_path,
                now
            ],
        )?;

        tx.execute(
            "DELETE FROM workspace_files WHERE directory = ?1",
            params![dir_key],
        )?;
        tx.execute(
            "DELETE FROM workspace_directories WHERE directory = ?1",
            params![dir_key],
        )?;

        {
            let mut insert_file = tx.prepare(
                "INSERT INTO workspace_files (directory, path, resource_id, hash, created, updated, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (position, file) in workspace.files.iter().enumerate() {
                insert_file
                    .execute(params![
                        dir_key,
                        file.path,
                        file.id,
                        file.hash,
                        file.audit.created,
                        file.audit.updated,
                        position as i64
                    ])
                    .with_context(|| format!("Failed to store file record {}", file.path))?;
            }

            let mut insert_dir = tx.prepare(
                "INSERT INTO workspace_directories (directory, path, resource_id, position)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, dir) in workspace.directories.iter().enumerate() {
                insert_dir
                    .execute(params![dir_key, dir.path, dir.id, position as i64])
                    .with_context(|| format!("Failed to store directory record {}", dir.path))?;
            }
        }

        tx.commit().context("Failed to commit workspace snapshot")
    }

    /// Whether a workspace exists for a directory
    pub fn exists(&self, directory: &Path) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM workspaces WHERE directory = ?1",
            params![key(directory)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Delete the workspace for a directory
    pub fn delete(&self, directory: &Path) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM workspaces WHERE directory = ?1",
            params![key(directory)],
        )
        .context("Failed to delete workspace")?;
        Ok(())
    }

    /// Every directory with a stored workspace
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT directory FROM workspaces ORDER BY directory ASC")?;
        let dirs = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(dirs.into_iter().map(PathBuf::from).collect())
    }
}

fn key(directory: &Path) -> String {
    directory.to_string_lossy().to_string()
}
