//! Conflict Detection
//!
//! Cross-references a freshly computed [`Status`] against the live remote
//! listing. Only remote truth is consulted for existence; the snapshot is
//! consulted solely for the last-seen `updated` timestamp.

use crate::model::{RemoteResource, Workspace};
use crate::status::Status;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Divergence between local intent and remote state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflicts {
    /// Added locally, but the path already exists remotely
    pub added_already_exists: Vec<String>,
    /// Changed locally, but deleted remotely
    pub changed_was_deleted: Vec<String>,
    /// Changed locally, and modified remotely since the last sync
    pub changed_remotely: Vec<String>,
    /// Unchanged locally, but deleted remotely
    pub deleted_remotely: Vec<String>,
    /// Deleted locally, and already absent remotely
    pub deleted_not_exists: Vec<String>,
}

impl Conflicts {
    /// Whether any category that must stop a normal push is populated
    pub fn is_blocking(&self) -> bool {
        !self.added_already_exists.is_empty()
            || !self.changed_was_deleted.is_empty()
            || !self.changed_remotely.is_empty()
    }

    /// Whether no category is populated at all
    pub fn is_empty(&self) -> bool {
        !self.is_blocking() && self.deleted_remotely.is_empty() && self.deleted_not_exists.is_empty()
    }

    fn categories(&self) -> [(&'static str, &Vec<String>); 5] {
        [
            ("added but already exists remotely", &self.added_already_exists),
            ("changed but deleted remotely", &self.changed_was_deleted),
            ("changed remotely", &self.changed_remotely),
            ("deleted remotely", &self.deleted_remotely),
            ("deleted and already absent remotely", &self.deleted_not_exists),
        ]
    }
}

impl fmt::Display for Conflicts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (label, paths) in self.categories() {
            if paths.is_empty() {
                continue;
            }
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", label, paths.join(", "))?;
            first = false;
        }
        if first {
            write!(f, "none")?;
        }
        Ok(())
    }
}

/// Classify divergence for a status against the remote listing
pub fn detect_conflicts(
    status: &Status,
    workspace: &Workspace,
    remote: &[RemoteResource],
) -> Conflicts {
    let remote_by_path: HashMap<&str, &RemoteResource> =
        remote.iter().map(|r| (r.path.as_str(), r)).collect();
    let mut conflicts = Conflicts::default();

    for path in &status.added {
        if remote_by_path.contains_key(path.as_str()) {
            conflicts.added_already_exists.push(path.clone());
        }
    }

    for path in &status.changed {
        match remote_by_path.get(path.as_str()) {
            None => conflicts.changed_was_deleted.push(path.clone()),
            Some(resource) => {
                let recorded = workspace.file(path).map(|r| r.audit.updated);
                if recorded != Some(resource.audit.updated) {
                    conflicts.changed_remotely.push(path.clone());
                }
            }
        }
    }

    for path in &status.unchanged {
        if !remote_by_path.contains_key(path.as_str()) {
            conflicts.deleted_remotely.push(path.clone());
        }
    }

    for path in &status.deleted {
        if !remote_by_path.contains_key(path.as_str()) {
            conflicts.deleted_not_exists.push(path.clone());
        }
    }

    if !conflicts.deleted_remotely.is_empty() {
        warn!(
            "{} unchanged file(s) were deleted remotely",
            conflicts.deleted_remotely.len()
        );
    }

    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Audit, FileRecord};
    use chrono::{Duration, Utc};

    fn audit_at(offset_secs: i64) -> Audit {
        let base = Utc::now();
        Audit {
            created: base,
            updated: base + Duration::seconds(offset_secs),
        }
    }

    fn remote(path: &str, audit: Audit) -> RemoteResource {
        RemoteResource {
            id: format!("r{}", path),
            path: path.to_string(),
            is_directory: false,
            audit,
        }
    }

    fn workspace_with(path: &str, audit: Audit) -> Workspace {
        let mut ws = Workspace::new("/work");
        ws.files.push(FileRecord {
            path: path.to_string(),
            id: format!("r{}", path),
            hash: "h".to_string(),
            audit,
        });
        ws
    }

    #[test]
    fn test_changed_remotely() {
        let t1 = audit_at(0);
        let t2 = Audit {
            updated: t1.updated + Duration::seconds(5),
            ..t1
        };
        let ws = workspace_with("/x.raml", t1);
        let status = Status {
            changed: vec!["/x.raml".to_string()],
            ..Status::default()
        };

        let conflicts = detect_conflicts(&status, &ws, &[remote("/x.raml", t2)]);
        assert_eq!(conflicts.changed_remotely, vec!["/x.raml"]);
        assert!(conflicts.is_blocking());
    }

    #[test]
    fn test_changed_with_matching_timestamp_is_clean() {
        let t1 = audit_at(0);
        let ws = workspace_with("/x.raml", t1);
        let status = Status {
            changed: vec!["/x.raml".to_string()],
            ..Status::default()
        };

        let conflicts = detect_conflicts(&status, &ws, &[remote("/x.raml", t1)]);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_all_categories() {
        let t1 = audit_at(0);
        let mut ws = workspace_with("/changed-gone.raml", t1);
        ws.files.push(FileRecord {
            path: "/unchanged-gone.raml".to_string(),
            id: "u".to_string(),
            hash: "h".to_string(),
            audit: t1,
        });

        let status = Status {
            added: vec!["/exists.raml".to_string(), "/fresh.raml".to_string()],
            changed: vec!["/changed-gone.raml".to_string()],
            unchanged: vec!["/unchanged-gone.raml".to_string()],
            deleted: vec!["/deleted-gone.raml".to_string()],
            ..Status::default()
        };
        let listing = vec![remote("/exists.raml", t1)];

        let conflicts = detect_conflicts(&status, &ws, &listing);
        assert_eq!(conflicts.added_already_exists, vec!["/exists.raml"]);
        assert_eq!(conflicts.changed_was_deleted, vec!["/changed-gone.raml"]);
        assert_eq!(conflicts.deleted_remotely, vec!["/unchanged-gone.raml"]);
        assert_eq!(conflicts.deleted_not_exists, vec!["/deleted-gone.raml"]);
        assert!(conflicts.changed_remotely.is_empty());
    }

    #[test]
    fn test_informational_only_is_not_blocking() {
        let conflicts = Conflicts {
            deleted_remotely: vec!["/a.raml".to_string()],
            deleted_not_exists: vec!["/b.raml".to_string()],
            ..Conflicts::default()
        };
        assert!(!conflicts.is_blocking());
        assert!(!conflicts.is_empty());
    }

    #[test]
    fn test_display() {
        let conflicts = Conflicts {
            changed_remotely: vec!["/x.raml".to_string(), "/y.raml".to_string()],
            ..Conflicts::default()
        };
        assert_eq!(conflicts.to_string(), "changed remotely: /x.raml, /y.raml");
        assert_eq!(Conflicts::default().to_string(), "none");
    }
}
