//! apisync - local/remote reconciliation for API design projects
//!
//! Keeps a local working directory and a remote, hierarchical API-design
//! project in step. A per-directory snapshot records what both sides agreed
//! on at the last sync; from it the engine derives local changes, detects
//! divergence against the live remote listing and applies changes in
//! dependency order (directories before files on the way in, files before
//! directories on the way out).
//!
//! # Example
//!
//! ```no_run
//! use apisync_core::{MemoryRemote, Scope, SyncConfig, SyncEngine};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn run() -> apisync_core::SyncResult<()> {
//! let scope = Scope::new("org", "orders-api", "v1");
//! let remote = Arc::new(MemoryRemote::new(scope.clone()));
//! let engine = SyncEngine::open(remote, SyncConfig::default())?;
//!
//! let dir = Path::new("./orders-api");
//! engine.init(dir, scope, Some("orders.raml")).await?;
//! let applied = engine.push(dir).await?;
//! println!("{} file(s) created", applied.added.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod conflicts;
pub mod engine;
pub mod error;
pub mod force;
pub mod lock;
pub mod memory_remote;
pub mod model;
pub mod pull;
pub mod reconcile;
pub mod remote;
pub mod scanner;
pub mod snapshot;
pub mod status;

pub use config::{DirectoryOrder, SyncConfig};
pub use conflicts::{Conflicts, detect_conflicts};
pub use engine::SyncEngine;
pub use error::{RemoteError, SyncError, SyncResult};
pub use memory_remote::MemoryRemote;
pub use model::{Audit, DirectoryRecord, FileRecord, RemoteResource, Scope, Workspace};
pub use pull::PullSummary;
pub use remote::RemoteClient;
pub use scanner::LocalTree;
pub use snapshot::SnapshotStore;
pub use status::{Status, compute_status};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging.
///
/// Honors `RUST_LOG`, defaulting to `apisync=info`. Does nothing if a
/// global subscriber is already installed.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apisync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
