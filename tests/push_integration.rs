//! Integration tests for push
//!
//! Tests for:
//! - Idempotence under retry
//! - Directory creation and deletion ordering
//! - Conflict classification and blocking
//! - Persistence of partial progress after a failed step

use apisync_core::memory_remote::{RemoteCall, RemoteOp};
use apisync_core::{
    DirectoryOrder, MemoryRemote, RemoteError, SnapshotStore, SyncConfig, SyncEngine, SyncError,
};
use apisync_integration_tests::{Harness, ROOT_FILE, paths, scope};
use std::sync::Arc;

fn created_directories(calls: Vec<RemoteCall>) -> Vec<String> {
    calls
        .into_iter()
        .filter_map(|call| match call {
            RemoteCall::CreateDirectory { path, .. } => Some(path),
            _ => None,
        })
        .collect()
}

fn deleted_directories(calls: Vec<RemoteCall>) -> Vec<String> {
    calls
        .into_iter()
        .filter_map(|call| match call {
            RemoteCall::DeleteDirectory { path } => Some(path),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_push_twice_second_is_empty() {
    let h = Harness::new();
    h.init().await;
    h.write("/types/order.raml", b"type: object");
    h.write("/examples/order.json", b"{}");

    let first = h.engine().push(h.path()).await.unwrap();
    assert_eq!(first.added.len(), 3);

    h.remote().clear_calls();
    let second = h.engine().push(h.path()).await.unwrap();
    assert!(second.added.is_empty());
    assert!(second.changed.is_empty());
    assert!(second.deleted.is_empty());
    assert!(h.remote().calls().is_empty());
}

#[tokio::test]
async fn test_lexicographic_directory_creation_order() {
    let config = SyncConfig {
        directory_order: DirectoryOrder::Lexicographic,
        ..SyncConfig::default()
    };
    let h = Harness::with_config(config);
    h.init().await;
    h.write("/a/c/x.raml", b"x");
    h.write("/b/z/y.raml", b"y");

    let applied = h.engine().push(h.path()).await.unwrap();
    assert_eq!(applied.added_directories, paths(&["/a", "/a/c", "/b", "/b/z"]));

    assert_eq!(
        created_directories(h.remote().mutation_calls()),
        paths(&["/a", "/a/c", "/b", "/b/z"])
    );
}

#[tokio::test]
async fn test_depth_directory_creation_order() {
    let h = Harness::new();
    h.init().await;
    h.write("/a/c/x.raml", b"x");
    h.write("/b/z/y.raml", b"y");

    h.engine().push(h.path()).await.unwrap();
    assert_eq!(
        created_directories(h.remote().mutation_calls()),
        paths(&["/a", "/b", "/a/c", "/b/z"])
    );

    // Every file was created under its parent's assigned id
    for call in h.remote().mutation_calls() {
        if let RemoteCall::CreateFile { path, parent_id } = call {
            let parent = path.rsplit_once('/').map(|(p, _)| p).unwrap();
            let expected = if parent.is_empty() {
                None
            } else {
                Some(h.remote().resource(parent).unwrap().id)
            };
            assert_eq!(parent_id, expected, "parent id of {}", path);
        }
    }
}

#[tokio::test]
async fn test_directory_deletion_deepest_first() {
    let h = Harness::new();
    h.init().await;
    h.write("/a/b/c/deep.raml", b"d");
    h.write("/a/side.raml", b"s");
    h.engine().push(h.path()).await.unwrap();
    h.remote().clear_calls();

    h.remove("/a");
    let applied = h.engine().push(h.path()).await.unwrap();
    assert_eq!(applied.deleted, paths(&["/a/b/c/deep.raml", "/a/side.raml"]));

    let calls = h.remote().mutation_calls();
    let first_dir_delete = calls
        .iter()
        .position(|c| matches!(c, RemoteCall::DeleteDirectory { .. }))
        .unwrap();
    assert!(
        calls[..first_dir_delete]
            .iter()
            .all(|c| matches!(c, RemoteCall::DeleteFile { .. }))
    );
    assert_eq!(deleted_directories(calls), paths(&["/a/b/c", "/a/b", "/a"]));
    assert_eq!(h.remote().paths(), paths(&[ROOT_FILE]));
}

#[tokio::test]
async fn test_changed_remotely_blocks_update() {
    let h = Harness::new();
    h.init().await;
    h.write("/x.raml", b"v1");
    h.engine().push(h.path()).await.unwrap();

    let recorded = h
        .engine()
        .workspace(h.path())
        .await
        .unwrap()
        .unwrap()
        .file("/x.raml")
        .unwrap()
        .audit
        .updated;
    assert!(h.remote().touch("/x.raml", b"edited in designer"));
    assert_ne!(h.remote().resource("/x.raml").unwrap().audit.updated, recorded);

    h.write("/x.raml", b"v2");
    h.remote().clear_calls();

    let err = h.engine().push(h.path()).await.unwrap_err();
    match &err {
        SyncError::ConflictsFound(conflicts) => {
            assert_eq!(conflicts.changed_remotely, paths(&["/x.raml"]));
            assert!(conflicts.is_blocking());
        }
        other => panic!("expected ConflictsFound, got {:?}", other),
    }
    assert!(
        !h.remote()
            .calls()
            .iter()
            .any(|c| matches!(c, RemoteCall::UpdateFile { .. }))
    );
}

#[tokio::test]
async fn test_every_blocking_category_prevents_mutation() {
    let h = Harness::new();
    h.init().await;
    h.write("/gone.raml", b"g");
    h.write("/edited.raml", b"e");
    h.engine().push(h.path()).await.unwrap();

    // added locally, already present remotely
    h.write("/dup.raml", b"local");
    h.remote().insert_file("/dup.raml", b"remote");
    // changed locally, deleted remotely
    h.write("/gone.raml", b"g2");
    h.remote().remove("/gone.raml");
    // changed on both sides
    h.write("/edited.raml", b"e2");
    h.remote().touch("/edited.raml", b"e-remote");
    // and an unrelated local addition that must not be uploaded
    h.write("/new.raml", b"n");
    h.remote().clear_calls();

    let err = h.engine().push(h.path()).await.unwrap_err();
    let conflicts = err.conflicts().unwrap();
    assert_eq!(conflicts.added_already_exists, paths(&["/dup.raml"]));
    assert_eq!(conflicts.changed_was_deleted, paths(&["/gone.raml"]));
    assert_eq!(conflicts.changed_remotely, paths(&["/edited.raml"]));
    assert!(h.remote().mutation_calls().is_empty());
    assert!(h.remote().resource("/new.raml").is_none());
}

#[tokio::test]
async fn test_informational_conflicts_do_not_block() {
    let h = Harness::new();
    h.init().await;
    h.write("/kept.raml", b"k");
    h.write("/dropped.raml", b"d");
    h.engine().push(h.path()).await.unwrap();

    // unchanged locally, deleted remotely
    h.remote().remove("/kept.raml");
    // deleted on both sides
    h.remote().remove("/dropped.raml");
    h.remove("/dropped.raml");
    h.write("/new.raml", b"n");

    let (_, conflicts) = h.engine().conflicts(h.path()).await.unwrap();
    assert_eq!(conflicts.deleted_remotely, paths(&["/kept.raml"]));
    assert_eq!(conflicts.deleted_not_exists, paths(&["/dropped.raml"]));
    assert!(!conflicts.is_blocking());

    h.remote().clear_calls();
    h.engine().push(h.path()).await.unwrap();
    assert_eq!(
        h.remote().mutation_calls(),
        vec![RemoteCall::CreateFile {
            path: "/new.raml".to_string(),
            parent_id: None
        }]
    );
    let ws = h.engine().workspace(h.path()).await.unwrap().unwrap();
    assert!(ws.file("/dropped.raml").is_none());
}

#[tokio::test]
async fn test_partial_failure_persists_first_file_only() {
    let h = Harness::new();
    h.init().await;
    h.write("/stale.raml", b"s");
    h.write("/tracked.raml", b"t1");
    h.engine().push(h.path()).await.unwrap();

    h.remove("/stale.raml");
    h.write("/tracked.raml", b"t2");
    h.write("/f1.raml", b"1");
    h.write("/f2.raml", b"2");
    h.write("/f3.raml", b"3");
    h.remote().fail_on(
        RemoteOp::CreateFile,
        Some("/f2.raml"),
        RemoteError::Transport("503 Service Unavailable".into()),
    );
    h.remote().clear_calls();

    let err = h.engine().push(h.path()).await.unwrap_err();
    assert!(matches!(err, SyncError::Remote(RemoteError::Transport(_))));

    let ws = h.engine().workspace(h.path()).await.unwrap().unwrap();
    assert!(ws.file("/f1.raml").is_some());
    assert!(ws.file("/f2.raml").is_none());
    assert!(ws.file("/f3.raml").is_none());
    assert!(ws.file("/stale.raml").is_some());
    assert!(
        !h.remote()
            .calls()
            .iter()
            .any(|c| matches!(c, RemoteCall::UpdateFile { .. } | RemoteCall::DeleteFile { .. }))
    );

    // Retry acts only on what remains
    h.remote().clear_failures();
    h.remote().clear_calls();
    let retry = h.engine().push(h.path()).await.unwrap();
    assert_eq!(retry.added, paths(&["/f2.raml", "/f3.raml"]));
    assert_eq!(retry.changed, paths(&["/tracked.raml"]));
    assert_eq!(retry.deleted, paths(&["/stale.raml"]));
    assert!(
        !h.remote()
            .calls()
            .iter()
            .any(|c| c.path() == Some("/f1.raml"))
    );
}

#[tokio::test]
async fn test_unauthorized_is_surfaced_unchanged() {
    let h = Harness::new();
    h.init().await;
    h.remote().set_authorized(false);

    let err = h.engine().push(h.path()).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert!(h.remote().mutation_calls().is_empty());
}

#[tokio::test]
async fn test_snapshot_survives_engine_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("state").join("workspaces.db");
    let remote = Arc::new(MemoryRemote::new(scope()));
    let config = SyncConfig {
        snapshot_path: db.clone(),
        ..SyncConfig::default()
    };

    let h = Harness::with_parts(
        remote.clone(),
        Arc::new(SnapshotStore::open(&db).unwrap()),
        config.clone(),
    );
    h.init().await;
    h.write("/types/a.raml", b"a");
    h.engine().push(h.path()).await.unwrap();

    let restarted = SyncEngine::open(remote.clone(), config).unwrap();
    remote.clear_calls();
    let status = restarted.push(h.path()).await.unwrap();
    assert!(status.added.is_empty());
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn test_ignored_and_hidden_files_are_not_pushed() {
    let h = Harness::new();
    h.init().await;
    h.write("/.git/HEAD", b"ref: refs/heads/main");
    h.write("/draft.raml.swp", b"swap");
    h.write("/node_modules/x/index.js", b"x");
    h.write("/types/t.raml", b"t");

    h.engine().push(h.path()).await.unwrap();
    assert_eq!(
        h.remote().paths(),
        paths(&[ROOT_FILE, "/types", "/types/t.raml"])
    );
}
