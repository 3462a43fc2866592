// Conformance suite for the backend adapter contract.
// Every backend must pass the same assertions; the suite is written once
// against the trait objects and invoked per backend.

use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;
use updraft_storage::{Backend, BackendError, BlobStore, FlatBackend, RecordStore, SqliteBackend};

async fn flat_memory() -> Arc<dyn Backend> {
    Arc::new(FlatBackend::new(None).await.unwrap())
}

async fn sqlite(dir: &tempfile::TempDir) -> Arc<dyn Backend> {
    Arc::new(
        SqliteBackend::new(dir.path().join("conformance.db"), 1)
            .await
            .unwrap(),
    )
}

async fn record_contract(backend: Arc<dyn Backend>) {
    // Missing records are NotFound, not empty values.
    let err = backend.get_record("accounts", "missing").await.unwrap_err();
    assert!(matches!(err, BackendError::NotFound(_)), "got {err:?}");

    // Conditional create succeeds once.
    let v1 = backend
        .create_record_if_absent("accounts", "a1", json!({"email": "a@x.com"}))
        .await
        .unwrap();

    let err = backend
        .create_record_if_absent("accounts", "a1", json!({"email": "other@x.com"}))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Conflict(_)), "got {err:?}");

    // Reads observe the created payload and version.
    let record = backend.get_record("accounts", "a1").await.unwrap();
    assert_eq!(record.version, v1);
    assert_eq!(record.data, json!({"email": "a@x.com"}));

    // Version-checked replace succeeds with the current version...
    let v2 = backend
        .put_record("accounts", "a1", json!({"email": "b@x.com"}), Some(v1))
        .await
        .unwrap();
    assert!(v2 > v1, "replacing a record must advance its version");

    // ...and loses with a stale one.
    let err = backend
        .put_record("accounts", "a1", json!({"email": "c@x.com"}), Some(v1))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::VersionConflict(_)), "got {err:?}");

    // Unconditional put always lands.
    backend
        .put_record("accounts", "a1", json!({"email": "d@x.com"}), None)
        .await
        .unwrap();
    let record = backend.get_record("accounts", "a1").await.unwrap();
    assert_eq!(record.data, json!({"email": "d@x.com"}));

    // Same key in a different collection is a different record.
    backend
        .create_record_if_absent("apps", "a1", json!({"name": "Foo"}))
        .await
        .unwrap();
    let record = backend.get_record("accounts", "a1").await.unwrap();
    assert_eq!(record.data, json!({"email": "d@x.com"}));

    // Delete removes, and a second delete is NotFound, not a crash.
    backend.delete_record("accounts", "a1").await.unwrap();
    let err = backend.delete_record("accounts", "a1").await.unwrap_err();
    assert!(matches!(err, BackendError::NotFound(_)));

    // Version-checked put against a deleted record is a conflict.
    let err = backend
        .put_record("accounts", "a1", json!({}), Some(v2))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::VersionConflict(_)));
}

async fn blob_contract(backend: Arc<dyn Backend>) {
    let err = backend.get_blob("missing").await.unwrap_err();
    assert!(matches!(err, BackendError::NotFound(_)));

    backend
        .put_blob("history/d1", Bytes::from_static(b"[1,2,3]"))
        .await
        .unwrap();
    assert_eq!(
        backend.get_blob("history/d1").await.unwrap(),
        Bytes::from_static(b"[1,2,3]")
    );

    // Whole-object replace.
    backend
        .put_blob("history/d1", Bytes::from_static(b"[1,2,3,4]"))
        .await
        .unwrap();
    assert_eq!(
        backend.get_blob("history/d1").await.unwrap(),
        Bytes::from_static(b"[1,2,3,4]")
    );

    backend.delete_blob("history/d1").await.unwrap();
    let err = backend.delete_blob("history/d1").await.unwrap_err();
    assert!(matches!(err, BackendError::NotFound(_)));
}

async fn conditional_create_race(backend: Arc<dyn Backend>) {
    // Ten concurrent reservations of one key: exactly one may win.
    let mut handles = Vec::new();
    for i in 0..10 {
        let backend = backend.clone();
        handles.push(tokio::spawn(async move {
            backend
                .create_record_if_absent("pointers", "email:x@y.com", json!({"owner": i}))
                .await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(BackendError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners, 1, "exactly one concurrent create may succeed");
}

// ===== Flat backend =====

#[tokio::test]
async fn flat_record_contract() {
    record_contract(flat_memory().await).await;
}

#[tokio::test]
async fn flat_blob_contract() {
    blob_contract(flat_memory().await).await;
}

#[tokio::test]
async fn flat_conditional_create_race() {
    conditional_create_race(flat_memory().await).await;
}

#[tokio::test]
async fn flat_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("updraft.json");

    {
        let backend = FlatBackend::new(Some(path.clone())).await.unwrap();
        backend
            .create_record_if_absent("accounts", "a1", json!({"email": "a@x.com"}))
            .await
            .unwrap();
        backend
            .put_blob("history/d1", Bytes::from_static(b"[]"))
            .await
            .unwrap();
    }

    let backend = FlatBackend::new(Some(path)).await.unwrap();
    let record = backend.get_record("accounts", "a1").await.unwrap();
    assert_eq!(record.data, json!({"email": "a@x.com"}));
    assert_eq!(
        backend.get_blob("history/d1").await.unwrap(),
        Bytes::from_static(b"[]")
    );

    // The global version counter survives too: new writes must not reuse
    // version numbers handed out before the reopen.
    let next = backend
        .create_record_if_absent("accounts", "a2", json!({}))
        .await
        .unwrap();
    assert!(next > record.version);
}

#[tokio::test]
async fn flat_rejects_corrupt_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("updraft.json");
    std::fs::write(&path, b"{ not json").unwrap();

    match FlatBackend::new(Some(path)).await {
        Err(BackendError::Corrupt(_)) => {}
        other => panic!("expected corrupt-document error, got {other:?}"),
    }
}

// ===== SQLite backend =====

#[tokio::test]
async fn sqlite_record_contract() {
    let dir = tempfile::tempdir().unwrap();
    record_contract(sqlite(&dir).await).await;
}

#[tokio::test]
async fn sqlite_blob_contract() {
    let dir = tempfile::tempdir().unwrap();
    blob_contract(sqlite(&dir).await).await;
}

#[tokio::test]
async fn sqlite_conditional_create_race() {
    let dir = tempfile::tempdir().unwrap();
    conditional_create_race(sqlite(&dir).await).await;
}

#[tokio::test]
async fn sqlite_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("updraft.db");

    {
        let backend = SqliteBackend::new(&path, 1).await.unwrap();
        backend
            .create_record_if_absent("accounts", "a1", json!({"email": "a@x.com"}))
            .await
            .unwrap();
    }

    let backend = SqliteBackend::new(&path, 1).await.unwrap();
    let record = backend.get_record("accounts", "a1").await.unwrap();
    assert_eq!(record.data, json!({"email": "a@x.com"}));
}
