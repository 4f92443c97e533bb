//! Relocation engine behavior across create, update and delete

mod common;

use common::{seeded, FaultyStorage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use upload_storage::engine::Stage;
use upload_storage::storage::OpKind;
use upload_storage::{
    AttributeValue, ErrorKind, ExistingPolicy, FileRef, Location, RelocationEngine,
    RelocationOptions, Storage, StorageError,
};

fn files(names: &[&str]) -> Vec<FileRef> {
    names.iter().map(|n| FileRef::from(*n)).collect()
}

#[tokio::test]
async fn test_update_replaces_single_file() {
    let storage = seeded(&["/upload/a.jpg", "/temp/b.jpg"]).await;
    let engine = RelocationEngine::new(Arc::clone(&storage), "/temp", "/upload").unwrap();

    let report = engine
        .on_update(
            &AttributeValue::multi(["a.jpg"]),
            &AttributeValue::multi(["b.jpg"]),
        )
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.relocated, files(&["b.jpg"]));
    assert_eq!(report.deleted, files(&["a.jpg"]));
    assert_eq!(storage.file_paths(), vec!["upload/b.jpg".to_string()]);
}

#[tokio::test]
async fn test_update_leaves_kept_file_untouched() {
    let storage = seeded(&["/upload/a.jpg", "/upload/b.jpg", "/temp/c.jpg"]).await;
    let engine = RelocationEngine::new(Arc::clone(&storage), "/temp", "/upload").unwrap();

    let report = engine
        .on_update(
            &AttributeValue::multi(["a.jpg", "b.jpg"]),
            &AttributeValue::multi(["b.jpg", "c.jpg"]),
        )
        .await
        .unwrap();

    assert_eq!(report.relocated, files(&["c.jpg"]));
    assert_eq!(report.deleted, files(&["a.jpg"]));
    assert!(storage
        .operations()
        .iter()
        .all(|op| !op.path.ends_with("b.jpg")));
    assert_eq!(
        storage.file_paths(),
        vec!["upload/b.jpg".to_string(), "upload/c.jpg".to_string()]
    );
}

#[tokio::test]
async fn test_missing_temp_file_reported_siblings_continue() {
    let storage = seeded(&["/temp/a.jpg", "/temp/c.jpg"]).await;
    let engine = RelocationEngine::new(Arc::clone(&storage), "/temp", "/upload").unwrap();

    let report = engine
        .on_create(&AttributeValue::multi(["a.jpg", "b.jpg", "c.jpg"]))
        .await
        .unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.relocated, files(&["a.jpg", "c.jpg"]));
    assert_eq!(report.failed_files(ErrorKind::NotFound), vec![&FileRef::from("b.jpg")]);
    assert_eq!(report.failures[0].stage, Stage::Create);
}

#[tokio::test]
async fn test_update_touches_only_the_difference() {
    let cases: &[(&[&str], &[&str])] = &[
        (&["a.jpg"], &["a.jpg"]),
        (&["a.jpg", "b.jpg"], &["b.jpg"]),
        (&[], &["b.jpg"]),
        (&["a.jpg", "b.jpg"], &["b.jpg", "a.jpg"]),
        (&["a.jpg"], &[]),
    ];

    for (old, new) in cases {
        let storage = seeded(&["/upload/a.jpg", "/upload/b.jpg", "/temp/b.jpg"]).await;
        let engine = RelocationEngine::new(Arc::clone(&storage), "/temp", "/upload").unwrap();

        engine
            .on_update(
                &AttributeValue::multi(old.iter().copied()),
                &AttributeValue::multi(new.iter().copied()),
            )
            .await
            .unwrap();

        for op in storage.mutations() {
            if op.kind == OpKind::CreateDir {
                continue;
            }
            let touched = op.path.rsplit('/').next().unwrap_or_default().to_string();
            let in_old = old.contains(&touched.as_str());
            let in_new = new.contains(&touched.as_str());
            assert!(
                in_old != in_new,
                "{:?} -> {:?} touched unchanged file {}",
                old,
                new,
                op.path
            );
        }
    }
}

#[tokio::test]
async fn test_double_delete_is_idempotent() {
    let storage = seeded(&["/upload/a.jpg", "/upload/b.jpg"]).await;
    let engine = RelocationEngine::new(Arc::clone(&storage), "/temp", "/upload").unwrap();
    let value = AttributeValue::multi(["a.jpg", "b.jpg"]);

    let first = engine.on_delete(&value).await.unwrap();
    assert_eq!(first.deleted, files(&["a.jpg", "b.jpg"]));

    let second = engine.on_delete(&value).await.unwrap();
    assert!(second.is_complete());
    assert!(second.deleted.is_empty());
    assert_eq!(second.already_absent, files(&["a.jpg", "b.jpg"]));
    assert!(storage.file_paths().is_empty());
}

#[tokio::test]
async fn test_directory_creation_failure_is_fatal() {
    let inner = seeded(&["/temp/a.jpg"]).await;
    let storage = Arc::new(FaultyStorage::new(Arc::clone(&inner)).failing_create_dir());
    let engine = RelocationEngine::new(storage, "/temp", "/upload").unwrap();

    let err = engine
        .on_create(&AttributeValue::single("a.jpg"))
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::DirectoryCreate { ref path, .. } if path == "/upload"));
    assert!(err.is_fatal());
    assert!(inner.exists("/temp/a.jpg").await.unwrap());
}

#[tokio::test]
async fn test_delete_failure_reported_others_continue() {
    let inner = seeded(&["/upload/a.jpg", "/upload/b.jpg"]).await;
    let storage = Arc::new(FaultyStorage::new(Arc::clone(&inner)).failing_delete("/upload/a.jpg"));
    let engine = RelocationEngine::new(storage, "/temp", "/upload").unwrap();

    let report = engine
        .on_delete(&AttributeValue::multi(["a.jpg", "b.jpg"]))
        .await
        .unwrap();

    assert_eq!(report.deleted, files(&["b.jpg"]));
    assert_eq!(report.failed_files(ErrorKind::Io), vec![&FileRef::from("a.jpg")]);
    assert_eq!(report.failures[0].stage, Stage::Delete);
    assert_eq!(inner.file_paths(), vec!["upload/a.jpg".to_string()]);
}

#[tokio::test]
async fn test_failed_create_withholds_deletes() {
    let inner = seeded(&["/upload/a.jpg", "/temp/b.jpg"]).await;
    let storage = Arc::new(FaultyStorage::new(Arc::clone(&inner)).failing_move("/temp/b.jpg"));
    let engine = RelocationEngine::new(storage, "/temp", "/upload").unwrap();

    let report = engine
        .on_update(&"a.jpg".into(), &"b.jpg".into())
        .await
        .unwrap();

    assert!(report.has_create_failures());
    assert!(report.deleted.is_empty());
    assert_eq!(report.retained, files(&["a.jpg"]));
    assert!(inner.exists("/upload/a.jpg").await.unwrap());
    assert!(inner.exists("/temp/b.jpg").await.unwrap());
}

#[tokio::test]
async fn test_resolver_called_once_per_operation() {
    let storage = seeded(&["/temp/a.jpg", "/temp/b.jpg"]).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let upload = Location::resolver(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        "/records/42".to_string()
    });
    let engine = RelocationEngine::new(Arc::clone(&storage), "/temp", upload).unwrap();

    engine
        .on_create(&AttributeValue::multi(["a.jpg", "b.jpg"]))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        storage.file_paths(),
        vec!["records/42/a.jpg".to_string(), "records/42/b.jpg".to_string()]
    );
}

#[tokio::test]
async fn test_empty_resolved_location_is_config_error() {
    let storage = seeded(&["/temp/a.jpg"]).await;
    let engine =
        RelocationEngine::new(Arc::clone(&storage), "/temp", Location::resolver(String::new))
            .unwrap();

    let err = engine
        .on_create(&AttributeValue::single("a.jpg"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(storage.mutations().len(), 0);
}

#[tokio::test]
async fn test_failed_overwrite_keeps_stored_file() {
    let inner = seeded(&["/upload/a.jpg", "/temp/a.jpg"]).await;
    inner.write("/upload/a.jpg", b"stored").await.unwrap();
    let storage = Arc::new(FaultyStorage::new(Arc::clone(&inner)).failing_move("/temp/a.jpg"));
    let engine = RelocationEngine::new(storage, "/temp", "/upload")
        .unwrap()
        .with_options(RelocationOptions {
            existing: ExistingPolicy::Overwrite,
            ..RelocationOptions::default()
        });

    let report = engine.on_create(&"a.jpg".into()).await.unwrap();

    assert_eq!(report.failed_files(ErrorKind::Io), vec![&FileRef::from("a.jpg")]);
    assert_eq!(inner.read("/upload/a.jpg").await.unwrap(), b"stored");
    assert!(inner.exists("/temp/a.jpg").await.unwrap());
}

#[tokio::test]
async fn test_overwrite_replaces_without_delete() {
    let storage = seeded(&["/upload/a.jpg", "/temp/a.jpg"]).await;
    storage.write("/temp/a.jpg", b"fresh").await.unwrap();
    storage.clear_operations();
    let engine = RelocationEngine::new(Arc::clone(&storage), "/temp", "/upload")
        .unwrap()
        .with_options(RelocationOptions {
            existing: ExistingPolicy::Overwrite,
            ..RelocationOptions::default()
        });

    let report = engine.on_create(&"a.jpg".into()).await.unwrap();

    assert_eq!(report.relocated, files(&["a.jpg"]));
    assert_eq!(storage.read("/upload/a.jpg").await.unwrap(), b"fresh");
    assert!(storage
        .operations()
        .iter()
        .all(|op| op.kind != OpKind::Delete));
}
