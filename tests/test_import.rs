mod support;

use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use sonexa::db::{AssetClass, Database, SyncOperation};
use sonexa::events::{AppEvent, EventBus};
use sonexa::import::ImportService;
use sonexa::settings::SettingsStore;
use sonexa::sync::SyncQueue;
use sonexa::workers::MetadataWorkerPool;

struct Env {
    import: ImportService,
    db: Database,
    queue: SyncQueue,
    settings: SettingsStore,
    events: EventBus,
    _temp: TempDir,
}

async fn setup() -> Env {
    support::tracing_init();

    let temp = TempDir::new().unwrap();
    let settings = SettingsStore::load(&temp.path().join("config")).unwrap();
    let library_root = temp.path().join("library");
    settings
        .update(|s| s.local_library_path = library_root.to_string_lossy().to_string())
        .unwrap();

    let db = Database::new(&temp.path().join("test.db").to_string_lossy())
        .await
        .expect("Failed to create database");
    let events = EventBus::new();
    let workers = Arc::new(MetadataWorkerPool::new(2));
    let queue = SyncQueue::new(db.clone());
    let import = ImportService::new(
        db.clone(),
        settings.clone(),
        workers,
        queue.clone(),
        events.clone(),
    );

    Env {
        import,
        db,
        queue,
        settings,
        events,
        _temp: temp,
    }
}

async fn write_source(env: &Env, name: &str, bytes: &[u8]) -> PathBuf {
    let dir = env._temp.path().join("incoming");
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let path = dir.join(name);
    tokio::fs::write(&path, bytes).await.unwrap();
    path
}

#[tokio::test]
async fn test_import_copies_file_and_creates_entry() {
    let env = setup().await;
    let source = write_source(&env, "sunset_theme.wav", b"wav bytes here").await;

    let outcome = env.import.import_files(&[source.clone()], None).await.unwrap();

    assert_eq!(outcome.success.len(), 1);
    assert!(outcome.failed.is_empty());
    assert!(outcome.duplicates.is_empty());

    let entry = &outcome.success[0];
    assert_eq!(entry.asset_class, AssetClass::Music);
    assert_eq!(entry.size_bytes, 14);
    assert!(entry.remote_key.is_none());
    assert!(!entry.favorite);
    assert!(entry.filename.starts_with("sunset_theme_"));
    assert!(entry.filename.ends_with(".wav"));
    assert!(entry.local_path.contains("/music/"));

    // Copy, not move: both the source and the library copy exist
    assert!(tokio::fs::try_exists(&source).await.unwrap());
    assert!(tokio::fs::try_exists(&entry.local_path).await.unwrap());

    let files = env.db.get_audio_files().await.unwrap();
    assert_eq!(files.len(), 1);

    // Auto-sync is off by default: nothing was queued
    assert_eq!(env.queue.get_stats().await.unwrap().total, 0);
}

#[tokio::test]
async fn test_identical_bytes_collapse_to_one_entry() {
    let env = setup().await;
    let first = write_source(&env, "take_one.wav", b"identical audio content").await;
    let second = write_source(&env, "renamed_take.wav", b"identical audio content").await;

    let outcome = env
        .import
        .import_files(&[first, second.clone()], None)
        .await
        .unwrap();

    assert_eq!(outcome.success.len(), 1);
    assert_eq!(outcome.duplicates, vec![second.clone()]);
    assert_eq!(env.db.get_audio_files().await.unwrap().len(), 1);

    // A later re-import of the same bytes is still a duplicate
    let again = env.import.import_files(&[second.clone()], None).await.unwrap();
    assert!(again.success.is_empty());
    assert_eq!(again.duplicates, vec![second]);
    assert_eq!(env.db.get_audio_files().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_bad_paths_do_not_abort_the_batch() {
    let env = setup().await;
    let good_one = write_source(&env, "one.wav", b"first").await;
    let missing = env._temp.path().join("incoming").join("not_there.wav");
    let good_two = write_source(&env, "two.wav", b"second").await;

    let outcome = env
        .import
        .import_files(&[good_one, missing.clone(), good_two], None)
        .await
        .unwrap();

    assert_eq!(outcome.success.len(), 2);
    assert_eq!(outcome.failed, vec![missing]);
    assert_eq!(env.db.get_audio_files().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_unsupported_extension_is_rejected() {
    let env = setup().await;
    let notes = write_source(&env, "notes.txt", b"not audio").await;

    let outcome = env.import.import_files(&[notes.clone()], None).await.unwrap();

    assert!(outcome.success.is_empty());
    assert_eq!(outcome.failed, vec![notes]);
    assert!(env.db.get_audio_files().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_progress_events_follow_input_order() {
    let env = setup().await;
    let mut rx = env.events.subscribe();

    let paths = vec![
        write_source(&env, "a.wav", b"aaa").await,
        write_source(&env, "b.wav", b"bbb").await,
        write_source(&env, "c.wav", b"ccc").await,
    ];

    env.import.import_files(&paths, None).await.unwrap();

    let mut progress = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let AppEvent::ImportProgress {
            current,
            total,
            filename,
        } = event
        {
            progress.push((current, total, filename));
        }
    }

    assert_eq!(
        progress,
        vec![
            (1, 3, "a.wav".to_string()),
            (2, 3, "b.wav".to_string()),
            (3, 3, "c.wav".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_class_override_and_filename_heuristic() {
    let env = setup().await;
    let whoosh = write_source(&env, "big_whoosh.wav", b"whoosh bytes").await;
    let forced = write_source(&env, "whoosh_two.wav", b"other whoosh bytes").await;

    let outcome = env.import.import_files(&[whoosh], None).await.unwrap();
    assert_eq!(outcome.success[0].asset_class, AssetClass::Sfx);
    assert!(outcome.success[0].local_path.contains("/sfx/"));

    // Explicit override wins over the vocabulary match
    let outcome = env
        .import
        .import_files(&[forced], Some(AssetClass::Music))
        .await
        .unwrap();
    assert_eq!(outcome.success[0].asset_class, AssetClass::Music);
    assert!(outcome.success[0].local_path.contains("/music/"));
}

#[tokio::test]
async fn test_auto_sync_queues_an_upload_per_import() {
    let env = setup().await;
    env.settings.update(|s| s.auto_sync = true).unwrap();
    let source = write_source(&env, "fresh.wav", b"fresh bytes").await;

    let outcome = env.import.import_files(&[source], None).await.unwrap();
    assert_eq!(outcome.success.len(), 1);

    let batch = env.queue.claim_batch(10).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].operation, SyncOperation::Upload);
    assert_eq!(batch[0].file_id.as_deref(), Some(outcome.success[0].id.as_str()));
}
