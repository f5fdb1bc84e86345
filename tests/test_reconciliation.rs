mod support;

use chrono::Utc;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

use sonexa::audio;
use sonexa::cloud_storage::RemoteStoreManager;
use sonexa::db::{AssetClass, Database, DbAudioFile};
use sonexa::events::EventBus;
use sonexa::import::ImportService;
use sonexa::secure_config::SecureStore;
use sonexa::settings::SettingsStore;
use sonexa::sync::{SyncEngine, SyncError, SyncQueue, SyncRequest};
use sonexa::workers::MetadataWorkerPool;
use support::MockRemoteStore;

struct Env {
    db: Database,
    settings: SettingsStore,
    queue: SyncQueue,
    engine: SyncEngine,
    store: Arc<MockRemoteStore>,
    workers: Arc<MetadataWorkerPool>,
    events: EventBus,
    _temp: TempDir,
}

async fn setup(configured: bool) -> Env {
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
    let queue = SyncQueue::new(db.clone());
    let workers = Arc::new(MetadataWorkerPool::new(2));
    let events = EventBus::new();
    let store = Arc::new(MockRemoteStore::new());

    let engine = SyncEngine::new(
        db.clone(),
        queue.clone(),
        settings.clone(),
        SecureStore::new(),
        workers.clone(),
        events.clone(),
    );
    if configured {
        engine.set_remote(RemoteStoreManager::from_storage(store.clone()));
    }

    Env {
        db,
        settings,
        queue,
        engine,
        store,
        workers,
        events,
        _temp: temp,
    }
}

/// Write a file into the managed tree and catalog it, without a remote key
async fn add_local_entry(env: &Env, asset_class: AssetClass, filename: &str, bytes: &[u8]) -> DbAudioFile {
    let dir = env.settings.library_root().join(asset_class.as_str());
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let path = dir.join(filename);
    tokio::fs::write(&path, bytes).await.unwrap();

    let now = Utc::now();
    let file = DbAudioFile {
        id: Uuid::new_v4().to_string(),
        filename: filename.to_string(),
        asset_class,
        local_path: path.to_string_lossy().to_string(),
        content_hash: audio::hash_bytes(bytes),
        duration_seconds: 0.0,
        size_bytes: bytes.len() as i64,
        tags: Vec::new(),
        bpm: None,
        favorite: false,
        remote_key: None,
        remote_url: None,
        created_at: now,
        updated_at: now,
    };
    env.db.insert_audio_file(&file).await.unwrap();
    file
}

#[tokio::test]
async fn test_unconfigured_remote_is_a_distinct_state() {
    let env = setup(false).await;

    assert!(matches!(
        env.engine.full_sync().await,
        Err(SyncError::NotConfigured)
    ));
    assert!(matches!(
        env.engine.compute_sync_status().await,
        Err(SyncError::NotConfigured)
    ));
    assert!(!env.engine.is_configured());
}

#[tokio::test]
async fn test_status_counts_the_pending_delta() {
    let env = setup(true).await;

    add_local_entry(&env, AssetClass::Music, "one.wav", b"one").await;
    add_local_entry(&env, AssetClass::Sfx, "two.wav", b"two").await;
    env.store.insert_object("music/elsewhere.mp3", b"remote bytes");

    let status = env.engine.compute_sync_status().await.unwrap();
    assert_eq!(status.upload_needed, 2);
    assert_eq!(status.download_needed, 1);
}

#[tokio::test]
async fn test_full_sync_uploads_then_downloads_then_settles() {
    let env = setup(true).await;

    add_local_entry(&env, AssetClass::Music, "song.wav", b"song bytes").await;
    add_local_entry(&env, AssetClass::Sfx, "boom.wav", b"boom bytes").await;
    env.store.insert_object("music/from_other_machine.mp3", b"downloaded bytes");

    let report = env.engine.full_sync().await.unwrap();
    assert_eq!(report.uploaded, 2);
    assert_eq!(report.downloaded, 1);

    // Uploads landed under the class-prefixed keys and the catalog learned
    // the remote identities
    assert!(env.store.has_key("music/song.wav"));
    assert!(env.store.has_key("sfx/boom.wav"));
    let files = env.db.get_audio_files().await.unwrap();
    assert_eq!(files.len(), 3);
    assert!(files.iter().all(|f| f.remote_key.is_some()));

    // The downloaded object was written into the tree and cataloged with
    // its remote key set from the start
    let downloaded = files
        .iter()
        .find(|f| f.filename == "from_other_machine.mp3")
        .expect("downloaded entry must exist");
    assert_eq!(
        downloaded.remote_key.as_deref(),
        Some("music/from_other_machine.mp3")
    );
    assert!(tokio::fs::try_exists(&downloaded.local_path).await.unwrap());

    assert!(env.settings.get().last_sync_at.is_some());

    // Idempotence: a second pass has nothing to move
    let report = env.engine.full_sync().await.unwrap();
    assert_eq!(report.uploaded, 0);
    assert_eq!(report.downloaded, 0);

    let status = env.engine.compute_sync_status().await.unwrap();
    assert_eq!(status.upload_needed, 0);
    assert_eq!(status.download_needed, 0);
}

#[tokio::test]
async fn test_individual_failures_do_not_abort_the_pass() {
    let env = setup(true).await;

    add_local_entry(&env, AssetClass::Music, "good.wav", b"good bytes").await;
    add_local_entry(&env, AssetClass::Music, "cursed.wav", b"cursed bytes").await;
    env.store.fail_key("music/cursed.wav");

    let report = env.engine.full_sync().await.unwrap();
    assert_eq!(report.uploaded, 1);
    assert!(env.store.has_key("music/good.wav"));

    // The failed entry is still an upload candidate for the next pass
    let status = env.engine.compute_sync_status().await.unwrap();
    assert_eq!(status.upload_needed, 1);
}

#[tokio::test]
async fn test_download_of_known_bytes_links_the_existing_entry() {
    let env = setup(true).await;

    let local = add_local_entry(&env, AssetClass::Music, "loop.wav", b"shared bytes").await;
    env.store.insert_object("music/loop_elsewhere.wav", b"shared bytes");

    env.queue
        .enqueue(SyncRequest::Download {
            remote_key: "music/loop_elsewhere.wav".to_string(),
            asset_class: AssetClass::Music,
        })
        .await
        .unwrap();
    let run = env.engine.process_queue().await.unwrap();
    assert_eq!(run.completed, 1);

    // Hash uniqueness holds: the remote identity is attached to the entry
    // we already have instead of inserting a second row
    let files = env.db.get_audio_files().await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].id, local.id);
    assert_eq!(
        files[0].remote_key.as_deref(),
        Some("music/loop_elsewhere.wav")
    );
}

#[tokio::test]
async fn test_queue_driven_sync_moves_the_same_delta() {
    let env = setup(true).await;

    let entry = add_local_entry(&env, AssetClass::Sfx, "hit.wav", b"hit bytes").await;
    env.store.insert_object("music/incoming.mp3", b"incoming bytes");

    let delta = env.engine.queue_missing().await.unwrap();
    assert_eq!(delta.uploads_queued, 1);
    assert_eq!(delta.downloads_queued, 1);

    // Re-triggering schedules nothing new while the items are unfinished
    let delta = env.engine.queue_missing().await.unwrap();
    assert_eq!(delta.uploads_queued, 0);
    assert_eq!(delta.downloads_queued, 0);

    let run = env.engine.process_queue().await.unwrap();
    assert_eq!(run.completed, 2);
    assert_eq!(run.failed, 0);

    assert!(env.store.has_key("sfx/hit.wav"));
    let uploaded = env.db.get_audio_file(&entry.id).await.unwrap().unwrap();
    assert_eq!(uploaded.remote_key.as_deref(), Some("sfx/hit.wav"));

    let files = env.db.get_audio_files().await.unwrap();
    assert_eq!(files.len(), 2);

    // Completed items are deleted, not retained
    let stats = env.queue.get_stats().await.unwrap();
    assert_eq!(stats.total, 0);
}

#[tokio::test]
async fn test_deleting_an_absent_key_is_success() {
    let env = setup(true).await;

    env.queue
        .enqueue(SyncRequest::Delete {
            remote_key: "music/long_gone.mp3".to_string(),
            asset_class: AssetClass::Music,
        })
        .await
        .unwrap();

    let run = env.engine.process_queue().await.unwrap();
    assert_eq!(run.completed, 1);
    assert_eq!(run.failed, 0);
    assert_eq!(env.queue.get_stats().await.unwrap().total, 0);
}

#[tokio::test]
async fn test_failed_queue_item_enters_backoff() {
    let env = setup(true).await;

    add_local_entry(&env, AssetClass::Music, "flaky.wav", b"flaky bytes").await;
    env.store.fail_key("music/flaky.wav");

    env.engine.queue_missing().await.unwrap();
    let run = env.engine.process_queue().await.unwrap();
    assert_eq!(run.completed, 0);
    assert_eq!(run.failed, 1);

    // The item is parked in its backoff window, not lost and not burning
    // retries in a loop
    let stats = env.queue.get_stats().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.permanently_failed, 0);
    assert!(env.engine.process_queue().await.unwrap() == Default::default());
}

#[tokio::test]
async fn test_end_to_end_import_then_sync() {
    let env = setup(false).await;

    let import = ImportService::new(
        env.db.clone(),
        env.settings.clone(),
        env.workers.clone(),
        env.queue.clone(),
        env.events.clone(),
    );
    let incoming = env._temp.path().join("track.wav");
    tokio::fs::write(&incoming, b"track bytes").await.unwrap();

    let outcome = import.import_files(&[incoming], None).await.unwrap();
    assert_eq!(outcome.success.len(), 1);
    assert!(outcome.success[0].remote_key.is_none());

    // Remote unconfigured: sync raises the actionable signal
    assert!(matches!(
        env.engine.full_sync().await,
        Err(SyncError::NotConfigured)
    ));

    // Configure and sync: the entry is mirrored
    env.engine
        .set_remote(RemoteStoreManager::from_storage(env.store.clone()));
    let report = env.engine.full_sync().await.unwrap();
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.downloaded, 0);

    let files = env.db.get_audio_files().await.unwrap();
    assert!(files[0].remote_key.is_some());
    assert!(files[0].remote_url.is_some());

    // Already reconciled: another pass is a no-op
    let report = env.engine.full_sync().await.unwrap();
    assert_eq!(report.uploaded, 0);
    assert_eq!(report.downloaded, 0);
}
