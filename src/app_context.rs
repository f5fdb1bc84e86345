use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::Database;
use crate::events::EventBus;
use crate::import::ImportService;
use crate::library::LibraryManager;
use crate::secure_config::SecureStore;
use crate::settings::{SettingsError, SettingsStore};
use crate::sync::{SyncEngine, SyncError, SyncQueue};
use crate::watcher::{LibraryWatcher, WatchError};
use crate::workers::MetadataWorkerPool;

const DATABASE_FILE: &str = "sonexa.db";
const METADATA_WORKERS: usize = 2;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
    #[error("Watcher error: {0}")]
    Watch(#[from] WatchError),
}

/// Every long-lived service, constructed once at process start and handed
/// to call sites by clone. No ambient globals: tests build their own
/// context against a temp directory.
#[derive(Clone)]
pub struct AppContext {
    pub db: Database,
    pub settings: SettingsStore,
    pub secrets: SecureStore,
    pub events: EventBus,
    pub workers: Arc<MetadataWorkerPool>,
    pub library: LibraryManager,
    pub import: ImportService,
    pub sync_queue: SyncQueue,
    pub sync_engine: Arc<SyncEngine>,
    pub watcher: LibraryWatcher,
}

impl AppContext {
    /// Bring up the full service graph under `data_dir`
    pub async fn init(data_dir: &Path) -> Result<Self, AppError> {
        let settings = SettingsStore::load(data_dir)?;
        let db = Database::new(&data_dir.join(DATABASE_FILE).to_string_lossy()).await?;
        let events = EventBus::new();
        let workers = Arc::new(MetadataWorkerPool::new(METADATA_WORKERS));
        let secrets = SecureStore::new();

        let sync_queue = SyncQueue::new(db.clone());
        // Crash recovery: revive operations stranded in `processing` before
        // anything schedules new work
        sync_queue.reset_stuck_items().await?;

        crate::library::ensure_library_tree(&settings.library_root()).await?;

        let library = LibraryManager::new(
            db.clone(),
            settings.clone(),
            sync_queue.clone(),
            events.clone(),
        );
        let import = ImportService::new(
            db.clone(),
            settings.clone(),
            workers.clone(),
            sync_queue.clone(),
            events.clone(),
        );
        let sync_engine = Arc::new(SyncEngine::new(
            db.clone(),
            sync_queue.clone(),
            settings.clone(),
            secrets.clone(),
            workers.clone(),
            events.clone(),
        ));

        match sync_engine.connect_remote().await {
            Ok(()) => info!("Remote store connected"),
            Err(SyncError::NotConfigured) => info!("Remote store not configured"),
            Err(e) => warn!(error = %e, "Remote store connection failed"),
        }

        let watcher = LibraryWatcher::new(import.clone(), events.clone());
        watcher.start(&settings.library_root())?;

        Ok(AppContext {
            db,
            settings,
            secrets,
            events,
            workers,
            library,
            import,
            sync_queue,
            sync_engine,
            watcher,
        })
    }
}
