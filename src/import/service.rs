// # Import pipeline
//
// Per path, strictly in order: allow-list check, metadata via the worker
// pool, content-hash dedup against the catalog, class inference, copy into
// the managed tree, catalog insert. The insert comes last so a failed copy
// leaves no partial catalog state behind.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audio;
use crate::db::{AssetClass, Database, DbAudioFile};
use crate::events::{AppEvent, EventBus, LibraryChange};
use crate::import::types::{ImportDisposition, ImportOutcome};
use crate::settings::SettingsStore;
use crate::sync::{SyncQueue, SyncRequest};
use crate::workers::{MetadataWorkerPool, WorkerError};

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
    #[error("Unsupported file type: {0}")]
    Unsupported(String),
}

/// Orchestrates file imports into the managed library tree
#[derive(Clone)]
pub struct ImportService {
    db: Database,
    settings: SettingsStore,
    workers: Arc<MetadataWorkerPool>,
    queue: SyncQueue,
    events: EventBus,
}

impl ImportService {
    pub fn new(
        db: Database,
        settings: SettingsStore,
        workers: Arc<MetadataWorkerPool>,
        queue: SyncQueue,
        events: EventBus,
    ) -> Self {
        ImportService {
            db,
            settings,
            workers,
            queue,
            events,
        }
    }

    /// Import a batch of candidate files
    ///
    /// Paths are processed in input order and a progress event fires after
    /// every path, so a caller can render a progress bar without waiting for
    /// the whole batch. A bad path is reported in the outcome, never raised.
    pub async fn import_files(
        &self,
        paths: &[PathBuf],
        force_class: Option<AssetClass>,
    ) -> Result<ImportOutcome, ImportError> {
        let library_root = self.settings.library_root();
        crate::library::ensure_library_tree(&library_root).await?;

        let total = paths.len();
        let auto_sync = self.settings.get().auto_sync;
        let mut outcome = ImportOutcome::default();

        for (index, path) in paths.iter().enumerate() {
            match self.import_one(path, force_class, &library_root).await {
                Ok(ImportDisposition::Imported(file)) => {
                    info!(path = %path.display(), id = %file.id, "Imported file");
                    if auto_sync {
                        if let Err(e) = self
                            .queue
                            .enqueue(SyncRequest::Upload {
                                file_id: file.id.clone(),
                                asset_class: file.asset_class,
                            })
                            .await
                        {
                            warn!(id = %file.id, error = %e, "Could not queue upload");
                        }
                    }
                    self.events
                        .emit(AppEvent::LibraryUpdated(LibraryChange::Added {
                            file: file.clone(),
                        }));
                    outcome.success.push(file);
                }
                Ok(ImportDisposition::Duplicate) => {
                    info!(path = %path.display(), "Skipping duplicate content");
                    outcome.duplicates.push(path.clone());
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Import failed");
                    outcome.failed.push(path.clone());
                }
            }

            self.events.emit(AppEvent::ImportProgress {
                current: index + 1,
                total,
                filename: display_name(path),
            });
        }

        Ok(outcome)
    }

    async fn import_one(
        &self,
        source: &Path,
        force_class: Option<AssetClass>,
        library_root: &Path,
    ) -> Result<ImportDisposition, ImportError> {
        if !audio::is_audio_file(source) {
            return Err(ImportError::Unsupported(display_name(source)));
        }

        // Metadata before the duplicate check: dedup is content-based, not
        // name-based
        let metadata = self.workers.compute_metadata(source).await?;

        if self
            .db
            .get_audio_file_by_hash(&metadata.content_hash)
            .await?
            .is_some()
        {
            return Ok(ImportDisposition::Duplicate);
        }

        let filename = display_name(source);
        let asset_class = force_class.unwrap_or_else(|| audio::detect_asset_class(&filename));

        // Copy (not move) into the managed tree under the class directory,
        // uniquifying the name while preserving the extension
        let unique_name = unique_filename(&filename);
        let dest_path = library_root.join(asset_class.as_str()).join(&unique_name);
        fs::copy(source, &dest_path).await?;

        let now = Utc::now();
        let file = DbAudioFile {
            id: Uuid::new_v4().to_string(),
            filename: unique_name,
            asset_class,
            local_path: dest_path.to_string_lossy().to_string(),
            content_hash: metadata.content_hash,
            duration_seconds: metadata.duration_seconds,
            size_bytes: metadata.size_bytes as i64,
            tags: Vec::new(),
            bpm: None,
            favorite: false,
            remote_key: None,
            remote_url: None,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.db.insert_audio_file(&file).await {
            // Don't leave an orphan copy in the tree
            let _ = fs::remove_file(&dest_path).await;
            return Err(e.into());
        }

        Ok(ImportDisposition::Imported(file))
    }

    /// Register a file that is already inside the managed tree (watcher
    /// additions): identical hash-then-dedup-then-insert sequence, minus the
    /// copy step. Returns None when the content is already cataloged.
    pub async fn register_existing_file(
        &self,
        path: &Path,
        class_hint: Option<AssetClass>,
    ) -> Result<Option<DbAudioFile>, ImportError> {
        let metadata = self.workers.compute_metadata(path).await?;

        if self
            .db
            .get_audio_file_by_hash(&metadata.content_hash)
            .await?
            .is_some()
        {
            return Ok(None);
        }

        let filename = display_name(path);
        let asset_class = class_hint.unwrap_or_else(|| audio::detect_asset_class(&filename));

        let now = Utc::now();
        let file = DbAudioFile {
            id: Uuid::new_v4().to_string(),
            filename,
            asset_class,
            local_path: path.to_string_lossy().to_string(),
            content_hash: metadata.content_hash,
            duration_seconds: metadata.duration_seconds,
            size_bytes: metadata.size_bytes as i64,
            tags: Vec::new(),
            bpm: None,
            favorite: false,
            remote_key: None,
            remote_url: None,
            created_at: now,
            updated_at: now,
        };

        self.db.insert_audio_file(&file).await?;
        Ok(Some(file))
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Uniquify a filename with a millisecond import timestamp, keeping the
/// extension intact
pub(crate) fn unique_filename(filename: &str) -> String {
    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.to_string());
    let timestamp = Utc::now().timestamp_millis();

    match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, timestamp, ext.to_string_lossy()),
        None => format!("{}_{}", stem, timestamp),
    }
}
