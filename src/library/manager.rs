use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::db::{AssetClass, Database, DbAudioFile};
use crate::events::{AppEvent, EventBus, LibraryChange};
use crate::settings::SettingsStore;
use crate::sync::{SyncError, SyncQueue, SyncRequest};

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Sync queue error: {0}")]
    Queue(#[from] SyncError),
}

/// Per-class library totals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryStats {
    pub music_count: i64,
    pub sfx_count: i64,
    pub total_size: i64,
}

/// The main library manager for catalog reads and user-driven edits
///
/// Handles:
/// - Catalog listing and lookups
/// - Metadata edits (tags, bpm, favorite, re-classification)
/// - File removal, including scheduling the matching remote delete
/// - Library-wide stats and reset
#[derive(Debug, Clone)]
pub struct LibraryManager {
    db: Database,
    settings: SettingsStore,
    queue: SyncQueue,
    events: EventBus,
}

impl LibraryManager {
    pub fn new(
        db: Database,
        settings: SettingsStore,
        queue: SyncQueue,
        events: EventBus,
    ) -> Self {
        LibraryManager {
            db,
            settings,
            queue,
            events,
        }
    }

    /// Get all cataloged files, newest first
    pub async fn get_files(&self) -> Result<Vec<DbAudioFile>, LibraryError> {
        Ok(self.db.get_audio_files().await?)
    }

    pub async fn get_file(&self, id: &str) -> Result<Option<DbAudioFile>, LibraryError> {
        Ok(self.db.get_audio_file(id).await?)
    }

    pub async fn set_favorite(&self, id: &str, favorite: bool) -> Result<bool, LibraryError> {
        Ok(self.db.set_favorite(id, favorite).await?)
    }

    pub async fn set_tags(&self, id: &str, tags: &[String]) -> Result<bool, LibraryError> {
        Ok(self.db.set_tags(id, tags).await?)
    }

    pub async fn set_bpm(&self, id: &str, bpm: Option<i32>) -> Result<bool, LibraryError> {
        Ok(self.db.set_bpm(id, bpm).await?)
    }

    /// Explicit re-classification; re-imports never change the class
    pub async fn set_asset_class(
        &self,
        id: &str,
        asset_class: AssetClass,
    ) -> Result<bool, LibraryError> {
        Ok(self.db.set_asset_class(id, asset_class).await?)
    }

    /// Remove a file from the library: catalog row, the file on disk, and
    /// (when mirrored) a queued delete against the remote store.
    /// Returns false when the id is unknown.
    pub async fn remove_file(&self, id: &str) -> Result<bool, LibraryError> {
        let Some(entry) = self.db.get_audio_file(id).await? else {
            return Ok(false);
        };

        self.db.delete_audio_file(id).await?;

        let path = PathBuf::from(&entry.local_path);
        if let Err(e) = fs::remove_file(&path).await {
            // The catalog row is already gone; a missing file is not worth
            // failing the removal over
            warn!(path = %path.display(), error = %e, "Could not remove file from disk");
        }

        if let Some(remote_key) = entry.remote_key {
            self.queue
                .enqueue(SyncRequest::Delete {
                    remote_key,
                    asset_class: entry.asset_class,
                })
                .await?;
        }

        info!(id, filename = %entry.filename, "Removed file from library");
        self.events
            .emit(AppEvent::LibraryUpdated(LibraryChange::Removed { path }));

        Ok(true)
    }

    /// Delete every file under both class directories and purge the catalog.
    /// Returns the number of files unlinked.
    pub async fn clear_library(&self) -> Result<u64, LibraryError> {
        let root = self.settings.library_root();
        let mut removed = 0u64;

        for class in [AssetClass::Music, AssetClass::Sfx] {
            let dir = root.join(class.as_str());
            let Ok(mut entries) = fs::read_dir(&dir).await else {
                continue;
            };
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    fs::remove_file(entry.path()).await?;
                    removed += 1;
                }
            }
        }

        self.db.clear_audio_files().await?;
        info!(removed, "Cleared library");
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<LibraryStats, LibraryError> {
        Ok(LibraryStats {
            music_count: self.db.count_files_by_class(AssetClass::Music).await?,
            sfx_count: self.db.count_files_by_class(AssetClass::Sfx).await?,
            total_size: self.db.total_file_size().await?,
        })
    }

    /// The expanded managed library root
    pub fn library_root(&self) -> PathBuf {
        self.settings.library_root()
    }
}
