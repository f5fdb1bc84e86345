// # Reconciliation engine and queue processor
//
// The engine compares the local catalog against the remote listing and
// drives the delta in both directions: local entries without a remote key
// are uploaded first, then remote keys unknown locally are downloaded.
// Correlation is by remote key alone; filename collisions that do not share
// a key are distinct objects.

use chrono::Utc;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::audio;
use crate::cloud_storage::{RemoteConfig, RemoteEntry, RemoteStoreManager};
use crate::db::{AssetClass, Database, DbAudioFile, DbSyncQueueItem, SyncOperation};
use crate::events::{AppEvent, EventBus, LibraryChange};
use crate::import;
use crate::settings::SettingsStore;
use crate::secure_config::SecureStore;
use crate::sync::queue::{SyncQueue, SyncRequest};
use crate::sync::SyncError;
use crate::workers::MetadataWorkerPool;
use uuid::Uuid;

const CLAIM_BATCH_SIZE: i64 = 10;

/// Pending work in each direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStatusReport {
    pub upload_needed: usize,
    pub download_needed: usize,
}

/// What a full sync pass actually moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
    pub uploaded: usize,
    pub downloaded: usize,
}

/// Operations enqueued by `queue_missing`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueDelta {
    pub uploads_queued: usize,
    pub downloads_queued: usize,
}

/// Outcome of one queue drain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueRunReport {
    pub completed: usize,
    pub failed: usize,
}

/// Long-lived service reconciling the catalog with the remote store
pub struct SyncEngine {
    db: Database,
    queue: SyncQueue,
    settings: SettingsStore,
    secrets: SecureStore,
    workers: Arc<MetadataWorkerPool>,
    events: EventBus,
    remote: Mutex<Option<RemoteStoreManager>>,
    sync_running: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        db: Database,
        queue: SyncQueue,
        settings: SettingsStore,
        secrets: SecureStore,
        workers: Arc<MetadataWorkerPool>,
        events: EventBus,
    ) -> Self {
        SyncEngine {
            db,
            queue,
            settings,
            secrets,
            workers,
            events,
            remote: Mutex::new(None),
            sync_running: AtomicBool::new(false),
        }
    }

    /// Build the remote adapter from settings + keychain credentials and
    /// run the idempotent bucket setup. `NotConfigured` when either half of
    /// the configuration is missing.
    pub async fn connect_remote(&self) -> Result<(), SyncError> {
        let settings = self.settings.get();
        if settings.remote_endpoint_url.trim().is_empty()
            || settings.remote_bucket.trim().is_empty()
        {
            return Err(SyncError::NotConfigured);
        }

        let Some(credentials) = self.secrets.get_remote_credentials()? else {
            return Err(SyncError::NotConfigured);
        };

        let config = RemoteConfig {
            bucket_name: settings.remote_bucket,
            region: settings.remote_region,
            access_key_id: credentials.access_key_id,
            secret_access_key: credentials.secret_access_key,
            endpoint_url: Some(settings.remote_endpoint_url),
        };

        let manager = RemoteStoreManager::new(config).await?;
        manager.ensure_bucket().await?;
        self.set_remote(manager);
        Ok(())
    }

    /// Install an already-built adapter (tests, custom deployments)
    pub fn set_remote(&self, manager: RemoteStoreManager) {
        *self.remote.lock().unwrap() = Some(manager);
    }

    /// Drop the adapter; sync entry points report `NotConfigured` again
    pub fn clear_remote(&self) {
        *self.remote.lock().unwrap() = None;
    }

    pub fn is_configured(&self) -> bool {
        self.remote.lock().unwrap().is_some()
    }

    fn remote(&self) -> Result<RemoteStoreManager, SyncError> {
        self.remote
            .lock()
            .unwrap()
            .clone()
            .ok_or(SyncError::NotConfigured)
    }

    /// Count the pending delta without moving anything
    pub async fn compute_sync_status(&self) -> Result<SyncStatusReport, SyncError> {
        let remote = self.remote()?;

        let upload_needed = self.db.get_files_without_remote().await?.len();

        let known: HashSet<String> = self.db.get_known_remote_keys().await?.into_iter().collect();
        let download_needed = self
            .list_all(&remote)
            .await?
            .into_iter()
            .filter(|entry| !known.contains(&entry.key))
            .count();

        Ok(SyncStatusReport {
            upload_needed,
            download_needed,
        })
    }

    /// One-shot bidirectional pass: uploads first, then downloads, so a
    /// fresh download (whose remote key is set with its insert) can never be
    /// re-offered as an upload candidate in the same pass. Individual
    /// failures are logged and skipped; the pass always visits every
    /// candidate.
    pub async fn full_sync(&self) -> Result<SyncReport, SyncError> {
        if self.sync_running.swap(true, Ordering::SeqCst) {
            debug!("Sync already in flight, ignoring trigger");
            return Ok(SyncReport::default());
        }
        let _guard = RunningGuard(&self.sync_running);

        let remote = self.remote()?;
        let started = Instant::now();
        let mut report = SyncReport::default();

        for entry in self.db.get_files_without_remote().await? {
            match self.upload_entry(&remote, &entry).await {
                Ok(()) => report.uploaded += 1,
                Err(e) => {
                    warn!(id = %entry.id, filename = %entry.filename, error = %e, "Upload failed")
                }
            }
        }

        let known: HashSet<String> = self.db.get_known_remote_keys().await?.into_iter().collect();
        for remote_entry in self.list_all(&remote).await? {
            if known.contains(&remote_entry.key) {
                continue;
            }
            match self.download_entry(&remote, &remote_entry.key).await {
                Ok(()) => report.downloaded += 1,
                Err(e) => warn!(key = %remote_entry.key, error = %e, "Download failed"),
            }
        }

        if let Err(e) = self.settings.update(|s| s.last_sync_at = Some(Utc::now())) {
            warn!(error = %e, "Could not persist last sync time");
        }

        info!(
            uploaded = report.uploaded,
            downloaded = report.downloaded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sync complete"
        );
        self.events.emit(AppEvent::SyncComplete {
            synced: report.uploaded + report.downloaded,
            elapsed: started.elapsed(),
        });

        Ok(report)
    }

    /// Schedule the same delta through the durable queue instead of
    /// executing it inline
    pub async fn queue_missing(&self) -> Result<QueueDelta, SyncError> {
        let remote = self.remote()?;
        let mut delta = QueueDelta::default();

        for entry in self.db.get_files_without_remote().await? {
            if let crate::sync::EnqueueOutcome::Queued(_) = self
                .queue
                .enqueue(SyncRequest::Upload {
                    file_id: entry.id.clone(),
                    asset_class: entry.asset_class,
                })
                .await?
            {
                delta.uploads_queued += 1;
            }
        }

        let known: HashSet<String> = self.db.get_known_remote_keys().await?.into_iter().collect();
        for remote_entry in self.list_all(&remote).await? {
            if known.contains(&remote_entry.key) {
                continue;
            }
            if let crate::sync::EnqueueOutcome::Queued(_) = self
                .queue
                .enqueue(SyncRequest::Download {
                    remote_key: remote_entry.key.clone(),
                    asset_class: class_from_key(&remote_entry.key),
                })
                .await?
            {
                delta.downloads_queued += 1;
            }
        }

        Ok(delta)
    }

    /// Drain the queue: claim eligible items oldest-first, dispatch each to
    /// the remote store, and record the outcome. At-least-once semantics —
    /// uploads overwrite by key and deleting an absent key succeeds, so a
    /// crash between the remote call and `mark_completed` is safe to replay.
    pub async fn process_queue(&self) -> Result<QueueRunReport, SyncError> {
        let remote = self.remote()?;
        let mut report = QueueRunReport::default();

        loop {
            let batch = self.queue.claim_batch(CLAIM_BATCH_SIZE).await?;
            if batch.is_empty() {
                break;
            }

            for item in batch {
                match self.process_item(&remote, &item).await {
                    Ok(()) => {
                        self.queue.mark_completed(item.id).await?;
                        report.completed += 1;
                    }
                    Err(e) => {
                        self.queue.mark_failed(item.id, &e.to_string()).await?;
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    async fn process_item(
        &self,
        remote: &RemoteStoreManager,
        item: &DbSyncQueueItem,
    ) -> Result<(), SyncError> {
        match item.operation {
            SyncOperation::Upload => {
                let file_id = item.file_id.as_deref().ok_or_else(|| {
                    SyncError::MalformedItem(format!("upload item {} has no file id", item.id))
                })?;
                let entry = self.db.get_audio_file(file_id).await?.ok_or_else(|| {
                    SyncError::MalformedItem(format!(
                        "upload item {} references unknown file {}",
                        item.id, file_id
                    ))
                })?;
                self.upload_entry(remote, &entry).await
            }
            SyncOperation::Download => {
                let key = item.remote_key.as_deref().ok_or_else(|| {
                    SyncError::MalformedItem(format!("download item {} has no remote key", item.id))
                })?;
                self.download_entry(remote, key).await
            }
            SyncOperation::Delete => {
                let key = item.remote_key.as_deref().ok_or_else(|| {
                    SyncError::MalformedItem(format!("delete item {} has no remote key", item.id))
                })?;
                remote.delete(key).await?;
                Ok(())
            }
        }
    }

    async fn upload_entry(
        &self,
        remote: &RemoteStoreManager,
        entry: &DbAudioFile,
    ) -> Result<(), SyncError> {
        let key = remote_key_for(entry.asset_class, &entry.filename);
        let object = remote
            .upload_file(Path::new(&entry.local_path), &key)
            .await?;
        self.db
            .set_remote_location(&entry.id, &object.key, &object.url)
            .await?;
        debug!(id = %entry.id, key = %object.key, "Uploaded entry");
        Ok(())
    }

    /// Fetch a remote object and catalog it. The new row carries its remote
    /// key from the start, so it is never an upload candidate. If the bytes
    /// hash-match an entry we already have, the remote identity is attached
    /// to that entry instead of inserting a second row.
    async fn download_entry(
        &self,
        remote: &RemoteStoreManager,
        key: &str,
    ) -> Result<(), SyncError> {
        let bytes = remote.download(key).await?;
        let content_hash = audio::hash_bytes(&bytes);
        let url = remote.public_url(key);

        if let Some(existing) = self.db.get_audio_file_by_hash(&content_hash).await? {
            if existing.remote_key.is_none() {
                self.db.set_remote_location(&existing.id, key, &url).await?;
                debug!(id = %existing.id, key, "Linked remote object to existing entry");
            } else {
                debug!(id = %existing.id, key, "Content already mirrored under another key");
            }
            return Ok(());
        }

        let asset_class = class_from_key(key);
        let filename = key.rsplit('/').next().unwrap_or(key).to_string();

        let root = self.settings.library_root();
        crate::library::ensure_library_tree(&root).await?;
        let mut dest_path = root.join(asset_class.as_str()).join(&filename);
        if fs::try_exists(&dest_path).await.unwrap_or(false) {
            // Same name, different content: keep both
            dest_path = root
                .join(asset_class.as_str())
                .join(import::unique_filename(&filename));
        }
        fs::write(&dest_path, &bytes).await?;

        let (duration_seconds, size_bytes) = self.workers.probe_metadata(&dest_path).await?;

        let now = Utc::now();
        let file = DbAudioFile {
            id: Uuid::new_v4().to_string(),
            filename,
            asset_class,
            local_path: dest_path.to_string_lossy().to_string(),
            content_hash,
            duration_seconds,
            size_bytes: size_bytes as i64,
            tags: Vec::new(),
            bpm: None,
            favorite: false,
            remote_key: Some(key.to_string()),
            remote_url: Some(url),
            created_at: now,
            updated_at: now,
        };
        self.db.insert_audio_file(&file).await?;

        debug!(id = %file.id, key, "Downloaded remote object");
        self.events
            .emit(AppEvent::LibraryUpdated(LibraryChange::Added { file }));

        Ok(())
    }

    async fn list_all(
        &self,
        remote: &RemoteStoreManager,
    ) -> Result<Vec<RemoteEntry>, SyncError> {
        let mut entries = Vec::new();
        for class in [AssetClass::Music, AssetClass::Sfx] {
            entries.extend(remote.list(&format!("{}/", class.as_str())).await?);
        }
        Ok(entries)
    }
}

/// Remote key layout: `<asset_class>/<filename>`
pub fn remote_key_for(asset_class: AssetClass, filename: &str) -> String {
    format!("{}/{}", asset_class.as_str(), filename)
}

/// Recover the asset class from a key's prefix; anything unrecognized is
/// treated as music
pub fn class_from_key(key: &str) -> AssetClass {
    key.split('/')
        .next()
        .and_then(|prefix| prefix.parse().ok())
        .unwrap_or(AssetClass::Music)
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_key_layout() {
        assert_eq!(remote_key_for(AssetClass::Sfx, "hit_01.wav"), "sfx/hit_01.wav");
        assert_eq!(class_from_key("sfx/hit_01.wav"), AssetClass::Sfx);
        assert_eq!(class_from_key("music/song.mp3"), AssetClass::Music);
        assert_eq!(class_from_key("misc/unknown.bin"), AssetClass::Music);
    }
}
