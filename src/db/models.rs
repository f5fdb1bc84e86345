use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;

// String constants for SQL CHECK clauses (keep in sync with as_str())
const ASSET_CLASS_MUSIC: &str = "music";
const ASSET_CLASS_SFX: &str = "sfx";
const SYNC_STATUS_PENDING: &str = "pending";
const SYNC_STATUS_PROCESSING: &str = "processing";
const SYNC_STATUS_FAILED: &str = "failed";
const SYNC_STATUS_COMPLETED: &str = "completed";
const SYNC_OP_UPLOAD: &str = "upload";
const SYNC_OP_DOWNLOAD: &str = "download";
const SYNC_OP_DELETE: &str = "delete";

/// Database models for the sonexa catalog
///
/// The storage layout is deliberately small:
/// - One `files` row per physical audio asset in the managed library tree
/// - One `sync_queue` row per pending remote operation
///
/// Content identity is the file hash: no two live catalog rows may share a
/// `content_hash`, which is what makes re-imports of identical bytes collapse
/// into a single entry.
///
/// Broad classification of an audio asset, used both for browsing and for
/// routing files to the right library subdirectory / remote prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum AssetClass {
    Music,
    Sfx,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Music => ASSET_CLASS_MUSIC,
            AssetClass::Sfx => ASSET_CLASS_SFX,
        }
    }
}

impl std::str::FromStr for AssetClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ASSET_CLASS_MUSIC => Ok(AssetClass::Music),
            ASSET_CLASS_SFX => Ok(AssetClass::Sfx),
            other => Err(format!("Unknown asset class: {}", other)),
        }
    }
}

/// One imported audio asset
///
/// `local_path` always points inside the managed library tree. `remote_key`
/// and `remote_url` are set together once the file is mirrored; `remote_key`
/// doubles as the correlation key against remote store listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbAudioFile {
    pub id: String,
    /// Display name at import time (includes the uniquifying suffix)
    pub filename: String,
    pub asset_class: AssetClass,
    pub local_path: String,
    /// Hex digest of the file bytes; unique across live entries
    pub content_hash: String,
    /// Best-effort; 0.0 when no probe tool produced a value
    pub duration_seconds: f64,
    pub size_bytes: i64,
    /// Ordered free-form labels
    pub tags: Vec<String>,
    pub bpm: Option<i32>,
    pub favorite: bool,
    pub remote_key: Option<String>,
    pub remote_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbAudioFile {
    /// True when the entry is believed to be mirrored remotely
    pub fn is_mirrored(&self) -> bool {
        self.remote_key.is_some()
    }
}

/// Remote operation kind carried by a sync queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncOperation {
    Upload,
    Download,
    Delete,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::Upload => SYNC_OP_UPLOAD,
            SyncOperation::Download => SYNC_OP_DOWNLOAD,
            SyncOperation::Delete => SYNC_OP_DELETE,
        }
    }
}

impl std::str::FromStr for SyncOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            SYNC_OP_UPLOAD => Ok(SyncOperation::Upload),
            SYNC_OP_DOWNLOAD => Ok(SyncOperation::Download),
            SYNC_OP_DELETE => Ok(SyncOperation::Delete),
            other => Err(format!("Unknown sync operation: {}", other)),
        }
    }
}

/// Sync queue item status
///
/// `Completed` never persists: completion deletes the row, so the queue only
/// ever holds unfinished work. A `Processing` row found at startup is a crash
/// artifact and is swept back to `Pending` before any new work is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Pending,
    Processing,
    Failed,
    Completed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => SYNC_STATUS_PENDING,
            SyncStatus::Processing => SYNC_STATUS_PROCESSING,
            SyncStatus::Failed => SYNC_STATUS_FAILED,
            SyncStatus::Completed => SYNC_STATUS_COMPLETED,
        }
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            SYNC_STATUS_PENDING => Ok(SyncStatus::Pending),
            SYNC_STATUS_PROCESSING => Ok(SyncStatus::Processing),
            SYNC_STATUS_FAILED => Ok(SyncStatus::Failed),
            SYNC_STATUS_COMPLETED => Ok(SyncStatus::Completed),
            other => Err(format!("Unknown sync status: {}", other)),
        }
    }
}

/// One pending remote operation
///
/// `file_id` is the correlating id for uploads, `remote_key` for downloads
/// and deletes. `id` is an autoincrement rowid and provides the FIFO
/// tie-break when two items share a creation timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbSyncQueueItem {
    pub id: i64,
    pub operation: SyncOperation,
    pub file_id: Option<String>,
    pub remote_key: Option<String>,
    pub asset_class: AssetClass,
    pub status: SyncStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
    /// NULL means eligible immediately
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbSyncQueueItem {
    /// The id used for duplicate-suppression on enqueue
    pub fn correlating_id(&self) -> Option<&str> {
        match self.operation {
            SyncOperation::Upload => self.file_id.as_deref(),
            SyncOperation::Download | SyncOperation::Delete => self.remote_key.as_deref(),
        }
    }

    /// True once the retry budget is exhausted and only a manual clear helps
    pub fn is_permanently_failed(&self) -> bool {
        self.status == SyncStatus::Failed && self.retry_count >= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_class_round_trip() {
        assert_eq!(AssetClass::Music.as_str(), "music");
        assert_eq!("sfx".parse::<AssetClass>().unwrap(), AssetClass::Sfx);
        assert!("drums".parse::<AssetClass>().is_err());
    }

    #[test]
    fn test_sync_status_round_trip() {
        for status in [
            SyncStatus::Pending,
            SyncStatus::Processing,
            SyncStatus::Failed,
            SyncStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_correlating_id_follows_operation() {
        let now = Utc::now();
        let mut item = DbSyncQueueItem {
            id: 1,
            operation: SyncOperation::Upload,
            file_id: Some("file-1".to_string()),
            remote_key: Some("music/a.wav".to_string()),
            asset_class: AssetClass::Music,
            status: SyncStatus::Pending,
            retry_count: 0,
            max_retries: 5,
            last_error: None,
            next_retry_at: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(item.correlating_id(), Some("file-1"));

        item.operation = SyncOperation::Delete;
        assert_eq!(item.correlating_id(), Some("music/a.wav"));
    }
}
