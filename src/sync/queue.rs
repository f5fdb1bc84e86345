use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::db::{AssetClass, Database, DbSyncQueueItem, SyncOperation, SyncStatus};
use crate::sync::SyncError;

/// Retry budget per queue item
pub const MAX_RETRIES: i32 = 5;

/// Escalating backoff schedule applied between retries, in seconds
const BACKOFF_SECONDS: [i64; 5] = [30, 60, 300, 900, 3600];

/// Delay before retry number `retry_count` (1-based); the schedule saturates
/// at its last tier
fn backoff_delay(retry_count: i32) -> Duration {
    let index = ((retry_count - 1).max(0) as usize).min(BACKOFF_SECONDS.len() - 1);
    Duration::seconds(BACKOFF_SECONDS[index])
}

/// A remote operation to enqueue
///
/// Uploads correlate by catalog id, downloads and deletes by remote key;
/// each carries the asset class that routes it to the right remote prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRequest {
    Upload {
        file_id: String,
        asset_class: AssetClass,
    },
    Download {
        remote_key: String,
        asset_class: AssetClass,
    },
    Delete {
        remote_key: String,
        asset_class: AssetClass,
    },
}

impl SyncRequest {
    pub fn operation(&self) -> SyncOperation {
        match self {
            SyncRequest::Upload { .. } => SyncOperation::Upload,
            SyncRequest::Download { .. } => SyncOperation::Download,
            SyncRequest::Delete { .. } => SyncOperation::Delete,
        }
    }

    pub fn asset_class(&self) -> AssetClass {
        match self {
            SyncRequest::Upload { asset_class, .. }
            | SyncRequest::Download { asset_class, .. }
            | SyncRequest::Delete { asset_class, .. } => *asset_class,
        }
    }

    fn correlating_id(&self) -> &str {
        match self {
            SyncRequest::Upload { file_id, .. } => file_id,
            SyncRequest::Download { remote_key, .. } | SyncRequest::Delete { remote_key, .. } => {
                remote_key
            }
        }
    }

    fn file_id(&self) -> Option<&str> {
        match self {
            SyncRequest::Upload { file_id, .. } => Some(file_id),
            _ => None,
        }
    }

    fn remote_key(&self) -> Option<&str> {
        match self {
            SyncRequest::Download { remote_key, .. } | SyncRequest::Delete { remote_key, .. } => {
                Some(remote_key)
            }
            _ => None,
        }
    }
}

/// Result of an enqueue attempt
#[derive(Debug)]
pub enum EnqueueOutcome {
    Queued(DbSyncQueueItem),
    /// An equivalent unfinished item already exists; nothing was inserted
    AlreadyQueued,
}

/// Queue statistics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    /// Items that exhausted their retries and need manual attention
    pub permanently_failed: u64,
    pub total: u64,
}

/// Durable FIFO queue of pending remote operations
///
/// Items are claimed oldest-first, deleted on success, and retried on
/// failure under the fixed backoff schedule. Rows stranded in `processing`
/// by a crash are swept back to `pending` at startup, so no operation can
/// stay invisible to scheduling forever.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    db: Database,
}

impl SyncQueue {
    pub fn new(db: Database) -> Self {
        SyncQueue { db }
    }

    /// Queue a remote operation unless an equivalent one is already waiting
    pub async fn enqueue(&self, request: SyncRequest) -> Result<EnqueueOutcome, SyncError> {
        let operation = request.operation();

        if self
            .db
            .has_active_sync_item(operation, request.correlating_id())
            .await?
        {
            debug!(
                operation = operation.as_str(),
                target = request.correlating_id(),
                "Equivalent item already queued"
            );
            return Ok(EnqueueOutcome::AlreadyQueued);
        }

        let item = self
            .db
            .insert_sync_item(
                operation,
                request.file_id(),
                request.remote_key(),
                request.asset_class(),
                MAX_RETRIES,
            )
            .await?;

        info!(
            item_id = item.id,
            operation = operation.as_str(),
            target = request.correlating_id(),
            "Queued sync operation"
        );

        Ok(EnqueueOutcome::Queued(item))
    }

    /// Claim up to `limit` eligible items, oldest first, moving each to
    /// `processing`. Items inside a backoff window or past their retry
    /// budget are not returned.
    pub async fn claim_batch(&self, limit: i64) -> Result<Vec<DbSyncQueueItem>, SyncError> {
        Ok(self.db.claim_sync_batch(Utc::now(), limit).await?)
    }

    /// Completion deletes the row; the queue only holds unfinished work
    pub async fn mark_completed(&self, id: i64) -> Result<bool, SyncError> {
        Ok(self.db.delete_sync_item(id).await?)
    }

    /// Record a failure and schedule the retry, or park the item once the
    /// retry budget is spent
    pub async fn mark_failed(&self, id: i64, error_message: &str) -> Result<(), SyncError> {
        let item = self
            .db
            .get_sync_item(id)
            .await?
            .ok_or(SyncError::ItemNotFound(id))?;

        let retry_count = item.retry_count + 1;

        if retry_count >= item.max_retries {
            warn!(
                item_id = id,
                retry_count,
                error = error_message,
                "Sync item permanently failed"
            );
            self.db
                .fail_sync_item(id, retry_count, error_message, None)
                .await?;
        } else {
            let next_retry_at = Utc::now() + backoff_delay(retry_count);
            warn!(
                item_id = id,
                retry_count,
                max_retries = item.max_retries,
                next_retry_at = %next_retry_at,
                error = error_message,
                "Sync item failed, will retry"
            );
            self.db
                .fail_sync_item(id, retry_count, error_message, Some(next_retry_at))
                .await?;
        }

        Ok(())
    }

    /// Startup sweep: revert crash artifacts left in `processing`
    pub async fn reset_stuck_items(&self) -> Result<u64, SyncError> {
        let reset = self.db.reset_processing_sync_items().await?;
        if reset > 0 {
            info!(reset, "Reset stuck sync items");
        }
        Ok(reset)
    }

    pub async fn get_stats(&self) -> Result<QueueStats, SyncError> {
        Ok(QueueStats {
            pending: self
                .db
                .count_sync_items_with_status(SyncStatus::Pending)
                .await? as u64,
            processing: self
                .db
                .count_sync_items_with_status(SyncStatus::Processing)
                .await? as u64,
            permanently_failed: self.db.count_permanently_failed_sync_items().await? as u64,
            total: self.db.count_sync_items().await? as u64,
        })
    }

    /// Manual escape hatch for items past their retry budget
    pub async fn clear_permanently_failed(&self) -> Result<u64, SyncError> {
        Ok(self.db.clear_permanently_failed_sync_items().await?)
    }

    pub async fn get_item(&self, id: i64) -> Result<Option<DbSyncQueueItem>, SyncError> {
        Ok(self.db.get_sync_item(id).await?)
    }
}
