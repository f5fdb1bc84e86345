use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::db::models::*;

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Initialize database connection and create tables
    pub async fn new(database_path: &str) -> Result<Self, sqlx::Error> {
        // Use sqlite:// with ?mode=rwc to create if it doesn't exist
        let database_url = format!("sqlite://{}?mode=rwc", database_path);
        info!("Connecting to {}", database_url);
        let pool = SqlitePool::connect(&database_url).await?;

        let db = Database { pool };
        db.create_tables().await?;
        Ok(db)
    }

    /// Create all necessary tables
    async fn create_tables(&self) -> Result<(), sqlx::Error> {
        // Catalog table (one row per physical audio asset)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                asset_class TEXT NOT NULL CHECK(asset_class IN ('music', 'sfx')),
                local_path TEXT NOT NULL,
                content_hash TEXT NOT NULL UNIQUE,
                duration_seconds REAL NOT NULL DEFAULT 0,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                tags TEXT NOT NULL DEFAULT '[]',
                bpm INTEGER,
                favorite INTEGER NOT NULL DEFAULT 0,
                remote_key TEXT,
                remote_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Sync queue table (one row per pending remote operation; completed
        // rows are deleted, so the table only holds unfinished work)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                operation TEXT NOT NULL CHECK(operation IN ('upload', 'download', 'delete')),
                file_id TEXT,
                remote_key TEXT,
                asset_class TEXT NOT NULL CHECK(asset_class IN ('music', 'sfx')),
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK(status IN ('pending', 'processing', 'failed', 'completed')),
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 5,
                last_error TEXT,
                next_retry_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_remote_key ON files (remote_key)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sync_queue_status ON sync_queue (status)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sync_queue_next_retry ON sync_queue (next_retry_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ---- Catalog ----

    /// Insert a new audio file row
    pub async fn insert_audio_file(&self, file: &DbAudioFile) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO files (
                id, filename, asset_class, local_path, content_hash,
                duration_seconds, size_bytes, tags, bpm, favorite,
                remote_key, remote_url, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&file.id)
        .bind(&file.filename)
        .bind(file.asset_class.as_str())
        .bind(&file.local_path)
        .bind(&file.content_hash)
        .bind(file.duration_seconds)
        .bind(file.size_bytes)
        .bind(serde_json::to_string(&file.tags).unwrap_or_else(|_| "[]".to_string()))
        .bind(file.bpm)
        .bind(file.favorite)
        .bind(&file.remote_key)
        .bind(&file.remote_url)
        .bind(file.created_at.to_rfc3339())
        .bind(file.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get all audio files, newest first
    pub async fn get_audio_files(&self) -> Result<Vec<DbAudioFile>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM files ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(row_to_audio_file).collect())
    }

    /// Get a single audio file by id
    pub async fn get_audio_file(&self, id: &str) -> Result<Option<DbAudioFile>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_audio_file))
    }

    /// Look up an audio file by content hash (the dedup check)
    pub async fn get_audio_file_by_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<DbAudioFile>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM files WHERE content_hash = ?")
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_audio_file))
    }

    /// All entries not yet mirrored remotely (upload candidates)
    pub async fn get_files_without_remote(&self) -> Result<Vec<DbAudioFile>, sqlx::Error> {
        let rows =
            sqlx::query("SELECT * FROM files WHERE remote_key IS NULL ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.iter().map(row_to_audio_file).collect())
    }

    /// Every non-null remote key known locally (reconciliation correlation set)
    pub async fn get_known_remote_keys(&self) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query("SELECT remote_key FROM files WHERE remote_key IS NOT NULL")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|row| row.get("remote_key")).collect())
    }

    /// Record where an entry now lives remotely
    pub async fn set_remote_location(
        &self,
        id: &str,
        remote_key: &str,
        remote_url: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE files SET remote_key = ?, remote_url = ?, updated_at = ? WHERE id = ?")
            .bind(remote_key)
            .bind(remote_url)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn set_favorite(&self, id: &str, favorite: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE files SET favorite = ?, updated_at = ? WHERE id = ?")
            .bind(favorite)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_tags(&self, id: &str, tags: &[String]) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE files SET tags = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string()))
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_bpm(&self, id: &str, bpm: Option<i32>) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE files SET bpm = ?, updated_at = ? WHERE id = ?")
            .bind(bpm)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Re-classify an entry (explicit user edit, never driven by re-import)
    pub async fn set_asset_class(
        &self,
        id: &str,
        asset_class: AssetClass,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE files SET asset_class = ?, updated_at = ? WHERE id = ?")
            .bind(asset_class.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_audio_file(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Purge every catalog row (library reset)
    pub async fn clear_audio_files(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM files").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn count_files_by_class(&self, asset_class: AssetClass) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE asset_class = ?")
            .bind(asset_class.as_str())
            .fetch_one(&self.pool)
            .await
    }

    pub async fn total_file_size(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COALESCE(SUM(size_bytes), 0) FROM files")
            .fetch_one(&self.pool)
            .await
    }

    // ---- Sync queue ----

    /// Insert a queue item and return the stored row (with its assigned id)
    pub async fn insert_sync_item(
        &self,
        operation: SyncOperation,
        file_id: Option<&str>,
        remote_key: Option<&str>,
        asset_class: AssetClass,
        max_retries: i32,
    ) -> Result<DbSyncQueueItem, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO sync_queue (
                operation, file_id, remote_key, asset_class, status,
                retry_count, max_retries, created_at, updated_at
            ) VALUES (?, ?, ?, ?, 'pending', 0, ?, ?, ?)
            "#,
        )
        .bind(operation.as_str())
        .bind(file_id)
        .bind(remote_key)
        .bind(asset_class.as_str())
        .bind(max_retries)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        Ok(self
            .get_sync_item(id)
            .await?
            .expect("just-inserted sync queue row must exist"))
    }

    pub async fn get_sync_item(&self, id: i64) -> Result<Option<DbSyncQueueItem>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM sync_queue WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_sync_item))
    }

    /// True when an equivalent unfinished item already exists for the
    /// correlating id + operation (duplicate-suppression on enqueue)
    pub async fn has_active_sync_item(
        &self,
        operation: SyncOperation,
        correlating_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let sql = match operation {
            SyncOperation::Upload => {
                "SELECT COUNT(*) FROM sync_queue \
                 WHERE operation = ? AND file_id = ? AND status IN ('pending', 'processing')"
            }
            SyncOperation::Download | SyncOperation::Delete => {
                "SELECT COUNT(*) FROM sync_queue \
                 WHERE operation = ? AND remote_key = ? AND status IN ('pending', 'processing')"
            }
        };

        let count: i64 = sqlx::query_scalar(sql)
            .bind(operation.as_str())
            .bind(correlating_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    /// Select eligible items oldest-first and transition them to processing.
    ///
    /// Eligible means pending or retriable-failed with the backoff window
    /// elapsed. Items that exhausted their retry budget are never returned.
    pub async fn claim_sync_batch(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<DbSyncQueueItem>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM sync_queue
            WHERE status IN ('pending', 'failed')
              AND retry_count < max_retries
              AND (next_retry_at IS NULL OR next_retry_at <= ?)
            ORDER BY created_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut items: Vec<DbSyncQueueItem> = rows.iter().map(row_to_sync_item).collect();

        for item in &mut items {
            sqlx::query("UPDATE sync_queue SET status = 'processing', updated_at = ? WHERE id = ?")
                .bind(Utc::now().to_rfc3339())
                .bind(item.id)
                .execute(&self.pool)
                .await?;
            item.status = SyncStatus::Processing;
        }

        Ok(items)
    }

    /// Remove a finished item (completion is deletion, not a retained state)
    pub async fn delete_sync_item(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sync_queue WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a failed attempt; `next_retry_at = None` parks the item
    pub async fn fail_sync_item(
        &self,
        id: i64,
        retry_count: i32,
        last_error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE sync_queue
            SET status = 'failed', retry_count = ?, last_error = ?,
                next_retry_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(retry_count)
        .bind(last_error)
        .bind(next_retry_at.map(|t| t.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Revert crash artifacts: any row stuck in processing becomes pending
    pub async fn reset_processing_sync_items(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sync_queue SET status = 'pending', updated_at = ? WHERE status = 'processing'",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn count_sync_items_with_status(
        &self,
        status: SyncStatus,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
    }

    pub async fn count_permanently_failed_sync_items(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM sync_queue WHERE status = 'failed' AND retry_count >= max_retries",
        )
        .fetch_one(&self.pool)
        .await
    }

    pub async fn count_sync_items(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&self.pool)
            .await
    }

    /// Purge items that exhausted their retries (manual intervention)
    pub async fn clear_permanently_failed_sync_items(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM sync_queue WHERE status = 'failed' AND retry_count >= max_retries",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn row_to_audio_file(row: &sqlx::sqlite::SqliteRow) -> DbAudioFile {
    DbAudioFile {
        id: row.get("id"),
        filename: row.get("filename"),
        asset_class: row
            .get::<String, _>("asset_class")
            .parse()
            .expect("asset_class column is CHECK-constrained"),
        local_path: row.get("local_path"),
        content_hash: row.get("content_hash"),
        duration_seconds: row.get("duration_seconds"),
        size_bytes: row.get("size_bytes"),
        tags: serde_json::from_str(&row.get::<String, _>("tags")).unwrap_or_default(),
        bpm: row.get("bpm"),
        favorite: row.get("favorite"),
        remote_key: row.get("remote_key"),
        remote_url: row.get("remote_url"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at")),
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at")),
    }
}

fn row_to_sync_item(row: &sqlx::sqlite::SqliteRow) -> DbSyncQueueItem {
    DbSyncQueueItem {
        id: row.get("id"),
        operation: row
            .get::<String, _>("operation")
            .parse()
            .expect("operation column is CHECK-constrained"),
        file_id: row.get("file_id"),
        remote_key: row.get("remote_key"),
        asset_class: row
            .get::<String, _>("asset_class")
            .parse()
            .expect("asset_class column is CHECK-constrained"),
        status: row
            .get::<String, _>("status")
            .parse()
            .expect("status column is CHECK-constrained"),
        retry_count: row.get("retry_count"),
        max_retries: row.get("max_retries"),
        last_error: row.get("last_error"),
        next_retry_at: row
            .get::<Option<String>, _>("next_retry_at")
            .map(|s| parse_timestamp(&s)),
        created_at: parse_timestamp(&row.get::<String, _>("created_at")),
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at")),
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .unwrap()
        .with_timezone(&Utc)
}
