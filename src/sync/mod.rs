// # Sync module
//
// - **SyncQueue**: durable FIFO queue of pending remote operations with
//   retry backoff and crash recovery
// - **SyncEngine**: drains the queue and runs the one-shot reconciliation
//   pass that diffs the local catalog against the remote listing

mod engine;
mod queue;

pub use engine::{QueueDelta, QueueRunReport, SyncEngine, SyncReport, SyncStatusReport};
pub use queue::{EnqueueOutcome, QueueStats, SyncQueue, SyncRequest, MAX_RETRIES};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Remote store error: {0}")]
    Remote(#[from] crate::cloud_storage::RemoteStoreError),
    #[error("Remote store is not configured")]
    NotConfigured,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Worker error: {0}")]
    Worker(#[from] crate::workers::WorkerError),
    #[error("Secure storage error: {0}")]
    Secrets(#[from] crate::secure_config::SecureConfigError),
    #[error("Sync queue item not found: {0}")]
    ItemNotFound(i64),
    #[error("Malformed queue item: {0}")]
    MalformedItem(String),
}
