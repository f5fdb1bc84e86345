mod client;
mod models;

pub use client::Database;
pub use models::{
    AssetClass, DbAudioFile, DbSyncQueueItem, SyncOperation, SyncStatus,
};
