use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::db::DbAudioFile;

/// Catalog change carried by a `LibraryUpdated` event
#[derive(Debug, Clone)]
pub enum LibraryChange {
    Added { file: DbAudioFile },
    Removed { path: PathBuf },
}

/// Notifications emitted toward the UI shell. Fire-and-forget: the core
/// never waits on an acknowledgment.
#[derive(Debug, Clone)]
pub enum AppEvent {
    ImportProgress {
        current: usize,
        total: usize,
        filename: String,
    },
    LibraryUpdated(LibraryChange),
    SyncComplete {
        synced: usize,
        elapsed: Duration,
    },
}

/// Broadcast bus for app events
///
/// Cloning is cheap; all clones feed the same subscribers. Emitting with no
/// subscribers is fine — the send result is deliberately ignored.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        EventBus { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: AppEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish()
    }
}
