// # Library tree watcher
//
// Observes the managed library tree for files added or removed outside the
// app (Finder drops, rsync, etc.). Added files are held back until they have
// been quiet for a stability window, then pushed through the same
// hash-then-dedup-then-insert path as a normal import — minus the copy step,
// since the file is already inside the tree.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio;
use crate::db::AssetClass;
use crate::events::{AppEvent, EventBus, LibraryChange};
use crate::import::ImportService;

/// A file must stay unmodified this long before it counts as added;
/// protects against ingesting a partially written copy
const WRITE_STABILITY: Duration = Duration::from_millis(1000);

const SWEEP_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Watch error: {0}")]
    Notify(#[from] notify::Error),
}

/// Filesystem watcher over the managed library tree
///
/// `start`/`stop`/`restart` are idempotent and safe to call repeatedly,
/// e.g. when the library path setting changes. Only changes are reported;
/// the initial tree state is never re-ingested.
#[derive(Clone)]
pub struct LibraryWatcher {
    watcher: Arc<Mutex<Option<RecommendedWatcher>>>,
    added_tx: mpsc::UnboundedSender<PathBuf>,
    events: EventBus,
}

impl LibraryWatcher {
    pub fn new(import: ImportService, events: EventBus) -> Self {
        let (added_tx, mut added_rx) = mpsc::unbounded_channel::<PathBuf>();

        // Debounce loop: a path is processed once it has been quiet for the
        // stability window; every new event resets its clock
        let loop_events = events.clone();
        tokio::spawn(async move {
            let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
            let mut tick = tokio::time::interval(SWEEP_INTERVAL);

            loop {
                tokio::select! {
                    received = added_rx.recv() => {
                        match received {
                            Some(path) => {
                                pending.insert(path, Instant::now());
                            }
                            None => break,
                        }
                    }
                    _ = tick.tick() => {
                        let ready: Vec<PathBuf> = pending
                            .iter()
                            .filter(|(_, last_seen)| last_seen.elapsed() >= WRITE_STABILITY)
                            .map(|(path, _)| path.clone())
                            .collect();

                        for path in ready {
                            pending.remove(&path);
                            handle_added_path(&import, &loop_events, &path).await;
                        }
                    }
                }
            }
        });

        LibraryWatcher {
            watcher: Arc::new(Mutex::new(None)),
            added_tx,
            events,
        }
    }

    /// Begin watching `root` recursively; a no-op when already running
    pub fn start(&self, root: &Path) -> Result<(), WatchError> {
        let mut guard = self.watcher.lock().unwrap();
        if guard.is_some() {
            debug!("Watcher already running");
            return Ok(());
        }

        let added_tx = self.added_tx.clone();
        let remove_events = self.events.clone();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let Ok(event) = result else { return };
                match event.kind {
                    EventKind::Create(_) | EventKind::Modify(_) => {
                        for path in event.paths {
                            if !is_dotfile(&path) && audio::is_audio_file(&path) {
                                let _ = added_tx.send(path);
                            }
                        }
                    }
                    EventKind::Remove(_) => {
                        for path in event.paths {
                            if !is_dotfile(&path) {
                                remove_events.emit(AppEvent::LibraryUpdated(
                                    LibraryChange::Removed { path },
                                ));
                            }
                        }
                    }
                    _ => {}
                }
            },
            notify::Config::default(),
        )?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        info!("Watching library tree at {}", root.display());

        *guard = Some(watcher);
        Ok(())
    }

    /// Stop watching; a no-op when not running
    pub fn stop(&self) {
        if self.watcher.lock().unwrap().take().is_some() {
            info!("Watcher stopped");
        }
    }

    /// Stop and start again, e.g. after the library path changed
    pub fn restart(&self, root: &Path) -> Result<(), WatchError> {
        self.stop();
        self.start(root)
    }

    pub fn is_running(&self) -> bool {
        self.watcher.lock().unwrap().is_some()
    }
}

/// Catalog a write-stable file that appeared in the tree. The class comes
/// from the parent directory name when it matches a class dir, otherwise
/// from the filename heuristic inside the import path.
async fn handle_added_path(import: &ImportService, events: &EventBus, path: &Path) {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return;
    }

    match import
        .register_existing_file(path, class_from_parent(path))
        .await
    {
        Ok(Some(file)) => {
            info!(path = %path.display(), id = %file.id, "Cataloged externally added file");
            events.emit(AppEvent::LibraryUpdated(LibraryChange::Added { file }));
        }
        Ok(None) => {
            debug!(path = %path.display(), "Content already cataloged, ignoring");
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not catalog added file");
        }
    }
}

fn class_from_parent(path: &Path) -> Option<AssetClass> {
    path.parent()?.file_name()?.to_str()?.parse().ok()
}

fn is_dotfile(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}
