// # Metadata worker pool
//
// Offloads content hashing and duration probing onto a small fixed set of
// background tasks so large imports never stall the caller. Requests and
// responses are correlated by task id through a pending map; if the pool is
// unavailable the same computation runs inline on the calling task, so
// callers cannot observe which path executed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::audio::{self, FileMetadata};

const DEFAULT_WORKERS: usize = 2;
const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Worker task timed out")]
    Timeout,
    #[error("Worker pool unavailable")]
    Canceled,
}

/// Work requested from a pool worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Hash,
    Metadata,
    Full,
}

#[derive(Debug)]
struct TaskRequest {
    task_id: u64,
    kind: TaskKind,
    file_path: PathBuf,
}

#[derive(Debug)]
enum TaskOutput {
    Hash {
        content_hash: String,
    },
    Metadata {
        duration_seconds: f64,
        size_bytes: u64,
    },
    Full(FileMetadata),
}

type TaskResult = Result<TaskOutput, WorkerError>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<TaskResult>>>>;

/// Fixed pool of background tasks computing file hashes and probe metadata
pub struct MetadataWorkerPool {
    task_tx: mpsc::UnboundedSender<TaskRequest>,
    pending: PendingMap,
    next_task_id: AtomicU64,
    available: Arc<AtomicBool>,
    task_timeout: Duration,
}

impl MetadataWorkerPool {
    pub fn new(workers: usize) -> Self {
        Self::with_timeout(workers, DEFAULT_TASK_TIMEOUT)
    }

    pub fn with_timeout(workers: usize, task_timeout: Duration) -> Self {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let task_rx = Arc::new(tokio::sync::Mutex::new(task_rx));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let available = Arc::new(AtomicBool::new(true));

        for worker_index in 0..workers.max(1) {
            let handle = tokio::spawn(worker_loop(task_rx.clone(), pending.clone()));

            // Supervisor: a crashed worker rejects everything in flight and
            // trips the inline fallback for subsequent calls. Local failure,
            // never fatal.
            let available = available.clone();
            let pending = pending.clone();
            tokio::spawn(async move {
                if handle.await.is_err() {
                    warn!(
                        worker_index,
                        "Metadata worker crashed, switching to inline processing"
                    );
                    available.store(false, Ordering::SeqCst);
                    reject_all_pending(&pending);
                }
            });
        }

        MetadataWorkerPool {
            task_tx,
            pending,
            next_task_id: AtomicU64::new(1),
            available,
            task_timeout,
        }
    }

    /// A pool that never dispatches: every call takes the inline path.
    /// Useful when the runtime that would host the workers is not up yet.
    pub fn disabled() -> Self {
        let (task_tx, _) = mpsc::unbounded_channel();
        MetadataWorkerPool {
            task_tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_task_id: AtomicU64::new(1),
            available: Arc::new(AtomicBool::new(false)),
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Content hash + duration + size for a file
    pub async fn compute_metadata(&self, path: &Path) -> Result<FileMetadata, WorkerError> {
        match self.submit(TaskKind::Full, path).await? {
            TaskOutput::Full(metadata) => Ok(metadata),
            _ => unreachable!("full task resolved with a mismatched output kind"),
        }
    }

    /// Content hash only
    pub async fn compute_hash(&self, path: &Path) -> Result<String, WorkerError> {
        match self.submit(TaskKind::Hash, path).await? {
            TaskOutput::Hash { content_hash } => Ok(content_hash),
            _ => unreachable!("hash task resolved with a mismatched output kind"),
        }
    }

    /// Duration + size only (no hashing pass)
    pub async fn probe_metadata(&self, path: &Path) -> Result<(f64, u64), WorkerError> {
        match self.submit(TaskKind::Metadata, path).await? {
            TaskOutput::Metadata {
                duration_seconds,
                size_bytes,
            } => Ok((duration_seconds, size_bytes)),
            _ => unreachable!("metadata task resolved with a mismatched output kind"),
        }
    }

    async fn submit(&self, kind: TaskKind, path: &Path) -> TaskResult {
        if !self.is_available() {
            return execute(kind, path).await;
        }

        let task_id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let (response_tx, response_rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(task_id, response_tx);

        let request = TaskRequest {
            task_id,
            kind,
            file_path: path.to_path_buf(),
        };

        if self.task_tx.send(request).is_err() {
            // All workers gone; drop the parked sender and run inline
            self.pending.lock().unwrap().remove(&task_id);
            self.available.store(false, Ordering::SeqCst);
            return execute(kind, path).await;
        }

        match tokio::time::timeout(self.task_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(WorkerError::Canceled),
            Err(_) => {
                // Evict the task id so the eventual late response is ignored,
                // and stop trusting the pool for future calls
                self.pending.lock().unwrap().remove(&task_id);
                self.available.store(false, Ordering::SeqCst);
                Err(WorkerError::Timeout)
            }
        }
    }
}

async fn worker_loop(
    task_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<TaskRequest>>>,
    pending: PendingMap,
) {
    loop {
        let request = { task_rx.lock().await.recv().await };
        let Some(request) = request else {
            break;
        };

        let result = execute(request.kind, &request.file_path).await;
        resolve(&pending, request.task_id, result);
    }
}

async fn execute(kind: TaskKind, path: &Path) -> TaskResult {
    match kind {
        TaskKind::Hash => {
            let content_hash = audio::hash_file(path).await?;
            Ok(TaskOutput::Hash { content_hash })
        }
        TaskKind::Metadata => {
            let (duration_seconds, size_bytes) = audio::probe_metadata(path).await?;
            Ok(TaskOutput::Metadata {
                duration_seconds,
                size_bytes,
            })
        }
        TaskKind::Full => {
            let metadata = audio::compute_file_metadata(path).await?;
            Ok(TaskOutput::Full(metadata))
        }
    }
}

fn resolve(pending: &PendingMap, task_id: u64, result: TaskResult) {
    let sender = pending.lock().unwrap().remove(&task_id);
    match sender {
        Some(sender) => {
            let _ = sender.send(result);
        }
        None => {
            // Caller timed out and evicted the id
            debug!(task_id, "Ignoring late worker response");
        }
    }
}

fn reject_all_pending(pending: &PendingMap) {
    let senders: Vec<_> = pending.lock().unwrap().drain().collect();
    for (task_id, sender) in senders {
        debug!(task_id, "Rejecting pending task after worker failure");
        let _ = sender.send(Err(WorkerError::Canceled));
    }
}
