//! Supervised worker pool for background refreshes.
//!
//! Jobs are queued on a bounded channel and drained by a fixed set of
//! workers. Each job runs in its own spawned task so that a panic is caught
//! at the join point and logged instead of taking the worker down with it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{Mutex, mpsc};

use crate::{Error, Result};

/// Worker tasks started when no count is configured.
pub const DEFAULT_WORKERS: usize = 4;

/// Jobs that may wait in the queue before submissions are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// A background refresh. Resolves once the snapshot has been published or
/// the failure recorded.
pub type RefreshJob = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

struct Queued {
    panel_id: String,
    job: RefreshJob,
}

/// Handle to the pool. Cloning shares the same queue and workers; the
/// workers exit once every handle is dropped and the queue drains.
#[derive(Clone)]
pub struct RefreshPool {
    tx: mpsc::Sender<Queued>,
    workers: usize,
}

impl std::fmt::Debug for RefreshPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshPool")
            .field("workers", &self.workers)
            .field("capacity", &self.tx.max_capacity())
            .finish()
    }
}

impl RefreshPool {
    /// Start `workers` worker tasks on the current tokio runtime.
    pub fn new(workers: usize, capacity: usize) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| Error::Config(format!("refresh pool needs a tokio runtime: {e}")))?;

        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<Queued>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        for worker in 0..workers {
            handle.spawn(run_worker(worker, Arc::clone(&rx)));
        }

        tracing::debug!(
            event = "cache.pool_started",
            workers,
            capacity = capacity.max(1),
        );

        Ok(Self { tx, workers })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(DEFAULT_WORKERS, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queue a job without waiting. Returns false when the job was dropped
    /// because the queue is full or the pool has shut down.
    pub fn submit<F>(&self, panel_id: &str, job: F) -> bool
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let queued = Queued {
            panel_id: panel_id.to_string(),
            job: Box::pin(job),
        };
        match self.tx.try_send(queued) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                tracing::warn!(
                    event = "cache.refresh_dropped",
                    panel_id = %dropped.panel_id,
                    reason = "queue_full",
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                tracing::warn!(
                    event = "cache.refresh_dropped",
                    panel_id = %dropped.panel_id,
                    reason = "pool_closed",
                );
                false
            }
        }
    }
}

async fn run_worker(worker: usize, rx: Arc<Mutex<mpsc::Receiver<Queued>>>) {
    loop {
        // Hold the receiver lock only while waiting for the next job.
        let next = rx.lock().await.recv().await;
        let Some(Queued { panel_id, job }) = next else {
            break;
        };

        match tokio::spawn(job).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    event = "cache.background_refresh_failed",
                    panel_id = %panel_id,
                    worker,
                    error = %e,
                );
            }
            Err(join) if join.is_panic() => {
                tracing::error!(
                    event = "cache.background_refresh_panicked",
                    panel_id = %panel_id,
                    worker,
                    error = %join,
                );
            }
            Err(join) => {
                tracing::warn!(
                    event = "cache.background_refresh_aborted",
                    panel_id = %panel_id,
                    worker,
                    error = %join,
                );
            }
        }
    }
    tracing::debug!(event = "cache.worker_stopped", worker);
}
