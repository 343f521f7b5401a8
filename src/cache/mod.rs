//! Per-panel snapshot cache.
//!
//! A [`CacheStore`] holds one immutable snapshot behind an `Arc`, the time it
//! was fetched, whether a refresh is in flight and the error from the last
//! failed attempt. All transitions happen under one short-lived mutex that is
//! never held across an await point, so reads never block on network I/O.
//!
//! Refresh ownership is handed out as a [`RefreshGuard`]. Exactly one guard
//! can exist per store at a time; dropping it without completing releases
//! the in-flight flag so the next reader retries.

mod coordinator;
mod pool;

pub use coordinator::{RefreshCoordinator, RefreshState};
pub use pool::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS, RefreshJob, RefreshPool};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::{Error, Result};

/// Snapshot freshness window used when a panel does not configure one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug)]
struct CacheEntry<T> {
    payload: Option<Arc<T>>,
    fetched_at: Option<Instant>,
    refreshing: bool,
    last_error: Option<Error>,
}

impl<T> Default for CacheEntry<T> {
    fn default() -> Self {
        Self {
            payload: None,
            fetched_at: None,
            refreshing: false,
            last_error: None,
        }
    }
}

/// Point-in-time view of a [`CacheStore`].
#[derive(Debug)]
pub struct CacheRead<T> {
    pub payload: Option<Arc<T>>,
    pub fetched_at: Option<Instant>,
    /// `now - fetched_at >= ttl`, or no payload at all
    pub is_stale: bool,
    pub refreshing: bool,
    /// Error from the most recent refresh, cleared by the next publish
    pub last_error: Option<Error>,
}

impl<T> Clone for CacheRead<T> {
    fn clone(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            fetched_at: self.fetched_at,
            is_stale: self.is_stale,
            refreshing: self.refreshing,
            last_error: self.last_error.clone(),
        }
    }
}

/// Snapshot cache for one panel instance.
#[derive(Debug)]
pub struct CacheStore<T> {
    ttl: Duration,
    entry: Mutex<CacheEntry<T>>,
    /// Bumped every time a refresh ends, successfully or not.
    settled: watch::Sender<u64>,
}

impl<T> CacheStore<T> {
    pub fn new(ttl: Duration) -> Self {
        let (settled, _) = watch::channel(0);
        Self {
            ttl,
            entry: Mutex::new(CacheEntry::default()),
            settled,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, CacheEntry<T>> {
        self.entry.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn read(&self) -> CacheRead<T> {
        let entry = self.lock();
        let is_stale = match (&entry.payload, entry.fetched_at) {
            (Some(_), Some(at)) => Instant::now().saturating_duration_since(at) >= self.ttl,
            _ => true,
        };
        CacheRead {
            payload: entry.payload.clone(),
            fetched_at: entry.fetched_at,
            is_stale,
            refreshing: entry.refreshing,
            last_error: entry.last_error.clone(),
        }
    }

    /// Swap in a new snapshot and reset its age.
    pub fn publish(&self, payload: T) -> Arc<T> {
        let payload = Arc::new(payload);
        let mut entry = self.lock();
        entry.payload = Some(Arc::clone(&payload));
        entry.fetched_at = Some(Instant::now());
        entry.last_error = None;
        payload
    }

    /// Claim the refresh slot. Returns false if a refresh is already running.
    ///
    /// While nothing has been published, the error of an earlier attempt is
    /// cleared so that callers waiting on this attempt only ever see its own
    /// outcome.
    pub fn begin_refresh(&self) -> bool {
        let mut entry = self.lock();
        if entry.refreshing {
            return false;
        }
        entry.refreshing = true;
        if entry.payload.is_none() {
            entry.last_error = None;
        }
        true
    }

    /// Release the refresh slot and record the outcome.
    ///
    /// A failure only sets `last_error`; the published payload is untouched.
    pub fn end_refresh(&self, error: Option<Error>) {
        {
            let mut entry = self.lock();
            entry.refreshing = false;
            if error.is_some() {
                entry.last_error = error;
            }
        }
        self.settled.send_modify(|n| *n = n.wrapping_add(1));
    }

    /// Receiver that changes whenever a refresh ends.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.settled.subscribe()
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }
}

impl<T> CacheStore<T>
where
    T: Send + Sync + 'static,
{
    /// Claim the refresh slot as an owned guard that can move into a task.
    pub fn try_begin(self: &Arc<Self>) -> Option<RefreshGuard<T>> {
        self.begin_refresh().then(|| RefreshGuard {
            store: Some(Arc::clone(self)),
        })
    }
}

impl<T> Default for CacheStore<T> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// Ownership of one in-flight refresh.
#[derive(Debug)]
pub struct RefreshGuard<T> {
    store: Option<Arc<CacheStore<T>>>,
}

impl<T> RefreshGuard<T> {
    /// Publish on success, record the error on failure, release the slot.
    pub fn complete(mut self, outcome: Result<T>) -> Result<Arc<T>> {
        let Some(store) = self.store.take() else {
            return Err(Error::unavailable("refresh already completed"));
        };
        match outcome {
            Ok(payload) => {
                let payload = store.publish(payload);
                store.end_refresh(None);
                Ok(payload)
            }
            Err(e) => {
                store.end_refresh(Some(e.clone()));
                Err(e)
            }
        }
    }
}

impl<T> Drop for RefreshGuard<T> {
    fn drop(&mut self) {
        // Abandoned: cancelled, dropped by a full queue, or panicked.
        if let Some(store) = self.store.take() {
            store.end_refresh(None);
        }
    }
}
