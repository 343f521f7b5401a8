//! Refresh state machine for one panel.
//!
//! The coordinator owns no state of its own beyond handles: the refresh flag
//! lives in the [`CacheStore`], so "at most one fetch in flight" is enforced
//! by whoever manages to take the [`RefreshGuard`]. A trigger that loses that
//! race is dropped, never queued.

use std::sync::Arc;

use crate::panel::{PanelSource, RequestContext};
use crate::{Error, Result};

use super::{CacheStore, RefreshGuard, RefreshPool};

/// Whether a panel currently has a fetch in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

pub struct RefreshCoordinator<S: PanelSource> {
    panel_id: String,
    store: Arc<CacheStore<S::Snapshot>>,
    source: Arc<S>,
    pool: RefreshPool,
}

impl<S: PanelSource> std::fmt::Debug for RefreshCoordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("panel_id", &self.panel_id)
            .field("kind", &self.source.kind())
            .field("state", &self.state())
            .finish()
    }
}

impl<S: PanelSource> RefreshCoordinator<S> {
    pub fn new(
        panel_id: impl Into<String>,
        store: Arc<CacheStore<S::Snapshot>>,
        source: Arc<S>,
        pool: RefreshPool,
    ) -> Self {
        Self {
            panel_id: panel_id.into(),
            store,
            source,
            pool,
        }
    }

    pub fn panel_id(&self) -> &str {
        &self.panel_id
    }

    pub fn state(&self) -> RefreshState {
        if self.store.is_refreshing() {
            RefreshState::Refreshing
        } else {
            RefreshState::Idle
        }
    }

    /// Synchronous first load, bound to the caller's context.
    ///
    /// If another caller already started the first fetch, waits for that one
    /// instead of issuing a second. Cancellation abandons the fetch and
    /// leaves the store empty.
    pub async fn load_initial(&self, ctx: &RequestContext) -> Result<Arc<S::Snapshot>> {
        loop {
            // Subscribe before looking, so a refresh ending in between is seen.
            let mut settled = self.store.subscribe();
            if let Some(payload) = self.store.read().payload {
                return Ok(payload);
            }

            if let Some(guard) = self.store.try_begin() {
                tracing::debug!(
                    event = "cache.refresh_started",
                    panel_id = %self.panel_id,
                    trigger = "initial",
                );
                let outcome = tokio::select! {
                    _ = ctx.cancelled() => {
                        drop(guard);
                        tracing::debug!(
                            event = "cache.refresh_cancelled",
                            panel_id = %self.panel_id,
                        );
                        return Err(Error::cancelled());
                    }
                    outcome = self.source.fetch() => outcome,
                };
                return finish(&self.panel_id, guard, outcome, "initial").inspect_err(|e| {
                    tracing::warn!(
                        event = "cache.refresh_failed",
                        panel_id = %self.panel_id,
                        trigger = "initial",
                        error = %e,
                    );
                });
            }

            tokio::select! {
                _ = ctx.cancelled() => return Err(Error::cancelled()),
                changed = settled.changed() => {
                    if changed.is_err() {
                        return Err(Error::unavailable("cache store dropped"));
                    }
                }
            }

            let read = self.store.read();
            if let Some(payload) = read.payload {
                return Ok(payload);
            }
            if let Some(e) = read.last_error {
                return Err(e);
            }
            // The other loader was abandoned; try again ourselves.
        }
    }

    /// Background refresh because the snapshot aged past its TTL.
    pub fn trigger_stale(&self) -> bool {
        self.spawn_refresh("stale")
    }

    /// Background refresh regardless of age, typically after a mutation.
    pub fn trigger_early(&self) -> bool {
        self.spawn_refresh("early")
    }

    /// Wait until no refresh is in flight.
    pub async fn settle(&self) {
        let mut settled = self.store.subscribe();
        while self.store.is_refreshing() {
            if settled.changed().await.is_err() {
                break;
            }
        }
    }

    fn spawn_refresh(&self, trigger: &'static str) -> bool {
        let Some(guard) = self.store.try_begin() else {
            tracing::debug!(
                event = "cache.refresh_coalesced",
                panel_id = %self.panel_id,
                trigger,
            );
            return false;
        };

        tracing::debug!(
            event = "cache.refresh_started",
            panel_id = %self.panel_id,
            trigger,
        );

        let source = Arc::clone(&self.source);
        let panel_id = self.panel_id.clone();
        // The job owns the guard; if the pool drops the job the flag clears.
        self.pool.submit(&self.panel_id, async move {
            let outcome = source.fetch().await;
            finish(&panel_id, guard, outcome, trigger).map(|_| ())
        })
    }
}

fn finish<T>(
    panel_id: &str,
    guard: RefreshGuard<T>,
    outcome: Result<T>,
    trigger: &'static str,
) -> Result<Arc<T>> {
    let published = guard.complete(outcome)?;
    tracing::info!(
        event = "cache.refresh_completed",
        panel_id = %panel_id,
        trigger,
    );
    Ok(published)
}
