//! Panel controllers.
//!
//! A panel is one independently refreshed dashboard widget. Each panel type
//! implements [`PanelSource`], which knows how to produce a fresh snapshot.
//! [`PanelController`] wraps a source with its own cache store and refresh
//! coordinator and is the only thing the web layer talks to.

mod registry;
mod tasks;

pub use registry::PanelRegistry;
pub use tasks::{MutationResult, TaskMutation, TaskPanel, TaskPanelView, TaskSource};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::cache::{CacheStore, RefreshCoordinator, RefreshPool, RefreshState};
use crate::{ErrorKind, Result};

/// Produces snapshots for one panel type.
#[async_trait]
pub trait PanelSource: Send + Sync + 'static {
    type Snapshot: Send + Sync + 'static;

    /// Short type tag, e.g. `"tasks"`.
    fn kind(&self) -> &'static str;

    /// Fetch and shape a complete snapshot.
    async fn fetch(&self) -> Result<Self::Snapshot>;
}

/// Per-request state handed down from the web layer.
///
/// Cancelling it aborts only work the caller is waiting on directly (the
/// blocking first load); background refreshes keep running.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

/// Result of rendering a panel that has data to show.
#[derive(Debug)]
pub struct Rendered<T> {
    pub view: Arc<T>,
    /// The last refresh failed and nothing fresher has been published since
    pub degraded: bool,
    pub error_message: Option<String>,
}

/// Cache, coordinator and source for one panel instance.
pub struct PanelController<S: PanelSource> {
    id: String,
    source: Arc<S>,
    store: Arc<CacheStore<S::Snapshot>>,
    coordinator: RefreshCoordinator<S>,
}

impl<S: PanelSource> std::fmt::Debug for PanelController<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelController")
            .field("id", &self.id)
            .field("kind", &self.source.kind())
            .field("ttl", &self.store.ttl())
            .field("state", &self.coordinator.state())
            .finish()
    }
}

impl<S: PanelSource> PanelController<S> {
    pub fn new(id: impl Into<String>, source: S, ttl: Duration, pool: RefreshPool) -> Self {
        let id = id.into();
        let source = Arc::new(source);
        let store = Arc::new(CacheStore::new(ttl));
        let coordinator =
            RefreshCoordinator::new(id.clone(), Arc::clone(&store), Arc::clone(&source), pool);
        Self {
            id,
            source,
            store,
            coordinator,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn state(&self) -> RefreshState {
        self.coordinator.state()
    }

    /// Current view for this panel.
    ///
    /// Blocks on the upstream only when nothing has ever been published. A
    /// stale snapshot is returned immediately and a background refresh is
    /// started that outlives `ctx`.
    pub async fn render(&self, ctx: &RequestContext) -> Result<Rendered<S::Snapshot>> {
        let read = self.store.read();
        let Some(view) = read.payload else {
            let view = self.coordinator.load_initial(ctx).await?;
            return Ok(Rendered {
                view,
                degraded: false,
                error_message: None,
            });
        };

        if read.is_stale {
            self.coordinator.trigger_stale();
        }

        Ok(Rendered {
            view,
            degraded: read.last_error.is_some(),
            error_message: read.last_error.map(|e| e.to_string()),
        })
    }

    /// Refresh now regardless of age. Dropped if one is already running.
    pub fn trigger_early(&self) -> bool {
        self.coordinator.trigger_early()
    }

    /// Wait for any in-flight refresh to finish.
    pub async fn settle(&self) {
        self.coordinator.settle().await;
    }
}

/// Type-erased render output for page composition.
#[derive(Debug, Clone, Serialize)]
pub struct PanelRender {
    pub id: String,
    pub kind: &'static str,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Absent only when the first load failed
    pub view: Option<serde_json::Value>,
}

/// Object-safe face of a panel, so different panel types can share a page.
#[async_trait]
pub trait Panel: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> &'static str;

    async fn render_json(&self, ctx: &RequestContext) -> PanelRender;
}

#[async_trait]
impl<S> Panel for PanelController<S>
where
    S: PanelSource,
    S::Snapshot: Serialize,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        self.source.kind()
    }

    async fn render_json(&self, ctx: &RequestContext) -> PanelRender {
        let kind = self.source.kind();
        match self.render(ctx).await {
            Ok(rendered) => match serde_json::to_value(&*rendered.view) {
                Ok(view) => PanelRender {
                    id: self.id.clone(),
                    kind,
                    degraded: rendered.degraded,
                    error: rendered.error_message,
                    error_kind: None,
                    view: Some(view),
                },
                Err(e) => PanelRender {
                    id: self.id.clone(),
                    kind,
                    degraded: true,
                    error: Some(format!("failed to encode view: {e}")),
                    error_kind: Some(ErrorKind::MalformedResponse),
                    view: None,
                },
            },
            Err(e) => PanelRender {
                id: self.id.clone(),
                kind,
                degraded: true,
                error: Some(e.to_string()),
                error_kind: Some(e.kind()),
                view: None,
            },
        }
    }
}
