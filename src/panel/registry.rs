use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use crate::cache::RefreshPool;
use crate::config::DashboardConfig;
use crate::Result;

use super::{Panel, PanelRender, RequestContext, TaskPanel};

/// Panels on one page, keyed by panel id.
#[derive(Debug, Default)]
pub struct PanelRegistry {
    panels: HashMap<String, Arc<TaskPanel>>,
}

impl PanelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured panel around one shared refresh pool.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn from_config(config: DashboardConfig) -> Result<Self> {
        let config = config.validated()?;
        let pool = RefreshPool::new(config.pool.workers, config.pool.queue_capacity)?;

        let mut registry = Self::new();
        for (id, panel) in config.panels {
            let panel = TaskPanel::from_config(id, panel, pool.clone())?;
            registry.insert(panel);
        }
        tracing::info!(event = "panel.registry_loaded", panels = registry.len());
        Ok(registry)
    }

    /// Register a panel, replacing any panel with the same id.
    pub fn insert(&mut self, panel: TaskPanel) -> Option<Arc<TaskPanel>> {
        self.panels.insert(panel.id().to_string(), Arc::new(panel))
    }

    pub fn get(&self, id: &str) -> Option<Arc<TaskPanel>> {
        self.panels.get(id).cloned()
    }

    /// Panel ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.panels.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    /// Render every panel concurrently, ordered by panel id.
    ///
    /// A panel whose first load fails comes back with an error and no view;
    /// it never stops the other panels from rendering.
    pub async fn render_all(&self, ctx: &RequestContext) -> Vec<PanelRender> {
        let renders = self.ids().into_iter().filter_map(|id| {
            self.panels
                .get(id)
                .map(|panel| async move { panel.render_json(ctx).await })
        });
        join_all(renders).await
    }
}
