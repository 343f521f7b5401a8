//! Configuration for panels and the shared refresh pool.
//!
//! A dashboard is described by one TOML document:
//!
//! ```toml
//! [pool]
//! workers = 4
//! queue-capacity = 64
//!
//! [panels.inbox]
//! api-token = "..."
//! project-id = "2203306141"
//!
//! [panels.today]
//! api-token = "..."
//! filter = "today | overdue"
//! ```
//!
//! Each `[panels.<id>]` table is a [`PanelConfig`]. Locating and reloading the
//! file is left to the embedding application.

pub mod schema;

pub use schema::{
    DEFAULT_CACHE_DURATION_SECS, DEFAULT_COLLAPSE_AFTER, DEFAULT_REQUEST_TIMEOUT_SECS,
    PanelConfig,
};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cache::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use crate::models::validate_id;
use crate::{Error, Result};

/// Sizing for the background refresh pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Every panel on a page plus the pool they share.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DashboardConfig {
    pub pool: PoolConfig,
    pub panels: BTreeMap<String, PanelConfig>,
}

impl DashboardConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validated()
    }

    /// Validate every panel. Panel ids end up in URL paths, so they follow
    /// the same character rules as upstream ids.
    pub fn validated(mut self) -> Result<Self> {
        if self.pool.workers == 0 {
            self.pool.workers = DEFAULT_WORKERS;
        }
        if self.pool.queue_capacity == 0 {
            self.pool.queue_capacity = DEFAULT_QUEUE_CAPACITY;
        }

        let mut panels = BTreeMap::new();
        for (id, panel) in std::mem::take(&mut self.panels) {
            validate_id("panel", &id).map_err(|e| Error::Config(e.to_string()))?;
            let panel = panel
                .validated()
                .map_err(|e| Error::Config(format!("panel {id}: {e}")))?;
            panels.insert(id, panel);
        }
        self.panels = panels;
        Ok(self)
    }
}
