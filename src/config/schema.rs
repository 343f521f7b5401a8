//! TOML schema for task panel configuration.
//!
//! ```toml
//! api-token = "..."
//! cache-duration = 300
//! project-id = "2203306141"
//! priority-min = 3
//! due-filter = "upcoming"
//! limit = 10
//! default-labels = "home, errands"
//! ```

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{PRIORITY_MAX, PRIORITY_MIN, TaskQuery};
use crate::pipeline::{DEFAULT_LIMIT, DueFilter, FilterSet, ViewSpec};
use crate::upstream::{ClientOptions, DEFAULT_BASE_URL, DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW};
use crate::{Error, Result};

/// Seconds a snapshot stays fresh when `cache-duration` is unset.
pub const DEFAULT_CACHE_DURATION_SECS: u64 = 300;

/// Seconds before an upstream request is abandoned.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Number of subtasks shown before the rest collapse; -1 never collapses.
pub const DEFAULT_COLLAPSE_AFTER: i64 = 5;

/// Accept either `"a, b"` or `["a", "b"]`; blanks are dropped.
fn comma_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }

    let items = match Raw::deserialize(deserializer)? {
        Raw::One(s) => s.split(',').map(str::to_string).collect(),
        Raw::Many(v) => v,
    };
    Ok(split_list(items))
}

fn split_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Settings for one task panel.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PanelConfig {
    /// Bearer credential for the upstream (required)
    #[serde(skip_serializing)]
    pub api_token: String,

    pub base_url: String,

    /// Snapshot TTL in seconds
    pub cache_duration: u64,

    /// Per-request timeout in seconds
    pub request_timeout: u64,

    /// Soft request budget per window
    pub rate_limit: u32,

    /// Budget window in seconds
    pub rate_window: u64,

    // Upstream query
    pub filter: Option<String>,
    pub project_id: Option<String>,
    pub section_id: Option<String>,
    pub label: Option<String>,
    pub lang: Option<String>,
    #[serde(deserialize_with = "comma_list")]
    pub ids: Vec<String>,

    // Local filtering and display
    /// 0 disables the check, otherwise 1-4
    pub priority_min: u8,
    pub due_filter: DueFilter,
    pub show_completed: bool,
    pub show_subtasks: bool,
    pub limit: i64,
    pub collapse_after: i64,
    pub compact_mode: bool,
    pub hide_description: bool,

    // Create defaults
    pub default_project_id: Option<String>,
    pub default_section_id: Option<String>,
    pub default_priority: i64,
    #[serde(deserialize_with = "comma_list")]
    pub default_labels: Vec<String>,
}

impl std::fmt::Debug for PanelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelConfig")
            .field("api_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("cache_duration", &self.cache_duration)
            .field("filter", &self.filter)
            .field("project_id", &self.project_id)
            .field("due_filter", &self.due_filter)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_duration: DEFAULT_CACHE_DURATION_SECS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
            rate_limit: DEFAULT_RATE_LIMIT,
            rate_window: DEFAULT_RATE_WINDOW.as_secs(),
            filter: None,
            project_id: None,
            section_id: None,
            label: None,
            lang: None,
            ids: Vec::new(),
            priority_min: 0,
            due_filter: DueFilter::All,
            show_completed: false,
            show_subtasks: true,
            limit: DEFAULT_LIMIT as i64,
            collapse_after: DEFAULT_COLLAPSE_AFTER,
            compact_mode: false,
            hide_description: false,
            default_project_id: None,
            default_section_id: None,
            default_priority: i64::from(PRIORITY_MIN),
            default_labels: Vec::new(),
        }
    }
}

impl PanelConfig {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            ..Self::default()
        }
    }

    /// Parse one panel table and normalise it.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validated()
    }

    /// Reject unusable settings and clamp the rest to their defaults.
    pub fn validated(mut self) -> Result<Self> {
        self.api_token = self.api_token.trim().to_string();
        if self.api_token.is_empty() {
            return Err(Error::Config("api-token is required".to_string()));
        }
        if self.base_url.trim().is_empty() {
            self.base_url = DEFAULT_BASE_URL.to_string();
        }
        if self.cache_duration == 0 {
            self.cache_duration = DEFAULT_CACHE_DURATION_SECS;
        }
        if self.request_timeout == 0 {
            self.request_timeout = DEFAULT_REQUEST_TIMEOUT_SECS;
        }
        if self.rate_window == 0 {
            self.rate_window = DEFAULT_RATE_WINDOW.as_secs();
        }
        if self.limit <= 0 {
            self.limit = DEFAULT_LIMIT as i64;
        }
        if self.collapse_after == 0 || self.collapse_after < -1 {
            self.collapse_after = DEFAULT_COLLAPSE_AFTER;
        }
        if !(i64::from(PRIORITY_MIN)..=i64::from(PRIORITY_MAX)).contains(&self.default_priority) {
            self.default_priority = i64::from(PRIORITY_MIN);
        }
        if self.priority_min > PRIORITY_MAX {
            self.priority_min = 0;
        }
        self.ids = split_list(std::mem::take(&mut self.ids));
        self.default_labels = split_list(std::mem::take(&mut self.default_labels));
        Ok(self)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache_duration)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.request_timeout),
            rate_limit: self.rate_limit,
            rate_window: Duration::from_secs(self.rate_window),
        }
    }

    pub fn task_query(&self) -> TaskQuery {
        TaskQuery {
            project_id: self.project_id.clone(),
            section_id: self.section_id.clone(),
            label: self.label.clone(),
            filter: self.filter.clone(),
            lang: self.lang.clone(),
            ids: self.ids.clone(),
        }
    }

    pub fn view_spec(&self) -> ViewSpec {
        ViewSpec {
            filters: FilterSet {
                show_completed: self.show_completed,
                priority_min: (self.priority_min > 0).then_some(self.priority_min),
                due: self.due_filter,
                ids: self.ids.clone(),
            },
            limit: usize::try_from(self.limit).unwrap_or(DEFAULT_LIMIT),
            nest: self.show_subtasks,
        }
    }

    /// Projects are resolved unless an upstream filter already narrows the
    /// list and no project is pinned.
    pub fn resolves_projects(&self) -> bool {
        self.project_id.is_some() || self.filter.is_none()
    }

    /// `default-priority` after normalisation, as the upstream's 1-4 scale.
    pub fn default_priority(&self) -> u8 {
        u8::try_from(self.default_priority)
            .ok()
            .filter(|p| (PRIORITY_MIN..=PRIORITY_MAX).contains(p))
            .unwrap_or(PRIORITY_MIN)
    }
}
