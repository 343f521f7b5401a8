//! Data models for upstream task-service entities.
//!
//! This module defines the records a panel consumes:
//! - `Task` - Work items with priority, due date, labels and an optional parent
//! - `Project` / `Section` - Containers that tasks belong to
//! - `Label` - Named tags resolved against a task's label names
//! - `Comment` - Notes attached to a task or project
//!
//! Request bodies for write operations live in [`requests`].

pub mod requests;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub use requests::{
    CreateCommentRequest, CreateLabelRequest, CreateProjectRequest, CreateSectionRequest,
    CreateTaskRequest, RemoveSharedLabelRequest, RenameSharedLabelRequest, TaskQuery,
    UpdateCommentRequest, UpdateLabelRequest, UpdateProjectRequest, UpdateSectionRequest,
    UpdateTaskRequest,
};

/// Lowest task priority (the upstream's "normal").
pub const PRIORITY_MIN: u8 = 1;

/// Highest task priority (the upstream's "urgent").
pub const PRIORITY_MAX: u8 = 4;

/// Treat `null`, a missing field and `""` alike. The upstream uses all
/// three for "no parent" / "no section".
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Dates the upstream sometimes sends as `""` to mean "no date".
fn empty_date_as_none<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) if !s.is_empty() => s.parse().map(Some).map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

fn default_priority() -> u8 {
    PRIORITY_MIN
}

/// A task record from the upstream service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Opaque unique identifier
    pub id: String,

    /// Task title (markdown allowed upstream)
    pub content: String,

    /// Longer description
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub is_completed: bool,

    /// Upstream-provided ordering key within the parent/project
    #[serde(default)]
    pub order: i64,

    /// Priority level (1-4, higher is more urgent)
    #[serde(default = "default_priority")]
    pub priority: u8,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub project_id: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub section_id: Option<String>,

    /// Parent task ID for subtasks
    #[serde(default, deserialize_with = "empty_as_none")]
    pub parent_id: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub creator_id: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub due: Option<Due>,

    #[serde(default)]
    pub deadline: Option<Deadline>,

    #[serde(default)]
    pub duration: Option<TaskDuration>,

    /// Label names; resolved to [`Label`] objects by the view pipeline
    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(default)]
    pub comment_count: u32,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub assignee_id: Option<String>,

    #[serde(default)]
    pub url: String,
}

impl Task {
    /// Create a bare task with the given ID and content.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            description: String::new(),
            is_completed: false,
            order: 0,
            priority: PRIORITY_MIN,
            project_id: None,
            section_id: None,
            parent_id: None,
            creator_id: None,
            created_at: None,
            due: None,
            deadline: None,
            duration: None,
            labels: Vec::new(),
            comment_count: 0,
            assignee_id: None,
            url: String::new(),
        }
    }

    /// Calendar date the task is due, if any.
    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due.as_ref().and_then(|d| d.date)
    }
}

/// Due information attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Due {
    /// Absent when the upstream sends an empty date
    #[serde(default, deserialize_with = "empty_date_as_none")]
    pub date: Option<NaiveDate>,

    #[serde(default)]
    pub is_recurring: bool,

    /// Exact due time, when the task has one
    #[serde(default, deserialize_with = "empty_as_none")]
    pub datetime: Option<String>,

    /// Human-readable due string as the user typed it
    #[serde(default)]
    pub string: String,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub timezone: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub lang: Option<String>,
}

impl Due {
    pub fn on(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            is_recurring: false,
            datetime: None,
            string: String::new(),
            timezone: None,
            lang: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deadline {
    #[serde(default, deserialize_with = "empty_date_as_none")]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDuration {
    pub amount: u32,
    /// "minute" or "day"
    pub unit: String,
}

/// A project that tasks belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub color: String,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub order: i64,

    #[serde(default)]
    pub comment_count: u32,

    #[serde(default)]
    pub is_shared: bool,

    #[serde(default)]
    pub is_favorite: bool,

    #[serde(default)]
    pub is_inbox_project: bool,

    #[serde(default)]
    pub is_team_inbox: bool,

    #[serde(default)]
    pub view_style: String,

    #[serde(default)]
    pub url: String,
}

/// A section within a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub project_id: String,
    #[serde(default)]
    pub order: i64,
    pub name: String,
}

/// A personal label. Tasks reference labels by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub color: String,

    #[serde(default)]
    pub order: i64,

    #[serde(default)]
    pub is_favorite: bool,
}

/// A comment on a task or project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub content: String,

    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub attachment: Option<Attachment>,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub task_id: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub project_id: Option<String>,
}

/// A file attached to a comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_url: String,
}

/// A collaborator on a shared project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// Check that an entity ID is safe to splice into a request path.
///
/// Upstream IDs are alphanumeric; anything else is rejected before a request
/// is built.
pub fn validate_id(entity: &str, id: &str) -> crate::Result<()> {
    if id.is_empty() {
        return Err(crate::Error::validation(format!("{entity} id is required")));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(crate::Error::validation(format!(
            "invalid {entity} id: {id}"
        )));
    }
    Ok(())
}
