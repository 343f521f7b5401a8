//! Request bodies and query options for upstream write and list calls.
//!
//! Optional fields are omitted from the serialized body so that the upstream
//! only sees what the caller actually set.

use serde::{Deserialize, Serialize};

use super::{Attachment, PRIORITY_MAX, PRIORITY_MIN};
use crate::{Error, Result};

/// Options for listing tasks (`GET /tasks`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub project_id: Option<String>,
    pub section_id: Option<String>,
    pub label: Option<String>,
    /// Upstream filter expression, e.g. `today | overdue`
    pub filter: Option<String>,
    pub lang: Option<String>,
    pub ids: Vec<String>,
}

impl TaskQuery {
    /// Query pairs in the order the upstream documents them.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let fields = [
            ("project_id", &self.project_id),
            ("section_id", &self.section_id),
            ("label", &self.label),
            ("filter", &self.filter),
            ("lang", &self.lang),
        ];
        for (key, value) in fields {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                pairs.push((key, value.to_string()));
            }
        }
        if !self.ids.is_empty() {
            pairs.push(("ids", self.ids.join(",")));
        }
        pairs
    }
}

fn check_priority(priority: Option<u8>) -> Result<()> {
    match priority {
        Some(p) if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&p) => Err(Error::validation(format!(
            "priority must be between {PRIORITY_MIN} and {PRIORITY_MAX}, got {p}"
        ))),
        _ => Ok(()),
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{field} is required")));
    }
    Ok(())
}

/// Body for `POST /tasks`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_string: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_datetime: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_lang: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_unit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_date: Option<String>,
}

impl CreateTaskRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("content", &self.content)?;
        check_priority(self.priority)
    }
}

/// Body for `POST /tasks/{id}`. Unset fields are left unchanged upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_string: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_datetime: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_lang: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_unit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_date: Option<String>,
}

impl UpdateTaskRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(content) = &self.content {
            require("content", content)?;
        }
        check_priority(self.priority)
    }
}

/// Body for `POST /projects`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_style: Option<String>,
}

/// Body for `POST /projects/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateProjectRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_style: Option<String>,
}

/// Body for `POST /sections`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateSectionRequest {
    pub name: String,
    pub project_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

/// Body for `POST /sections/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateSectionRequest {
    pub name: String,
}

/// Body for `POST /labels`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateLabelRequest {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

/// Body for `POST /labels/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateLabelRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

/// Body for `POST /labels/shared/rename`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameSharedLabelRequest {
    pub name: String,
    pub new_name: String,
}

/// Body for `POST /labels/shared/remove`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveSharedLabelRequest {
    pub name: String,
}

/// Body for `POST /comments`. Exactly one of `task_id` / `project_id` is
/// expected; `task_id` wins when both are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

impl CreateCommentRequest {
    pub fn for_task(task_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            task_id: Some(task_id.into()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("content", &self.content)?;
        let has_task = self.task_id.as_deref().is_some_and(|s| !s.is_empty());
        let has_project = self.project_id.as_deref().is_some_and(|s| !s.is_empty());
        if !has_task && !has_project {
            return Err(Error::validation("either task_id or project_id is required"));
        }
        Ok(())
    }
}

/// Body for `POST /comments/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateCommentRequest {
    pub content: String,
}

impl UpdateCommentRequest {
    pub fn validate(&self) -> Result<()> {
        require("content", &self.content)
    }
}
