//! Task list panel: fetches tasks from the upstream, shapes them through the
//! view pipeline and applies writes on behalf of the page.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use serde::Serialize;

use crate::cache::RefreshPool;
use crate::config::PanelConfig;
use crate::models::{
    Comment, CreateCommentRequest, CreateTaskRequest, Label, Project, Task, TaskQuery,
    UpdateCommentRequest, UpdateTaskRequest, validate_id,
};
use crate::pipeline::{self, Associations, TaskNode, ViewSpec};
use crate::upstream::UpstreamClient;
use crate::{Error, Result};

use super::{PanelController, PanelSource, RequestContext};

/// A task panel instance.
pub type TaskPanel = PanelController<TaskSource>;

/// Snapshot published by a task panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskPanelView {
    pub tasks: Vec<TaskNode>,
    pub projects: Vec<Project>,
    pub labels: Vec<Label>,
    /// Subtasks shown before the rest collapse; -1 never collapses
    pub collapse_after: i64,
    pub compact_mode: bool,
    pub hide_description: bool,
}

/// Values filled into new tasks when the caller leaves them unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CreateDefaults {
    project_id: Option<String>,
    section_id: Option<String>,
    priority: u8,
    labels: Vec<String>,
}

impl CreateDefaults {
    fn apply(&self, request: &mut CreateTaskRequest) {
        if request.project_id.is_none() {
            request.project_id = self.project_id.clone();
        }
        if request.section_id.is_none() {
            request.section_id = self.section_id.clone();
        }
        if request.priority.is_none() {
            request.priority = Some(self.priority);
        }
        if request.labels.is_empty() {
            request.labels = self.labels.clone();
        }
    }
}

/// Upstream-backed snapshot source for a task panel.
#[derive(Debug)]
pub struct TaskSource {
    client: Arc<UpstreamClient>,
    query: TaskQuery,
    view: ViewSpec,
    resolve_projects: bool,
    collapse_after: i64,
    compact_mode: bool,
    hide_description: bool,
    defaults: CreateDefaults,
}

impl TaskSource {
    /// Build a source around an existing client. `config` is expected to be
    /// normalised already (see [`PanelConfig::validated`]).
    pub fn new(client: Arc<UpstreamClient>, config: &PanelConfig) -> Self {
        Self {
            client,
            query: config.task_query(),
            view: config.view_spec(),
            resolve_projects: config.resolves_projects(),
            collapse_after: config.collapse_after,
            compact_mode: config.compact_mode,
            hide_description: config.hide_description,
            defaults: CreateDefaults {
                project_id: config.default_project_id.clone(),
                section_id: config.default_section_id.clone(),
                priority: config.default_priority(),
                labels: config.default_labels.clone(),
            },
        }
    }

    pub fn client(&self) -> &UpstreamClient {
        &self.client
    }

    async fn projects(&self) -> Vec<Project> {
        if !self.resolve_projects {
            return Vec::new();
        }
        self.client.list_projects().await.unwrap_or_else(|e| {
            tracing::warn!(
                event = "panel.associations_unavailable",
                entity = "projects",
                error = %e,
            );
            Vec::new()
        })
    }

    async fn labels(&self) -> Vec<Label> {
        self.client.list_labels().await.unwrap_or_else(|e| {
            tracing::warn!(
                event = "panel.associations_unavailable",
                entity = "labels",
                error = %e,
            );
            Vec::new()
        })
    }
}

#[async_trait]
impl PanelSource for TaskSource {
    type Snapshot = TaskPanelView;

    fn kind(&self) -> &'static str {
        "tasks"
    }

    async fn fetch(&self) -> Result<TaskPanelView> {
        let records = self.client.list_tasks(&self.query).await?;
        let (projects, labels) = tokio::join!(self.projects(), self.labels());

        let assoc = Associations::new(projects.clone(), labels.clone());
        let tasks = pipeline::build(records, &self.view, &assoc, Local::now().date_naive());

        Ok(TaskPanelView {
            tasks,
            projects,
            labels,
            collapse_after: self.collapse_after,
            compact_mode: self.compact_mode,
            hide_description: self.hide_description,
        })
    }
}

/// A write a task panel can perform.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskMutation {
    CreateTask(CreateTaskRequest),
    UpdateTask {
        id: String,
        request: UpdateTaskRequest,
    },
    CloseTask {
        id: String,
    },
    ReopenTask {
        id: String,
    },
    DeleteTask {
        id: String,
    },
    CreateComment(CreateCommentRequest),
    UpdateComment {
        id: String,
        request: UpdateCommentRequest,
    },
    DeleteComment {
        id: String,
    },
}

impl TaskMutation {
    pub fn op(&self) -> &'static str {
        match self {
            TaskMutation::CreateTask(_) => "create_task",
            TaskMutation::UpdateTask { .. } => "update_task",
            TaskMutation::CloseTask { .. } => "close_task",
            TaskMutation::ReopenTask { .. } => "reopen_task",
            TaskMutation::DeleteTask { .. } => "delete_task",
            TaskMutation::CreateComment(_) => "create_comment",
            TaskMutation::UpdateComment { .. } => "update_comment",
            TaskMutation::DeleteComment { .. } => "delete_comment",
        }
    }

    /// Reject bad input before anything is sent upstream.
    pub fn validate(&self) -> Result<()> {
        match self {
            TaskMutation::CreateTask(request) => request.validate(),
            TaskMutation::UpdateTask { id, request } => {
                validate_id("task", id)?;
                request.validate()
            }
            TaskMutation::CloseTask { id }
            | TaskMutation::ReopenTask { id }
            | TaskMutation::DeleteTask { id } => validate_id("task", id),
            TaskMutation::CreateComment(request) => {
                request.validate()?;
                if let Some(task_id) = &request.task_id {
                    validate_id("task", task_id)?;
                }
                Ok(())
            }
            TaskMutation::UpdateComment { id, request } => {
                validate_id("comment", id)?;
                request.validate()
            }
            TaskMutation::DeleteComment { id } => validate_id("comment", id),
        }
    }
}

/// The upstream's echo of a successful write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MutationResult {
    Task(Task),
    Comment(Comment),
    /// The upstream answered 204 with no body
    Done,
}

impl PanelController<TaskSource> {
    /// Build a panel, its upstream client and cache from configuration.
    pub fn from_config(
        id: impl Into<String>,
        config: PanelConfig,
        pool: RefreshPool,
    ) -> Result<Self> {
        let config = config.validated()?;
        let client = UpstreamClient::new(config.api_token.clone(), config.client_options())?;
        let source = TaskSource::new(Arc::new(client), &config);
        Ok(Self::new(id, source, config.ttl(), pool))
    }

    /// Apply one write upstream.
    ///
    /// On success an early refresh is triggered and the upstream's echo is
    /// returned. Errors come back unchanged and leave the cache alone.
    pub async fn mutate(
        &self,
        mut mutation: TaskMutation,
        ctx: &RequestContext,
    ) -> Result<MutationResult> {
        let op = mutation.op();
        if let TaskMutation::CreateTask(request) = &mut mutation {
            self.source().defaults.apply(request);
        }

        let outcome = match mutation.validate() {
            Ok(()) => with_context(ctx, self.apply(mutation)).await,
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(_) => {
                tracing::info!(event = "panel.mutation_applied", panel_id = %self.id(), op);
                self.trigger_early();
            }
            Err(e) => {
                tracing::warn!(
                    event = "panel.mutation_failed",
                    panel_id = %self.id(),
                    op,
                    kind = ?e.kind(),
                    error = %e,
                );
            }
        }
        outcome
    }

    async fn apply(&self, mutation: TaskMutation) -> Result<MutationResult> {
        let client = self.source().client();
        match mutation {
            TaskMutation::CreateTask(request) => {
                client.create_task(&request).await.map(MutationResult::Task)
            }
            TaskMutation::UpdateTask { id, request } => client
                .update_task(&id, &request)
                .await
                .map(MutationResult::Task),
            TaskMutation::CloseTask { id } => {
                client.close_task(&id).await.map(|()| MutationResult::Done)
            }
            TaskMutation::ReopenTask { id } => {
                client.reopen_task(&id).await.map(|()| MutationResult::Done)
            }
            TaskMutation::DeleteTask { id } => {
                client.delete_task(&id).await.map(|()| MutationResult::Done)
            }
            TaskMutation::CreateComment(request) => client
                .create_comment(&request)
                .await
                .map(MutationResult::Comment),
            TaskMutation::UpdateComment { id, request } => client
                .update_comment(&id, &request)
                .await
                .map(MutationResult::Comment),
            TaskMutation::DeleteComment { id } => {
                client.delete_comment(&id).await.map(|()| MutationResult::Done)
            }
        }
    }

    /// Uncached single-task read.
    pub async fn get_task(&self, id: &str, ctx: &RequestContext) -> Result<Task> {
        validate_id("task", id)?;
        with_context(ctx, self.source().client().get_task(id)).await
    }

    /// Uncached comment listing for one task.
    pub async fn list_comments(&self, task_id: &str, ctx: &RequestContext) -> Result<Vec<Comment>> {
        validate_id("task", task_id)?;
        with_context(ctx, self.source().client().list_task_comments(task_id)).await
    }
}

async fn with_context<T>(ctx: &RequestContext, call: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        _ = ctx.cancelled() => Err(Error::cancelled()),
        outcome = call => outcome,
    }
}
