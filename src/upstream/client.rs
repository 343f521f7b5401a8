//! HTTP client for the upstream task service.
//!
//! Every call goes through [`UpstreamClient::call`], which:
//! - injects the bearer credential (never logged; `Debug` redacts it)
//! - records the call against the [`RateBudget`] and warns past the soft limit
//! - issues exactly one request, bounded by the client timeout, with no retries
//! - maps the response status onto the crate [`Error`] taxonomy

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::{Method, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::rate::{BudgetStatus, DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW, RateBudget};
use crate::models::{
    Collaborator, Comment, CreateCommentRequest, CreateLabelRequest, CreateProjectRequest,
    CreateSectionRequest, CreateTaskRequest, Label, Project, RemoveSharedLabelRequest,
    RenameSharedLabelRequest, Section, Task, TaskQuery, UpdateCommentRequest, UpdateLabelRequest,
    UpdateProjectRequest, UpdateSectionRequest, UpdateTaskRequest, validate_id,
};
use crate::{Error, Result};

/// Upstream REST API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.todoist.com/rest/v2";

/// Upper bound on a single request, connect through body read
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("panelkeeper/", env!("CARGO_PKG_VERSION"));

/// Connection settings for an [`UpstreamClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub timeout: Duration,
    pub rate_limit: u32,
    pub rate_window: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            rate_limit: DEFAULT_RATE_LIMIT,
            rate_window: DEFAULT_RATE_WINDOW,
        }
    }
}

/// Authenticated client owned by one panel instance.
///
/// The rate budget lives behind the client's own lock; it is never shared
/// with other panels, even ones using the same account.
pub struct UpstreamClient {
    token: String,
    base_url: String,
    http: reqwest::Client,
    budget: Mutex<RateBudget>,
}

impl fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("request_count", &self.request_count())
            .finish()
    }
}

impl UpstreamClient {
    /// Build a client for the given bearer token.
    pub fn new(token: impl Into<String>, options: ClientOptions) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::Config("api token is required".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Config(format!("http client error: {e}")))?;

        Ok(Self {
            token,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            http,
            budget: Mutex::new(RateBudget::new(options.rate_limit, options.rate_window)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Requests counted in the current rate window.
    pub fn request_count(&self) -> u32 {
        self.budget
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .count()
    }

    fn record_request(&self, method: &Method, path: &str) {
        let (status, count, limit, window) = {
            let mut budget = self.budget.lock().unwrap_or_else(PoisonError::into_inner);
            let status = budget.record(Instant::now());
            (status, budget.count(), budget.limit(), budget.window())
        };

        if status == BudgetStatus::OverLimit {
            warn!(
                event = "upstream.rate_limit_approaching",
                count,
                limit,
                window_secs = window.as_secs(),
                method = %method,
                path,
            );
        }
    }

    /// Issue one request and return the raw response body of a 2xx reply.
    ///
    /// `path` is relative to the base URL and must start with `/`.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Vec<u8>> {
        self.record_request(&method, path);

        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        debug!(event = "upstream.request_started", method = %method, path);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let err = transport_error(&e);
                warn!(event = "upstream.request_failed", method = %method, path, error = %err);
                return Err(err);
            }
        };

        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = transport_error(&e);
                warn!(
                    event = "upstream.request_failed",
                    method = %method,
                    path,
                    status = status.as_u16(),
                    error = %err,
                );
                return Err(err);
            }
        };

        match classify(status, retry_after, &bytes) {
            Ok(()) => {
                debug!(
                    event = "upstream.request_completed",
                    method = %method,
                    path,
                    status = status.as_u16(),
                );
                Ok(bytes.to_vec())
            }
            Err(err) => {
                warn!(
                    event = "upstream.request_failed",
                    method = %method,
                    path,
                    status = status.as_u16(),
                    error = %err,
                );
                Err(err)
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let bytes = self.call(Method::GET, path, query, None).await?;
        decode(&bytes)
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let bytes = self
            .call(Method::POST, path, &[], Some(encode(body)?))
            .await?;
        decode(&bytes)
    }

    async fn post_empty(&self, path: &str, body: Option<Value>) -> Result<()> {
        self.call(Method::POST, path, &[], body).await.map(|_| ())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.call(Method::DELETE, path, &[], None).await.map(|_| ())
    }

    // Tasks

    pub async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        self.get_json("/tasks", &query.to_pairs()).await
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Task> {
        validate_id("task", task_id)?;
        self.get_json(&format!("/tasks/{task_id}"), &[]).await
    }

    pub async fn create_task(&self, request: &CreateTaskRequest) -> Result<Task> {
        request.validate()?;
        self.post_json("/tasks", request).await
    }

    pub async fn update_task(&self, task_id: &str, request: &UpdateTaskRequest) -> Result<Task> {
        validate_id("task", task_id)?;
        request.validate()?;
        self.post_json(&format!("/tasks/{task_id}"), request).await
    }

    pub async fn close_task(&self, task_id: &str) -> Result<()> {
        validate_id("task", task_id)?;
        self.post_empty(&format!("/tasks/{task_id}/close"), None).await
    }

    pub async fn reopen_task(&self, task_id: &str) -> Result<()> {
        validate_id("task", task_id)?;
        self.post_empty(&format!("/tasks/{task_id}/reopen"), None).await
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<()> {
        validate_id("task", task_id)?;
        self.delete(&format!("/tasks/{task_id}")).await
    }

    // Projects

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        self.get_json("/projects", &[]).await
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Project> {
        validate_id("project", project_id)?;
        self.get_json(&format!("/projects/{project_id}"), &[]).await
    }

    pub async fn create_project(&self, request: &CreateProjectRequest) -> Result<Project> {
        if request.name.trim().is_empty() {
            return Err(Error::validation("name is required"));
        }
        self.post_json("/projects", request).await
    }

    pub async fn update_project(
        &self,
        project_id: &str,
        request: &UpdateProjectRequest,
    ) -> Result<Project> {
        validate_id("project", project_id)?;
        self.post_json(&format!("/projects/{project_id}"), request)
            .await
    }

    pub async fn archive_project(&self, project_id: &str) -> Result<()> {
        validate_id("project", project_id)?;
        self.post_empty(&format!("/projects/{project_id}/archive"), None)
            .await
    }

    pub async fn unarchive_project(&self, project_id: &str) -> Result<()> {
        validate_id("project", project_id)?;
        self.post_empty(&format!("/projects/{project_id}/unarchive"), None)
            .await
    }

    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        validate_id("project", project_id)?;
        self.delete(&format!("/projects/{project_id}")).await
    }

    pub async fn project_collaborators(&self, project_id: &str) -> Result<Vec<Collaborator>> {
        validate_id("project", project_id)?;
        self.get_json(&format!("/projects/{project_id}/collaborators"), &[])
            .await
    }

    // Sections

    pub async fn list_sections(&self, project_id: Option<&str>) -> Result<Vec<Section>> {
        let mut query = Vec::new();
        if let Some(project_id) = project_id.filter(|id| !id.is_empty()) {
            query.push(("project_id", project_id.to_string()));
        }
        self.get_json("/sections", &query).await
    }

    pub async fn get_section(&self, section_id: &str) -> Result<Section> {
        validate_id("section", section_id)?;
        self.get_json(&format!("/sections/{section_id}"), &[]).await
    }

    pub async fn create_section(&self, request: &CreateSectionRequest) -> Result<Section> {
        if request.name.trim().is_empty() {
            return Err(Error::validation("name is required"));
        }
        validate_id("project", &request.project_id)?;
        self.post_json("/sections", request).await
    }

    pub async fn update_section(
        &self,
        section_id: &str,
        request: &UpdateSectionRequest,
    ) -> Result<Section> {
        validate_id("section", section_id)?;
        if request.name.trim().is_empty() {
            return Err(Error::validation("name is required"));
        }
        self.post_json(&format!("/sections/{section_id}"), request)
            .await
    }

    pub async fn delete_section(&self, section_id: &str) -> Result<()> {
        validate_id("section", section_id)?;
        self.delete(&format!("/sections/{section_id}")).await
    }

    // Labels

    pub async fn list_labels(&self) -> Result<Vec<Label>> {
        self.get_json("/labels", &[]).await
    }

    pub async fn get_label(&self, label_id: &str) -> Result<Label> {
        validate_id("label", label_id)?;
        self.get_json(&format!("/labels/{label_id}"), &[]).await
    }

    pub async fn create_label(&self, request: &CreateLabelRequest) -> Result<Label> {
        if request.name.trim().is_empty() {
            return Err(Error::validation("name is required"));
        }
        self.post_json("/labels", request).await
    }

    pub async fn update_label(&self, label_id: &str, request: &UpdateLabelRequest) -> Result<Label> {
        validate_id("label", label_id)?;
        self.post_json(&format!("/labels/{label_id}"), request).await
    }

    pub async fn delete_label(&self, label_id: &str) -> Result<()> {
        validate_id("label", label_id)?;
        self.delete(&format!("/labels/{label_id}")).await
    }

    pub async fn shared_labels(&self, omit_personal: bool) -> Result<Vec<String>> {
        let query = if omit_personal {
            vec![("omit_personal", "true".to_string())]
        } else {
            Vec::new()
        };
        self.get_json("/labels/shared", &query).await
    }

    pub async fn rename_shared_label(&self, name: &str, new_name: &str) -> Result<()> {
        if name.trim().is_empty() || new_name.trim().is_empty() {
            return Err(Error::validation("name and new_name are required"));
        }
        let body = RenameSharedLabelRequest {
            name: name.to_string(),
            new_name: new_name.to_string(),
        };
        self.post_empty("/labels/shared/rename", Some(encode(&body)?))
            .await
    }

    pub async fn remove_shared_label(&self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::validation("name is required"));
        }
        let body = RemoveSharedLabelRequest {
            name: name.to_string(),
        };
        self.post_empty("/labels/shared/remove", Some(encode(&body)?))
            .await
    }

    // Comments

    pub async fn list_task_comments(&self, task_id: &str) -> Result<Vec<Comment>> {
        validate_id("task", task_id)?;
        self.get_json("/comments", &[("task_id", task_id.to_string())])
            .await
    }

    pub async fn list_project_comments(&self, project_id: &str) -> Result<Vec<Comment>> {
        validate_id("project", project_id)?;
        self.get_json("/comments", &[("project_id", project_id.to_string())])
            .await
    }

    pub async fn get_comment(&self, comment_id: &str) -> Result<Comment> {
        validate_id("comment", comment_id)?;
        self.get_json(&format!("/comments/{comment_id}"), &[]).await
    }

    pub async fn create_comment(&self, request: &CreateCommentRequest) -> Result<Comment> {
        request.validate()?;
        self.post_json("/comments", request).await
    }

    pub async fn update_comment(
        &self,
        comment_id: &str,
        request: &UpdateCommentRequest,
    ) -> Result<Comment> {
        validate_id("comment", comment_id)?;
        request.validate()?;
        self.post_json(&format!("/comments/{comment_id}"), request)
            .await
    }

    pub async fn delete_comment(&self, comment_id: &str) -> Result<()> {
        validate_id("comment", comment_id)?;
        self.delete(&format!("/comments/{comment_id}")).await
    }
}

/// Map a response status onto the error taxonomy. 2xx is success.
fn classify(status: StatusCode, retry_after: Option<String>, body: &[u8]) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }

    let text = String::from_utf8_lossy(body).into_owned();
    Err(match status {
        StatusCode::UNAUTHORIZED => Error::Auth,
        StatusCode::FORBIDDEN => Error::Permission,
        StatusCode::NOT_FOUND => Error::NotFound,
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited {
            retry_after,
            body: text,
        },
        other => Error::UpstreamUnavailable {
            reason: format!("unexpected status {}", other.as_u16()),
            status: Some(other.as_u16()),
            body: Some(text),
        },
    })
}

fn transport_error(err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::unavailable(format!("request timed out: {err}"))
    } else if err.is_connect() {
        Error::unavailable(format!("connection failed: {err}"))
    } else {
        Error::unavailable(format!("request failed: {err}"))
    }
}

fn encode<B: Serialize>(body: &B) -> Result<Value> {
    serde_json::to_value(body)
        .map_err(|e| Error::validation(format!("request body is not serializable: {e}")))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.is_empty() {
        return Err(Error::MalformedResponse("empty response body".to_string()));
    }
    serde_json::from_slice(bytes).map_err(|e| Error::MalformedResponse(e.to_string()))
}
