//! HTTP surface for panels.
//!
//! Every route is scoped to one panel instance:
//!
//! | Method | Path | Operation |
//! |---|---|---|
//! | GET | `/api/panels` | render every panel |
//! | GET | `/api/panels/{panel_id}` | render one panel |
//! | POST | `/api/panels/{panel_id}/tasks` | create a task |
//! | GET | `/api/panels/{panel_id}/tasks/{id}` | read a task (uncached) |
//! | POST | `/api/panels/{panel_id}/tasks/{id}` | update a task |
//! | POST | `/api/panels/{panel_id}/tasks/{id}/close` | close a task |
//! | POST | `/api/panels/{panel_id}/tasks/{id}/reopen` | reopen a task |
//! | DELETE | `/api/panels/{panel_id}/tasks/{id}` | delete a task |
//! | GET | `/api/panels/{panel_id}/tasks/{id}/comments` | list comments |
//! | POST | `/api/panels/{panel_id}/tasks/{id}/comments` | add a comment |
//! | POST | `/api/panels/{panel_id}/comments/{id}` | edit a comment |
//! | DELETE | `/api/panels/{panel_id}/comments/{id}` | delete a comment |
//!
//! Writes answer with the upstream's echo, or 204 when the upstream has
//! nothing to echo. Failures use `{"error": {"kind", "message", "retry_after"}}`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::Error;
use crate::models::{
    Attachment, Comment, CreateCommentRequest, CreateTaskRequest, Task, UpdateCommentRequest,
    UpdateTaskRequest,
};
use crate::panel::{
    MutationResult, Panel, PanelRegistry, PanelRender, RequestContext, TaskMutation, TaskPanel,
};

type AppState = Arc<PanelRegistry>;

/// Error wrapper that renders as the JSON error body.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(Error::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut error = json!({
            "kind": self.0.kind(),
            "message": self.0.to_string(),
        });
        if let Some(retry_after) = self.0.retry_after() {
            error["retry_after"] = json!(retry_after);
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();
        if let Some(value) = self
            .0
            .retry_after()
            .and_then(|v| HeaderValue::from_str(v).ok())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Build the router over a shared registry.
pub fn router(registry: Arc<PanelRegistry>) -> Router {
    Router::new()
        .route("/api/panels", get(render_all))
        .route("/api/panels/{panel_id}", get(render_panel))
        .route("/api/panels/{panel_id}/tasks", post(create_task))
        .route(
            "/api/panels/{panel_id}/tasks/{id}",
            get(get_task).post(update_task).delete(delete_task),
        )
        .route("/api/panels/{panel_id}/tasks/{id}/close", post(close_task))
        .route("/api/panels/{panel_id}/tasks/{id}/reopen", post(reopen_task))
        .route(
            "/api/panels/{panel_id}/tasks/{id}/comments",
            get(list_comments).post(create_comment),
        )
        .route(
            "/api/panels/{panel_id}/comments/{id}",
            post(update_comment).delete(delete_comment),
        )
        .with_state(registry)
}

fn lookup(registry: &PanelRegistry, panel_id: &str) -> ApiResult<Arc<TaskPanel>> {
    registry.get(panel_id).ok_or(ApiError(Error::NotFound))
}

async fn mutate(panel: &TaskPanel, mutation: TaskMutation) -> ApiResult<Response> {
    let result = panel.mutate(mutation, &RequestContext::new()).await?;
    Ok(match result {
        MutationResult::Done => StatusCode::NO_CONTENT.into_response(),
        echo => Json(echo).into_response(),
    })
}

async fn render_all(State(registry): State<AppState>) -> Json<Vec<PanelRender>> {
    Json(registry.render_all(&RequestContext::new()).await)
}

async fn render_panel(
    State(registry): State<AppState>,
    Path(panel_id): Path<String>,
) -> ApiResult<Json<PanelRender>> {
    let panel = lookup(&registry, &panel_id)?;
    Ok(Json(panel.render_json(&RequestContext::new()).await))
}

async fn create_task(
    State(registry): State<AppState>,
    Path(panel_id): Path<String>,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let panel = lookup(&registry, &panel_id)?;
    let Json(request) = body?;
    mutate(&panel, TaskMutation::CreateTask(request)).await
}

async fn get_task(
    State(registry): State<AppState>,
    Path((panel_id, id)): Path<(String, String)>,
) -> ApiResult<Json<Task>> {
    let panel = lookup(&registry, &panel_id)?;
    Ok(Json(panel.get_task(&id, &RequestContext::new()).await?))
}

async fn update_task(
    State(registry): State<AppState>,
    Path((panel_id, id)): Path<(String, String)>,
    body: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let panel = lookup(&registry, &panel_id)?;
    let Json(request) = body?;
    mutate(&panel, TaskMutation::UpdateTask { id, request }).await
}

async fn close_task(
    State(registry): State<AppState>,
    Path((panel_id, id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let panel = lookup(&registry, &panel_id)?;
    mutate(&panel, TaskMutation::CloseTask { id }).await
}

async fn reopen_task(
    State(registry): State<AppState>,
    Path((panel_id, id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let panel = lookup(&registry, &panel_id)?;
    mutate(&panel, TaskMutation::ReopenTask { id }).await
}

async fn delete_task(
    State(registry): State<AppState>,
    Path((panel_id, id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let panel = lookup(&registry, &panel_id)?;
    mutate(&panel, TaskMutation::DeleteTask { id }).await
}

async fn list_comments(
    State(registry): State<AppState>,
    Path((panel_id, id)): Path<(String, String)>,
) -> ApiResult<Json<Vec<Comment>>> {
    let panel = lookup(&registry, &panel_id)?;
    Ok(Json(panel.list_comments(&id, &RequestContext::new()).await?))
}

/// Comment body for the task-scoped route; the task comes from the path.
#[derive(Debug, Deserialize)]
struct NewComment {
    #[serde(default)]
    content: String,
    #[serde(default)]
    attachment: Option<Attachment>,
}

async fn create_comment(
    State(registry): State<AppState>,
    Path((panel_id, id)): Path<(String, String)>,
    body: Result<Json<NewComment>, JsonRejection>,
) -> ApiResult<Response> {
    let panel = lookup(&registry, &panel_id)?;
    let Json(body) = body?;
    let request = CreateCommentRequest {
        attachment: body.attachment,
        ..CreateCommentRequest::for_task(id, body.content)
    };
    mutate(&panel, TaskMutation::CreateComment(request)).await
}

async fn update_comment(
    State(registry): State<AppState>,
    Path((panel_id, id)): Path<(String, String)>,
    body: Result<Json<UpdateCommentRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let panel = lookup(&registry, &panel_id)?;
    let Json(request) = body?;
    mutate(&panel, TaskMutation::UpdateComment { id, request }).await
}

async fn delete_comment(
    State(registry): State<AppState>,
    Path((panel_id, id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let panel = lookup(&registry, &panel_id)?;
    mutate(&panel, TaskMutation::DeleteComment { id }).await
}
