//! Common test utilities for panelkeeper integration tests.
//!
//! Provides `FakeUpstream`, an in-process stand-in for the task service that
//! listens on an ephemeral port. Tests point a real `UpstreamClient` at it and
//! can script failures, latency and canned responses.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use panelkeeper::config::PanelConfig;
use panelkeeper::models::{Comment, Due, Label, Project, Task};
use panelkeeper::upstream::{ClientOptions, UpstreamClient};

/// Bearer token the fake accepts.
pub const TOKEN: &str = "test-token";

#[derive(Debug, Clone)]
struct Canned {
    status: u16,
    retry_after: Option<String>,
    body: String,
}

#[derive(Default)]
pub struct FakeState {
    tasks: Mutex<Vec<Task>>,
    comments: Mutex<Vec<Comment>>,
    projects: Mutex<Vec<Project>>,
    labels: Mutex<Vec<Label>>,
    canned: Mutex<Option<Canned>>,
    delay: Mutex<Duration>,
    next_id: AtomicU64,
    hits: AtomicUsize,
    task_lists: AtomicUsize,
    last_query: Mutex<HashMap<String, String>>,
    last_create: Mutex<Option<Value>>,
}

impl FakeState {
    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}{}", 100 + self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

type Shared = Arc<FakeState>;

/// A running fake upstream.
pub struct FakeUpstream {
    pub base_url: String,
    pub state: Shared,
}

impl FakeUpstream {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(FakeState::default());

        let app = Router::new()
            .route("/tasks", get(list_tasks).post(create_task))
            .route(
                "/tasks/{id}",
                get(get_task).post(update_task).delete(delete_task),
            )
            .route("/tasks/{id}/close", post(close_task))
            .route("/tasks/{id}/reopen", post(reopen_task))
            .route("/projects", get(list_projects))
            .route("/labels", get(list_labels))
            .route("/comments", get(list_comments).post(create_comment))
            .route(
                "/comments/{id}",
                post(update_comment).delete(delete_comment),
            )
            .layer(middleware::from_fn_with_state(Arc::clone(&state), gate))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    /// Panel config pointed at this fake with the accepted token.
    pub fn panel_config(&self) -> PanelConfig {
        PanelConfig {
            base_url: self.base_url.clone(),
            ..PanelConfig::new(TOKEN)
        }
    }

    pub fn client(&self) -> UpstreamClient {
        self.client_with(ClientOptions {
            base_url: self.base_url.clone(),
            ..ClientOptions::default()
        })
    }

    pub fn client_with(&self, options: ClientOptions) -> UpstreamClient {
        UpstreamClient::new(TOKEN, options).unwrap()
    }

    pub fn add_task(&self, task: Task) {
        self.state.tasks.lock().unwrap().push(task);
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.state
            .tasks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    pub fn set_projects(&self, projects: Vec<Project>) {
        *self.state.projects.lock().unwrap() = projects;
    }

    pub fn set_labels(&self, labels: Vec<Label>) {
        *self.state.labels.lock().unwrap() = labels;
    }

    /// Answer every request with this status and body until `recover`.
    pub fn respond_with(&self, status: u16, retry_after: Option<&str>, body: &str) {
        *self.state.canned.lock().unwrap() = Some(Canned {
            status,
            retry_after: retry_after.map(String::from),
            body: body.to_string(),
        });
    }

    pub fn recover(&self) {
        *self.state.canned.lock().unwrap() = None;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = delay;
    }

    /// Every request that reached the fake, including rejected ones.
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// Successful `GET /tasks` calls.
    pub fn task_lists(&self) -> usize {
        self.state.task_lists.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> HashMap<String, String> {
        self.state.last_query.lock().unwrap().clone()
    }

    pub fn last_create(&self) -> Option<Value> {
        self.state.last_create.lock().unwrap().clone()
    }
}

/// Build a task record the way the upstream would return it.
pub fn task(id: &str, content: &str, priority: u8) -> Task {
    let mut task = Task::new(id, content);
    task.priority = priority;
    task
}

pub fn due(task: Task, date: &str) -> Task {
    Task {
        due: Some(Due::on(date.parse().unwrap())),
        ..task
    }
}

pub fn project(id: &str, name: &str) -> Project {
    serde_json::from_value(json!({ "id": id, "name": name })).unwrap()
}

pub fn label(id: &str, name: &str) -> Label {
    serde_json::from_value(json!({ "id": id, "name": name })).unwrap()
}

async fn gate(State(state): State<Shared>, request: Request, next: Next) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let delay = *state.delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let expected = format!("Bearer {TOKEN}");
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(expected.as_str());
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "Forbidden").into_response();
    }

    let canned = state.canned.lock().unwrap().clone();
    if let Some(canned) = canned {
        let mut response = (
            StatusCode::from_u16(canned.status).unwrap(),
            canned.body,
        )
            .into_response();
        if let Some(retry_after) = canned.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, retry_after.parse().unwrap());
        }
        return response;
    }

    next.run(request).await
}

async fn list_tasks(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Vec<Task>> {
    state.task_lists.fetch_add(1, Ordering::SeqCst);
    *state.last_query.lock().unwrap() = query.clone();

    let tasks = state
        .tasks
        .lock()
        .unwrap()
        .iter()
        .filter(|t| !t.is_completed)
        .filter(|t| {
            query
                .get("project_id")
                .is_none_or(|p| t.project_id.as_deref() == Some(p.as_str()))
        })
        .cloned()
        .collect();
    Json(tasks)
}

async fn get_task(
    State(state): State<Shared>,
    Path(id): Path<String>,
) -> Result<Json<Task>, StatusCode> {
    state
        .tasks
        .lock()
        .unwrap()
        .iter()
        .find(|t| t.id == id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn create_task(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Task> {
    *state.last_create.lock().unwrap() = Some(body.clone());

    let mut task = Task::new(
        state.next_id("t"),
        body["content"].as_str().unwrap_or_default(),
    );
    if let Some(priority) = body["priority"].as_u64() {
        task.priority = priority as u8;
    }
    task.project_id = body["project_id"].as_str().map(String::from);
    task.section_id = body["section_id"].as_str().map(String::from);
    task.parent_id = body["parent_id"].as_str().map(String::from);
    task.labels = body["labels"]
        .as_array()
        .map(|labels| {
            labels
                .iter()
                .filter_map(|l| l.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    if let Some(date) = body["due_date"].as_str() {
        task.due = date.parse().ok().map(Due::on);
    }

    state.tasks.lock().unwrap().push(task.clone());
    Json(task)
}

async fn update_task(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Task>, StatusCode> {
    let mut tasks = state.tasks.lock().unwrap();
    let task = tasks
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or(StatusCode::NOT_FOUND)?;
    if let Some(content) = body["content"].as_str() {
        task.content = content.to_string();
    }
    if let Some(priority) = body["priority"].as_u64() {
        task.priority = priority as u8;
    }
    Ok(Json(task.clone()))
}

fn set_completed(state: &FakeState, id: &str, done: bool) -> StatusCode {
    let mut tasks = state.tasks.lock().unwrap();
    match tasks.iter_mut().find(|t| t.id == id) {
        Some(task) => {
            task.is_completed = done;
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn close_task(State(state): State<Shared>, Path(id): Path<String>) -> StatusCode {
    set_completed(&state, &id, true)
}

async fn reopen_task(State(state): State<Shared>, Path(id): Path<String>) -> StatusCode {
    set_completed(&state, &id, false)
}

async fn delete_task(State(state): State<Shared>, Path(id): Path<String>) -> StatusCode {
    let mut tasks = state.tasks.lock().unwrap();
    let before = tasks.len();
    tasks.retain(|t| t.id != id);
    if tasks.len() < before {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn list_projects(State(state): State<Shared>) -> Json<Vec<Project>> {
    Json(state.projects.lock().unwrap().clone())
}

async fn list_labels(State(state): State<Shared>) -> Json<Vec<Label>> {
    Json(state.labels.lock().unwrap().clone())
}

async fn list_comments(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Vec<Comment>> {
    let task_id = query.get("task_id").cloned();
    let comments = state
        .comments
        .lock()
        .unwrap()
        .iter()
        .filter(|c| task_id.is_none() || c.task_id == task_id)
        .cloned()
        .collect();
    Json(comments)
}

async fn create_comment(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Comment> {
    let comment: Comment = serde_json::from_value(json!({
        "id": state.next_id("c"),
        "content": body["content"],
        "task_id": body["task_id"],
        "project_id": body["project_id"],
    }))
    .unwrap();
    state.comments.lock().unwrap().push(comment.clone());
    Json(comment)
}

async fn update_comment(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Comment>, StatusCode> {
    let mut comments = state.comments.lock().unwrap();
    let comment = comments
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or(StatusCode::NOT_FOUND)?;
    if let Some(content) = body["content"].as_str() {
        comment.content = content.to_string();
    }
    Ok(Json(comment.clone()))
}

async fn delete_comment(State(state): State<Shared>, Path(id): Path<String>) -> StatusCode {
    let mut comments = state.comments.lock().unwrap();
    let before = comments.len();
    comments.retain(|c| c.id != id);
    if comments.len() < before {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
