//! Integration tests for the upstream client against a fake task service.

mod common;

use std::time::Duration;

use common::{FakeUpstream, TOKEN, task};
use panelkeeper::models::{CreateCommentRequest, CreateTaskRequest, TaskQuery, UpdateTaskRequest};
use panelkeeper::upstream::{ClientOptions, UpstreamClient};
use panelkeeper::{Error, ErrorKind};

#[tokio::test]
async fn test_list_tasks_forwards_query() {
    let fake = FakeUpstream::start().await;
    let mut pinned = task("1", "in project", 1);
    pinned.project_id = Some("p1".into());
    fake.add_task(pinned);
    fake.add_task(task("2", "elsewhere", 1));

    let client = fake.client();
    let query = TaskQuery {
        project_id: Some("p1".into()),
        filter: Some("today | overdue".into()),
        ids: vec!["1".into(), "2".into()],
        ..TaskQuery::default()
    };
    let tasks = client.list_tasks(&query).await.unwrap();

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, "1");
    let sent = fake.last_query();
    assert_eq!(sent["project_id"], "p1");
    assert_eq!(sent["filter"], "today | overdue");
    assert_eq!(sent["ids"], "1,2");
    assert!(!sent.contains_key("label"));
}

#[tokio::test]
async fn test_wrong_token_is_auth_error() {
    let fake = FakeUpstream::start().await;
    let client = UpstreamClient::new(
        "not-the-token",
        ClientOptions {
            base_url: fake.base_url.clone(),
            ..ClientOptions::default()
        },
    )
    .unwrap();
    assert_eq!(client.list_projects().await.unwrap_err(), Error::Auth);
}

#[tokio::test]
async fn test_status_codes_map_to_error_kinds() {
    let fake = FakeUpstream::start().await;
    let client = fake.client();

    let cases = [
        (401, ErrorKind::Auth),
        (403, ErrorKind::Permission),
        (404, ErrorKind::NotFound),
        (429, ErrorKind::RateLimited),
        (500, ErrorKind::UpstreamUnavailable),
        (503, ErrorKind::UpstreamUnavailable),
        (418, ErrorKind::UpstreamUnavailable),
    ];
    for (status, kind) in cases {
        fake.respond_with(status, None, "nope");
        let err = client.list_labels().await.unwrap_err();
        assert_eq!(err.kind(), kind, "status {status}");
    }
}

#[tokio::test]
async fn test_rate_limited_carries_retry_after() {
    let fake = FakeUpstream::start().await;
    fake.respond_with(429, Some("17"), "too many requests");

    let err = fake.client().list_tasks(&TaskQuery::default()).await.unwrap_err();
    assert_eq!(
        err,
        Error::RateLimited {
            retry_after: Some("17".into()),
            body: "too many requests".into(),
        }
    );
    assert_eq!(err.retry_after(), Some("17"));
}

#[tokio::test]
async fn test_server_error_keeps_status_and_body() {
    let fake = FakeUpstream::start().await;
    fake.respond_with(502, None, "bad gateway");

    match fake.client().list_projects().await.unwrap_err() {
        Error::UpstreamUnavailable { status, body, .. } => {
            assert_eq!(status, Some(502));
            assert_eq!(body.as_deref(), Some("bad gateway"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_undecodable_body_is_malformed() {
    let fake = FakeUpstream::start().await;
    fake.respond_with(200, None, "<html>definitely not json</html>");

    let err = fake.client().list_tasks(&TaskQuery::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedResponse);
}

#[tokio::test]
async fn test_timeout_is_upstream_unavailable() {
    let fake = FakeUpstream::start().await;
    fake.set_delay(Duration::from_millis(500));

    let client = fake.client_with(ClientOptions {
        base_url: fake.base_url.clone(),
        timeout: Duration::from_millis(50),
        ..ClientOptions::default()
    });
    let err = client.list_projects().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
}

#[tokio::test]
async fn test_connection_refused_is_upstream_unavailable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = UpstreamClient::new(
        TOKEN,
        ClientOptions {
            base_url: format!("http://{addr}"),
            ..ClientOptions::default()
        },
    )
    .unwrap();
    let err = client.list_labels().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
}

#[tokio::test]
async fn test_invalid_input_never_hits_network() {
    let fake = FakeUpstream::start().await;
    let client = fake.client();

    let err = client
        .create_task(&CreateTaskRequest::new("   "))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let bad_priority = CreateTaskRequest {
        priority: Some(7),
        ..CreateTaskRequest::new("ok")
    };
    assert_eq!(
        client.create_task(&bad_priority).await.unwrap_err().kind(),
        ErrorKind::Validation
    );

    let orphan_comment = CreateCommentRequest {
        content: "floating".into(),
        ..CreateCommentRequest::default()
    };
    assert_eq!(
        client.create_comment(&orphan_comment).await.unwrap_err().kind(),
        ErrorKind::Validation
    );

    assert_eq!(
        client.close_task("../projects").await.unwrap_err().kind(),
        ErrorKind::Validation
    );

    assert_eq!(fake.hits(), 0);
    assert_eq!(client.request_count(), 0);
}

#[tokio::test]
async fn test_task_lifecycle() {
    let fake = FakeUpstream::start().await;
    let client = fake.client();

    let created = client
        .create_task(&CreateTaskRequest {
            priority: Some(4),
            ..CreateTaskRequest::new("write tests")
        })
        .await
        .unwrap();
    assert_eq!(created.content, "write tests");
    assert_eq!(created.priority, 4);

    let updated = client
        .update_task(
            &created.id,
            &UpdateTaskRequest {
                content: Some("write more tests".into()),
                ..UpdateTaskRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.content, "write more tests");

    client.close_task(&created.id).await.unwrap();
    assert!(fake.task(&created.id).unwrap().is_completed);
    client.reopen_task(&created.id).await.unwrap();
    assert!(!fake.task(&created.id).unwrap().is_completed);

    client.delete_task(&created.id).await.unwrap();
    assert_eq!(client.get_task(&created.id).await.unwrap_err(), Error::NotFound);
}

#[tokio::test]
async fn test_comment_lifecycle() {
    let fake = FakeUpstream::start().await;
    fake.add_task(task("42", "discuss", 1));
    let client = fake.client();

    let comment = client
        .create_comment(&CreateCommentRequest::for_task("42", "first!"))
        .await
        .unwrap();
    assert_eq!(comment.task_id.as_deref(), Some("42"));

    let listed = client.list_task_comments("42").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].content, "first!");

    client.delete_comment(&comment.id).await.unwrap();
    assert!(client.list_task_comments("42").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_request_count_tracks_every_call() {
    let fake = FakeUpstream::start().await;
    let client = fake.client();

    client.list_projects().await.unwrap();
    client.list_labels().await.unwrap();
    fake.respond_with(500, None, "boom");
    client.list_labels().await.unwrap_err();

    assert_eq!(client.request_count(), 3);
    assert_eq!(fake.hits(), 3);
}
