//! `GitHubClient` against a stub GitHub served from 127.0.0.1.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};
use blogpush_core::error::PublishError;
use blogpush_core::github::{ContentsApi, GitHubClient, PutFile, RemoteRef};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Recorded {
    requests: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn user(headers: HeaderMap) -> impl IntoResponse {
    match bearer(&headers).as_deref() {
        Some("Bearer good") => (StatusCode::OK, Json(json!({"login": "jane", "id": 1}))),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Bad credentials"})),
        ),
    }
}

async fn get_contents(
    Path((owner, repo, path)): Path<(String, String, String)>,
) -> impl IntoResponse {
    if path == "blog/a.md" {
        (
            StatusCode::OK,
            Json(json!({
                "path": path,
                "sha": "abc",
                "encoding": "base64",
                "content": "IyBIZWxs\nbw==\n",
                "owner": owner,
                "repo": repo
            })),
        )
    } else {
        (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"})))
    }
}

async fn put_contents(
    State(state): State<Recorded>,
    Path((_owner, _repo, path)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state
        .requests
        .lock()
        .unwrap()
        .push((path.clone(), bearer(&headers), body.clone()));
    if path.starts_with("locked/") {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"message": "Invalid request"})),
        );
    }
    (
        StatusCode::CREATED,
        Json(json!({"content": {"path": path}, "commit": {"sha": "c0ffee"}})),
    )
}

async fn spawn_stub() -> (String, Recorded) {
    let state = Recorded::default();
    let app = Router::new()
        .route("/user", get(user))
        .route(
            "/repos/{owner}/{repo}/contents/{*path}",
            get(get_contents).put(put_contents),
        )
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

fn file(path: &str) -> RemoteRef {
    RemoteRef {
        owner: "jane".into(),
        repo: "site".into(),
        path: path.into(),
    }
}

#[tokio::test]
async fn current_user_reads_login() {
    let (base, _) = spawn_stub().await;
    let client = GitHubClient::new(base);
    assert_eq!(client.current_user("good").await.unwrap().login, "jane");

    let err = client.current_user("bad").await.unwrap_err();
    match err {
        PublishError::Upstream { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Bad credentials");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn get_file_returns_revision_and_content() {
    let (base, _) = spawn_stub().await;
    let client = GitHubClient::new(base);
    let remote = client.get_file("good", &file("blog/a.md")).await.unwrap();
    assert_eq!(remote.sha, "abc");
    assert_eq!(remote.decode().unwrap(), b"# Hello");

    let missing = client.get_file("good", &file("blog/b.md")).await;
    assert!(matches!(
        missing,
        Err(PublishError::Upstream { status: 404, .. })
    ));
}

#[tokio::test]
async fn put_file_sends_bearer_and_body() {
    let (base, recorded) = spawn_stub().await;
    let client = GitHubClient::new(base);

    let resp = client
        .put_file(
            "good",
            &file("src/data/images/1-a.png"),
            &PutFile::new("upload image 1-a.png", b"png", None),
        )
        .await
        .unwrap();
    assert!(resp.is_success());
    assert_eq!(resp.status, 201);
    assert_eq!(resp.body["commit"]["sha"], "c0ffee");

    client
        .put_file(
            "good",
            &file("blog/a.md"),
            &PutFile::new("edit", b"# Hi", Some("abc".into())),
        )
        .await
        .unwrap();

    let requests = recorded.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].0, "src/data/images/1-a.png");
    assert_eq!(requests[0].1.as_deref(), Some("Bearer good"));
    assert_eq!(
        requests[0].2,
        json!({"message": "upload image 1-a.png", "content": "cG5n"})
    );
    assert_eq!(requests[1].2["sha"], "abc");
}

#[tokio::test]
async fn put_file_passes_failures_through() {
    let (base, _) = spawn_stub().await;
    let client = GitHubClient::new(base);
    let resp = client
        .put_file("good", &file("locked/a.md"), &PutFile::new("m", b"x", None))
        .await
        .unwrap();
    assert!(!resp.is_success());
    assert_eq!(resp.status, 422);
    assert_eq!(resp.body, json!({"message": "Invalid request"}));
}
