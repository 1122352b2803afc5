//! The editor's side of a publish, against the proxy served on 127.0.0.1.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use blogpush_core::client::ProxyClient;
use blogpush_core::error::PublishError;
use blogpush_core::frontmatter::FrontmatterDraft;
use blogpush_core::github::{ApiResponse, ContentsApi, Identity, PutFile, RemoteFile, RemoteRef};
use blogpush_core::publish::{PublishRequest, Publisher};
use blogpush_core::session::{EditorSession, MemorySnapshotStore};
use blogpush_core::RepositoryTarget;
use blogpush_server::{
    app, config::Config, cors_layer, handlers::ApiState, image_source::RelayImageSource,
    relay::UploadRelay,
};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeGitHub {
    /// (path, content, sha) in commit order
    puts: Mutex<Vec<(String, Vec<u8>, Option<String>)>>,
    /// path -> sha
    shas: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl ContentsApi for FakeGitHub {
    async fn current_user(&self, _token: &str) -> Result<Identity, PublishError> {
        Ok(Identity {
            login: "jane".into(),
        })
    }

    async fn get_file(&self, _token: &str, file: &RemoteRef) -> Result<RemoteFile, PublishError> {
        let sha = self.shas.lock().unwrap().get(&file.path).cloned().ok_or(
            PublishError::Upstream {
                status: 404,
                message: "Not Found".into(),
            },
        )?;
        Ok(RemoteFile {
            path: file.path.clone(),
            sha,
            content: String::new(),
            encoding: "base64".into(),
        })
    }

    async fn put_file(
        &self,
        _token: &str,
        file: &RemoteRef,
        body: &PutFile,
    ) -> Result<ApiResponse, PublishError> {
        let mut puts = self.puts.lock().unwrap();
        puts.push((
            file.path.clone(),
            STANDARD.decode(&body.content).unwrap(),
            body.sha.clone(),
        ));
        let sha = format!("sha-{}", puts.len());
        self.shas
            .lock()
            .unwrap()
            .insert(file.path.clone(), sha.clone());
        Ok(ApiResponse {
            status: 201,
            body: json!({
                "content": {"path": file.path, "sha": sha},
                "commit": {"sha": format!("c{}", puts.len())}
            }),
        })
    }
}

struct Proxy {
    client: ProxyClient,
    github: Arc<FakeGitHub>,
    relay: Arc<UploadRelay>,
    _dir: tempfile::TempDir,
}

async fn spawn_proxy() -> Proxy {
    let dir = tempfile::tempdir().unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let config = Config {
        upload_dir: dir.path().to_path_buf(),
        public_base_url: base.clone(),
        ..Config::default()
    };
    let relay = Arc::new(
        UploadRelay::new(&config.upload_dir, config.upload_ttl)
            .await
            .unwrap(),
    );
    let github = Arc::new(FakeGitHub::default());
    let publisher = Publisher::new(
        github.clone(),
        Arc::new(RelayImageSource::new(relay.clone())),
        config.publisher_config(),
    );
    let state = ApiState {
        publisher,
        relay: relay.clone(),
        max_upload_bytes: config.max_upload_bytes,
    };
    let router = app(state, cors_layer(&config.cors_origins));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Proxy {
        client: ProxyClient::new(base).with_token("user-token"),
        github,
        relay,
        _dir: dir,
    }
}

fn draft() -> FrontmatterDraft {
    let mut draft = FrontmatterDraft {
        author: "jane".into(),
        title: "Hello World".into(),
        slug: "hello-world".into(),
        tags: "rust, blog".into(),
        description: "first post".into(),
        ..FrontmatterDraft::default()
    };
    draft.stamp_now();
    draft
}

#[tokio::test]
async fn upload_compose_and_push() {
    let proxy = spawn_proxy().await;
    let png = b"\x89PNG\r\n\x1a\nfake".to_vec();

    let path = proxy
        .client
        .upload_image("cat.png", png.clone(), Some("image/png"))
        .await
        .unwrap();
    assert!(path.starts_with("/uploads/"));
    assert!(path.ends_with("-cat.png"));
    let file_name = path.trim_start_matches("/uploads/").to_string();
    assert_eq!(std::fs::read(proxy.relay.dir().join(&file_name)).unwrap(), png);

    let now = Utc::now();
    let mut session = EditorSession::open(MemorySnapshotStore::new(), now).unwrap();
    let image_url = proxy.client.url(&path);
    session.insert_uploaded_image(&image_url, now).unwrap();
    session.insert_frontmatter(&draft(), now).unwrap();
    assert!(session.text().starts_with("---\nauthor: jane\n"));
    assert!(session.text().ends_with(&format!("![uploaded image]({image_url})")));

    let req = session
        .publish_request(&RepositoryTarget::default(), Some("first post".into()))
        .unwrap();
    assert_eq!(req.file_path, "src/data/blog/Hello_World.md");
    assert_eq!(req.sha, None);

    let resp = proxy.client.push(&req).await.unwrap();
    assert!(resp.success);
    assert_eq!(resp.commit_sha(), Some("c2"));

    let puts = proxy.github.puts.lock().unwrap().clone();
    assert_eq!(puts.len(), 2);
    assert_eq!(puts[0].0, format!("src/data/images/{file_name}"));
    assert_eq!(puts[0].1, png);
    assert_eq!(puts[1].0, "src/data/blog/Hello_World.md");

    let committed = String::from_utf8(puts[1].1.clone()).unwrap();
    let permanent = format!(
        "https://github.com/jane/astro-paper/blob/main/src/data/images/{file_name}?raw=true"
    );
    assert!(committed.contains(&format!("![uploaded image]({permanent})")));
    assert!(!committed.contains(&image_url));
    assert!(committed.contains("## Table of contents"));
}

#[tokio::test]
async fn modify_sends_revision_marker() {
    let proxy = spawn_proxy().await;
    let now = Utc::now();
    let mut session = EditorSession::open(MemorySnapshotStore::new(), now).unwrap();
    session.insert_frontmatter(&draft(), now).unwrap();
    let req = session
        .publish_request(&RepositoryTarget::default(), None)
        .unwrap();
    proxy.client.push(&req).await.unwrap();

    let edited = PublishRequest {
        content: format!("{}\nMore text.", req.content),
        sha: Some("sha-1".into()),
        ..req.clone()
    };
    let resp = proxy.client.modify(&edited).await.unwrap();
    assert!(resp.success);
    assert_eq!(resp.commit_sha(), Some("c2"));

    let puts = proxy.github.puts.lock().unwrap().clone();
    assert_eq!(puts[1].2.as_deref(), Some("sha-1"));
    assert!(String::from_utf8(puts[1].1.clone()).unwrap().ends_with("More text."));

    let stale = PublishRequest {
        sha: Some("sha-1".into()),
        ..edited
    };
    let err = proxy.client.modify(&stale).await.unwrap_err();
    assert!(matches!(err, PublishError::Upstream { status: 409, .. }));
}
