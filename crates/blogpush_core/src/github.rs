//! GitHub Contents API access.
//!
//! The publish pipeline and the editor session only see [`ContentsApi`], so
//! tests can substitute an in-memory fake for GitHub.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PublishError;

/// Default REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Host used when building permanent file URLs.
pub const DEFAULT_WEB_HOST: &str = "github.com";

const ACCEPT: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("blogpush/", env!("CARGO_PKG_VERSION"));

/// The account a token belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identity {
    /// Account login, used as the repository owner
    pub login: String,
}

/// Identifies one file in a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRef {
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Path inside the repository
    pub path: String,
}

/// A file as returned by `GET /repos/{owner}/{repo}/contents/{path}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFile {
    /// Path inside the repository
    pub path: String,
    /// Revision marker of this version of the file
    pub sha: String,
    /// Encoded content
    #[serde(default)]
    pub content: String,
    /// Content encoding, `base64` for regular files
    #[serde(default)]
    pub encoding: String,
}

impl RemoteFile {
    /// Decode the file content. GitHub wraps its Base64 output, so whitespace
    /// is dropped before decoding.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let compact: String = self
            .content
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        STANDARD.decode(compact)
    }
}

/// Body of a create-or-update request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PutFile {
    /// Commit message
    pub message: String,
    /// Base64 file content
    pub content: String,
    /// Revision marker of the file being replaced; absent when creating
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

impl PutFile {
    /// Encode `bytes` into a request body.
    pub fn new(message: impl Into<String>, bytes: &[u8], sha: Option<String>) -> Self {
        Self {
            message: message.into(),
            content: STANDARD.encode(bytes),
            sha,
        }
    }
}

/// Raw upstream response, passed back unchanged to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status
    pub status: u16,
    /// JSON body, or the body text as a JSON string if it was not JSON
    pub body: serde_json::Value,
}

impl ApiResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The subset of the GitHub REST API blogpush talks to.
#[async_trait]
pub trait ContentsApi: Send + Sync {
    /// `GET /user`
    async fn current_user(&self, token: &str) -> Result<Identity, PublishError>;

    /// `GET /repos/{owner}/{repo}/contents/{path}`
    async fn get_file(&self, token: &str, file: &RemoteRef) -> Result<RemoteFile, PublishError>;

    /// `PUT /repos/{owner}/{repo}/contents/{path}`
    ///
    /// Non-2xx statuses are returned, not raised; the caller decides which
    /// error they become.
    async fn put_file(
        &self,
        token: &str,
        file: &RemoteRef,
        body: &PutFile,
    ) -> Result<ApiResponse, PublishError>;
}

/// [`ContentsApi`] over HTTPS.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    api_url: String,
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

impl GitHubClient {
    /// Create a client for the API rooted at `api_url`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn contents_url(&self, file: &RemoteRef) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_url,
            file.owner,
            file.repo,
            file.path.trim_start_matches('/')
        )
    }

    fn request(&self, method: reqwest::Method, url: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
    }
}

async fn read_response(resp: reqwest::Response) -> Result<ApiResponse, PublishError> {
    let status = resp.status().as_u16();
    let text = resp.text().await?;
    let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
    Ok(ApiResponse { status, body })
}

fn upstream_message(body: &serde_json::Value) -> String {
    body.get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl ContentsApi for GitHubClient {
    async fn current_user(&self, token: &str) -> Result<Identity, PublishError> {
        let url = format!("{}/user", self.api_url);
        let resp = read_response(self.request(reqwest::Method::GET, &url, token).send().await?)
            .await?;
        if !resp.is_success() {
            return Err(PublishError::Upstream {
                status: resp.status,
                message: upstream_message(&resp.body),
            });
        }
        serde_json::from_value(resp.body).map_err(|e| PublishError::Upstream {
            status: 200,
            message: format!("identity response without login: {e}"),
        })
    }

    async fn get_file(&self, token: &str, file: &RemoteRef) -> Result<RemoteFile, PublishError> {
        let url = self.contents_url(file);
        debug!("GET {}", url);
        let resp = read_response(self.request(reqwest::Method::GET, &url, token).send().await?)
            .await?;
        if !resp.is_success() {
            return Err(PublishError::Upstream {
                status: resp.status,
                message: upstream_message(&resp.body),
            });
        }
        serde_json::from_value(resp.body).map_err(|e| PublishError::Upstream {
            status: 200,
            message: format!("{} is not a file: {e}", file.path),
        })
    }

    async fn put_file(
        &self,
        token: &str,
        file: &RemoteRef,
        body: &PutFile,
    ) -> Result<ApiResponse, PublishError> {
        let url = self.contents_url(file);
        debug!("PUT {} (update: {})", url, body.sha.is_some());
        let resp = self
            .request(reqwest::Method::PUT, &url, token)
            .json(body)
            .send()
            .await?;
        read_response(resp).await
    }
}
