//! Editor-side client for the upload proxy.

use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::info;

use crate::error::{PublishError, UploadError};
use crate::publish::PublishRequest;

/// Response of `POST /api/upload` and `POST /api/modify`.
#[derive(Debug, Clone, Deserialize)]
pub struct PushResponse {
    /// Always `true` on a 2xx response
    pub success: bool,
    /// Upstream commit descriptor
    pub data: serde_json::Value,
}

impl PushResponse {
    /// SHA of the commit, if upstream reported one.
    pub fn commit_sha(&self) -> Option<&str> {
        self.data.pointer("/commit/sha").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct ImageUploadResponse {
    url: String,
}

/// Resolve the MIME type of an upload and require it to be an image.
///
/// The declared content type wins; without one the type is guessed from the
/// file name.
pub fn image_mime(file_name: &str, declared: Option<&str>) -> Result<String, UploadError> {
    let mime = declared
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .or_else(|| {
            mime_guess::from_path(file_name)
                .first()
                .map(|m| m.essence_str().to_string())
        });
    match mime {
        Some(mime) if mime.starts_with("image/") => Ok(mime),
        Some(mime) => Err(UploadError::NotAnImage(format!("{file_name}: {mime}"))),
        None => Err(UploadError::NotAnImage(file_name.to_string())),
    }
}

/// Talks to a running upload proxy.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ProxyClient {
    /// Create a client for the proxy at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Send `token` as the bearer credential instead of relying on the
    /// proxy's fallback token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Absolute URL for a path returned by the proxy.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_publish(
        &self,
        endpoint: &str,
        req: &PublishRequest,
    ) -> Result<PushResponse, PublishError> {
        let mut builder = self.client.post(self.url(endpoint)).json(req);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await?;
            return Err(PublishError::Upstream {
                status: status.as_u16(),
                message,
            });
        }
        let body: PushResponse = resp.json().await?;
        info!(
            "Pushed {} (commit {})",
            req.file_path,
            body.commit_sha().unwrap_or("unknown")
        );
        Ok(body)
    }

    /// `POST /api/upload`: publish a new post.
    pub async fn push(&self, req: &PublishRequest) -> Result<PushResponse, PublishError> {
        self.post_publish("/api/upload", req).await
    }

    /// `POST /api/modify`: update an existing post. `req.sha` is required.
    pub async fn modify(&self, req: &PublishRequest) -> Result<PushResponse, PublishError> {
        if req.sha.as_deref().is_none_or(str::is_empty) {
            return Err(PublishError::InvalidTarget("sha"));
        }
        self.post_publish("/api/modify", req).await
    }

    /// `POST /api/upload/image`: hand an image to the relay.
    ///
    /// Non-image content is rejected before anything is sent. Returns the
    /// relay path (`/uploads/...`).
    pub async fn upload_image(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String, UploadError> {
        let mime = image_mime(file_name, content_type)?;
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(&mime)?;
        let form = Form::new().part("file", part);

        let resp = self
            .client
            .post(self.url("/api/upload/image"))
            .multipart(form)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body: resp.text().await?,
            });
        }
        Ok(resp.json::<ImageUploadResponse>().await?.url)
    }
}
