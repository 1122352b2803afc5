//! The publish pipeline.
//!
//! One call to [`Publisher::publish`] commits a post to a repository:
//!
//! 1. resolve the acting account from the bearer token (or the configured
//!    fallback token),
//! 2. re-commit every image served by the upload relay into the repository's
//!    image directory and point the markdown at the committed copies,
//! 3. commit the rewritten markdown, creating the file or updating it when a
//!    revision marker is supplied.
//!
//! Every upstream call is awaited before the next one starts. Image commits
//! that succeeded stay committed if a later step fails.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::PublishError;
use crate::frontmatter;
use crate::github::{ContentsApi, DEFAULT_WEB_HOST, PutFile, RemoteRef};
use crate::images::{self, LOCAL_SEGMENT};

/// Commit message used when the request carries none.
pub const DEFAULT_MESSAGE: &str = "upload via webapp";

/// Where posts and their images go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryTarget {
    /// Repository name (the owner comes from the token)
    pub repo_name: String,
    /// Directory for markdown files
    pub content_dir: String,
    /// Directory for images
    pub image_dir: String,
}

impl Default for RepositoryTarget {
    fn default() -> Self {
        Self {
            repo_name: "astro-paper".to_string(),
            content_dir: "src/data/blog".to_string(),
            image_dir: "src/data/images".to_string(),
        }
    }
}

impl RepositoryTarget {
    /// Reject targets with a blank repository or content directory.
    pub fn validate(&self) -> Result<(), PublishError> {
        if self.repo_name.trim().is_empty() {
            return Err(PublishError::InvalidTarget("repoName"));
        }
        if self.content_dir.trim().is_empty() {
            return Err(PublishError::InvalidTarget("repoPath"));
        }
        Ok(())
    }
}

/// Repository path for a post: `content_dir/stem.md`.
pub fn commit_path(content_dir: &str, stem: &str) -> String {
    let dir = content_dir.trim_end_matches('/');
    if dir.is_empty() {
        format!("{stem}.md")
    } else {
        format!("{dir}/{stem}.md")
    }
}

/// Body of `POST /api/upload` and `POST /api/modify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    /// Repository path of the markdown file
    pub file_path: String,
    /// Repository directory for images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    /// Repository name
    pub repo_name: String,
    /// Markdown text
    pub content: String,
    /// Commit message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Revision marker; present only when updating an existing file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

impl PublishRequest {
    /// Validate `text` and build the request that publishes it to `target`.
    pub fn from_document(
        text: &str,
        target: &RepositoryTarget,
        message: Option<String>,
        sha: Option<String>,
    ) -> Result<Self, PublishError> {
        let fm = frontmatter::validate(text)?;
        target.validate()?;
        let image_path = Some(target.image_dir.trim().to_string()).filter(|p| !p.is_empty());
        Ok(Self {
            file_path: commit_path(&target.content_dir, &fm.file_stem()),
            image_path,
            repo_name: target.repo_name.clone(),
            content: text.to_string(),
            message,
            sha,
        })
    }
}

/// Source of image bytes for locally hosted images.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Fetch the image at `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PublishError>;
}

/// [`ImageSource`] that downloads over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpImageSource {
    client: Client,
}

impl HttpImageSource {
    /// Create a new source.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PublishError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PublishError::Upstream {
                status: status.as_u16(),
                message: format!("failed to fetch image {url}"),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Settings fixed when the [`Publisher`] is built.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Token used when a request carries no bearer token
    pub fallback_token: Option<String>,
    /// Host of permanent image URLs
    pub web_host: String,
    /// Path segment that marks a locally hosted image
    pub local_segment: String,
    /// Base URL that relative image URLs are resolved against
    pub relay_base_url: Option<String>,
    /// Check the remote revision marker before an update commit
    pub verify_revision: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            fallback_token: None,
            web_host: DEFAULT_WEB_HOST.to_string(),
            local_segment: LOCAL_SEGMENT.to_string(),
            relay_base_url: None,
            verify_revision: true,
        }
    }
}

/// An image moved from the relay into the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushedImage {
    /// URL as written in the markdown
    pub original_url: String,
    /// Repository path of the committed image
    pub path: String,
    /// URL that replaced `original_url`
    pub permanent_url: String,
}

/// Result of a successful publish.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    /// Repository owner the commits went to
    pub owner: String,
    /// Images committed before the markdown
    pub images: Vec<PushedImage>,
    /// Markdown as committed
    pub content: String,
    /// Upstream commit descriptor of the markdown commit
    pub commit: serde_json::Value,
}

impl PublishOutcome {
    /// SHA of the markdown commit, if upstream reported one.
    pub fn commit_sha(&self) -> Option<&str> {
        self.commit.pointer("/commit/sha").and_then(|v| v.as_str())
    }
}

/// Runs the publish pipeline against a [`ContentsApi`].
#[derive(Clone)]
pub struct Publisher {
    api: Arc<dyn ContentsApi>,
    images: Arc<dyn ImageSource>,
    config: PublisherConfig,
}

impl Publisher {
    /// Create a publisher.
    pub fn new(
        api: Arc<dyn ContentsApi>,
        images: Arc<dyn ImageSource>,
        config: PublisherConfig,
    ) -> Self {
        Self {
            api,
            images,
            config,
        }
    }

    /// Settings this publisher was built with.
    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Pick the request's bearer token, falling back to the configured one.
    pub fn resolve_token<'a>(&'a self, bearer: Option<&'a str>) -> Result<&'a str, PublishError> {
        bearer
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or_else(|| {
                self.config
                    .fallback_token
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
            })
            .ok_or(PublishError::AuthRequired)
    }

    fn resolve_image_url(&self, url: &str) -> String {
        match &self.config.relay_base_url {
            Some(base) if url.starts_with('/') => {
                format!("{}{}", base.trim_end_matches('/'), url)
            }
            _ => url.to_string(),
        }
    }

    /// Publish `req`, creating the file or, when `req.sha` is set, updating it.
    pub async fn publish(
        &self,
        bearer: Option<&str>,
        req: &PublishRequest,
    ) -> Result<PublishOutcome, PublishError> {
        let token = self.resolve_token(bearer)?;
        if req.repo_name.trim().is_empty() {
            return Err(PublishError::InvalidTarget("repoName"));
        }
        if req.file_path.trim().is_empty() {
            return Err(PublishError::InvalidTarget("filePath"));
        }

        let owner = self.api.current_user(token).await?.login;
        let markdown_ref = RemoteRef {
            owner: owner.clone(),
            repo: req.repo_name.clone(),
            path: req.file_path.clone(),
        };

        if let (Some(expected), true) = (&req.sha, self.config.verify_revision) {
            let current = self.api.get_file(token, &markdown_ref).await?.sha;
            if &current != expected {
                warn!(
                    "Refusing to update {}: revision {} is stale (remote is {})",
                    req.file_path, expected, current
                );
                return Err(PublishError::RevisionConflict {
                    expected: expected.clone(),
                    current,
                });
            }
        }

        let local = images::local_images(&req.content, &self.config.local_segment);
        let image_dir = req
            .image_path
            .as_deref()
            .map(|p| p.trim().trim_matches('/'))
            .unwrap_or_default();
        if !local.is_empty() && image_dir.is_empty() {
            return Err(PublishError::InvalidTarget("imagePath"));
        }

        // Relative and absolute links to one upload share a repository path;
        // each path is committed once.
        let mut committed: HashMap<String, String> = HashMap::new();
        let mut targets: HashMap<String, String> = HashMap::new();
        let mut pushed = Vec::with_capacity(local.len());
        for image in local {
            let file_name = image.file_name().to_string();
            let path = format!("{image_dir}/{file_name}");
            if let Some(permanent) = committed.get(&path) {
                debug!("{} already committed as {}", image.url, path);
                targets.insert(image.url, permanent.clone());
                continue;
            }

            let bytes = self.images.fetch(&self.resolve_image_url(&image.url)).await?;
            let image_ref = RemoteRef {
                owner: owner.clone(),
                repo: req.repo_name.clone(),
                path: path.clone(),
            };
            let body = PutFile::new(format!("upload image {file_name}"), &bytes, None);
            let resp = self.api.put_file(token, &image_ref, &body).await?;
            if !resp.is_success() {
                error!("Image push failed for {}: {}", path, resp.body);
                return Err(PublishError::ImagePushFailed {
                    status: resp.status,
                    body: resp.body,
                });
            }

            let permanent = images::permanent_url(
                &self.config.web_host,
                &owner,
                &req.repo_name,
                image_dir,
                &file_name,
            );
            info!("Committed image {} to {}/{}", path, owner, req.repo_name);
            committed.insert(path.clone(), permanent.clone());
            targets.insert(image.url.clone(), permanent.clone());
            pushed.push(PushedImage {
                original_url: image.url,
                path,
                permanent_url: permanent,
            });
        }
        let content = images::rewrite_images(&req.content, &targets);

        let message = req
            .message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());
        let body = PutFile::new(message, content.as_bytes(), req.sha.clone());
        let resp = self.api.put_file(token, &markdown_ref, &body).await?;
        if !resp.is_success() {
            error!("Markdown push failed for {}: {}", req.file_path, resp.body);
            return Err(PublishError::MarkdownPushFailed {
                status: resp.status,
                body: resp.body,
            });
        }

        info!(
            "Committed {} to {}/{} ({} images, {})",
            req.file_path,
            owner,
            req.repo_name,
            pushed.len(),
            if req.sha.is_some() { "update" } else { "create" }
        );
        Ok(PublishOutcome {
            owner,
            images: pushed,
            content,
            commit: resp.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_path() {
        assert_eq!(commit_path("blog", "My_Post"), "blog/My_Post.md");
        assert_eq!(commit_path("blog/", "My_Post"), "blog/My_Post.md");
        assert_eq!(commit_path("", "My_Post"), "My_Post.md");
    }

    #[test]
    fn test_request_wire_format() {
        let req: PublishRequest = serde_json::from_value(serde_json::json!({
            "filePath": "blog/a.md",
            "imagePath": "images",
            "repoName": "site",
            "content": "x",
            "message": "m"
        }))
        .unwrap();
        assert_eq!(req.file_path, "blog/a.md");
        assert_eq!(req.image_path.as_deref(), Some("images"));
        assert_eq!(req.sha, None);
    }

    #[test]
    fn test_target_validation() {
        assert!(RepositoryTarget::default().validate().is_ok());
        let target = RepositoryTarget {
            repo_name: " ".into(),
            ..RepositoryTarget::default()
        };
        assert!(matches!(
            target.validate(),
            Err(PublishError::InvalidTarget("repoName"))
        ));
    }

    #[test]
    fn test_from_document_uses_title_stem() {
        let text = "---
author: a
pubDatetime: p
modDatetime: m
title: My Post
slug: s
featured: true
draft: false
tags:
  - t
description: d
---
## Table of contents
";
        let target = RepositoryTarget {
            repo_name: "site".into(),
            content_dir: "blog".into(),
            image_dir: "".into(),
        };
        let req = PublishRequest::from_document(text, &target, None, None).unwrap();
        assert_eq!(req.file_path, "blog/My_Post.md");
        assert_eq!(req.image_path, None);

        let err = PublishRequest::from_document("no frontmatter", &target, None, None);
        assert!(matches!(err, Err(PublishError::Validation(_))));
    }
}
