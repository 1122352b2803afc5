//! Publish endpoints.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use blogpush_core::error::PublishError;
use blogpush_core::publish::{PublishRequest, Publisher};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::upload::upload_image;
use crate::relay::UploadRelay;

#[derive(Clone)]
pub struct ApiState {
    pub publisher: Publisher,
    pub relay: Arc<UploadRelay>,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct PushResponse {
    success: bool,
    data: serde_json::Value,
}

pub fn api_routes(state: ApiState) -> Router {
    let max_upload_bytes = state.max_upload_bytes;
    Router::new()
        .route("/upload", post(create_post))
        .route("/modify", post(modify_post))
        .route(
            "/upload/image",
            post(upload_image).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .with_state(state)
}

/// Token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    Some(value.strip_prefix("Bearer ").unwrap_or(value))
}

async fn create_post(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<PublishRequest>,
) -> Response {
    publish(&state, &headers, req).await
}

async fn modify_post(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<PublishRequest>,
) -> Response {
    if req.sha.as_deref().is_none_or(|s| s.trim().is_empty()) {
        return error_response(StatusCode::BAD_REQUEST, "sha is required to modify a post");
    }
    publish(&state, &headers, req).await
}

async fn publish(state: &ApiState, headers: &HeaderMap, req: PublishRequest) -> Response {
    match state.publisher.publish(bearer_token(headers), &req).await {
        Ok(outcome) => {
            info!(
                "Published {}/{} for {} ({} images)",
                req.repo_name,
                req.file_path,
                outcome.owner,
                outcome.images.len()
            );
            (
                StatusCode::OK,
                Json(PushResponse {
                    success: true,
                    data: outcome.commit,
                }),
            )
                .into_response()
        }
        Err(err) => publish_error_response(err),
    }
}

pub(crate) fn error_response(status: StatusCode, error: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn status_or(code: u16, fallback: StatusCode) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(fallback)
}

fn publish_error_response(err: PublishError) -> Response {
    match err {
        PublishError::AuthRequired => {
            error_response(StatusCode::UNAUTHORIZED, &err.to_string())
        }
        PublishError::ImagePushFailed { status, body }
        | PublishError::MarkdownPushFailed { status, body } => {
            (status_or(status, StatusCode::BAD_GATEWAY), Json(body)).into_response()
        }
        PublishError::RevisionConflict { .. } => {
            warn!("{}", err);
            error_response(StatusCode::CONFLICT, &err.to_string())
        }
        PublishError::InvalidTarget(_) | PublishError::Validation(_) => {
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
        PublishError::Upstream { status, ref message } => {
            error!("GitHub request failed ({}): {}", status, message);
            error_response(status_or(status, StatusCode::BAD_GATEWAY), message)
        }
        PublishError::Http(e) => {
            error!("Upload failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Upload failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, "abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
    }

    #[test]
    fn test_upstream_status_is_mirrored() {
        let resp = publish_error_response(PublishError::MarkdownPushFailed {
            status: 422,
            body: serde_json::json!({"message": "sha wasn't supplied"}),
        });
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let resp = publish_error_response(PublishError::InvalidTarget("repoName"));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
