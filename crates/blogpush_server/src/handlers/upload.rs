//! Image relay endpoint.

use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use blogpush_core::client::image_mime;
use serde::Serialize;
use tracing::{debug, error, warn};

use super::api::{ApiState, error_response};

/// Multipart field carrying the image.
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
struct ImageUploadResponse {
    url: String,
}

struct ReceivedFile {
    name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Option<ReceivedFile>, Response> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("Malformed multipart upload: {}", e);
                return Err(error_response(e.status(), &e.body_text()));
            }
        };
        if field.name() != Some(FILE_FIELD) {
            debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }
        let name = field.file_name().unwrap_or("image").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| {
            warn!("Failed to read upload body: {}", e);
            error_response(e.status(), &e.body_text())
        })?;
        return Ok(Some(ReceivedFile {
            name,
            content_type,
            bytes: bytes.to_vec(),
        }));
    }
}

/// `POST /api/upload/image`: host an image until its deletion time and
/// return the URL it can be fetched from.
pub async fn upload_image(State(state): State<ApiState>, mut multipart: Multipart) -> Response {
    let file = match read_file_field(&mut multipart).await {
        Ok(Some(file)) => file,
        Ok(None) => return error_response(StatusCode::BAD_REQUEST, "No file uploaded"),
        Err(resp) => return resp,
    };

    if let Err(e) = image_mime(&file.name, file.content_type.as_deref()) {
        warn!("Rejected upload: {}", e);
        return error_response(StatusCode::UNSUPPORTED_MEDIA_TYPE, &e.to_string());
    }

    match state.relay.store(&file.name, &file.bytes).await {
        Ok(stored) => (
            StatusCode::OK,
            Json(ImageUploadResponse {
                url: stored.public_path,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to store upload {}: {}", file.name, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Upload failed")
        }
    }
}
