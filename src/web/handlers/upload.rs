use axum::{
    extract::{multipart::MultipartError, Json, Multipart, State},
    http::StatusCode,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::checked_id;
use crate::schedule::error::{TaskError, TaskResult};
use crate::storage::artifact::{ArtifactKind, ImageEncoding};
use crate::utils::http::HttpResponse;
use crate::AppContext;

#[derive(Debug, Serialize)]
pub struct Uploaded {
    pub file_path: String,
    pub md5: String,
    #[serde(rename = "type")]
    pub file_type: String,
}

struct UploadedFile {
    name: String,
    bytes: Vec<u8>,
}

// POST /upload, multipart `file` + `md5`
pub async fn upload(
    State(ctx): State<Arc<AppContext>>,
    mut multipart: Multipart,
) -> TaskResult<Json<HttpResponse<Uploaded>>> {
    let limit = ctx.max_upload_bytes;
    let mut file = None;
    let mut md5 = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                file = Some(UploadedFile {
                    name,
                    bytes: bytes.to_vec(),
                });
            }
            Some("md5") => {
                md5 = Some(field.text().await.map_err(|e| multipart_error(e, limit))?);
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| TaskError::Validation("no file received".to_string()))?;
    let id = checked_id(md5)?;

    if file.bytes.len() > limit {
        return Err(too_large(limit));
    }
    let encoding = ImageEncoding::sniff(&file.bytes).ok_or_else(|| {
        TaskError::Validation("only JPG, PNG or GIF images are allowed".to_string())
    })?;
    let kind = if file.name.to_lowercase().contains("mask") {
        ArtifactKind::Mask
    } else {
        ArtifactKind::Source
    };

    let path = ctx
        .artifacts
        .store(&id, kind, encoding, file.bytes)
        .await
        .map_err(TaskError::Persistence)?;
    info!("Stored {} for {} at {}", kind, id, path.display());

    Ok(Json(HttpResponse::success(
        "upload succeeded",
        Uploaded {
            file_path: path.display().to_string(),
            md5: id,
            file_type: encoding.extension().to_string(),
        },
    )))
}

fn too_large(limit: usize) -> TaskError {
    TaskError::Validation(format!("file exceeds the upload limit of {} bytes", limit))
}

fn multipart_error(e: MultipartError, limit: usize) -> TaskError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(limit)
    } else {
        TaskError::Validation(e.body_text())
    }
}
