use axum::{
    body::{Body, Bytes},
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::fs;
use tokio_util::io::ReaderStream;

use super::{encode_segment, found, ok, ApiResponse};
use crate::error::{AppError, AppResult};
use crate::files::{self, UploadRequest};
use crate::models::{FileStats, FileUpload};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct FileListing {
    success: bool,
    files: Vec<FileUpload>,
    stats: FileStats,
}

pub async fn list_files(State(state): State<AppState>) -> AppResult<Json<FileListing>> {
    let files = files::list_files(state.db()?).await?;
    let stats = files::file_stats(&files, Utc::now());
    Ok(Json(FileListing {
        success: true,
        files,
        stats,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    id: String,
    download_slug: String,
    download_url: String,
    file: FileUpload,
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(format!("Invalid upload: {}", err.body_text()))
}

/// Reads the `file` part and an optional `expiresAt` part, then stores the
/// upload.
pub async fn store_upload(state: &AppState, mut multipart: Multipart) -> AppResult<FileUpload> {
    let db = state.db()?;
    let blobs = state.blobs()?;

    let mut upload: Option<(String, Option<String>, Bytes)> = None;
    let mut expires_at: Option<DateTime<Utc>> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                upload = Some((file_name, content_type, data));
            }
            Some("expiresAt") => {
                let raw = field.text().await.map_err(multipart_error)?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    let parsed = DateTime::parse_from_rfc3339(raw)
                        .map_err(|_| AppError::Validation(format!("Invalid expiresAt: {raw}")))?;
                    expires_at = Some(parsed.with_timezone(&Utc));
                }
            }
            _ => {}
        }
    }

    let (original_name, content_type, data) =
        upload.ok_or_else(|| AppError::Validation("No file provided".to_string()))?;

    files::upload_file(
        db,
        blobs,
        UploadRequest {
            original_name,
            content_type,
            data,
            expires_at,
        },
        state.config.max_file_size,
    )
    .await
}

pub fn download_url(state: &AppState, slug: &str) -> String {
    state.public_url(&format!("/download/{}", encode_segment(slug)))
}

pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<ApiResponse<UploadedFile>>)> {
    let file = store_upload(&state, multipart).await?;
    Ok((
        StatusCode::CREATED,
        ok(UploadedFile {
            id: file.id.clone(),
            download_slug: file.download_slug.clone(),
            download_url: download_url(&state, &file.download_slug),
            file,
        }),
    ))
}

pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let file = files::get_file(state.db()?, &id).await?;
    Ok(Json(json!({ "success": true, "file": file })))
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let file = files::soft_delete_file(state.db()?, &id).await?;
    match state.blobs() {
        Ok(blobs) => {
            if let Err(e) = blobs.delete(&file.storage_url).await {
                tracing::warn!(error = %e, url = %file.storage_url, "blob not removed");
            }
        }
        Err(_) => tracing::warn!(url = %file.storage_url, "no blob store, blob left in place"),
    }
    Ok(Json(json!({ "success": true, "message": "File deleted successfully" })))
}

pub async fn download_file(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Response> {
    let file = files::resolve_download(state.db()?, &slug, Utc::now()).await?;
    tracing::info!(%slug, downloads = file.download_count, "download served");
    Ok(found(&file.storage_url))
}

/// Streams a blob written by the local store.
pub async fn serve_blob(State(state): State<AppState>, Path(key): Path<String>) -> AppResult<Response> {
    let path = state
        .blobs()?
        .local_path(&key)
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    let file = match fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("File not found".to_string()))
        }
        Err(e) => return Err(AppError::Internal(e.to_string())),
    };

    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);
    let mime_type = mime_guess::from_path(&path).first_or_octet_stream();

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime_type.as_ref().to_string()),
            (header::CACHE_CONTROL, "public, max-age=31536000".to_string()),
        ],
        body,
    )
        .into_response())
}
