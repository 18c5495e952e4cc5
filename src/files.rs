use axum::body::Bytes;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::db::{is_unique_violation, DbConnection};
use crate::error::{AppError, AppResult};
use crate::models::{FileStats, FileUpload, NewFileUpload};
use crate::slug::generate_download_slug;

pub const ALLOWED_EXTENSIONS: &[&str] = &[
    ".zip", ".rar", ".7z", ".tar", ".gz", ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".txt",
    ".json", ".js", ".css", ".html",
];

/// Download slug generation gives up after this many collisions.
pub const SLUG_ATTEMPTS: usize = 10;

const FILE_COLUMNS: &str = "id, filename, original_name, file_size, mime_type, file_extension, \
     storage_url, download_slug, download_count, expires_at, created_at, updated_at";

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileUpload> {
    Ok(FileUpload {
        id: row.get(0)?,
        filename: row.get(1)?,
        original_name: row.get(2)?,
        size: row.get(3)?,
        mime_type: row.get(4)?,
        extension: row.get(5)?,
        storage_url: row.get(6)?,
        download_slug: row.get(7)?,
        download_count: row.get(8)?,
        expires_at: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

/// Lowercased extension with its dot, e.g. `.zip`.
pub fn file_extension(name: &str) -> Option<String> {
    let base = name.rsplit('/').next().unwrap_or(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(format!(".{}", ext.to_lowercase()))
}

/// Strips characters that are unsafe in storage paths or headers; folder
/// separators stay.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\\'))
        .collect();
    cleaned
        .replace("..", "")
        .trim_start_matches('/')
        .trim()
        .to_string()
}

pub fn validate_upload(name: &str, size: usize, max_size: usize) -> AppResult<String> {
    if size == 0 {
        return Err(AppError::Validation("File is empty".to_string()));
    }
    if size > max_size {
        return Err(AppError::Validation(format!(
            "File too large. Maximum: {}MB",
            max_size / 1024 / 1024
        )));
    }
    match file_extension(name) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(ext),
        _ => Err(AppError::Validation(format!(
            "File type not allowed. Allowed: {}",
            ALLOWED_EXTENSIONS.join(", ")
        ))),
    }
}

fn download_slug_taken(conn: &Connection, slug: &str) -> rusqlite::Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM file_uploads WHERE download_slug = ?1 LIMIT 1",
            [slug],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Draws candidates from `generate` until one is free, at most `attempts` times.
pub async fn unique_download_slug<F>(db: &DbConnection, attempts: usize, mut generate: F) -> AppResult<String>
where
    F: FnMut() -> String,
{
    let conn = db.lock().await;
    for attempt in 1..=attempts {
        let candidate = generate();
        if !download_slug_taken(&conn, &candidate)? {
            return Ok(candidate);
        }
        tracing::debug!(attempt, slug = %candidate, "download slug collision");
    }
    Err(AppError::Internal("could not generate a unique download slug".to_string()))
}

pub async fn insert_file(db: &DbConnection, new: &NewFileUpload) -> AppResult<FileUpload> {
    let now = Utc::now();
    let file = FileUpload {
        id: Uuid::new_v4().to_string(),
        filename: new.filename.clone(),
        original_name: new.original_name.clone(),
        size: new.size,
        mime_type: new.mime_type.clone(),
        extension: new.extension.clone(),
        storage_url: new.storage_url.clone(),
        download_slug: new.download_slug.clone(),
        download_count: 0,
        expires_at: new.expires_at,
        created_at: now,
        updated_at: now,
    };
    db.lock()
        .await
        .execute(
            &format!("INSERT INTO file_uploads ({FILE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
            params![
                file.id,
                file.filename,
                file.original_name,
                file.size,
                file.mime_type,
                file.extension,
                file.storage_url,
                file.download_slug,
                file.download_count,
                file.expires_at,
                file.created_at,
                file.updated_at
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Internal(format!("download slug {} already in use", new.download_slug))
            } else {
                e.into()
            }
        })?;
    Ok(file)
}

/// Files that are not soft-deleted, newest first.
pub async fn list_files(db: &DbConnection) -> AppResult<Vec<FileUpload>> {
    let conn = db.lock().await;
    let mut stmt = conn.prepare(&format!(
        "SELECT {FILE_COLUMNS} FROM file_uploads WHERE deleted_at IS NULL ORDER BY created_at DESC"
    ))?;
    let files = stmt
        .query_map([], file_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(files)
}

pub fn file_stats(files: &[FileUpload], now: DateTime<Utc>) -> FileStats {
    let week_ago = now - Duration::days(7);
    FileStats {
        total_files: files.len(),
        total_size: files.iter().map(|f| f.size).sum(),
        total_downloads: files.iter().map(|f| f.download_count).sum(),
        recent_uploads: files.iter().filter(|f| f.created_at > week_ago).count(),
    }
}

fn find_active(conn: &Connection, column: &str, value: &str) -> AppResult<Option<FileUpload>> {
    Ok(conn
        .query_row(
            &format!("SELECT {FILE_COLUMNS} FROM file_uploads WHERE {column} = ?1 AND deleted_at IS NULL"),
            [value],
            file_from_row,
        )
        .optional()?)
}

pub async fn get_file(db: &DbConnection, id: &str) -> AppResult<FileUpload> {
    let conn = db.lock().await;
    find_active(&conn, "id", id)?.ok_or_else(|| AppError::NotFound("File not found".to_string()))
}

pub async fn find_by_slug(db: &DbConnection, slug: &str) -> AppResult<FileUpload> {
    let conn = db.lock().await;
    find_active(&conn, "download_slug", slug)?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))
}

/// Marks the file deleted and returns the row as it was.
pub async fn soft_delete_file(db: &DbConnection, id: &str) -> AppResult<FileUpload> {
    let conn = db.lock().await;
    let file = find_active(&conn, "id", id)?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;
    let now = Utc::now();
    conn.execute(
        "UPDATE file_uploads SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
        params![id, now],
    )?;
    tracing::info!(%id, slug = %file.download_slug, "file deleted");
    Ok(file)
}

/// Looks the slug up and counts a download, unless the file has expired.
pub async fn resolve_download(db: &DbConnection, slug: &str, now: DateTime<Utc>) -> AppResult<FileUpload> {
    let conn = db.lock().await;
    let file = find_active(&conn, "download_slug", slug)?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;
    if file.is_expired_at(now) {
        return Err(AppError::Gone("File has expired".to_string()));
    }
    conn.execute(
        "UPDATE file_uploads SET download_count = download_count + 1, updated_at = ?2 WHERE id = ?1",
        params![file.id, now],
    )?;
    Ok(FileUpload {
        download_count: file.download_count + 1,
        updated_at: now,
        ..file
    })
}

/// Clients that know nothing about a file send `application/octet-stream`.
fn is_generic_binary(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/octet-stream"))
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub original_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Validates, stores the bytes and records the metadata row.
pub async fn upload_file(
    db: &DbConnection,
    blobs: &dyn BlobStore,
    request: UploadRequest,
    max_size: usize,
) -> AppResult<FileUpload> {
    let extension = validate_upload(&request.original_name, request.data.len(), max_size)?;
    let original_name = sanitize_filename(&request.original_name);
    if original_name.is_empty() {
        return Err(AppError::Validation("Invalid file name".to_string()));
    }

    let download_slug = unique_download_slug(db, SLUG_ATTEMPTS, generate_download_slug).await?;
    let storage_name = format!("{}-{}", Utc::now().timestamp_millis(), original_name);
    let mime_type = request
        .content_type
        .filter(|ct| !ct.trim().is_empty() && !is_generic_binary(ct))
        .unwrap_or_else(|| {
            mime_guess::from_path(&original_name)
                .first_or_octet_stream()
                .to_string()
        });
    let size = request.data.len() as i64;

    let blob = blobs
        .put(&format!("uploads/{storage_name}"), &mime_type, request.data)
        .await?;
    tracing::info!(url = %blob.url, size, "file stored");

    let new = NewFileUpload {
        filename: storage_name,
        original_name,
        size,
        mime_type,
        extension,
        storage_url: blob.url.clone(),
        download_slug,
        expires_at: request.expires_at,
    };
    match insert_file(db, &new).await {
        Ok(file) => Ok(file),
        Err(e) => {
            if let Err(cleanup) = blobs.delete(&blob.url).await {
                tracing::warn!(error = %cleanup, url = %blob.url, "orphaned blob left behind");
            }
            Err(e)
        }
    }
}
