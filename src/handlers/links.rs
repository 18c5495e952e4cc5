use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{encode_segment, found, ok, parse_json, ApiResponse};
use crate::error::{AppError, AppResult};
use crate::links::{self, ImportSummary};
use crate::models::{Link, NewLink};
use crate::portability::{self, EXPORT_FILENAME};
use crate::state::AppState;

pub async fn list_links(State(state): State<AppState>) -> AppResult<Json<ApiResponse<Vec<Link>>>> {
    let links = links::list_links(state.db()?).await?;
    Ok(ok(links))
}

pub async fn create_link(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<ApiResponse<Link>>)> {
    let db = state.db()?;
    let link = parse_json::<NewLink>(&body)?.into_link();
    let saved = links::save_link(db, &link).await?;
    Ok((StatusCode::CREATED, ok(saved)))
}

pub async fn update_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> AppResult<Json<ApiResponse<Link>>> {
    let db = state.db()?;
    let mut link = parse_json::<NewLink>(&body)?.into_link();
    link.id = id;
    let updated = links::update_link(db, &link).await?;
    Ok(ok(updated))
}

pub async fn delete_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    links::delete_link(state.db()?, &id).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSlugQuery {
    slug: Option<String>,
    exclude_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SlugAvailability {
    exists: bool,
}

pub async fn check_slug(
    State(state): State<AppState>,
    Query(query): Query<CheckSlugQuery>,
) -> AppResult<Json<ApiResponse<SlugAvailability>>> {
    let db = state.db()?;
    let slug = query
        .slug
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("Slug is required".to_string()))?;
    let exclude_id = query.exclude_id.filter(|id| !id.is_empty());
    let exists = links::slug_exists(db, &slug, exclude_id.as_deref()).await?;
    Ok(ok(SlugAvailability { exists }))
}

pub async fn export_links(State(state): State<AppState>) -> AppResult<Response> {
    let links = links::list_links(state.db()?).await?;
    let body = portability::export_links(&links)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILENAME}\""),
            ),
        ],
        body,
    )
        .into_response())
}

pub async fn import_links(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<ApiResponse<ImportSummary>>> {
    let db = state.db()?;
    let text = std::str::from_utf8(&body)
        .map_err(|_| AppError::Validation("Import file must be UTF-8 JSON".to_string()))?;
    let parsed = portability::import_links(text)?;
    let mut summary = links::upsert_links(db, &parsed).await?;
    // entries dropped while parsing count as skipped too
    let total: usize = serde_json::from_str::<Vec<serde_json::Value>>(text)
        .map(|v| v.len())
        .unwrap_or(parsed.len());
    summary.skipped += total.saturating_sub(parsed.len());
    Ok(ok(summary))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLink {
    slug: String,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

/// Public slug lookup. Misses answer `{error, slug}` so callers can show
/// which slug was unknown.
pub async fn resolve_slug(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    let db = match state.db() {
        Ok(db) => db,
        Err(e) => return e.into_response(),
    };
    match links::get_link_by_slug(db, &slug).await {
        Ok(link) => Json(ResolvedLink {
            slug: link.slug,
            url: link.url,
            title: link.title,
            created_at: link.created_at,
        })
        .into_response(),
        Err(AppError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Link not found", "slug": slug })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn redirect_slug(Path(slug): Path<String>) -> Response {
    found(&format!("/slug/{}", encode_segment(&slug)))
}
