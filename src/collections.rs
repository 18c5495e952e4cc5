use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use crate::db::{is_unique_violation, DbConnection};
use crate::error::{AppError, AppResult};
use crate::links::link_from_row;
use crate::models::{Collection, Link};
use crate::slug::{generate_access_key, valid_target, validate_access_key, validate_link_slug};

pub const DEFAULT_COLLECTION_NAME: &str = "My Shortcuts";
const ACCESS_KEY_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedCollection {
    pub access_key: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedCollection {
    pub collection_name: String,
    pub links: Vec<Link>,
}

fn validate_links(links: &[Link]) -> AppResult<()> {
    if links.is_empty() {
        return Err(AppError::Validation("No links to export".to_string()));
    }
    for (i, link) in links.iter().enumerate() {
        let n = i + 1;
        if link.id.trim().is_empty() {
            return Err(AppError::Validation(format!("Link {n}: invalid or missing id")));
        }
        if link.url.trim().is_empty() || !valid_target(link.url.trim()) {
            return Err(AppError::Validation(format!("Link {n}: invalid URL format")));
        }
        if validate_link_slug(link.slug.trim()).is_err() {
            return Err(AppError::Validation(format!("Link {n}: invalid slug format")));
        }
    }
    Ok(())
}

/// Copies `links` into a new collection reachable through a fresh access key.
///
/// The collection row and its links are written in one transaction.
pub async fn export_collection(
    db: &DbConnection,
    links: &[Link],
    name: Option<&str>,
    public_base_url: &str,
) -> AppResult<ExportedCollection> {
    validate_links(links)?;
    let name = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_COLLECTION_NAME);
    let description = format!("Collection with {} links", links.len());

    let mut conn = db.lock().await;
    let tx = conn.transaction()?;
    let collection_id = Uuid::new_v4().to_string();
    let now = Utc::now();

    let mut access_key = None;
    for _ in 0..ACCESS_KEY_ATTEMPTS {
        let candidate = generate_access_key();
        let inserted = tx.execute(
            "INSERT INTO shortcuts_collections (id, name, description, access_key, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![collection_id, name, description, candidate, now],
        );
        match inserted {
            Ok(_) => {
                access_key = Some(candidate);
                break;
            }
            Err(e) if is_unique_violation(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    let access_key = access_key
        .ok_or_else(|| AppError::Internal("could not generate a unique access key".to_string()))?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO shortcuts_links (id, url, slug, title, collection_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        )?;
        for link in links {
            let title = link.title.as_deref().map(str::trim).filter(|t| !t.is_empty());
            stmt.execute(params![
                Uuid::new_v4().to_string(),
                link.url.trim(),
                link.slug.trim(),
                title,
                collection_id,
                link.created_at,
            ])
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Validation(format!("Duplicate slug in collection: {}", link.slug))
                } else {
                    e.into()
                }
            })?;
        }
    }
    tx.commit()?;

    tracing::info!(%collection_id, links = links.len(), "collection exported");
    Ok(ExportedCollection {
        url: format!("{}/collection/{}", public_base_url.trim_end_matches('/'), access_key),
        access_key,
    })
}

pub async fn find_collection(db: &DbConnection, access_key: &str) -> AppResult<Collection> {
    let access_key = validate_access_key(access_key).map_err(AppError::Validation)?;
    let conn = db.lock().await;
    conn.query_row(
        "SELECT id, name, description, access_key, created_at, updated_at
         FROM shortcuts_collections WHERE access_key = ?1",
        [access_key],
        |row| {
            Ok(Collection {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                access_key: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound("Collection not found".to_string()))
}

/// Loads a shared collection, links oldest first.
pub async fn import_collection(db: &DbConnection, access_key: &str) -> AppResult<ImportedCollection> {
    let collection = find_collection(db, access_key).await?;
    let conn = db.lock().await;
    let mut stmt = conn.prepare(
        "SELECT id, url, slug, title, created_at FROM shortcuts_links
         WHERE collection_id = ?1
         ORDER BY created_at ASC",
    )?;
    let links = stmt
        .query_map([&collection.id], link_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(collection = %collection.id, links = links.len(), "collection loaded");
    Ok(ImportedCollection {
        collection_name: collection.name,
        links,
    })
}
