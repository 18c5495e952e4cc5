use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::db::{is_unique_violation, DbConnection};
use crate::error::{AppError, AppResult};
use crate::models::Link;
use crate::slug::{valid_target, validate_link_slug};

const LINK_COLUMNS: &str = "id, url, slug, title, created_at";

pub(crate) fn link_from_row(row: &Row<'_>) -> rusqlite::Result<Link> {
    Ok(Link {
        id: row.get(0)?,
        url: row.get(1)?,
        slug: row.get(2)?,
        title: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn validate_link(link: &Link) -> AppResult<()> {
    if link.id.trim().is_empty() {
        return Err(AppError::Validation("Link id is required".to_string()));
    }
    if !valid_target(&link.url) {
        return Err(AppError::Validation(format!("Invalid URL: {}", link.url)));
    }
    validate_link_slug(&link.slug).map_err(AppError::Validation)
}

fn slug_taken(conn: &Connection, slug: &str, exclude_id: Option<&str>) -> rusqlite::Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM shortcuts_links
             WHERE slug = ?1 AND collection_id IS NULL AND (?2 IS NULL OR id != ?2)
             LIMIT 1",
            params![slug, exclude_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn id_exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM shortcuts_links WHERE id = ?1 AND collection_id IS NULL",
            [id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Whether an individual link other than `exclude_id` already uses `slug`.
pub async fn slug_exists(db: &DbConnection, slug: &str, exclude_id: Option<&str>) -> AppResult<bool> {
    let conn = db.lock().await;
    Ok(slug_taken(&conn, slug, exclude_id)?)
}

fn insert(conn: &Connection, link: &Link) -> AppResult<()> {
    if slug_taken(conn, &link.slug, None)? {
        return Err(AppError::SlugTaken(link.slug.clone()));
    }
    let result = conn.execute(
        "INSERT INTO shortcuts_links (id, url, slug, title, collection_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?5)",
        params![link.id, link.url, link.slug, link.title, link.created_at],
    );
    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => {
            if id_exists(conn, &link.id)? {
                Err(AppError::Validation(format!("Link id {} already exists", link.id)))
            } else {
                Err(AppError::SlugTaken(link.slug.clone()))
            }
        }
        Err(e) => Err(e.into()),
    }
}

fn update(conn: &Connection, link: &Link) -> AppResult<()> {
    if slug_taken(conn, &link.slug, Some(&link.id))? {
        return Err(AppError::SlugTaken(link.slug.clone()));
    }
    let updated = conn
        .execute(
            "UPDATE shortcuts_links SET url = ?2, slug = ?3, title = ?4, updated_at = ?5
             WHERE id = ?1 AND collection_id IS NULL",
            params![link.id, link.url, link.slug, link.title, Utc::now()],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::SlugTaken(link.slug.clone())
            } else {
                e.into()
            }
        })?;
    if updated == 0 {
        return Err(AppError::NotFound(format!("Link {} not found", link.id)));
    }
    Ok(())
}

pub async fn save_link(db: &DbConnection, link: &Link) -> AppResult<Link> {
    validate_link(link)?;
    let conn = db.lock().await;
    insert(&conn, link)?;
    tracing::info!(slug = %link.slug, url = %link.url, "link saved");
    Ok(link.clone())
}

pub async fn update_link(db: &DbConnection, link: &Link) -> AppResult<Link> {
    validate_link(link)?;
    let conn = db.lock().await;
    update(&conn, link)?;
    tracing::info!(id = %link.id, slug = %link.slug, "link updated");
    let stored = conn.query_row(
        &format!("SELECT {LINK_COLUMNS} FROM shortcuts_links WHERE id = ?1"),
        [&link.id],
        link_from_row,
    )?;
    Ok(stored)
}

pub async fn delete_link(db: &DbConnection, id: &str) -> AppResult<()> {
    let deleted = db.lock().await.execute(
        "DELETE FROM shortcuts_links WHERE id = ?1 AND collection_id IS NULL",
        [id],
    )?;
    if deleted == 0 {
        return Err(AppError::NotFound(format!("Link {id} not found")));
    }
    tracing::info!(%id, "link deleted");
    Ok(())
}

/// Individual links, newest first.
pub async fn list_links(db: &DbConnection) -> AppResult<Vec<Link>> {
    let conn = db.lock().await;
    let mut stmt = conn.prepare(&format!(
        "SELECT {LINK_COLUMNS} FROM shortcuts_links
         WHERE collection_id IS NULL
         ORDER BY created_at DESC"
    ))?;
    let links = stmt
        .query_map([], link_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(links)
}

pub async fn get_link_by_slug(db: &DbConnection, slug: &str) -> AppResult<Link> {
    let conn = db.lock().await;
    conn.query_row(
        &format!(
            "SELECT {LINK_COLUMNS} FROM shortcuts_links
             WHERE slug = ?1 AND collection_id IS NULL
             LIMIT 1"
        ),
        [slug],
        link_from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound(format!("No link found with slug \"{slug}\"")))
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// Inserts unknown ids and updates known ones; entries that fail
/// validation or collide on slug are skipped.
pub async fn upsert_links(db: &DbConnection, links: &[Link]) -> AppResult<ImportSummary> {
    let conn = db.lock().await;
    let mut summary = ImportSummary::default();
    for link in links {
        let outcome = validate_link(link).and_then(|_| {
            if id_exists(&conn, &link.id)? {
                update(&conn, link)
            } else {
                insert(&conn, link)
            }
        });
        match outcome {
            Ok(()) => summary.imported += 1,
            Err(AppError::Validation(_)) | Err(AppError::SlugTaken(_)) => {
                tracing::debug!(id = %link.id, slug = %link.slug, "skipping imported link");
                summary.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    tracing::info!(imported = summary.imported, skipped = summary.skipped, "links imported");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::models::NewLink;

    fn link(id: &str, slug: &str) -> Link {
        NewLink {
            id: Some(id.to_string()),
            url: format!("https://example.com/{slug}"),
            slug: slug.to_string(),
            title: None,
            created_at: None,
        }
        .into_link()
    }

    #[tokio::test]
    async fn duplicate_slug_with_different_id_is_rejected() {
        let db = open_in_memory().unwrap();
        save_link(&db, &link("1", "docs")).await.unwrap();

        let err = save_link(&db, &link("2", "docs")).await.unwrap_err();
        assert!(matches!(err, AppError::SlugTaken(ref s) if s == "docs"));
        assert_eq!(list_links(&db).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn editing_to_own_slug_succeeds() {
        let db = open_in_memory().unwrap();
        let mut l = link("1", "docs");
        save_link(&db, &l).await.unwrap();

        l.title = Some("Docs".into());
        let stored = update_link(&db, &l).await.unwrap();
        assert_eq!(stored.title.as_deref(), Some("Docs"));
        assert_eq!(stored.slug, "docs");
    }

    #[tokio::test]
    async fn editing_to_another_links_slug_is_rejected() {
        let db = open_in_memory().unwrap();
        save_link(&db, &link("1", "docs")).await.unwrap();
        let mut other = link("2", "blog");
        save_link(&db, &other).await.unwrap();

        other.slug = "docs".into();
        let err = update_link(&db, &other).await.unwrap_err();
        assert!(matches!(err, AppError::SlugTaken(_)));
        assert_eq!(get_link_by_slug(&db, "blog").await.unwrap().id, "2");
    }

    #[tokio::test]
    async fn slug_exists_honours_exclusion() {
        let db = open_in_memory().unwrap();
        save_link(&db, &link("1", "docs")).await.unwrap();
        assert!(slug_exists(&db, "docs", None).await.unwrap());
        assert!(!slug_exists(&db, "docs", Some("1")).await.unwrap());
        assert!(slug_exists(&db, "docs", Some("2")).await.unwrap());
    }

    #[tokio::test]
    async fn missing_links_are_not_found() {
        let db = open_in_memory().unwrap();
        assert!(matches!(delete_link(&db, "nope").await, Err(AppError::NotFound(_))));
        assert!(matches!(get_link_by_slug(&db, "nope").await, Err(AppError::NotFound(_))));
        assert!(matches!(update_link(&db, &link("x", "y")).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_touching_storage() {
        let db = open_in_memory().unwrap();
        let mut bad = link("1", "docs");
        bad.url = "ftp://example.com".into();
        assert!(matches!(save_link(&db, &bad).await, Err(AppError::Validation(_))));
        let mut bad = link("1", "has space");
        bad.url = "https://example.com".into();
        assert!(matches!(save_link(&db, &bad).await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let db = open_in_memory().unwrap();
        let mut older = link("1", "old");
        older.created_at = Utc::now() - chrono::Duration::days(1);
        save_link(&db, &older).await.unwrap();
        save_link(&db, &link("2", "new")).await.unwrap();
        let slugs: Vec<_> = list_links(&db).await.unwrap().into_iter().map(|l| l.slug).collect();
        assert_eq!(slugs, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn upsert_inserts_updates_and_skips() {
        let db = open_in_memory().unwrap();
        save_link(&db, &link("1", "docs")).await.unwrap();
        save_link(&db, &link("2", "blog")).await.unwrap();

        let mut renamed = link("1", "documentation");
        renamed.title = Some("Docs".into());
        let summary = upsert_links(&db, &[renamed, link("3", "blog"), link("4", "new")])
            .await
            .unwrap();
        assert_eq!(summary, ImportSummary { imported: 2, skipped: 1 });
        assert_eq!(get_link_by_slug(&db, "documentation").await.unwrap().id, "1");
        assert_eq!(get_link_by_slug(&db, "blog").await.unwrap().id, "2");
        assert_eq!(list_links(&db).await.unwrap().len(), 3);
    }
}
