use chrono::{DateTime, Utc};
use rusqlite::{Connection, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type DbConnection = Arc<Mutex<Connection>>;

pub const REQUIRED_TABLES: [&str; 3] = ["shortcuts_collections", "shortcuts_links", "file_uploads"];

/// Ordered schema migrations; `PRAGMA user_version` records how many ran.
const MIGRATIONS: &[&str] = &[
    // 1: canonical schema
    "CREATE TABLE IF NOT EXISTS shortcuts_collections (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        access_key TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS shortcuts_links (
        id TEXT PRIMARY KEY,
        url TEXT NOT NULL,
        slug TEXT NOT NULL,
        title TEXT,
        collection_id TEXT REFERENCES shortcuts_collections (id) ON DELETE CASCADE,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_shortcuts_links_slug
        ON shortcuts_links (slug) WHERE collection_id IS NULL;
    CREATE UNIQUE INDEX IF NOT EXISTS idx_shortcuts_links_collection_slug
        ON shortcuts_links (collection_id, slug) WHERE collection_id IS NOT NULL;

    CREATE TABLE IF NOT EXISTS file_uploads (
        id TEXT PRIMARY KEY,
        filename TEXT NOT NULL,
        original_name TEXT NOT NULL,
        file_size INTEGER NOT NULL DEFAULT 0,
        mime_type TEXT NOT NULL,
        file_extension TEXT NOT NULL,
        storage_url TEXT NOT NULL,
        download_slug TEXT NOT NULL UNIQUE,
        download_count INTEGER NOT NULL DEFAULT 0,
        expires_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        deleted_at TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_file_uploads_created_at ON file_uploads (created_at DESC);
    CREATE INDEX IF NOT EXISTS idx_file_uploads_expires_at ON file_uploads (expires_at);",
];

pub fn establish_connection(path: &str) -> Result<DbConnection> {
    let conn = Connection::open(path)?;
    prepare(conn)
}

pub fn open_in_memory() -> Result<DbConnection> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(mut conn: Connection) -> Result<DbConnection> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    migrate(&mut conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub fn schema_version(conn: &Connection) -> Result<usize> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version.max(0) as usize)
}

/// Applies every migration newer than the stored `user_version`.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let current = schema_version(conn)?;
    for (index, sql) in MIGRATIONS.iter().enumerate().skip(current) {
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", (index + 1) as i64)?;
        tx.commit()?;
        tracing::info!(version = index + 1, "applied schema migration");
    }
    Ok(())
}

pub fn missing_tables(conn: &Connection) -> Result<Vec<&'static str>> {
    let mut stmt =
        conn.prepare("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")?;
    let mut missing = Vec::new();
    for table in REQUIRED_TABLES {
        let count: i64 = stmt.query_row([table], |row| row.get(0))?;
        if count == 0 {
            missing.push(table);
        }
    }
    Ok(missing)
}

/// Recreates any table that disappeared after startup.
pub async fn ensure_tables_exist(db: &DbConnection) -> Result<()> {
    let mut conn = db.lock().await;
    let missing = missing_tables(&conn)?;
    if missing.is_empty() {
        return Ok(());
    }
    tracing::warn!(?missing, "required tables missing, recreating schema");
    conn.pragma_update(None, "user_version", 0)?;
    migrate(&mut conn)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    pub connection: &'static str,
    pub timestamp: DateTime<Utc>,
    pub schema_version: usize,
    pub tables_exist: bool,
    pub missing_tables: Vec<&'static str>,
}

pub async fn test_connection(db: &DbConnection) -> Result<ConnectionReport> {
    let conn = db.lock().await;
    let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
    debug_assert_eq!(one, 1);
    let missing = missing_tables(&conn)?;
    Ok(ConnectionReport {
        connection: "OK",
        timestamp: Utc::now(),
        schema_version: schema_version(&conn)?,
        tables_exist: missing.is_empty(),
        missing_tables: missing,
    })
}

/// True when the error is a UNIQUE / PRIMARY KEY violation.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_database_has_every_table() {
        let db = open_in_memory().unwrap();
        let report = test_connection(&db).await.unwrap();
        assert!(report.tables_exist);
        assert_eq!(report.schema_version, MIGRATIONS.len());
    }

    #[test]
    fn migrate_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), MIGRATIONS.len());
        assert!(missing_tables(&conn).unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_table_is_recreated() {
        let db = open_in_memory().unwrap();
        db.lock().await.execute("DROP TABLE file_uploads", []).unwrap();
        assert_eq!(missing_tables(&*db.lock().await).unwrap(), vec!["file_uploads"]);

        ensure_tables_exist(&db).await.unwrap();
        assert!(missing_tables(&*db.lock().await).unwrap().is_empty());
    }

    #[test]
    fn on_disk_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atalho.db");
        let path = path.to_str().unwrap();
        drop(establish_connection(path).unwrap());
        let db = establish_connection(path).unwrap();
        let conn = db.try_lock().unwrap();
        assert_eq!(schema_version(&conn).unwrap(), MIGRATIONS.len());
    }
}
