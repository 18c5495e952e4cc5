//! Self-test endpoints for checking a deployment.

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db;
use crate::error::AppResult;
use crate::links;
use crate::models::Link;
use crate::state::AppState;

pub async fn test_db(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let db = state.db()?;
    db::ensure_tables_exist(db).await?;
    let report = db::test_connection(db).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Database connection OK",
        "report": report,
    })))
}

#[derive(Debug, Serialize)]
struct Step {
    step: &'static str,
    ok: bool,
    detail: String,
}

impl Step {
    fn record<T>(step: &'static str, result: &AppResult<T>, detail: impl FnOnce(&T) -> String) -> Self {
        match result {
            Ok(value) => Self {
                step,
                ok: true,
                detail: detail(value),
            },
            Err(e) => Self {
                step,
                ok: false,
                detail: e.to_string(),
            },
        }
    }
}

/// Walks the link store through list, lookup, save and delete.
pub async fn test_links(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let db = state.db()?;
    let mut steps = Vec::with_capacity(4);

    let listed = links::list_links(db).await;
    steps.push(Step::record("list", &listed, |l| format!("{} links", l.len())));

    let lookup = links::get_link_by_slug(db, "github").await;
    steps.push(Step {
        step: "lookup github",
        ok: true,
        detail: match &lookup {
            Ok(link) => format!("found {}", link.url),
            Err(e) => e.to_string(),
        },
    });

    let check_link = Link {
        id: Uuid::new_v4().to_string(),
        url: "https://example.com/diagnostics".to_string(),
        slug: format!("test-{}", Utc::now().timestamp_millis()),
        title: Some("Diagnostics".to_string()),
        created_at: Utc::now(),
    };
    let saved = links::save_link(db, &check_link).await;
    steps.push(Step::record("save", &saved, |l| format!("saved {}", l.slug)));

    if saved.is_ok() {
        let deleted = links::delete_link(db, &check_link.id).await;
        steps.push(Step::record("delete", &deleted, |_| format!("deleted {}", check_link.slug)));
    }

    let success = steps.iter().all(|s| s.ok);
    if !success {
        tracing::warn!("link self-test reported failures");
    }
    Ok(Json(json!({ "success": success, "steps": steps })))
}

pub async fn test_ai_status(State(state): State<AppState>) -> Json<Value> {
    let key = state.suggestions.api_key();
    Json(json!({
        "success": true,
        "hasApiKey": key.is_some(),
        "keyLength": key.map(str::len).unwrap_or(0),
        "keyPreview": key.map(|k| format!("{}...", k.chars().take(10).collect::<String>())),
    }))
}

pub async fn test_ai_run(State(state): State<AppState>) -> Json<Value> {
    let outcome = state.suggestions.suggest("https://github.com").await;
    Json(json!({
        "success": outcome.success,
        "hasApiKey": state.suggestions.api_key().is_some(),
        "result": outcome,
    }))
}
