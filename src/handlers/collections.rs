use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::parse_json;
use crate::collections::{self, ExportedCollection, ImportedCollection};
use crate::error::{AppError, AppResult};
use crate::models::{Link, NewLink};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    links: Option<Vec<NewLink>>,
    #[serde(default)]
    collection_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Flattened<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

impl<T> Flattened<T> {
    fn ok(body: T) -> Json<Self> {
        Json(Self { success: true, body })
    }
}

pub async fn create_collection(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<Flattened<ExportedCollection>>> {
    let db = state.db()?;
    let request: ExportRequest = parse_json(&body)?;
    let links: Vec<Link> = request
        .links
        .ok_or_else(|| AppError::Validation("Links array is required".to_string()))?
        .into_iter()
        .map(NewLink::into_link)
        .collect();

    let exported = collections::export_collection(
        db,
        &links,
        request.collection_name.as_deref(),
        &state.config.public_base_url,
    )
    .await?;
    Ok(Flattened::ok(exported))
}

pub async fn get_collection(
    State(state): State<AppState>,
    Path(access_key): Path<String>,
) -> AppResult<Json<Flattened<ImportedCollection>>> {
    let imported = collections::import_collection(state.db()?, &access_key).await?;
    Ok(Flattened::ok(imported))
}
