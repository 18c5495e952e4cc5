use axum::{body::Bytes, extract::State, Json};
use serde::Deserialize;

use super::parse_json;
use crate::error::{AppError, AppResult};
use crate::suggestions::SuggestionOutcome;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SuggestionRequest {
    #[serde(default)]
    link: Option<String>,
}

pub async fn suggest_slugs(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<SuggestionOutcome>> {
    let request: SuggestionRequest = parse_json(&body)?;
    let link = request
        .link
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .ok_or_else(|| AppError::Validation("Link is required".to_string()))?;

    tracing::debug!(%link, "generating slug suggestions");
    Ok(Json(state.suggestions.suggest(&link).await))
}
