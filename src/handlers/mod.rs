pub mod collections;
pub mod diagnostics;
pub mod files;
pub mod links;
pub mod suggestions;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::AppResult;

/// Success envelope shared by the JSON API.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { success: true, data })
}

/// Parses a request body so malformed JSON gets the same error shape as
/// every other failure.
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> AppResult<T> {
    Ok(serde_json::from_slice(body)?)
}

/// `302 Found` to `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

pub fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}
