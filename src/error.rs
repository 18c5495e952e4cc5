use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::blob::BlobError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not configured")]
    NotConfigured(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("slug \"{0}\" is already in use")]
    SlugTaken(String),

    #[error("{0}")]
    Gone(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("storage error: {0}")]
    Storage(#[from] BlobError),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

/// Body of every failed API response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Validation(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SlugTaken(_) => StatusCode::CONFLICT,
            AppError::Gone(_) => StatusCode::GONE,
            AppError::Storage(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short message shown to the user; raw causes go to `details`.
    pub fn client_message(&self) -> String {
        match self {
            AppError::NotConfigured(_)
            | AppError::Validation(_)
            | AppError::NotFound(_)
            | AppError::Gone(_) => self.to_string(),
            AppError::SlugTaken(_) => "Slug already exists".to_string(),
            AppError::Database(_) => "Database error".to_string(),
            AppError::Storage(_) => "File storage failed".to_string(),
            AppError::Json(_) => "Invalid JSON".to_string(),
            AppError::Internal(_) => "Unexpected error".to_string(),
        }
    }

    pub fn details(&self) -> Option<String> {
        match self {
            AppError::SlugTaken(_) => Some(self.to_string()),
            AppError::Database(e) => Some(e.to_string()),
            AppError::Storage(e) => Some(e.to_string()),
            AppError::Json(e) => Some(e.to_string()),
            AppError::Internal(msg) => Some(msg.clone()),
            _ => None,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            error: self.client_message(),
            details: self.details(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}
