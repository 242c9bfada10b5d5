use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::repository::RepoError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found")]
    NotFound,
    #[error("metric exists with a different kind")]
    TypeMismatch,
    #[error("repository error: {0}")]
    Persist(String),
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::TypeMismatch => ApiError::TypeMismatch,
            RepoError::EmptyId | RepoError::UnknownKind => ApiError::BadRequest(err.to_string()),
            RepoError::Cancelled | RepoError::Timeout => ApiError::Persist(err.to_string()),
            RepoError::Persist(msg) => ApiError::Persist(msg),
            RepoError::Database(e) => ApiError::Persist(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::TypeMismatch => (
                StatusCode::BAD_REQUEST,
                "metric exists with a different kind".to_string(),
            ),
            ApiError::Persist(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        if status.as_u16() >= 500 {
            tracing::error!(error = %self, "request failed");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Body for `POST /value/`: the client supplies `id` and `type`, the server
/// echoes back `delta` or `value`.
#[derive(Debug, Deserialize)]
pub struct GetMetricRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}
