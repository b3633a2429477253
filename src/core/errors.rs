use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("empty input: {0}")]
    EmptyInput(String),
    #[error("missing content: {0}")]
    MissingContent(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding provider error: {0}")]
    EmbeddingProvider(String),
    #[error("sentiment provider error: {0}")]
    SentimentProvider(String),
    #[error("generation provider error: {0}")]
    GenerationProvider(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    /// True for failures that originated in an external model provider.
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            ApiError::EmbeddingProvider(_)
                | ApiError::SentimentProvider(_)
                | ApiError::GenerationProvider(_)
                | ApiError::DimensionMismatch { .. }
        )
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::EmptyInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::MissingContent(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::DimensionMismatch { .. } => (StatusCode::BAD_GATEWAY, self.to_string()),
            ApiError::EmbeddingProvider(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::SentimentProvider(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::GenerationProvider(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
