//! Crate-wide error type and HTTP error mapping for the API boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::batch::BatchError;
use crate::chat::ChatError;
use crate::db::DbError;
use crate::embedding::EmbeddingError;
use crate::llm::LlmError;
use crate::reranker::RerankError;

/// Errors surfaced at the HTTP boundary. Variants map to the taxonomy in
/// the error handling design: validation/auth/rate-limit become 4xx,
/// everything else becomes a generic 500 so internal detail never leaks.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid API key")]
    Unauthorized,

    #[error("{0}")]
    Validation(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Rerank(#[from] RerankError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Chat(#[from] ChatError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            ApiError::Embedding(EmbeddingError::EmptyInput) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "failed to create embedding".to_string())
            }
            ApiError::Chat(ChatError::TextTooShort) => (StatusCode::BAD_REQUEST, self.to_string()),
            _ => {
                tracing::error!(error = %self, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, axum::Json(json!({ "detail": detail }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
