//! `POST /embedding` — C2 single-text embed (§6: `{"text": str} -> {"embedding": [float]}`).

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingError;
use crate::error::ApiResult;

use super::super::AppState;

#[derive(Debug, Deserialize)]
pub struct EmbeddingRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
}

pub async fn embed(
    State(state): State<AppState>,
    Json(req): Json<EmbeddingRequest>,
) -> ApiResult<Json<EmbeddingResponse>> {
    let embedding = state.embedder.embed(&req.text).await?.ok_or(EmbeddingError::EmptyInput)?;
    Ok(Json(EmbeddingResponse { embedding }))
}
