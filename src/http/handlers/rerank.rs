//! `POST /rerank` — C3 passthrough: score caller-supplied candidates against
//! a caller-supplied query, with no C8 involvement (§6: `{"query", "candidates"} ->
//! {"reranked_candidates": [...]}`).

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiResult;
use crate::reranker::{extract_content, RerankCandidate};

use super::super::AppState;

#[derive(Debug, Deserialize)]
pub struct RerankRequest {
    pub query: String,
    pub candidates: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct RerankResponse {
    pub reranked_candidates: Vec<Value>,
}

pub async fn rerank(State(state): State<AppState>, Json(req): Json<RerankRequest>) -> ApiResult<Json<RerankResponse>> {
    let candidates: Vec<RerankCandidate> = req
        .candidates
        .into_iter()
        .map(|payload| {
            let content = extract_content("passthrough", &payload);
            RerankCandidate { payload, content, reranker_score: None }
        })
        .collect();

    let reranked = state.reranker.rerank(&req.query, candidates).await?;

    let reranked_candidates = reranked
        .into_iter()
        .map(|c| {
            let mut obj = c.payload;
            if let Value::Object(ref mut map) = obj {
                map.insert("reranker_score".to_string(), serde_json::json!(c.reranker_score.unwrap_or(0.0)));
            }
            obj
        })
        .collect();

    Ok(Json(RerankResponse { reranked_candidates }))
}
