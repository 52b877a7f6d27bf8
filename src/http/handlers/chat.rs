//! `POST /v2/chat` — C10 (§6: `{"text", "chat_id"} -> {"answer", "sources"}`).

use axum::extract::State;
use axum::Json;

use crate::chat::{ChatRequest, ChatResponse};
use crate::error::ApiResult;

use super::super::AppState;

pub async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> ApiResult<Json<ChatResponse>> {
    let response = state.chat_engine.chat(req).await?;
    Ok(Json(response))
}
