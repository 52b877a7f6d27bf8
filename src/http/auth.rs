//! X-API-Key authentication middleware (§4.11, ground truth:
//! `original_source/src/security.py`'s `APIKeyHeader` dependency).

use axum::extract::{Request, State};
use axum::http::header::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;

use super::AppState;

const HEADER_NAME: &str = "x-api-key";

pub async fn require_api_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = headers.get(HEADER_NAME).and_then(|v| v.to_str().ok()).ok_or(ApiError::Unauthorized)?;

    if !state.store.is_valid_api_key(key).await? {
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}
