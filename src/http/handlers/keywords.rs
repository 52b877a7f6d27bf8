//! `/keywords/*`, `/synonyms/*` — C5 admin CRUD over keyword definitions and
//! their synonyms, dispatched straight through to `KeywordService`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::db::models::{Keyword, Synonym};
use crate::error::{ApiError, ApiResult};

use super::super::AppState;

#[derive(Debug, Deserialize)]
pub struct CategoryFilter {
    pub category: Option<String>,
}

pub async fn list_keywords(
    State(state): State<AppState>,
    Query(filter): Query<CategoryFilter>,
) -> ApiResult<Json<Vec<Keyword>>> {
    Ok(Json(state.keywords.list_keywords(filter.category.as_deref()).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateKeywordRequest {
    pub keyword: String,
    pub definition: String,
    pub category: Option<String>,
}

pub async fn create_keyword(
    State(state): State<AppState>,
    Json(req): Json<CreateKeywordRequest>,
) -> ApiResult<StatusCode> {
    let created = state.keywords.add_keyword(&req.keyword, &req.definition, req.category.as_deref()).await?;
    if created {
        Ok(StatusCode::CREATED)
    } else {
        Err(ApiError::Validation(format!("keyword {:?} already exists", req.keyword)))
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateKeywordRequest {
    pub definition: String,
    pub category: Option<String>,
}

pub async fn update_keyword(
    State(state): State<AppState>,
    Path(keyword): Path<String>,
    Json(req): Json<UpdateKeywordRequest>,
) -> ApiResult<StatusCode> {
    let updated = state.keywords.update_keyword(&keyword, &req.definition, req.category.as_deref()).await?;
    if updated {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::Validation(format!("keyword {keyword:?} not found")))
    }
}

pub async fn delete_keyword(State(state): State<AppState>, Path(keyword): Path<String>) -> ApiResult<StatusCode> {
    let deleted = state.keywords.delete_keyword(&keyword).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::Validation(format!("keyword {keyword:?} not found")))
    }
}

pub async fn toggle_keyword(State(state): State<AppState>, Path(keyword): Path<String>) -> ApiResult<StatusCode> {
    let toggled = state.keywords.toggle_keyword_status(&keyword).await?;
    if toggled {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::Validation(format!("keyword {keyword:?} not found")))
    }
}

#[derive(Debug, Deserialize)]
pub struct SynonymFilter {
    pub synonym_of: Option<String>,
}

pub async fn list_synonyms(
    State(state): State<AppState>,
    Query(filter): Query<SynonymFilter>,
) -> ApiResult<Json<Vec<Synonym>>> {
    Ok(Json(state.keywords.list_synonyms(filter.synonym_of.as_deref()).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateSynonymRequest {
    pub word: String,
    pub synonym_of: String,
}

pub async fn create_synonym(
    State(state): State<AppState>,
    Json(req): Json<CreateSynonymRequest>,
) -> ApiResult<StatusCode> {
    let created = state.keywords.add_synonym(&req.word, &req.synonym_of).await?;
    if created {
        Ok(StatusCode::CREATED)
    } else {
        Err(ApiError::Validation(format!("synonym {:?} of {:?} already exists", req.word, req.synonym_of)))
    }
}

pub async fn delete_synonym(
    State(state): State<AppState>,
    Path((word, synonym_of)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let deleted = state.keywords.delete_synonym(&word, &synonym_of).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::Validation(format!("synonym {word:?} of {synonym_of:?} not found")))
    }
}
