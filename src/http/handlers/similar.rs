//! `/v1/similar-*` and `/v2/similar-*` — C8 raw and C9 reranked similarity
//! search over issues, docs, forum posts, and QAs, plus their four-way
//! fan-outs. Response shape follows §6: "list of objects with at minimum
//! `{id or number, url, similarity_score}`; issue responses additionally
//! include `title` and `state`; QA responses include `question` and
//! `answer`; doc responses include `url`."

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::{models::SourceKind, DbError, Store};
use crate::error::{ApiError, ApiResult};
use crate::search::rerank_facade::reranked_search;
use crate::search::{doc_query, forum_query, issue_query, qa_query, SimilarityRow};

use super::super::AppState;

#[derive(Debug, Deserialize)]
pub struct SimilarityRequest {
    pub text: String,
    pub state: Option<String>,
}

/// Validate the optional `state` filter: one of `open`/`closed`,
/// case-insensitive; anything else is a 422 (§6's validator contract).
fn validate_state(state: Option<&str>) -> ApiResult<Option<&'static str>> {
    match state {
        None => Ok(None),
        Some(s) => match s.to_lowercase().as_str() {
            "open" => Ok(Some("state = 'open'")),
            "closed" => Ok(Some("state = 'closed'")),
            _ => Err(ApiError::Validation(format!("state must be 'open' or 'closed', got {s:?}"))),
        },
    }
}

async fn embed_or_fail(state: &AppState, text: &str) -> ApiResult<Vec<f32>> {
    Ok(state.embedder.embed(text).await?.ok_or(crate::embedding::EmbeddingError::EmptyInput)?)
}

async fn fetch_issue_payloads(store: &Store, ids: &[i64]) -> ApiResult<HashMap<i64, Value>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i64, i64, String, String)> =
        sqlx::query_as("SELECT id, number, title, state FROM issues WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&store.pool)
            .await
            .map_err(DbError::from)?;
    Ok(rows
        .into_iter()
        .map(|(id, number, title, state)| {
            (id, json!({"id": id, "number": number, "title": title, "state": state, "url": format!("issues/{number}")}))
        })
        .collect())
}

async fn fetch_doc_payloads(store: &Store, ids: &[i64]) -> ApiResult<HashMap<i64, Value>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i64, String, String)> =
        sqlx::query_as("SELECT id, url, markdown FROM metabase_docs WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&store.pool)
            .await
            .map_err(DbError::from)?;
    Ok(rows.into_iter().map(|(id, url, markdown)| (id, json!({"id": id, "url": url, "markdown": markdown}))).collect())
}

async fn fetch_forum_payloads(store: &Store, ids: &[i64]) -> ApiResult<HashMap<i64, Value>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i64, String, String, String)> =
        sqlx::query_as("SELECT id, title, conversation, slug FROM discourse_posts WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&store.pool)
            .await
            .map_err(DbError::from)?;
    Ok(rows
        .into_iter()
        .map(|(id, title, conversation, slug)| (id, json!({"id": id, "title": title, "conversation": conversation, "url": slug})))
        .collect())
}

async fn resolve_qa_source_url(store: &Store, kind: SourceKind, id: i64) -> Option<String> {
    match kind {
        SourceKind::MetabaseDoc => sqlx::query_scalar("SELECT url FROM metabase_docs WHERE id = $1")
            .bind(id)
            .fetch_optional(&store.pool)
            .await
            .ok()
            .flatten(),
        SourceKind::Issue => sqlx::query_scalar::<_, i64>("SELECT number FROM issues WHERE id = $1")
            .bind(id)
            .fetch_optional(&store.pool)
            .await
            .ok()
            .flatten()
            .map(|n| format!("issues/{n}")),
        SourceKind::DiscoursePost => sqlx::query_scalar("SELECT slug FROM discourse_posts WHERE id = $1")
            .bind(id)
            .fetch_optional(&store.pool)
            .await
            .ok()
            .flatten(),
    }
}

async fn fetch_qa_payloads(store: &Store, ids: &[i64]) -> ApiResult<HashMap<i64, Value>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i64, String, String, SourceKind, i64)> = sqlx::query_as(
        "SELECT id, question, answer, source_type, source_id FROM questions WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(&store.pool)
    .await
    .map_err(DbError::from)?;

    let mut out = HashMap::new();
    for (id, question, answer, source_type, source_id) in rows {
        let url = resolve_qa_source_url(store, source_type, source_id).await;
        out.insert(id, json!({"id": id, "question": question, "answer": answer, "url": url}));
    }
    Ok(out)
}

/// Merge each row's similarity score into its fetched payload, in
/// similarity-descending order, dropping rows whose payload vanished
/// between the C8 search and the bulk fetch (deleted concurrently).
fn assemble(rows: &[SimilarityRow], payloads: &HashMap<i64, Value>) -> Vec<Value> {
    rows.iter()
        .filter_map(|r| {
            payloads.get(&r.id).map(|p| {
                let mut obj = p.clone();
                if let Value::Object(ref mut map) = obj {
                    map.insert("similarity_score".to_string(), json!(r.similarity));
                }
                obj
            })
        })
        .collect()
}

/// Positionally align rows with their payload, dropping unmatched rows, so
/// the two vectors satisfy `reranked_search`'s alignment requirement.
fn order_payloads(rows: &[SimilarityRow], payloads: &HashMap<i64, Value>) -> (Vec<SimilarityRow>, Vec<Value>) {
    let mut out_rows = Vec::new();
    let mut out_payloads = Vec::new();
    for r in rows {
        if let Some(p) = payloads.get(&r.id) {
            out_rows.push(r.clone());
            out_payloads.push(p.clone());
        }
    }
    (out_rows, out_payloads)
}

fn reranked_to_json(results: Vec<crate::search::rerank_facade::RerankedResult>) -> Vec<Value> {
    results
        .into_iter()
        .map(|r| {
            let mut obj = r.payload;
            if let Value::Object(ref mut map) = obj {
                map.insert("similarity_score".to_string(), json!(r.similarity_score));
                map.insert("reranker_score".to_string(), json!(r.reranker_score));
            }
            obj
        })
        .collect()
}

pub async fn similar_issues_v1(
    State(state): State<AppState>,
    Json(req): Json<SimilarityRequest>,
) -> ApiResult<Json<Vec<Value>>> {
    let where_clause = validate_state(req.state.as_deref())?;
    let embedding = embed_or_fail(&state, &req.text).await?;
    let rows = state.similarity.search(&issue_query(), &embedding, where_clause, None).await?;
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let payloads = fetch_issue_payloads(&state.store, &ids).await?;
    Ok(Json(assemble(&rows, &payloads)))
}

pub async fn similar_docs_v1(
    State(state): State<AppState>,
    Json(req): Json<SimilarityRequest>,
) -> ApiResult<Json<Vec<Value>>> {
    let embedding = embed_or_fail(&state, &req.text).await?;
    let rows = state.similarity.search(&doc_query(), &embedding, None, None).await?;
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let payloads = fetch_doc_payloads(&state.store, &ids).await?;
    Ok(Json(assemble(&rows, &payloads)))
}

pub async fn similar_forum_v1(
    State(state): State<AppState>,
    Json(req): Json<SimilarityRequest>,
) -> ApiResult<Json<Vec<Value>>> {
    let embedding = embed_or_fail(&state, &req.text).await?;
    let rows = state.similarity.search(&forum_query(), &embedding, None, None).await?;
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let payloads = fetch_forum_payloads(&state.store, &ids).await?;
    Ok(Json(assemble(&rows, &payloads)))
}

pub async fn similar_qas_v1(
    State(state): State<AppState>,
    Json(req): Json<SimilarityRequest>,
) -> ApiResult<Json<Vec<Value>>> {
    let embedding = embed_or_fail(&state, &req.text).await?;
    let rows = state.similarity.search(&qa_query(), &embedding, None, None).await?;
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let payloads = fetch_qa_payloads(&state.store, &ids).await?;
    Ok(Json(assemble(&rows, &payloads)))
}

pub async fn similar_all_v1(
    State(state): State<AppState>,
    Json(req): Json<SimilarityRequest>,
) -> ApiResult<Json<Value>> {
    let embedding = embed_or_fail(&state, &req.text).await?;

    let (issues, docs, forum, qas) = tokio::join!(
        state.similarity.search(&issue_query(), &embedding, None, None),
        state.similarity.search(&doc_query(), &embedding, None, None),
        state.similarity.search(&forum_query(), &embedding, None, None),
        state.similarity.search(&qa_query(), &embedding, None, None),
    );
    // gather-style exception tolerance (§5): a failing branch yields empty.
    let issues = issues.unwrap_or_default();
    let docs = docs.unwrap_or_default();
    let forum = forum.unwrap_or_default();
    let qas = qas.unwrap_or_default();

    let issue_payloads = fetch_issue_payloads(&state.store, &ids_of(&issues)).await.unwrap_or_default();
    let doc_payloads = fetch_doc_payloads(&state.store, &ids_of(&docs)).await.unwrap_or_default();
    let forum_payloads = fetch_forum_payloads(&state.store, &ids_of(&forum)).await.unwrap_or_default();
    let qa_payloads = fetch_qa_payloads(&state.store, &ids_of(&qas)).await.unwrap_or_default();

    Ok(Json(json!({
        "issues": assemble(&issues, &issue_payloads),
        "docs": assemble(&docs, &doc_payloads),
        "forum": assemble(&forum, &forum_payloads),
        "questions": assemble(&qas, &qa_payloads),
    })))
}

fn ids_of(rows: &[SimilarityRow]) -> Vec<i64> {
    rows.iter().map(|r| r.id).collect()
}

pub async fn similar_issues_v2(
    State(state): State<AppState>,
    Json(req): Json<SimilarityRequest>,
) -> ApiResult<Json<Vec<Value>>> {
    let where_clause = validate_state(req.state.as_deref())?;
    let embedding = embed_or_fail(&state, &req.text).await?;
    let rows = state.similarity.search(&issue_query(), &embedding, where_clause, None).await?;
    let payloads = fetch_issue_payloads(&state.store, &ids_of(&rows)).await?;
    let (rows, payloads) = order_payloads(&rows, &payloads);
    let reranked = reranked_search(state.reranker.as_ref(), &req.text, "issue", rows, payloads, state.reranker_max_candidates, state.reranker_enabled).await;
    Ok(Json(reranked_to_json(reranked)))
}

pub async fn similar_docs_v2(
    State(state): State<AppState>,
    Json(req): Json<SimilarityRequest>,
) -> ApiResult<Json<Vec<Value>>> {
    let embedding = embed_or_fail(&state, &req.text).await?;
    let rows = state.similarity.search(&doc_query(), &embedding, None, None).await?;
    let payloads = fetch_doc_payloads(&state.store, &ids_of(&rows)).await?;
    let (rows, payloads) = order_payloads(&rows, &payloads);
    let reranked = reranked_search(state.reranker.as_ref(), &req.text, "doc", rows, payloads, state.reranker_max_candidates, state.reranker_enabled).await;
    Ok(Json(reranked_to_json(reranked)))
}

pub async fn similar_forum_v2(
    State(state): State<AppState>,
    Json(req): Json<SimilarityRequest>,
) -> ApiResult<Json<Vec<Value>>> {
    let embedding = embed_or_fail(&state, &req.text).await?;
    let rows = state.similarity.search(&forum_query(), &embedding, None, None).await?;
    let payloads = fetch_forum_payloads(&state.store, &ids_of(&rows)).await?;
    let (rows, payloads) = order_payloads(&rows, &payloads);
    let reranked = reranked_search(state.reranker.as_ref(), &req.text, "forum", rows, payloads, state.reranker_max_candidates, state.reranker_enabled).await;
    Ok(Json(reranked_to_json(reranked)))
}

pub async fn similar_qas_v2(
    State(state): State<AppState>,
    Json(req): Json<SimilarityRequest>,
) -> ApiResult<Json<Vec<Value>>> {
    let embedding = embed_or_fail(&state, &req.text).await?;
    let rows = state.similarity.search(&qa_query(), &embedding, None, None).await?;
    let payloads = fetch_qa_payloads(&state.store, &ids_of(&rows)).await?;
    let (rows, payloads) = order_payloads(&rows, &payloads);
    let reranked = reranked_search(state.reranker.as_ref(), &req.text, "qa", rows, payloads, state.reranker_max_candidates, state.reranker_enabled).await;
    Ok(Json(reranked_to_json(reranked)))
}

pub async fn similar_all_v2(
    State(state): State<AppState>,
    Json(req): Json<SimilarityRequest>,
) -> ApiResult<Json<Value>> {
    let embedding = embed_or_fail(&state, &req.text).await?;

    let (issues, docs, forum, qas) = tokio::join!(
        state.similarity.search(&issue_query(), &embedding, None, None),
        state.similarity.search(&doc_query(), &embedding, None, None),
        state.similarity.search(&forum_query(), &embedding, None, None),
        state.similarity.search(&qa_query(), &embedding, None, None),
    );
    let issues = issues.unwrap_or_default();
    let docs = docs.unwrap_or_default();
    let forum = forum.unwrap_or_default();
    let qas = qas.unwrap_or_default();

    let issue_payloads = fetch_issue_payloads(&state.store, &ids_of(&issues)).await.unwrap_or_default();
    let doc_payloads = fetch_doc_payloads(&state.store, &ids_of(&docs)).await.unwrap_or_default();
    let forum_payloads = fetch_forum_payloads(&state.store, &ids_of(&forum)).await.unwrap_or_default();
    let qa_payloads = fetch_qa_payloads(&state.store, &ids_of(&qas)).await.unwrap_or_default();

    let (issue_rows, issue_payloads) = order_payloads(&issues, &issue_payloads);
    let (doc_rows, doc_payloads) = order_payloads(&docs, &doc_payloads);
    let (forum_rows, forum_payloads) = order_payloads(&forum, &forum_payloads);
    let (qa_rows, qa_payloads) = order_payloads(&qas, &qa_payloads);

    let max_candidates = state.reranker_max_candidates;
    let reranker_enabled = state.reranker_enabled;
    let (issues, docs, forum, qas) = tokio::join!(
        reranked_search(state.reranker.as_ref(), &req.text, "issue", issue_rows, issue_payloads, max_candidates, reranker_enabled),
        reranked_search(state.reranker.as_ref(), &req.text, "doc", doc_rows, doc_payloads, max_candidates, reranker_enabled),
        reranked_search(state.reranker.as_ref(), &req.text, "forum", forum_rows, forum_payloads, max_candidates, reranker_enabled),
        reranked_search(state.reranker.as_ref(), &req.text, "qa", qa_rows, qa_payloads, max_candidates, reranker_enabled),
    );

    Ok(Json(json!({
        "issues": reranked_to_json(issues),
        "docs": reranked_to_json(docs),
        "forum": reranked_to_json(forum),
        "questions": reranked_to_json(qas),
    })))
}
