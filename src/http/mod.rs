//! HTTP API Surface (C11). Route table and shared application state.
//! Layering style (sub-router per concern, `from_fn_with_state` middleware,
//! merge into one `Router`) follows the donor's HTTP surface conventions,
//! enriched from `jlon-stellar`'s `main.rs` since the donor itself has none.

pub mod auth;
pub mod handlers;
pub mod rate_limit;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::batch::BatchOrchestrator;
use crate::chat::ChatEngine;
use crate::db::Store;
use crate::embedding::Embedder;
use crate::keywords::KeywordService;
use crate::llm::LlmClient;
use crate::reranker::Reranker;
use crate::search::SimilarityEngine;

use rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub embedder: Arc<dyn Embedder>,
    pub reranker: Arc<dyn Reranker>,
    pub similarity: Arc<SimilarityEngine>,
    pub keywords: Arc<KeywordService>,
    pub llm: Arc<dyn LlmClient>,
    pub chat_engine: Arc<ChatEngine>,
    pub batch: Arc<BatchOrchestrator>,
    pub similarity_rate_limiter: Arc<RateLimiter>,
    pub embedding_rate_limiter: Arc<RateLimiter>,
    pub reranker_max_candidates: usize,
    pub reranker_enabled: bool,
}

async fn healthz() -> &'static str {
    "OK"
}

/// Assemble the full router: similarity/rerank endpoints get the
/// similarity rate limit, `/embedding` gets its own (higher) limit, and
/// every route group carries the `X-API-Key` auth middleware except the
/// unauthenticated liveness probe.
pub fn build_router(state: AppState) -> Router {
    let similarity_routes = Router::new()
        .route("/rerank", post(handlers::rerank::rerank))
        .route("/v1/similar-github-issues", post(handlers::similar::similar_issues_v1))
        .route("/v1/similar-metabase-docs", post(handlers::similar::similar_docs_v1))
        .route("/v1/similar-discourse-posts", post(handlers::similar::similar_forum_v1))
        .route("/v1/similar-questions", post(handlers::similar::similar_qas_v1))
        .route("/v1/similar", post(handlers::similar::similar_all_v1))
        .route("/v2/similar-github-issues", post(handlers::similar::similar_issues_v2))
        .route("/v2/similar-metabase-docs", post(handlers::similar::similar_docs_v2))
        .route("/v2/similar-discourse-posts", post(handlers::similar::similar_forum_v2))
        .route("/v2/similar-questions", post(handlers::similar::similar_qas_v2))
        .route("/v2/similar", post(handlers::similar::similar_all_v2))
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit::similarity_rate_limit));

    let embedding_routes = Router::new()
        .route("/embedding", post(handlers::embedding::embed))
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit::embedding_rate_limit));

    let chat_routes = Router::new().route("/v2/chat", post(handlers::chat::chat));

    let admin_routes = Router::new()
        .route(
            "/keywords",
            get(handlers::keywords::list_keywords).post(handlers::keywords::create_keyword),
        )
        .route(
            "/keywords/:keyword",
            put(handlers::keywords::update_keyword).delete(handlers::keywords::delete_keyword),
        )
        .route("/keywords/:keyword/toggle", post(handlers::keywords::toggle_keyword))
        .route(
            "/synonyms",
            get(handlers::keywords::list_synonyms).post(handlers::keywords::create_synonym),
        )
        .route("/synonyms/:word/:synonym_of", axum::routing::delete(handlers::keywords::delete_synonym));

    let authenticated = similarity_routes
        .merge(embedding_routes)
        .merge(chat_routes)
        .merge(admin_routes)
        .layer(axum::middleware::from_fn_with_state(state.clone(), auth::require_api_key));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(authenticated)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
