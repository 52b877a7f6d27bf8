//! Reranker Service (C3): pluggable cross-encoder scoring of (query,
//! candidate) pairs. Trait shape follows the same provider-selection
//! pattern as `embedding` (§9 "Pluggable providers").

pub mod api;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RerankError {
    #[error("reranker provider request failed: {0}")]
    Provider(String),
}

pub type RerankResult<T> = Result<T, RerankError>;

/// A type-tagged candidate document. The dispatcher in `extract_content`
/// maps each kind to the field(s) a cross-encoder actually scores, matching
/// §4.3's table (issue→title+body; forum→title+conversation; doc→markdown;
/// qa→question+answer; keyword→keyword+definition).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankCandidate {
    #[serde(flatten)]
    pub payload: serde_json::Value,
    pub content: String,
    pub reranker_score: Option<f32>,
}

pub fn extract_content(kind: &str, payload: &serde_json::Value) -> String {
    let get = |k: &str| payload.get(k).and_then(|v| v.as_str()).unwrap_or("").to_string();
    match kind {
        "issue" => format!("{}\n{}", get("title"), get("body")),
        "forum" => format!("{}\n{}", get("title"), get("conversation")),
        "doc" => get("markdown"),
        "qa" => format!("{}\n{}", get("question"), get("answer")),
        "keyword" => format!("{}: {}", get("keyword"), get("definition")),
        _ => get("content"),
    }
}

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score candidates against `query`, returning them sorted descending by
    /// score. On provider failure, callers should fall back to the input
    /// order (§4.3's non-fatal contract) rather than propagating the error
    /// up through the search facade — that fallback lives in
    /// `search::rerank_facade`, not here, so the trait itself stays honest
    /// about failure.
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RerankCandidate>,
    ) -> RerankResult<Vec<RerankCandidate>>;
}

pub fn build_reranker(cfg: &crate::config::RerankerConfig) -> Box<dyn Reranker> {
    match cfg.provider {
        crate::config::RerankerProvider::Api => Box::new(api::ApiReranker::new(cfg)),
        crate::config::RerankerProvider::Local => {
            // No in-process cross-encoder is bundled; the API provider with
            // a loopback base URL covers the local case in this crate's
            // deployment model, matching the donor's pattern of treating
            // model internals as a black box (§1 out-of-scope).
            Box::new(api::ApiReranker::new(cfg))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_content_dispatches_by_kind() {
        let issue = json!({"title": "T", "body": "B"});
        assert_eq!(extract_content("issue", &issue), "T\nB");

        let doc = json!({"markdown": "M"});
        assert_eq!(extract_content("doc", &doc), "M");

        let qa = json!({"question": "Q", "answer": "A"});
        assert_eq!(extract_content("qa", &qa), "Q\nA");
    }
}
