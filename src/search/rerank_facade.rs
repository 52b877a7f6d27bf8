//! Reranked Search Facade (C9): C8 (with threshold) → rerank candidates →
//! C3 → truncate → filter positive scores → map back.

use crate::reranker::{extract_content, RerankCandidate, Reranker};
use super::SimilarityRow;

#[derive(Debug, Clone, serde::Serialize)]
pub struct RerankedResult {
    pub id: i64,
    pub similarity_score: f32,
    pub reranker_score: f32,
    pub payload: serde_json::Value,
}

/// Return rows in C8's own similarity order, synthesizing a `reranker_score`
/// equal to the similarity so callers see a consistent shape regardless of
/// whether reranking actually ran (§4.3: "returns the input order
/// unchanged").
fn passthrough(rows: &[SimilarityRow], payloads: &[serde_json::Value]) -> Vec<RerankedResult> {
    rows.iter()
        .zip(payloads.iter())
        .map(|(row, payload)| RerankedResult {
            id: row.id,
            similarity_score: row.similarity,
            reranker_score: row.similarity,
            payload: payload.clone(),
        })
        .collect()
}

/// Run the C8→C3 pipeline. `kind` selects the content-extraction dispatcher
/// (§4.3's issue/forum/doc/qa/keyword table); `payloads` must be aligned
/// positionally with `rows` (the caller already fetched full rows for the
/// candidates returned by C8). `enabled` is `cfg.reranker.enabled`: when
/// false, or when `rows` is empty, the reranker is never called and the
/// input order is returned unchanged (§4.3).
#[allow(clippy::too_many_arguments)]
pub async fn reranked_search(
    reranker: &dyn Reranker,
    query_text: &str,
    kind: &str,
    rows: Vec<SimilarityRow>,
    payloads: Vec<serde_json::Value>,
    max_candidates: usize,
    enabled: bool,
) -> Vec<RerankedResult> {
    if rows.is_empty() {
        return Vec::new();
    }

    let truncated_len = rows.len().min(max_candidates);
    let rows = &rows[..truncated_len];
    let payloads = &payloads[..truncated_len];

    if !enabled {
        return passthrough(rows, payloads);
    }

    let candidates: Vec<RerankCandidate> = payloads
        .iter()
        .map(|p| RerankCandidate { payload: p.clone(), content: extract_content(kind, p), reranker_score: None })
        .collect();

    let reranked = match reranker.rerank(query_text, candidates).await {
        Ok(r) => r,
        Err(e) => {
            // Non-fatal: fall back to C8's own ordering (§4.3: "on provider
            // exception, return the input list untouched").
            tracing::warn!(error = %e, "reranker failed, falling back to similarity order");
            return passthrough(rows, payloads);
        }
    };

    // similarity_score must travel with the payload through the rerank
    // step; match back up by id since reranking reorders the list.
    let similarity_by_payload: std::collections::HashMap<i64, f32> =
        rows.iter().map(|r| (r.id, r.similarity)).collect();

    reranked
        .into_iter()
        .filter(|c| c.reranker_score.unwrap_or(0.0) > 0.0)
        .map(|c| {
            let id = c.payload.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
            RerankedResult {
                id,
                similarity_score: similarity_by_payload.get(&id).copied().unwrap_or(0.0),
                reranker_score: c.reranker_score.unwrap_or(0.0),
                payload: c.payload,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::reranker::{RerankError, RerankResult};
    use serde_json::json;

    struct IdentityReranker;
    #[async_trait]
    impl Reranker for IdentityReranker {
        async fn rerank(&self, _query: &str, mut candidates: Vec<RerankCandidate>) -> RerankResult<Vec<RerankCandidate>> {
            for (i, c) in candidates.iter_mut().enumerate() {
                c.reranker_score = Some(1.0 - i as f32 * 0.1);
            }
            Ok(candidates)
        }
    }

    struct FailingReranker;
    #[async_trait]
    impl Reranker for FailingReranker {
        async fn rerank(&self, _query: &str, _candidates: Vec<RerankCandidate>) -> RerankResult<Vec<RerankCandidate>> {
            Err(RerankError::Provider("boom".into()))
        }
    }

    #[tokio::test]
    async fn filters_non_positive_scores() {
        struct ZeroReranker;
        #[async_trait]
        impl Reranker for ZeroReranker {
            async fn rerank(&self, _q: &str, mut c: Vec<RerankCandidate>) -> RerankResult<Vec<RerankCandidate>> {
                for cand in c.iter_mut() {
                    cand.reranker_score = Some(0.0);
                }
                Ok(c)
            }
        }
        let rows = vec![SimilarityRow { id: 1, similarity: 0.9 }];
        let payloads = vec![json!({"id": 1, "title": "t", "body": "b"})];
        let results = reranked_search(&ZeroReranker, "q", "issue", rows, payloads, 20, true).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn falls_back_to_similarity_order_on_reranker_failure() {
        let rows = vec![SimilarityRow { id: 1, similarity: 0.8 }];
        let payloads = vec![json!({"id": 1})];
        let results = reranked_search(&FailingReranker, "q", "issue", rows, payloads, 20, true).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].reranker_score, 0.8);
    }

    #[tokio::test]
    async fn disabled_reranker_returns_similarity_order_untouched() {
        let rows = vec![SimilarityRow { id: 1, similarity: 0.7 }];
        let payloads = vec![json!({"id": 1})];
        let results = reranked_search(&IdentityReranker, "q", "issue", rows, payloads, 20, false).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].reranker_score, 0.7);
    }

    #[tokio::test]
    async fn truncates_to_max_candidates() {
        let rows = vec![
            SimilarityRow { id: 1, similarity: 0.9 },
            SimilarityRow { id: 2, similarity: 0.8 },
        ];
        let payloads = vec![json!({"id": 1}), json!({"id": 2})];
        let results = reranked_search(&IdentityReranker, "q", "issue", rows, payloads, 1, true).await;
        assert_eq!(results.len(), 1);
    }
}
