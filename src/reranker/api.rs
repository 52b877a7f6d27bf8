use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::RerankerConfig;
use super::{RerankCandidate, RerankError, RerankResult, Reranker};

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    candidates: Vec<&'a str>,
}

#[derive(Deserialize)]
struct RerankResponse {
    scores: Vec<f32>,
}

pub struct ApiReranker {
    client: Client,
    url: String,
    api_key: String,
}

impl ApiReranker {
    pub fn new(cfg: &RerankerConfig) -> Self {
        ApiReranker {
            client: Client::builder()
                .timeout(cfg.api_timeout)
                .build()
                .unwrap_or_default(),
            url: format!("{}{}", cfg.api_base.trim_end_matches('/'), cfg.api_path),
            api_key: cfg.api_key.clone(),
        }
    }
}

#[async_trait]
impl Reranker for ApiReranker {
    async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<RerankCandidate>,
    ) -> RerankResult<Vec<RerankCandidate>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }
        let texts: Vec<&str> = candidates.iter().map(|c| c.content.as_str()).collect();
        let resp = self
            .client
            .post(&self.url)
            .header("X-API-Key", &self.api_key)
            .json(&RerankRequest { query, candidates: texts })
            .send()
            .await
            .map_err(|e| RerankError::Provider(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(RerankError::Provider(format!(
                "reranker API returned status {}",
                resp.status()
            )));
        }

        let body: RerankResponse = resp
            .json()
            .await
            .map_err(|e| RerankError::Provider(e.to_string()))?;

        if body.scores.len() != candidates.len() {
            return Err(RerankError::Provider(
                "reranker returned a different number of scores than candidates".into(),
            ));
        }

        for (c, score) in candidates.iter_mut().zip(body.scores.into_iter()) {
            c.reranker_score = Some(score);
        }
        candidates.sort_by(|a, b| {
            b.reranker_score
                .partial_cmp(&a.reranker_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(candidates)
    }
}
