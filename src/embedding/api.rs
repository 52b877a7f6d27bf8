//! HTTP-backed embedding provider: POSTs to an external `/embedding`-shaped
//! endpoint with an `X-API-Key` header, mirroring the contract this crate's
//! own `/embedding` handler implements (so two instances can chain).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use super::{Embedder, EmbeddingError, EmbeddingResult, MaybeVector};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

pub struct ApiEmbedder {
    client: Client,
    url: String,
    api_key: String,
    dimensions: usize,
}

impl ApiEmbedder {
    pub fn new(cfg: &EmbeddingConfig) -> Self {
        ApiEmbedder {
            client: Client::new(),
            url: format!("{}{}", cfg.api_base.trim_end_matches('/'), cfg.api_path),
            api_key: cfg.api_key.clone(),
            dimensions: cfg.dimensions,
        }
    }
}

#[async_trait]
impl Embedder for ApiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> EmbeddingResult<MaybeVector> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let resp = self
            .client
            .post(&self.url)
            .header("X-API-Key", &self.api_key)
            .json(&EmbedRequest { text })
            .send()
            .await
            .map_err(|e| EmbeddingError::Provider(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(EmbeddingError::Provider(format!(
                "embedding API returned status {}",
                resp.status()
            )));
        }

        let body: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| EmbeddingError::Provider(e.to_string()))?;

        if body.embedding.len() != self.dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimensions,
                got: body.embedding.len(),
            });
        }
        Ok(Some(body.embedding))
    }
}
