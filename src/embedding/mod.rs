//! Embedding Service (C2): pluggable text→vector provider.
//!
//! Trait shape grounded in the donor's `adapter::embedding::Embedder` trait
//! (`embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>`),
//! generalized here to the async/optional-output contract the distilled
//! spec requires: empty/whitespace input yields `None` rather than an error,
//! and a batch call preserves positional alignment with `None` holes.

pub mod api;
#[cfg(feature = "local-models")]
pub mod local;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding input was empty or whitespace-only")]
    EmptyInput,

    #[error("embedding provider request failed: {0}")]
    Provider(String),

    #[error("embedding provider returned wrong dimensionality: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("recursion guard: embedding API provider points at this process")]
    SelfReference,
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// A single embedded text, or `None` if the input was empty/whitespace.
pub type MaybeVector = Option<Vec<f32>>;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// The fixed dimensionality this provider produces.
    fn dimensions(&self) -> usize;

    /// Embed one text. Empty/whitespace input returns `Ok(None)`, never an
    /// error — errors are reserved for provider failures.
    async fn embed(&self, text: &str) -> EmbeddingResult<MaybeVector>;

    /// Embed many texts, preserving positional alignment with the input.
    /// The default implementation calls `embed` one at a time; HTTP-backed
    /// providers override this to dispatch a single batched request.
    async fn embed_many(&self, texts: &[&str]) -> EmbeddingResult<Vec<MaybeVector>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }
}

/// Cosine similarity between two equal-length vectors. Used by tests and by
/// any in-process similarity check that doesn't go through the SQL engine
/// (the real similarity search runs inside Postgres via `<=>`).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Build the configured embedder from `Config`. API providers are guarded
/// against pointing back at this process's own `/embedding` endpoint, per
/// the "recursion guard" contract in §4.2.
pub fn build_embedder(cfg: &crate::config::EmbeddingConfig, self_bind_addr: &str) -> EmbeddingResult<Box<dyn Embedder>> {
    match cfg.provider {
        crate::config::EmbeddingProvider::Api => {
            if cfg.api_base.contains(self_bind_addr) {
                return Err(EmbeddingError::SelfReference);
            }
            Ok(Box::new(api::ApiEmbedder::new(cfg)))
        }
        crate::config::EmbeddingProvider::Local => {
            #[cfg(feature = "local-models")]
            {
                Ok(Box::new(local::LocalEmbedder::load(cfg)?))
            }
            #[cfg(not(feature = "local-models"))]
            {
                Err(EmbeddingError::Provider(
                    "local embedding provider requested but crate built without `local-models` feature".into(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![0.1, 0.2, 0.3];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors_is_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_zero_vector_is_zero_not_nan() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
