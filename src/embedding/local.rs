//! In-process embedding model via `fastembed`, behind the `local-models`
//! feature. Grounded in the donor's `fastembed_impl::FastEmbedEmbedder`,
//! which wraps the model in a `Mutex` because `TextEmbedding::embed` takes
//! `&mut self`.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Mutex;

use crate::config::EmbeddingConfig;
use super::{Embedder, EmbeddingError, EmbeddingResult, MaybeVector};

pub struct LocalEmbedder {
    model: Mutex<TextEmbedding>,
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn load(cfg: &EmbeddingConfig) -> EmbeddingResult<Self> {
        let model = TextEmbedding::try_new(InitOptions::new(EmbeddingModel::AllMiniLML6V2))
            .map_err(|e| EmbeddingError::Provider(e.to_string()))?;
        Ok(LocalEmbedder {
            model: Mutex::new(model),
            dimensions: cfg.dimensions,
        })
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> EmbeddingResult<MaybeVector> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let mut out = self.embed_many(&[text]).await?;
        Ok(out.remove(0))
    }

    async fn embed_many(&self, texts: &[&str]) -> EmbeddingResult<Vec<MaybeVector>> {
        let non_empty: Vec<&str> = texts.iter().copied().filter(|t| !t.trim().is_empty()).collect();
        let mut model = self.model.lock().unwrap();
        let embedded = model
            .embed(non_empty.clone(), None)
            .map_err(|e| EmbeddingError::Provider(e.to_string()))?;
        let mut iter = embedded.into_iter();
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            if t.trim().is_empty() {
                out.push(None);
            } else {
                out.push(iter.next());
            }
        }
        Ok(out)
    }
}
