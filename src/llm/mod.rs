//! LLM Gateway (C4): unified synchronous-style LLM caller with retries, RPM
//! pacing, token accounting, and optional keyword-context injection.
//!
//! Trait/error shape grounded in the donor's `llm_orc::LlmOrcClient`
//! (async_trait, `is_available`/`invoke`, a `MockClient` builder for tests).
//! Behavioral details (RPM sleep formula, retry count/delay, token/cache-hit
//! extraction) are grounded in `original_source/src/llm_client.py`.

pub mod litellm;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),

    #[error("LLM call failed after retries: {0}")]
    InvocationFailed(String),
}

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelAlias {
    Fast,
    Slow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage { role: "system".into(), content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage { role: "user".into(), content: content.into() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub response_format_json: bool,
    /// Whether to run each user message through the keyword-relevance
    /// injector before sending (default true, matching `call_llm`'s
    /// `inject_keywords: bool = True`).
    pub inject_keywords: bool,
}

impl CallOptions {
    pub fn new() -> Self {
        CallOptions { temperature: 0.1, max_tokens: None, response_format_json: false, inject_keywords: true }
    }
}

#[derive(Debug, Clone)]
pub struct LlmUsage {
    pub content: String,
    pub tokens_sent: i32,
    pub tokens_received: i32,
    pub cache_hit: bool,
    pub response_id: Option<String>,
    pub model_id: Option<String>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn call(
        &self,
        messages: Vec<ChatMessage>,
        model: ModelAlias,
        opts: CallOptions,
    ) -> LlmResult<Option<String>>;

    async fn call_with_usage(
        &self,
        messages: Vec<ChatMessage>,
        model: ModelAlias,
        opts: CallOptions,
    ) -> LlmResult<Option<LlmUsage>>;
}
