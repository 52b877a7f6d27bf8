//! HTTP-backed `LlmClient` calling an OpenAI-compatible `/chat/completions`
//! endpoint (a LiteLLM proxy in production). Ground truth for the retry/
//! pacing/usage-extraction behavior: `original_source/src/llm_client.py`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::config::LlmConfig;
use crate::keywords::KeywordService;
use super::{CallOptions, ChatMessage, LlmClient, LlmError, LlmResult, LlmUsage, ModelAlias};

pub struct LiteLlmClient {
    client: Client,
    cfg: LlmConfig,
    keywords: Arc<KeywordService>,
}

impl LiteLlmClient {
    pub fn new(cfg: LlmConfig, keywords: Arc<KeywordService>) -> Self {
        LiteLlmClient { client: Client::new(), cfg, keywords }
    }

    fn resolve_model(&self, alias: ModelAlias) -> &str {
        match alias {
            ModelAlias::Fast => &self.cfg.fast_model,
            ModelAlias::Slow => &self.cfg.slow_model,
        }
    }

    /// `60 / rpm` seconds, matching `self.delay = 60.0 / self.rpm_limit`.
    fn pacing_delay(&self) -> Duration {
        if self.cfg.rpm == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(60.0 / self.cfg.rpm as f64)
        }
    }

    async fn inject_keywords(&self, messages: Vec<ChatMessage>, enabled: bool) -> Vec<ChatMessage> {
        if !enabled {
            return messages;
        }
        let mut out = Vec::with_capacity(messages.len());
        for m in messages {
            if m.role == "user" {
                let content = self.keywords.inject_relevant_keywords_into_prompt(&m.content).await;
                out.push(ChatMessage { role: m.role, content });
            } else {
                out.push(m);
            }
        }
        out
    }

    async fn do_call(
        &self,
        messages: &[ChatMessage],
        model: &str,
        opts: &CallOptions,
    ) -> Result<Value, String> {
        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": opts.temperature,
        });
        if let Some(max_tokens) = opts.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if opts.response_format_json {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.cfg.api_base.trim_end_matches('/')))
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            return Err(format!("LLM API returned status {}", resp.status()));
        }

        resp.json::<Value>().await.map_err(|e| e.to_string())
    }

    fn extract_usage(&self, response: &Value) -> LlmUsage {
        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let usage = &response["usage"];
        let tokens_sent = usage["prompt_tokens"].as_i64().unwrap_or(0) as i32;
        let tokens_received = usage["completion_tokens"].as_i64().unwrap_or(0) as i32;

        // Cache-hit detection: explicit top-level/choice flag first, else
        // cached_tokens>0 in prompt_tokens_details, per llm_client.py.
        let cache_hit = response["cache_hit"].as_bool()
            .or_else(|| response["choices"][0]["cache_hit"].as_bool())
            .unwrap_or_else(|| usage["prompt_tokens_details"]["cached_tokens"].as_i64().unwrap_or(0) > 0);

        LlmUsage {
            content,
            tokens_sent,
            tokens_received: if cache_hit { 0 } else { tokens_received },
            cache_hit,
            response_id: response["id"].as_str().map(str::to_string),
            model_id: response["model"].as_str().map(str::to_string),
        }
    }
}

#[async_trait]
impl LlmClient for LiteLlmClient {
    async fn call(
        &self,
        messages: Vec<ChatMessage>,
        model: ModelAlias,
        opts: CallOptions,
    ) -> LlmResult<Option<String>> {
        Ok(self.call_with_usage(messages, model, opts).await?.map(|u| u.content))
    }

    async fn call_with_usage(
        &self,
        messages: Vec<ChatMessage>,
        model: ModelAlias,
        opts: CallOptions,
    ) -> LlmResult<Option<LlmUsage>> {
        let messages = self.inject_keywords(messages, opts.inject_keywords).await;
        let model_name = self.resolve_model(model).to_string();
        let max_retries = self.cfg.max_retries.max(1);

        let mut last_err = String::new();
        for attempt in 1..=max_retries {
            match self.do_call(&messages, &model_name, &opts).await {
                Ok(response) => {
                    let delay = self.pacing_delay();
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    return Ok(Some(self.extract_usage(&response)));
                }
                Err(e) => {
                    tracing::warn!(attempt, max_retries, error = %e, "LLM call failed");
                    last_err = e;
                    if attempt < max_retries {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
        Err(LlmError::InvocationFailed(last_err))
    }
}
