//! Mock LLM client for tests, mirroring the donor's `llm_orc::MockClient`
//! builder (`with_response` / `with_failure`).

use async_trait::async_trait;
use std::sync::Mutex;

use super::{CallOptions, ChatMessage, LlmClient, LlmError, LlmResult, LlmUsage, ModelAlias};

pub struct MockLlmClient {
    responses: Mutex<Vec<Result<LlmUsage, String>>>,
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        MockLlmClient { responses: Mutex::new(Vec::new()), calls: Mutex::new(Vec::new()) }
    }

    pub fn with_response(self, content: impl Into<String>) -> Self {
        self.responses.lock().unwrap().push(Ok(LlmUsage {
            content: content.into(),
            tokens_sent: 10,
            tokens_received: 5,
            cache_hit: false,
            response_id: Some("mock-response".into()),
            model_id: Some("mock-model".into()),
        }));
        self
    }

    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.responses.lock().unwrap().push(Err(message.into()));
        self
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
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
        _model: ModelAlias,
        _opts: CallOptions,
    ) -> LlmResult<Option<LlmUsage>> {
        self.calls.lock().unwrap().push(messages);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok(None);
        }
        match responses.remove(0) {
            Ok(usage) => Ok(Some(usage)),
            Err(e) => Err(LlmError::InvocationFailed(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_queued_response_in_order() {
        let mock = MockLlmClient::new().with_response("first").with_response("second");
        let r1 = mock
            .call(vec![ChatMessage::user("hi")], ModelAlias::Fast, CallOptions::new())
            .await
            .unwrap();
        assert_eq!(r1.as_deref(), Some("first"));
        let r2 = mock
            .call(vec![ChatMessage::user("hi")], ModelAlias::Fast, CallOptions::new())
            .await
            .unwrap();
        assert_eq!(r2.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn surfaces_queued_failure() {
        let mock = MockLlmClient::new().with_failure("boom");
        let result = mock
            .call(vec![ChatMessage::user("hi")], ModelAlias::Fast, CallOptions::new())
            .await;
        assert!(result.is_err());
    }
}
