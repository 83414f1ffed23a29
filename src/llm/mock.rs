//! Test-only mock adapter. Grounded on `src/clients/mock.rs::MockVoid`,
//! widened to allow a scripted `chat_json` response since the planner's
//! behavior is the thing most tests need to control.

use super::{ChatMessage, LlmAdapter, ModelInfo};
use crate::error::LlmError;
use async_trait::async_trait;
use futures_core::Stream;
use futures_util::stream;
use std::pin::Pin;
use std::sync::Mutex;

/// Returns scripted `chat_json` responses in order (one per call), falling
/// back to `"{}"` once exhausted — mirrors `MockVoid`'s always-empty-object
/// behavior as the default.
#[derive(Debug)]
pub struct MockAdapter {
    responses: Mutex<Vec<String>>,
}

impl MockAdapter {
    #[must_use]
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    fn next_response(&self) -> String {
        let mut guard = self.responses.lock().expect("mock adapter mutex poisoned");
        if guard.is_empty() {
            "{}".to_string()
        } else {
            guard.remove(0)
        }
    }
}

#[async_trait]
impl LlmAdapter for MockAdapter {
    async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        Ok(vec![ModelInfo {
            id: "mock-model".to_string(),
            name: "Mock Model".to_string(),
        }])
    }

    async fn chat_text(&self, _model: &str, _messages: &[ChatMessage]) -> Result<String, LlmError> {
        Ok(self.next_response())
    }

    fn stream_text(
        &self,
        _model: &str,
        _messages: &[ChatMessage],
    ) -> Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>> {
        let response = self.next_response();
        Box::pin(stream::once(async move { Ok(response) }))
    }

    async fn chat_json(
        &self,
        _model: &str,
        _messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: i64,
    ) -> Result<String, LlmError> {
        Ok(self.next_response())
    }
}
