//! LLM adapter contract (spec §6): `list_models`, `chat_text`, `stream_text`,
//! `chat_json`. Mirrors the teacher's `core::LowLevelClient` trait, widened
//! from a single `ask_raw` to the four operations the engine actually needs.

pub mod mock;
pub mod ollama;
pub mod openai_compat;

pub use mock::MockAdapter;
pub use ollama::OllamaAdapter;
pub use openai_compat::OpenAiCompatAdapter;

use crate::error::{EngineBuildError, LlmError};
use async_trait::async_trait;
use futures_core::Stream;
use std::fmt::Debug;
use std::pin::Pin;

/// A single chat message, role + content, matching the OpenAI/Ollama wire
/// shape both adapters speak.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One entry from `list_models`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}

/// Capability record an LLM provider must implement. See `SPEC_FULL.md` §6.
#[async_trait]
pub trait LlmAdapter: Debug + Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError>;

    async fn chat_text(&self, model: &str, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// Lazily-produced sequence of text chunks. Implementations that cannot
    /// truly stream should fall back to a single chunk containing the full
    /// `chat_text` response.
    fn stream_text(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

    /// Chat call that guarantees JSON-mode output. `max_tokens < 0` means
    /// unbounded (the cap is simply omitted from the request).
    async fn chat_json(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: i64,
    ) -> Result<String, LlmError>;
}

/// Build an adapter for one of the recognized providers (spec §6).
pub fn build_adapter(
    provider: &str,
    base_url: &str,
    api_key: &str,
) -> Result<Box<dyn LlmAdapter>, EngineBuildError> {
    match provider.trim().to_lowercase().as_str() {
        "ollama" => Ok(Box::new(OllamaAdapter::new(base_url.to_string(), api_key.to_string()))),
        "openai" | "openai_compat" | "openai-compatible" | "openai_compatible" => Ok(Box::new(
            OpenAiCompatAdapter::new(base_url.to_string(), api_key.to_string()),
        )),
        other => Err(EngineBuildError::UnsupportedProvider(other.to_string())),
    }
}
