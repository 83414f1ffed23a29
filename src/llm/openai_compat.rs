//! OpenAI-compatible adapter (OpenAI, Azure-compatible gateways, local
//! OpenAI-shaped servers). Covers the `openai`, `openai_compat`,
//! `openai-compatible`, `openai_compatible` provider aliases from spec §6.
//!
//! Request/response shapes grounded on
//! `src/clients/chatgpt/providers/openai.rs`. SSE decoding grounded on
//! `examples/DSado88-squall/src/dispatch/http.rs`'s
//! `response.bytes_stream().eventsource()` + per-chunk JSON parse pattern.

use super::{ChatMessage, LlmAdapter, ModelInfo};
use crate::error::LlmError;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use std::pin::Pin;
use tracing::{instrument, warn};

#[derive(Clone, Debug)]
pub struct OpenAiCompatAdapter {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl OpenAiCompatAdapter {
    #[must_use]
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http: reqwest::Client::new(),
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.http.post(url);
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }

    fn status_to_error(status: reqwest::StatusCode, body: String) -> LlmError {
        match status.as_u16() {
            401 => LlmError::Authentication,
            429 => LlmError::RateLimit,
            _ => LlmError::Api(body),
        }
    }
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

#[async_trait]
impl LlmAdapter for OpenAiCompatAdapter {
    #[instrument(skip(self))]
    async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        let url = format!("{}/models", self.base_url);
        let mut builder = self.http.get(url);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Self::status_to_error(status, text));
        }
        let parsed: ModelsResponse = resp.json().await.map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(parsed
            .data
            .into_iter()
            .map(|m| ModelInfo {
                name: m.id.clone(),
                id: m.id,
            })
            .collect())
    }

    #[instrument(skip(self, messages), fields(model))]
    async fn chat_text(&self, model: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
        });
        let resp = self
            .post("/chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Self::status_to_error(status, text));
        }
        let parsed: ChatCompletion = resp.json().await.map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    fn stream_text(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": true,
        });
        let request = self.post("/chat/completions").json(&body);

        let stream = async_stream::stream! {
            let resp = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    yield Err(LlmError::Http(e.to_string()));
                    return;
                }
            };
            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                yield Err(Self::status_to_error(status, text));
                return;
            }

            let mut events = resp.bytes_stream().eventsource();
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(error = %e, "SSE stream error");
                        yield Err(LlmError::Http(e.to_string()));
                        return;
                    }
                };
                if event.data.trim() == "[DONE]" {
                    break;
                }
                match serde_json::from_str::<StreamChunk>(&event.data) {
                    Ok(chunk) => {
                        if let Some(content) = chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
                            if !content.is_empty() {
                                yield Ok(content);
                            }
                        }
                    }
                    Err(_) => continue,
                }
            }
        };
        Box::pin(stream)
    }

    #[instrument(skip(self, messages), fields(model, max_tokens))]
    async fn chat_json(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: i64,
    ) -> Result<String, LlmError> {
        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "response_format": { "type": "json_object" },
            "stream": false,
        });
        if max_tokens >= 0 {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        let resp = self
            .post("/chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Self::status_to_error(status, text));
        }
        let parsed: ChatCompletion = resp.json().await.map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}
