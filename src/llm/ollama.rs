//! Ollama adapter: host + optional bearer header (spec §6).
//!
//! Grounded on `src/clients/openai.rs`'s reqwest-client-plus-config shape and
//! on `original_source/.../llm_adapter.py::OllamaAdapter` for exact request
//! bodies and endpoint paths.

use super::{ChatMessage, LlmAdapter, ModelInfo};
use crate::error::LlmError;
use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use std::pin::Pin;
use tracing::{debug, instrument, warn};

#[derive(Clone, Debug)]
pub struct OllamaAdapter {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl OllamaAdapter {
    #[must_use]
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http: reqwest::Client::new(),
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.http.post(url);
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }

    fn messages_body(&self, model: &str, messages: &[ChatMessage], stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": stream,
        })
    }
}

#[derive(Deserialize)]
struct ChatChunk {
    message: Option<ChatChunkMessage>,
}

#[derive(Deserialize)]
struct ChatChunkMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagsModel>,
}

#[derive(Deserialize)]
struct TagsModel {
    name: Option<String>,
}

#[async_trait]
impl LlmAdapter for OllamaAdapter {
    #[instrument(skip(self))]
    async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        let url = format!("{}/api/tags", self.base_url);
        let mut builder = self.http.get(url);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(LlmError::Api(format!("status {}", resp.status())));
        }
        let parsed: TagsResponse = resp.json().await.map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(parsed
            .models
            .into_iter()
            .filter_map(|m| m.name)
            .map(|name| ModelInfo {
                id: name.clone(),
                name,
            })
            .collect())
    }

    #[instrument(skip(self, messages), fields(model))]
    async fn chat_text(&self, model: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = self.messages_body(model, messages, false);
        let resp = self
            .request("/api/chat")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(LlmError::Api(format!("status {}", resp.status())));
        }
        let parsed: ChatChunk = resp.json().await.map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(parsed
            .message
            .and_then(|m| m.content)
            .unwrap_or_default())
    }

    fn stream_text(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>> {
        let body = self.messages_body(model, messages, true);
        let request = self.request("/api/chat").json(&body);

        let stream = async_stream_ollama(request);
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
        let mut options = serde_json::json!({ "temperature": temperature });
        if max_tokens >= 0 {
            options["num_predict"] = serde_json::json!(max_tokens);
        }
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "format": "json",
            "options": options,
        });
        debug!(body_len = body.to_string().len(), "issuing ollama chat_json request");
        let resp = self
            .request("/api/chat")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(LlmError::Api(format!("status {}", resp.status())));
        }
        let parsed: ChatChunk = resp.json().await.map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(parsed
            .message
            .and_then(|m| m.content)
            .unwrap_or_default())
    }
}

/// Ollama streams newline-delimited JSON objects rather than SSE; decode the
/// response body line by line.
fn async_stream_ollama(
    request: reqwest::RequestBuilder,
) -> impl Stream<Item = Result<String, LlmError>> {
    async_stream::stream! {
        let resp = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                yield Err(LlmError::Http(e.to_string()));
                return;
            }
        };
        if !resp.status().is_success() {
            yield Err(LlmError::Api(format!("status {}", resp.status())));
            return;
        }

        let mut buf = String::new();
        let mut bytes = resp.bytes_stream();
        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Err(LlmError::Http(e.to_string()));
                    return;
                }
            };
            buf.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buf.find('\n') {
                let line = buf[..pos].trim().to_string();
                buf.drain(..=pos);
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<ChatChunk>(&line) {
                    Ok(parsed) => {
                        if let Some(content) = parsed.message.and_then(|m| m.content) {
                            if !content.is_empty() {
                                yield Ok(content);
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to decode ollama stream line"),
                }
            }
        }
    }
}
