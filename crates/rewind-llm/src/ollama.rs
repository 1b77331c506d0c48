//! Ollama provider for local models. Same message ordering as the other
//! providers; image parts ride in the per-message `images` array, and the
//! stream is newline-delimited JSON rather than SSE.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::provider::{
    ChatMessage, ChatOutcome, ChatParams, ChatProvider, ContentPart, MessageContent,
    ProviderError, Role, Usage,
};
use crate::stream::StreamEvent;

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(base_url: String, model: String, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        let base_url = if base_url.trim().is_empty() {
            "http://localhost:11434".to_string()
        } else {
            base_url.trim_end_matches('/').to_string()
        };
        Self {
            client,
            base_url,
            model,
        }
    }

    fn build_body(
        &self,
        messages: &[ChatMessage],
        params: &ChatParams,
        stream: bool,
    ) -> serde_json::Value {
        let converted: Vec<serde_json::Value> = messages.iter().map(convert_message).collect();
        serde_json::json!({
            "model": self.model,
            "messages": converted,
            "stream": stream,
            "options": {
                "num_predict": params.max_tokens,
                "temperature": params.temperature,
            },
        })
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Ollama API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        params: &ChatParams,
    ) -> Result<ChatOutcome, ProviderError> {
        let body = self.build_body(messages, params, false);
        debug!(model = %self.model, "sending request to Ollama");
        let resp = self.post(&body).await?;

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let prompt_tokens = api_resp.prompt_eval_count.unwrap_or(0);
        let completion_tokens = api_resp.eval_count.unwrap_or(0);
        Ok(ChatOutcome {
            content: api_resp.message.content,
            model: api_resp.model,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }

    async fn send_stream(
        &self,
        messages: &[ChatMessage],
        params: &ChatParams,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let body = self.build_body(messages, params, true);
        debug!(model = %self.model, "sending streaming request to Ollama");
        let resp = self.post(&body).await?;
        process_stream(resp, tx).await;
        Ok(())
    }
}

/// Ollama messages carry plain text content plus an `images` array of raw
/// base64 (no data-URL prefix).
fn convert_message(message: &ChatMessage) -> serde_json::Value {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    match &message.content {
        MessageContent::Text(text) => serde_json::json!({ "role": role, "content": text }),
        MessageContent::Parts(parts) => {
            let mut text_parts = Vec::new();
            let mut images = Vec::new();
            for part in parts {
                match part {
                    ContentPart::Text { text } => text_parts.push(text.as_str()),
                    ContentPart::ImageUrl { image_url } => {
                        let data = image_url
                            .url
                            .split_once(";base64,")
                            .map(|(_, d)| d)
                            .unwrap_or(&image_url.url);
                        images.push(data.to_string());
                    }
                }
            }
            let mut msg = serde_json::json!({
                "role": role,
                "content": text_parts.join("\n"),
            });
            if !images.is_empty() {
                msg["images"] = serde_json::json!(images);
            }
            msg
        }
    }
}

/// Parse Ollama's newline-delimited JSON stream. Each line is one object;
/// the final one carries `done: true` plus the token counts.
async fn process_stream(resp: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    use futures_util::StreamExt;

    let mut model = String::new();
    let mut usage = Usage::default();
    let mut line_buf = String::new();
    let mut byte_stream = resp.bytes_stream();

    while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };
        let text = match std::str::from_utf8(&chunk) {
            Ok(t) => t,
            Err(_) => continue,
        };

        line_buf.push_str(text);
        let lines: Vec<&str> = line_buf.split('\n').collect();
        let (complete, remainder) = lines.split_at(lines.len() - 1);
        let remainder = remainder.first().unwrap_or(&"").to_string();

        for line in complete {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<StreamChunk>(line) {
                Ok(chunk_data) => {
                    if model.is_empty() {
                        model = chunk_data.model.clone();
                    }
                    if chunk_data.done {
                        usage.prompt_tokens = chunk_data.prompt_eval_count.unwrap_or(0);
                        usage.completion_tokens = chunk_data.eval_count.unwrap_or(0);
                        usage.total_tokens = usage.prompt_tokens + usage.completion_tokens;
                    } else if !chunk_data.message.content.is_empty()
                        && tx
                            .send(StreamEvent::TextDelta {
                                text: chunk_data.message.content,
                            })
                            .await
                            .is_err()
                    {
                        return; // receiver dropped
                    }
                }
                Err(e) => {
                    warn!(line, err = %e, "failed to parse Ollama stream chunk");
                }
            }
        }
        line_buf = remainder;
    }

    let _ = tx.send(StreamEvent::Done { model, usage }).await;
}

// Ollama API response types (deserialization only)

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    message: OllamaMessage,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    model: String,
    #[serde(default = "default_message")]
    message: OllamaMessage,
    done: bool,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

fn default_message() -> OllamaMessage {
    OllamaMessage {
        content: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_parts_land_in_the_images_array() {
        let message = ChatMessage::user_with_images(
            "what is this",
            vec!["data:image/jpeg;base64,QUJD".to_string()],
        );
        let v = convert_message(&message);
        assert_eq!(v["content"], "what is this");
        assert_eq!(v["images"][0], "QUJD");
    }

    #[test]
    fn plain_text_has_no_images_field() {
        let v = convert_message(&ChatMessage::user("hi"));
        assert_eq!(v["content"], "hi");
        assert!(v.get("images").is_none());
    }
}
