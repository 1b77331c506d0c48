use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::provider::{
    ChatMessage, ChatOutcome, ChatParams, ChatProvider, ProviderError, Usage,
};
use crate::stream::{parse_sse_line, SseParsed, StreamEvent};

/// OpenAI-compatible chat-completions provider. The model registry rows all
/// describe endpoints of this shape (`<api_url>/chat/completions` with a
/// bearer key), which covers OpenAI itself and the common compatible hosts.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    provider_name: String,
    api_key: String,
    base_url: String,
    /// Path appended to base_url. Default: "/chat/completions".
    chat_path: String,
    model: String,
}

impl OpenAiCompatProvider {
    /// `base_url` should NOT include a trailing slash.
    pub fn new(
        name: impl Into<String>,
        api_key: String,
        base_url: String,
        model: String,
        timeout: std::time::Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            provider_name: name.into(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_path: "/chat/completions".to_string(),
            model,
        }
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url, self.chat_path)
    }

    fn build_body(&self, messages: &[ChatMessage], params: &ChatParams, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "stream": stream,
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        params: &ChatParams,
    ) -> Result<ChatOutcome, ProviderError> {
        let body = self.build_body(messages, params, false);

        debug!(model = %self.model, messages = messages.len(), "sending chat request");

        let resp = self
            .client
            .post(self.url())
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry,
            });
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "chat API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(parse_response(api_resp, &self.model))
    }

    async fn send_stream(
        &self,
        messages: &[ChatMessage],
        params: &ChatParams,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let body = self.build_body(messages, params, true);

        debug!(model = %self.model, "sending streaming chat request");

        let resp = self
            .client
            .post(self.url())
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "streaming chat API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        process_stream(resp, self.model.clone(), tx).await;
        Ok(())
    }
}

fn parse_response(resp: ApiResponse, fallback_model: &str) -> ChatOutcome {
    let content = resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    ChatOutcome {
        content,
        model: resp.model.unwrap_or_else(|| fallback_model.to_string()),
        usage: resp.usage.unwrap_or_default(),
    }
}

/// Parse an SSE chat stream and emit StreamEvents.
/// Each data line carries a JSON delta; `data: [DONE]` signals the end.
async fn process_stream(resp: reqwest::Response, model: String, tx: mpsc::Sender<StreamEvent>) {
    use futures_util::StreamExt;

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
            if let Some(SseParsed::Data(data)) = parse_sse_line(line) {
                if data.trim() == "[DONE]" {
                    break;
                }
                if let Ok(chunk_resp) = serde_json::from_str::<StreamChunk>(&data) {
                    if let Some(u) = chunk_resp.usage {
                        usage = u;
                    }
                    for choice in &chunk_resp.choices {
                        if let Some(content) = &choice.delta.content {
                            if !content.is_empty()
                                && tx
                                    .send(StreamEvent::TextDelta {
                                        text: content.clone(),
                                    })
                                    .await
                                    .is_err()
                            {
                                return; // receiver dropped
                            }
                        }
                    }
                }
            }
        }

        line_buf = remainder;
    }

    let _ = tx.send(StreamEvent::Done { model, usage }).await;
}

// Chat-completions response types

#[derive(Deserialize)]
struct ApiResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
