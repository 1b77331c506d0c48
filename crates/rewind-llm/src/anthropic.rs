//! Anthropic Messages API provider. The system prompt rides in its own
//! field and image parts become base64 source blocks.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::provider::{
    ChatMessage, ChatOutcome, ChatParams, ChatProvider, ContentPart, MessageContent,
    ProviderError, Role, Usage,
};
use crate::stream::{parse_sse_line, SseParsed, StreamEvent};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(
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
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    fn build_body(
        &self,
        messages: &[ChatMessage],
        params: &ChatParams,
        stream: bool,
    ) -> serde_json::Value {
        // System messages move into the dedicated field; the rest keep
        // their order.
        let mut system_parts: Vec<&str> = Vec::new();
        let mut converted: Vec<serde_json::Value> = Vec::new();
        for message in messages {
            match (&message.role, &message.content) {
                (Role::System, MessageContent::Text(text)) => system_parts.push(text),
                (Role::System, MessageContent::Parts(_)) => {}
                (role, content) => {
                    let role = match role {
                        Role::Assistant => "assistant",
                        _ => "user",
                    };
                    converted.push(serde_json::json!({
                        "role": role,
                        "content": convert_content(content),
                    }));
                }
            }
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "messages": converted,
            "stream": stream,
        });
        if !system_parts.is_empty() {
            body["system"] = serde_json::json!(system_parts.join("\n\n"));
        }
        body
    }

    async fn post(
        &self,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(body)
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
            warn!(status, body = %text, "Anthropic API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        params: &ChatParams,
    ) -> Result<ChatOutcome, ProviderError> {
        let body = self.build_body(messages, params, false);
        debug!(model = %self.model, "sending request to Anthropic");
        let resp = self.post(&body).await?;

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let content: String = api_resp
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Unknown => None,
            })
            .collect();
        let usage = Usage {
            prompt_tokens: api_resp.usage.input_tokens,
            completion_tokens: api_resp.usage.output_tokens,
            total_tokens: api_resp.usage.input_tokens + api_resp.usage.output_tokens,
        };
        Ok(ChatOutcome {
            content,
            model: api_resp.model,
            usage,
        })
    }

    async fn send_stream(
        &self,
        messages: &[ChatMessage],
        params: &ChatParams,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let body = self.build_body(messages, params, true);
        debug!(model = %self.model, "sending streaming request to Anthropic");
        let resp = self.post(&body).await?;
        process_stream(resp, tx).await;
        Ok(())
    }
}

/// Convert message content to Anthropic content blocks. Data-URL images
/// become base64 source blocks.
fn convert_content(content: &MessageContent) -> serde_json::Value {
    match content {
        MessageContent::Text(text) => serde_json::json!(text),
        MessageContent::Parts(parts) => {
            let blocks: Vec<serde_json::Value> = parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => {
                        serde_json::json!({ "type": "text", "text": text })
                    }
                    ContentPart::ImageUrl { image_url } => {
                        let (media_type, data) = split_data_url(&image_url.url);
                        serde_json::json!({
                            "type": "image",
                            "source": {
                                "type": "base64",
                                "media_type": media_type,
                                "data": data,
                            }
                        })
                    }
                })
                .collect();
            serde_json::Value::Array(blocks)
        }
    }
}

fn split_data_url(url: &str) -> (&str, &str) {
    url.strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .unwrap_or(("image/jpeg", url))
}

/// Parse the Anthropic SSE stream: `content_block_delta` text deltas plus
/// usage from `message_start` / `message_delta`.
async fn process_stream(resp: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    use futures_util::StreamExt;

    let mut current_event = String::new();
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
            match parse_sse_line(line) {
                Some(SseParsed::Event(ev)) => current_event = ev,
                Some(SseParsed::Data(data)) => match current_event.as_str() {
                    "message_start" => {
                        if let Ok(msg) = serde_json::from_str::<MessageStart>(&data) {
                            model = msg.message.model;
                            usage.prompt_tokens = msg.message.usage.input_tokens;
                        }
                    }
                    "content_block_delta" => {
                        if let Ok(delta) = serde_json::from_str::<ContentBlockDelta>(&data) {
                            if let Some(text) = delta.delta.text {
                                if !text.is_empty()
                                    && tx.send(StreamEvent::TextDelta { text }).await.is_err()
                                {
                                    return; // receiver dropped
                                }
                            }
                        }
                    }
                    "message_delta" => {
                        if let Ok(delta) = serde_json::from_str::<MessageDelta>(&data) {
                            if let Some(u) = delta.usage {
                                usage.completion_tokens = u.output_tokens;
                            }
                        }
                    }
                    _ => {}
                },
                None => {}
            }
        }
        line_buf = remainder;
    }

    usage.total_tokens = usage.prompt_tokens + usage.completion_tokens;
    let _ = tx.send(StreamEvent::Done { model, usage }).await;
}

// Anthropic API response types (deserialization only)

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    content: Vec<ContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
struct MessageStart {
    message: MessageStartInner,
}

#[derive(Deserialize)]
struct MessageStartInner {
    model: String,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    delta: Delta,
}

#[derive(Deserialize)]
struct Delta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct MessageDelta {
    #[serde(default)]
    usage: Option<OutputUsage>,
}

#[derive(Deserialize)]
struct OutputUsage {
    #[serde(default)]
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_move_into_the_system_field() {
        let provider = AnthropicProvider::new(
            "key".into(),
            "https://api.anthropic.com".into(),
            "claude".into(),
            std::time::Duration::from_secs(5),
        );
        let messages = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hello"),
        ];
        let body = provider.build_body(&messages, &ChatParams::default(), false);
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn image_parts_become_base64_source_blocks() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: "look".into(),
            },
            ContentPart::ImageUrl {
                image_url: crate::provider::ImageUrl {
                    url: "data:image/jpeg;base64,QUJD".into(),
                },
            },
        ]);
        let v = convert_content(&content);
        assert_eq!(v[1]["type"], "image");
        assert_eq!(v[1]["source"]["media_type"], "image/jpeg");
        assert_eq!(v[1]["source"]["data"], "QUJD");
    }

    #[test]
    fn data_url_splitting() {
        assert_eq!(
            split_data_url("data:image/png;base64,AAAA"),
            ("image/png", "AAAA")
        );
        // Malformed input degrades to a jpeg assumption, not a panic.
        assert_eq!(split_data_url("nonsense").0, "image/jpeg");
    }
}
