use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::stream::StreamEvent;

/// A single message in an LLM conversation. Content is either plain text or
/// an ordered list of multimodal parts (text + base64 image data URLs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// A user message carrying text followed by ordered image parts.
    pub fn user_with_images(text: impl Into<String>, image_data_urls: Vec<String>) -> Self {
        let mut parts = vec![ContentPart::Text { text: text.into() }];
        parts.extend(image_data_urls.into_iter().map(|url| ContentPart::ImageUrl {
            image_url: ImageUrl { url },
        }));
        Self {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    /// `data:image/jpeg;base64,...`
    pub url: String,
}

/// Generation parameters for a single request.
#[derive(Debug, Clone)]
pub struct ChatParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Response from a provider (non-streaming).
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub content: String,
    pub model: String,
    pub usage: Usage,
}

/// Common interface for chat-completion providers.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// Send a non-streaming request, wait for the full response.
    async fn send(
        &self,
        messages: &[ChatMessage],
        params: &ChatParams,
    ) -> Result<ChatOutcome, ProviderError>;

    /// Stream response events through a channel.
    /// Default: falls back to non-streaming send, emits TextDelta + Done.
    async fn send_stream(
        &self,
        messages: &[ChatMessage],
        params: &ChatParams,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let resp = self.send(messages, params).await?;
        let _ = tx
            .send(StreamEvent::TextDelta {
                text: resp.content,
            })
            .await;
        let _ = tx
            .send(StreamEvent::Done {
                model: resp.model,
                usage: resp.usage,
            })
            .await;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("No active model configured")]
    NoActiveModel,

    #[error("operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Whether another attempt may succeed. 5xx, rate limits, and transport
    /// errors are retryable; the terminal status set is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http(e) => !e.is_builder(),
            ProviderError::Api { status, .. } => {
                !matches!(status, 400 | 401 | 403 | 404 | 422) && *status >= 500
            }
            ProviderError::RateLimited { .. } => true,
            ProviderError::Parse(_) => false,
            ProviderError::NoActiveModel => false,
            ProviderError::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_serializes_as_plain_string() {
        let msg = ChatMessage::user("hello");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "user");
        assert_eq!(v["content"], "hello");
    }

    #[test]
    fn image_parts_serialize_as_openai_shape() {
        let msg = ChatMessage::user_with_images(
            "describe",
            vec!["data:image/jpeg;base64,AAAA".to_string()],
        );
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["content"][0]["type"], "text");
        assert_eq!(v["content"][1]["type"], "image_url");
        assert_eq!(
            v["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,AAAA"
        );
    }

    #[test]
    fn terminal_statuses_are_not_retryable() {
        for status in [400u16, 401, 403, 404, 422] {
            let err = ProviderError::Api {
                status,
                message: String::new(),
            };
            assert!(!err.is_retryable(), "{status} must be terminal");
        }
        assert!(ProviderError::Api {
            status: 503,
            message: String::new()
        }
        .is_retryable());
    }
}
