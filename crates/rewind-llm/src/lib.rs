//! LLM access for the Rewind pipeline.
//!
//! Providers (OpenAI-compatible, Anthropic, Ollama) behind one trait,
//! routed by the model registry in the store, with retry/backoff, SSE
//! streaming, token-usage accounting and a forgiving JSON extractor for
//! model replies.

pub mod anthropic;
pub mod client;
pub mod json;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod stream;

pub use client::{ChatBackend, LlmClient};
pub use provider::{
    ChatMessage, ChatOutcome, ChatParams, ChatProvider, ContentPart, MessageContent,
    ProviderError, Role, Usage,
};
pub use stream::StreamEvent;
