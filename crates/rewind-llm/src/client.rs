use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use rewind_core::config::LlmConfig;
use rewind_store::types::{LlmModel, TokenUsage};
use rewind_store::Store;

use crate::anthropic::AnthropicProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiCompatProvider;
use crate::provider::{ChatMessage, ChatOutcome, ChatParams, ChatProvider, ProviderError, Usage};
use crate::stream::StreamEvent;

/// What the pipeline agents and the chat service need from the LLM layer.
/// [`LlmClient`] is the production implementation; tests script their own.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Whether a model is available. Agents refuse to start without one.
    fn has_active_model(&self) -> bool;

    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        params: &ChatParams,
        request_type: &str,
    ) -> Result<ChatOutcome, ProviderError>;

    async fn chat_completion_stream(
        &self,
        messages: Vec<ChatMessage>,
        params: ChatParams,
        request_type: &str,
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError>;
}

/// LLM client backed by the model registry.
///
/// The active model row is re-read on every call so a `select_model` command
/// takes effect without restarting the pipeline. Every successful call is
/// recorded in `llm_token_usage` with its computed cost.
pub struct LlmClient {
    store: Store,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(store: Store, config: LlmConfig) -> Self {
        Self { store, config }
    }

    /// Whether an active model is configured. The pipeline refuses to start
    /// without one; UI queries keep working.
    pub fn has_active_model(&self) -> bool {
        matches!(self.store.models.get_active(), Ok(Some(_)))
    }

    fn active_provider(&self) -> Result<(Box<dyn ChatProvider>, LlmModel), ProviderError> {
        let model = self
            .store
            .models
            .get_active()
            .map_err(|e| ProviderError::Parse(e.to_string()))?
            .ok_or(ProviderError::NoActiveModel)?;
        let provider = self.provider_for(&model);
        Ok((provider, model))
    }

    /// Route on the model row's provider. Anything unrecognised is treated
    /// as an OpenAI-compatible endpoint, which covers the long tail of
    /// hosted gateways.
    fn provider_for(&self, model: &LlmModel) -> Box<dyn ChatProvider> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        match model.provider.to_lowercase().as_str() {
            "anthropic" => Box::new(AnthropicProvider::new(
                model.api_key.clone(),
                model.api_url.clone(),
                model.model_name.clone(),
                timeout,
            )),
            "ollama" => Box::new(OllamaProvider::new(
                model.api_url.clone(),
                model.model_name.clone(),
                timeout,
            )),
            other => Box::new(OpenAiCompatProvider::new(
                other.to_string(),
                model.api_key.clone(),
                model.api_url.clone(),
                model.model_name.clone(),
                timeout,
            )),
        }
    }

    /// Non-streaming completion with retry/backoff and usage recording.
    ///
    /// `request_type` labels the usage row ("scene_extraction", "chat", ...).
    pub async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        params: &ChatParams,
        request_type: &str,
    ) -> Result<ChatOutcome, ProviderError> {
        let (provider, model) = self.active_provider()?;

        let mut last_error = ProviderError::Parse("no attempt made".to_string());
        for attempt in 1..=self.config.max_retries + 1 {
            match provider.send(messages, params).await {
                Ok(outcome) => {
                    self.record_usage(&model, &outcome.usage, request_type);
                    return Ok(outcome);
                }
                Err(e) if e.is_retryable() && attempt <= self.config.max_retries => {
                    let backoff = match &e {
                        ProviderError::RateLimited { retry_after_ms } => *retry_after_ms,
                        _ => self.config.retry_backoff_ms * attempt as u64,
                    };
                    warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        error = %e,
                        backoff_ms = backoff,
                        "LLM call failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    /// Streaming completion. Events arrive on the returned receiver; the
    /// `Done` event triggers usage recording before being forwarded.
    pub async fn chat_completion_stream(
        &self,
        messages: Vec<ChatMessage>,
        params: ChatParams,
        request_type: &str,
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError> {
        let (provider, model) = self.active_provider()?;
        let (raw_tx, mut raw_rx) = mpsc::channel::<StreamEvent>(64);
        let (out_tx, out_rx) = mpsc::channel::<StreamEvent>(64);

        let store = self.store.clone();
        let request_type = request_type.to_string();
        let model_row = model.clone();
        tokio::spawn(async move {
            while let Some(event) = raw_rx.recv().await {
                if let StreamEvent::Done { usage, .. } = &event {
                    record_usage_row(&store, &model_row, usage, &request_type);
                }
                if out_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            if let Err(e) = provider.send_stream(&messages, &params, raw_tx.clone()).await {
                let _ = raw_tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        });

        Ok(out_rx)
    }

    /// Fire a minimal completion against an arbitrary model row and persist
    /// the outcome on the row. Used by the `test_model` command.
    pub async fn test_model(&self, model: &LlmModel) -> Result<(), ProviderError> {
        let provider = self.provider_for(model);
        let messages = vec![ChatMessage::user("Reply with the single word: ok")];
        let params = ChatParams {
            max_tokens: 8,
            temperature: 0.0,
        };
        let result = provider.send(&messages, &params).await;
        let (ok, error) = match &result {
            Ok(_) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };
        if let Err(e) = self
            .store
            .models
            .record_test(&model.id, ok, error.as_deref())
        {
            warn!(model_id = %model.id, "failed to record test outcome: {e}");
        }
        result.map(|_| ())
    }

    fn record_usage(&self, model: &LlmModel, usage: &Usage, request_type: &str) {
        record_usage_row(&self.store, model, usage, request_type);
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    fn has_active_model(&self) -> bool {
        LlmClient::has_active_model(self)
    }

    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        params: &ChatParams,
        request_type: &str,
    ) -> Result<ChatOutcome, ProviderError> {
        LlmClient::chat_completion(self, messages, params, request_type).await
    }

    async fn chat_completion_stream(
        &self,
        messages: Vec<ChatMessage>,
        params: ChatParams,
        request_type: &str,
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError> {
        LlmClient::chat_completion_stream(self, messages, params, request_type).await
    }
}

fn record_usage_row(store: &Store, model: &LlmModel, usage: &Usage, request_type: &str) {
    if usage.total_tokens == 0 {
        return;
    }
    let cost = compute_cost(model, usage);
    let row = TokenUsage {
        timestamp: chrono::Utc::now().to_rfc3339(),
        model: model.model_name.clone(),
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
        cost,
        request_type: request_type.to_string(),
    };
    if let Err(e) = store.usage.record(&row) {
        warn!("failed to record token usage: {e}");
    } else {
        debug!(
            tokens = usage.total_tokens,
            cost, request_type, "token usage recorded"
        );
    }
}

/// Prices are per million tokens.
fn compute_cost(model: &LlmModel, usage: &Usage) -> f64 {
    let input = usage.prompt_tokens as f64 / 1_000_000.0 * model.input_token_price;
    let output = usage.completion_tokens as f64 / 1_000_000.0 * model.output_token_price;
    input + output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_with_prices(input: f64, output: f64) -> LlmModel {
        LlmModel {
            id: "m".to_string(),
            name: "m".to_string(),
            provider: "openai".to_string(),
            api_url: "https://api.example.com".to_string(),
            model_name: "test".to_string(),
            input_token_price: input,
            output_token_price: output,
            currency: "USD".to_string(),
            api_key: "k".to_string(),
            is_active: true,
            last_test_status: None,
            last_tested_at: None,
            last_test_error: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn cost_uses_per_million_prices() {
        let model = model_with_prices(3.0, 15.0);
        let usage = Usage {
            prompt_tokens: 1_000_000,
            completion_tokens: 200_000,
            total_tokens: 1_200_000,
        };
        let cost = compute_cost(&model, &usage);
        assert!((cost - 6.0).abs() < 1e-9);
    }

    #[test]
    fn no_active_model_is_surfaced() {
        let store = Store::open_in_memory().unwrap();
        let client = LlmClient::new(store, LlmConfig::default());
        assert!(!client.has_active_model());
        assert!(matches!(
            client.active_provider(),
            Err(ProviderError::NoActiveModel)
        ));
    }
}
