//! Model lifecycle commands.

use serde::Deserialize;
use uuid::Uuid;

use rewind_store::types::LlmModel;

use crate::app::App;
use crate::response::{CommandResponse, Empty};

#[derive(Debug, Deserialize)]
pub struct CreateModelRequest {
    pub name: String,
    pub provider: String,
    pub api_url: String,
    pub model_name: String,
    pub api_key: String,
    #[serde(default)]
    pub input_token_price: f64,
    #[serde(default)]
    pub output_token_price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Deserialize)]
pub struct UpdateModelRequest {
    pub id: String,
    pub name: Option<String>,
    pub provider: Option<String>,
    pub api_url: Option<String>,
    pub model_name: Option<String>,
    pub api_key: Option<String>,
    pub input_token_price: Option<f64>,
    pub output_token_price: Option<f64>,
    pub currency: Option<String>,
}

pub async fn create_model(app: &App, req: CreateModelRequest) -> CommandResponse<LlmModel> {
    let model = LlmModel {
        id: Uuid::new_v4().to_string(),
        name: req.name,
        provider: req.provider,
        api_url: req.api_url.trim_end_matches('/').to_string(),
        model_name: req.model_name,
        input_token_price: req.input_token_price,
        output_token_price: req.output_token_price,
        currency: req.currency,
        api_key: req.api_key,
        is_active: false,
        last_test_status: None,
        last_tested_at: None,
        last_test_error: None,
        created_at: String::new(),
        updated_at: String::new(),
    };
    match app.store().models.create(&model) {
        Ok(()) => CommandResponse::ok(model),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

pub async fn list_models(app: &App) -> CommandResponse<Vec<LlmModel>> {
    match app.store().models.list() {
        Ok(models) => CommandResponse::ok(models),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

pub async fn get_active_model(app: &App) -> CommandResponse<Option<LlmModel>> {
    match app.store().models.get_active() {
        Ok(model) => CommandResponse::ok(model),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

pub async fn select_model(app: &App, id: &str) -> CommandResponse<LlmModel> {
    match app.store().models.select(id) {
        Ok(model) => CommandResponse::ok(model),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

pub async fn update_model_by_id(app: &App, req: UpdateModelRequest) -> CommandResponse<LlmModel> {
    let store = app.store();
    let existing = match store.models.get_by_id(&req.id) {
        Ok(Some(m)) => m,
        Ok(None) => return CommandResponse::err(format!("model not found: {}", req.id)),
        Err(e) => return CommandResponse::err(e.to_string()),
    };
    let updated = LlmModel {
        name: req.name.unwrap_or(existing.name),
        provider: req.provider.unwrap_or(existing.provider),
        api_url: req
            .api_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or(existing.api_url),
        model_name: req.model_name.unwrap_or(existing.model_name),
        api_key: req.api_key.unwrap_or(existing.api_key),
        input_token_price: req.input_token_price.unwrap_or(existing.input_token_price),
        output_token_price: req
            .output_token_price
            .unwrap_or(existing.output_token_price),
        currency: req.currency.unwrap_or(existing.currency),
        ..existing
    };
    match store.models.update(&updated) {
        Ok(()) => CommandResponse::ok(updated),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

pub async fn delete_model(app: &App, id: &str) -> CommandResponse<Empty> {
    match app.store().models.delete(id) {
        Ok(()) => CommandResponse::ok(Empty {}),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

/// Fire a minimal live completion against the model and record the result
/// on the row.
pub async fn test_model(app: &App, id: &str) -> CommandResponse<LlmModel> {
    let store = app.store();
    let model = match store.models.get_by_id(id) {
        Ok(Some(m)) => m,
        Ok(None) => return CommandResponse::err(format!("model not found: {id}")),
        Err(e) => return CommandResponse::err(e.to_string()),
    };
    let outcome = app.llm().test_model(&model).await;
    // Re-read to pick up last_test_* stamped by the client.
    let refreshed = store.models.get_by_id(id).ok().flatten().unwrap_or(model);
    match outcome {
        Ok(()) => CommandResponse::ok_with_message(refreshed, "model test passed"),
        Err(e) => CommandResponse {
            success: false,
            data: Some(refreshed),
            message: Some(e.to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        },
    }
}
