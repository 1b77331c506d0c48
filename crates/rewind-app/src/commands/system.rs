//! System lifecycle and status commands.

use serde::Serialize;

use crate::app::App;
use crate::response::{CommandResponse, Empty};

pub async fn start_system(app: &App) -> CommandResponse<Empty> {
    match app.start_system().await {
        Ok(()) => CommandResponse::ok_with_message(Empty {}, "pipeline started"),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

pub async fn stop_system(app: &App) -> CommandResponse<Empty> {
    app.stop_system().await;
    CommandResponse::ok_with_message(Empty {}, "pipeline stopped")
}

#[derive(Debug, Serialize)]
pub struct SystemStats {
    pub pipeline_running: bool,
    pub window_records: usize,
    pub window_screenshots: usize,
    pub image_cache_entries: usize,
    pub stats: rewind_agents::StatsSnapshot,
    pub llm_usage_7d: rewind_store::usage::UsageSummary,
}

pub async fn get_system_stats(app: &App) -> CommandResponse<SystemStats> {
    let window_stats = app.window.stats();
    let since = (chrono::Utc::now() - chrono::Duration::days(7)).to_rfc3339();
    let usage = app
        .store()
        .usage
        .summary_since(&since)
        .unwrap_or_default();
    CommandResponse::ok(SystemStats {
        pipeline_running: app.is_pipeline_running().await,
        window_records: window_stats.total_records,
        window_screenshots: window_stats.screenshots,
        image_cache_entries: app.cache.len(),
        stats: app.stats.snapshot(),
        llm_usage_7d: usage,
    })
}

#[derive(Debug, Serialize)]
pub struct DatabasePath {
    pub path: String,
}

pub async fn get_database_path(app: &App) -> CommandResponse<DatabasePath> {
    CommandResponse::ok(DatabasePath {
        path: app.db_path().display().to_string(),
    })
}

pub async fn set_database_path(app: &App, path: &str) -> CommandResponse<DatabasePath> {
    match app.set_database_path(path).await {
        Ok(()) => CommandResponse::ok(DatabasePath {
            path: app.db_path().display().to_string(),
        }),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

#[derive(Debug, Serialize)]
pub struct InitialSetup {
    pub has_models: bool,
    pub has_active_model: bool,
    pub needs_setup: bool,
    pub model_count: u64,
}

pub async fn check_initial_setup(app: &App) -> CommandResponse<InitialSetup> {
    let store = app.store();
    let model_count = store.models.count().unwrap_or(0);
    let has_active_model = matches!(store.models.get_active(), Ok(Some(_)));
    CommandResponse::ok(InitialSetup {
        has_models: model_count > 0,
        has_active_model,
        needs_setup: model_count == 0 || !has_active_model,
        model_count,
    })
}
