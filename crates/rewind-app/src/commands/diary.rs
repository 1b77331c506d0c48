//! Diary commands.

use std::sync::Arc;

use rewind_agents::diary::DiaryAgent;
use rewind_agents::Supervisor;
use rewind_core::emitter::AGENT_TASK_UPDATE;
use rewind_store::types::Diary;

use crate::app::App;
use crate::response::{CommandResponse, Empty};

/// Generate (or regenerate) the diary for a date (YYYY-MM-DD). Works
/// whether or not the background pipeline is running. Progress is surfaced
/// as `agent-task-update` notifications.
pub async fn generate_diary(app: &App, date: &str) -> CommandResponse<Diary> {
    let task_id = uuid::Uuid::new_v4().to_string();
    app.emitter.emit(
        AGENT_TASK_UPDATE,
        serde_json::json!({ "task_id": task_id, "status": "running" }),
    );

    let supervisor = app
        .config
        .pipeline
        .enable_supervisor
        .then(|| Arc::new(Supervisor::new(app.llm())));
    let agent = DiaryAgent::new(app.store(), app.llm(), supervisor, app.stats.clone());
    match agent.generate(date).await {
        Ok(Some(diary)) => {
            app.emitter.emit(
                AGENT_TASK_UPDATE,
                serde_json::json!({
                    "task_id": task_id,
                    "status": "done",
                    "result": { "diary_id": diary.id, "date": diary.date },
                }),
            );
            CommandResponse::ok(diary)
        }
        Ok(None) => {
            app.emitter.emit(
                AGENT_TASK_UPDATE,
                serde_json::json!({
                    "task_id": task_id,
                    "status": "failed",
                    "error": "no activities on that date",
                }),
            );
            CommandResponse::err(format!("no activities recorded on {date}"))
        }
        Err(e) => {
            app.emitter.emit(
                AGENT_TASK_UPDATE,
                serde_json::json!({
                    "task_id": task_id,
                    "status": "failed",
                    "error": e.to_string(),
                }),
            );
            CommandResponse::err(e.to_string())
        }
    }
}

pub async fn get_diary_list(app: &App, limit: usize) -> CommandResponse<Vec<Diary>> {
    match app.store().diaries.get_list(limit.clamp(1, 365)) {
        Ok(diaries) => CommandResponse::ok(diaries),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

pub async fn delete_diary(app: &App, id: &str) -> CommandResponse<Empty> {
    match app.store().diaries.delete(id) {
        Ok(()) => CommandResponse::ok(Empty {}),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}
