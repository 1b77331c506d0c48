//! Query and edit commands over events, knowledge and TODO artifacts.

use serde::{Deserialize, Serialize};

use rewind_store::types::{Event, KnowledgeItem, TodoItem};

use crate::app::App;
use crate::response::{CommandResponse, Empty};

pub async fn get_recent_events(app: &App, limit: usize) -> CommandResponse<Vec<Event>> {
    match app.store().events.get_recent(limit.clamp(1, 500)) {
        Ok(events) => CommandResponse::ok(events),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

/// Merged rows take precedence; uncovered primary rows follow.
pub async fn get_knowledge_list(app: &App) -> CommandResponse<Vec<KnowledgeItem>> {
    match app.store().knowledge.get_list() {
        Ok(items) => CommandResponse::ok(items),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

pub async fn get_todo_list(app: &App, include_completed: bool) -> CommandResponse<Vec<TodoItem>> {
    match app.store().todos.get_list(include_completed) {
        Ok(items) => CommandResponse::ok(items),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ScheduleTodoRequest {
    pub todo_id: String,
    /// YYYY-MM-DD
    pub scheduled_date: String,
    /// Optional HH:MM
    pub scheduled_time: Option<String>,
}

pub async fn schedule_todo(app: &App, req: ScheduleTodoRequest) -> CommandResponse<TodoItem> {
    match app.store().todos.schedule(
        &req.todo_id,
        Some(&req.scheduled_date),
        req.scheduled_time.as_deref(),
    ) {
        Ok(todo) => CommandResponse::ok(todo),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

pub async fn unschedule_todo(app: &App, todo_id: &str) -> CommandResponse<TodoItem> {
    match app.store().todos.schedule(todo_id, None, None) {
        Ok(todo) => CommandResponse::ok(todo),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

pub async fn delete_knowledge(app: &App, id: &str) -> CommandResponse<Empty> {
    match app.store().knowledge.delete(id) {
        Ok(()) => CommandResponse::ok(Empty {}),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

pub async fn delete_todo(app: &App, id: &str) -> CommandResponse<Empty> {
    match app.store().todos.delete(id) {
        Ok(()) => CommandResponse::ok(Empty {}),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

#[derive(Debug, Serialize)]
pub struct DateCount {
    pub date: String,
    pub count: u64,
}

pub async fn get_event_count_by_date(app: &App, date: &str) -> CommandResponse<DateCount> {
    match app.store().events.count_by_date(date) {
        Ok(count) => CommandResponse::ok(DateCount {
            date: date.to_string(),
            count,
        }),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

pub async fn get_knowledge_count_by_date(app: &App, date: &str) -> CommandResponse<DateCount> {
    match app.store().knowledge.count_by_date(date) {
        Ok(count) => CommandResponse::ok(DateCount {
            date: date.to_string(),
            count,
        }),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

pub async fn get_pipeline_stats(
    app: &App,
) -> CommandResponse<rewind_agents::StatsSnapshot> {
    CommandResponse::ok(app.stats.snapshot())
}
