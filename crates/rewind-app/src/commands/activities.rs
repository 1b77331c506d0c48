//! Activity queries and user edits. Edits go through the repository layer
//! and emit change notifications; merges additionally feed the session
//! agent's preference learning.

use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use rewind_core::emitter::{ACTIVITY_DELETED, ACTIVITY_UPDATED, BULK_UPDATE_COMPLETED};
use rewind_store::types::Activity;

use crate::app::App;
use crate::response::{CommandResponse, Empty};

pub async fn get_recent_activities(app: &App, limit: usize) -> CommandResponse<Vec<Activity>> {
    match app.store().activities.get_recent(limit.clamp(1, 100)) {
        Ok(activities) => CommandResponse::ok(activities),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct MergeActivitiesRequest {
    pub activity_ids: Vec<String>,
}

/// Merge two or more activities into one on the user's request. The first
/// (earliest) row absorbs the rest; the session agent learns a pattern
/// from the edit.
pub async fn merge_activities(
    app: &App,
    req: MergeActivitiesRequest,
) -> CommandResponse<Activity> {
    if req.activity_ids.len() < 2 {
        return CommandResponse::err("need at least two activities to merge");
    }
    let store = app.store();
    let mut originals = match store.activities.get_by_ids(&req.activity_ids) {
        Ok(a) if a.len() >= 2 => a,
        Ok(_) => return CommandResponse::err("fewer than two of the activities exist"),
        Err(e) => return CommandResponse::err(e.to_string()),
    };
    originals.sort_by(|a, b| a.start_time.cmp(&b.start_time));

    let mut merged = originals[0].clone();
    for other in &originals[1..] {
        if !other.title.is_empty() && other.title != merged.title {
            merged.title = format!("{}; {}", merged.title, other.title);
        }
        if !other.description.is_empty() && other.description != merged.description {
            if merged.description.is_empty() {
                merged.description = other.description.clone();
            } else {
                merged.description = format!("{}\n\n{}", merged.description, other.description);
            }
        }
        for id in &other.source_event_ids {
            if !merged.source_event_ids.contains(id) {
                merged.source_event_ids.push(id.clone());
            }
        }
        for tag in &other.topic_tags {
            if !merged.topic_tags.contains(tag) {
                merged.topic_tags.push(tag.clone());
            }
        }
        if other.end_time > merged.end_time {
            merged.end_time = other.end_time.clone();
        }
    }

    let updated = match store.activities.update(&merged) {
        Ok(u) => u,
        Err(e) => return CommandResponse::err(e.to_string()),
    };
    for other in &originals[1..] {
        if let Err(e) = store.activities.delete(&other.id) {
            warn!(activity_id = %other.id, "failed to delete merged-away activity: {e}");
        }
        app.emitter.emit(
            ACTIVITY_DELETED,
            serde_json::json!({
                "id": other.id,
                "deletedAt": chrono::Utc::now().to_rfc3339(),
            }),
        );
    }
    app.emitter.emit(
        ACTIVITY_UPDATED,
        serde_json::json!({ "activity": updated, "version": updated.version }),
    );
    app.emitter.emit(
        BULK_UPDATE_COMPLETED,
        serde_json::json!({
            "updatedCount": originals.len(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    );

    // Learn the pattern behind the user's merge, when the LLM is up.
    if let Some(coordinator) = app.coordinator().await {
        coordinator.session_agent().record_user_merge(&originals).await;
    }

    CommandResponse::ok(updated)
}

#[derive(Debug, Deserialize)]
pub struct SplitActivityRequest {
    pub activity_id: String,
    /// Event-id groups for the new activities; every group must be
    /// non-empty and drawn from the original's source events.
    pub event_groups: Vec<Vec<String>>,
}

/// Split one activity into several on the user's request.
pub async fn split_activity(
    app: &App,
    req: SplitActivityRequest,
) -> CommandResponse<Vec<Activity>> {
    if req.event_groups.len() < 2 || req.event_groups.iter().any(|g| g.is_empty()) {
        return CommandResponse::err("need at least two non-empty event groups");
    }
    let store = app.store();
    let original = match store.activities.get_by_id(&req.activity_id) {
        Ok(Some(a)) => a,
        Ok(None) => return CommandResponse::err(format!("activity not found: {}", req.activity_id)),
        Err(e) => return CommandResponse::err(e.to_string()),
    };
    for group in &req.event_groups {
        if group
            .iter()
            .any(|id| !original.source_event_ids.contains(id))
        {
            return CommandResponse::err("event group references an event outside the activity");
        }
    }

    let mut created = Vec::with_capacity(req.event_groups.len());
    for group in &req.event_groups {
        let events = match store.events.get_by_ids(group) {
            Ok(e) if !e.is_empty() => e,
            Ok(_) => continue,
            Err(e) => return CommandResponse::err(e.to_string()),
        };
        let start = events.iter().map(|e| e.start_time.clone()).min().unwrap_or_default();
        let end = events.iter().map(|e| e.end_time.clone()).max().unwrap_or_default();
        let activity = Activity {
            id: Uuid::new_v4().to_string(),
            title: original.title.clone(),
            description: original.description.clone(),
            start_time: start,
            end_time: end,
            source_event_ids: group.clone(),
            session_duration_minutes: None,
            topic_tags: original.topic_tags.clone(),
            version: 1,
            deleted: false,
            created_at: String::new(),
            updated_at: String::new(),
        };
        if let Err(e) = store.activities.save(&activity) {
            return CommandResponse::err(e.to_string());
        }
        if let Err(e) = store.events.mark_aggregated(group, &activity.id) {
            warn!(activity_id = %activity.id, "failed to re-point events: {e}");
        }
        created.push(activity);
    }

    if let Err(e) = store.activities.delete(&original.id) {
        return CommandResponse::err(e.to_string());
    }
    app.emitter.emit(
        ACTIVITY_DELETED,
        serde_json::json!({
            "id": original.id,
            "deletedAt": chrono::Utc::now().to_rfc3339(),
        }),
    );
    app.emitter.emit(
        BULK_UPDATE_COMPLETED,
        serde_json::json!({
            "updatedCount": created.len() + 1,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    );

    if let Some(coordinator) = app.coordinator().await {
        coordinator
            .session_agent()
            .record_user_split(&original, created.len())
            .await;
    }

    CommandResponse::ok(created)
}

pub async fn delete_activity(app: &App, id: &str) -> CommandResponse<Empty> {
    match app.store().activities.delete(id) {
        Ok(()) => {
            app.emitter.emit(
                ACTIVITY_DELETED,
                serde_json::json!({
                    "id": id,
                    "deletedAt": chrono::Utc::now().to_rfc3339(),
                }),
            );
            CommandResponse::ok(Empty {})
        }
        Err(e) => CommandResponse::err(e.to_string()),
    }
}
