//! Event agent: periodically clusters unaggregated actions into
//! medium-grain events via one text-only LLM call.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use rewind_llm::json::parse_json_response;
use rewind_llm::{ChatBackend, ChatMessage, ChatParams};
use rewind_store::types::{Action, Event};
use rewind_store::Store;

use crate::prompts;
use crate::schema::EventResponse;
use crate::stats::PipelineStats;

pub struct EventAgent {
    store: Store,
    llm: Arc<dyn ChatBackend>,
    stats: Arc<PipelineStats>,
    time_window_hours: i64,
}

impl EventAgent {
    pub fn new(
        store: Store,
        llm: Arc<dyn ChatBackend>,
        stats: Arc<PipelineStats>,
        time_window_hours: i64,
    ) -> Self {
        Self {
            store,
            llm,
            stats,
            time_window_hours,
        }
    }

    /// One aggregation pass. Failures are logged and counted; the next
    /// timer tick simply tries again.
    pub async fn aggregate_once(&self) {
        let candidates = match self.unaggregated_actions() {
            Ok(c) => c,
            Err(e) => {
                warn!("failed to load unaggregated actions: {e}");
                PipelineStats::bump(&self.stats.stage_failures);
                return;
            }
        };
        if candidates.len() < 2 {
            debug!(count = candidates.len(), "not enough actions to aggregate");
            return;
        }

        debug!(count = candidates.len(), "aggregating actions into events");
        let messages = vec![
            ChatMessage::system(prompts::EVENT_SYSTEM),
            ChatMessage::user(prompts::event_aggregation_prompt(&candidates)),
        ];
        let params = ChatParams {
            max_tokens: 2000,
            temperature: 0.3,
        };
        let outcome = match self
            .llm
            .chat_completion(&messages, &params, "event_aggregation")
            .await
        {
            Ok(o) => o,
            Err(e) => {
                warn!("event aggregation LLM call failed: {e}");
                PipelineStats::bump(&self.stats.stage_failures);
                return;
            }
        };

        let parsed: EventResponse = match parse_json_response(&outcome.content) {
            Some(p) => p,
            None => {
                warn!("event aggregation returned unparseable JSON");
                PipelineStats::bump(&self.stats.stage_failures);
                return;
            }
        };

        for entry in parsed.events {
            if entry.source_action_ids.is_empty() {
                warn!(title = %entry.title, "event with no source actions dropped");
                continue;
            }
            // Only ids that reference real, undeleted actions survive.
            let referenced = match self.store.actions.get_by_ids(&entry.source_action_ids) {
                Ok(actions) => actions,
                Err(e) => {
                    warn!("failed to verify source actions: {e}");
                    continue;
                }
            };
            if referenced.is_empty() {
                warn!(title = %entry.title, "event references no live actions, dropped");
                continue;
            }
            let source_ids: Vec<String> = referenced.iter().map(|a| a.id.clone()).collect();

            let (start_time, end_time) =
                canonical_time_range(entry.start_time.as_deref(), entry.end_time.as_deref(), &referenced);

            let event = Event {
                id: Uuid::new_v4().to_string(),
                title: entry.title,
                description: entry.description,
                keywords: entry.keywords,
                start_time,
                end_time,
                source_action_ids: source_ids,
                aggregated_into_activity_id: None,
                deleted: false,
                created_at: String::new(),
            };
            if let Err(e) = self.store.events.save(&event) {
                warn!(event_id = %event.id, "failed to save event: {e}");
                continue;
            }
            PipelineStats::bump(&self.stats.events_created);
        }
    }

    /// Actions in the look-back window whose ids are not referenced by any
    /// non-deleted event.
    fn unaggregated_actions(&self) -> rewind_store::Result<Vec<Action>> {
        let end = Utc::now();
        let start = end - Duration::hours(self.time_window_hours);
        let actions = self
            .store
            .actions
            .get_in_timeframe(&start.to_rfc3339(), &end.to_rfc3339())?;
        let aggregated = self.store.events.get_all_source_action_ids()?;
        let before = actions.len();
        let remaining: Vec<Action> = actions
            .into_iter()
            .filter(|a| !aggregated.contains(&a.id))
            .collect();
        debug!(
            total = before,
            already_aggregated = before - remaining.len(),
            remaining = remaining.len(),
            "action candidates filtered"
        );
        Ok(remaining)
    }
}

/// Canonical RFC3339 range. Unparseable LLM timestamps fall back to the
/// min/max of the referenced action timestamps.
fn canonical_time_range(
    start: Option<&str>,
    end: Option<&str>,
    actions: &[Action],
) -> (String, String) {
    let action_times: Vec<DateTime<Utc>> = actions
        .iter()
        .filter_map(|a| DateTime::parse_from_rfc3339(&a.timestamp).ok())
        .map(|t| t.with_timezone(&Utc))
        .collect();
    let fallback_start = action_times.iter().min().copied().unwrap_or_else(Utc::now);
    let fallback_end = action_times.iter().max().copied().unwrap_or(fallback_start);

    let parse = |raw: Option<&str>, fallback: DateTime<Utc>| {
        raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(fallback)
    };
    let start = parse(start, fallback_start);
    let mut end = parse(end, fallback_end);
    if end < start {
        end = start;
    }
    (start.to_rfc3339(), end.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(id: &str, ts: &str) -> Action {
        Action {
            id: id.to_string(),
            title: String::new(),
            description: String::new(),
            keywords: vec![],
            timestamp: ts.to_string(),
            screenshots: vec![],
            knowledge_extracted: false,
            extract_knowledge: false,
            deleted: false,
            created_at: String::new(),
        }
    }

    #[test]
    fn unparseable_times_fall_back_to_action_range() {
        let actions = vec![
            action("a1", "2025-06-01T10:00:00+00:00"),
            action("a2", "2025-06-01T10:30:00+00:00"),
        ];
        let (start, end) = canonical_time_range(Some("not a time"), None, &actions);
        assert_eq!(start, "2025-06-01T10:00:00+00:00");
        assert_eq!(end, "2025-06-01T10:30:00+00:00");
    }

    #[test]
    fn inverted_range_is_clamped() {
        let actions = vec![action("a1", "2025-06-01T10:00:00+00:00")];
        let (start, end) = canonical_time_range(
            Some("2025-06-01T11:00:00+00:00"),
            Some("2025-06-01T10:00:00+00:00"),
            &actions,
        );
        assert_eq!(start, end);
    }
}
