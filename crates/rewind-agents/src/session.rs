//! Session agent: clusters events into coarse work-session activities,
//! enforces the no-overlap invariant, and learns clustering preferences
//! from user merge/split edits.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use rewind_core::emitter::{Emitter, ACTIVITY_CREATED};
use rewind_llm::json::parse_json_response;
use rewind_llm::{ChatBackend, ChatMessage, ChatParams};
use rewind_store::types::{Activity, Event};
use rewind_store::Store;

use crate::prompts;
use crate::schema::SessionResponse;
use crate::stats::PipelineStats;

/// Events shorter than this or with fewer actions are too thin to cluster.
const LOOKBACK_HOURS: i64 = 2;
/// How many learned preferences are injected into the clustering prompt.
const MAX_PATTERNS_IN_PROMPT: usize = 5;
const MIN_PATTERN_CONFIDENCE: f64 = 0.5;
/// Confidence assigned to a freshly learned pattern.
const INITIAL_PATTERN_CONFIDENCE: f64 = 0.6;

pub struct SessionAgent {
    store: Store,
    llm: Arc<dyn ChatBackend>,
    emitter: Arc<dyn Emitter>,
    stats: Arc<PipelineStats>,
    min_event_actions: usize,
    min_event_duration_seconds: i64,
}

impl SessionAgent {
    pub fn new(
        store: Store,
        llm: Arc<dyn ChatBackend>,
        emitter: Arc<dyn Emitter>,
        stats: Arc<PipelineStats>,
        min_event_actions: usize,
        min_event_duration_seconds: i64,
    ) -> Self {
        Self {
            store,
            llm,
            emitter,
            stats,
            min_event_actions,
            min_event_duration_seconds,
        }
    }

    /// One clustering pass over recent unaggregated events.
    pub async fn aggregate_once(&self) {
        let events = match self.candidate_events() {
            Ok(e) => e,
            Err(e) => {
                warn!("failed to load candidate events: {e}");
                PipelineStats::bump(&self.stats.stage_failures);
                return;
            }
        };
        if events.is_empty() {
            debug!("no events to aggregate into sessions");
            return;
        }

        let patterns = self
            .store
            .preferences
            .recent_patterns(MAX_PATTERNS_IN_PROMPT, MIN_PATTERN_CONFIDENCE)
            .unwrap_or_default();

        debug!(events = events.len(), patterns = patterns.len(), "clustering events");
        let messages = vec![
            ChatMessage::system(prompts::SESSION_SYSTEM),
            ChatMessage::user(prompts::session_clustering_prompt(&events, &patterns)),
        ];
        let params = ChatParams {
            max_tokens: 2000,
            temperature: 0.3,
        };
        let outcome = match self
            .llm
            .chat_completion(&messages, &params, "session_aggregation")
            .await
        {
            Ok(o) => o,
            Err(e) => {
                warn!("session clustering LLM call failed: {e}");
                PipelineStats::bump(&self.stats.stage_failures);
                return;
            }
        };

        let parsed: SessionResponse = match parse_json_response(&outcome.content) {
            Some(p) => p,
            None => {
                warn!("session clustering returned unparseable JSON");
                PipelineStats::bump(&self.stats.stage_failures);
                return;
            }
        };

        let mut activities = Vec::new();
        for cluster in parsed.activities {
            let indices = normalize_source_indexes(&cluster.source, events.len());
            if indices.is_empty() {
                continue;
            }
            let clustered: Vec<&Event> = indices.iter().map(|&i| &events[i - 1]).collect();
            let Some(activity) = build_activity(
                &cluster.title,
                &cluster.description,
                &cluster.topic_tags,
                &clustered,
            ) else {
                continue;
            };
            activities.push(activity);
        }

        let before = activities.len();
        let activities = merge_overlapping(activities);
        if activities.len() < before {
            PipelineStats::add(
                &self.stats.activities_overlap_merged,
                (before - activities.len()) as u64,
            );
        }

        for activity in activities {
            if let Err(e) = self.store.activities.save(&activity) {
                warn!(activity_id = %activity.id, "failed to save activity: {e}");
                continue;
            }
            if let Err(e) = self
                .store
                .events
                .mark_aggregated(&activity.source_event_ids, &activity.id)
            {
                warn!(activity_id = %activity.id, "failed to mark events aggregated: {e}");
            }
            PipelineStats::bump(&self.stats.activities_created);
            self.emitter.emit(
                ACTIVITY_CREATED,
                serde_json::json!({
                    "activity": activity,
                    "version": activity.version,
                }),
            );
        }
    }

    /// Events that are not yet aggregated and pass the quality pre-filter.
    fn candidate_events(&self) -> rewind_store::Result<Vec<Event>> {
        let end = Utc::now();
        let start = end - Duration::hours(LOOKBACK_HOURS);
        let events = self
            .store
            .events
            .get_in_timeframe(&start.to_rfc3339(), &end.to_rfc3339())?;

        let mut quality_filtered = 0usize;
        let result: Vec<Event> = events
            .into_iter()
            .filter(|e| e.aggregated_into_activity_id.is_none())
            .filter(|e| {
                if e.source_action_ids.len() < self.min_event_actions {
                    quality_filtered += 1;
                    return false;
                }
                // Unparseable timestamps pass; duration is a soft filter.
                if let Some(secs) = duration_seconds(&e.start_time, &e.end_time) {
                    if secs < self.min_event_duration_seconds {
                        quality_filtered += 1;
                        return false;
                    }
                }
                true
            })
            .collect();
        if quality_filtered > 0 {
            debug!(quality_filtered, "events filtered by quality criteria");
        }
        Ok(result)
    }

    /// Learn a reusable pattern from a user-driven merge.
    pub async fn record_user_merge(&self, original_activities: &[Activity]) {
        let summary: Vec<serde_json::Value> = original_activities
            .iter()
            .map(|a| {
                serde_json::json!({
                    "title": a.title,
                    "description": a.description,
                    "start_time": a.start_time,
                    "end_time": a.end_time,
                })
            })
            .collect();
        let json = serde_json::to_string_pretty(&summary).unwrap_or_default();
        let (system, user) = prompts::user_merge_pattern_prompt(&json);
        self.learn_pattern("merge_pattern", system, user).await;
    }

    /// Learn a reusable pattern from a user-driven split.
    pub async fn record_user_split(&self, original: &Activity, new_activity_count: usize) {
        let summary = serde_json::json!({
            "title": original.title,
            "description": original.description,
            "duration_minutes": original.session_duration_minutes,
            "num_events": original.source_event_ids.len(),
        });
        let json = serde_json::to_string_pretty(&summary).unwrap_or_default();
        let (system, user) = prompts::user_split_pattern_prompt(&json, new_activity_count);
        self.learn_pattern("split_pattern", system, user).await;
    }

    async fn learn_pattern(&self, preference_type: &str, system: String, user: String) {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let params = ChatParams {
            max_tokens: 200,
            temperature: 0.3,
        };
        let outcome = match self
            .llm
            .chat_completion(&messages, &params, "preference_learning")
            .await
        {
            Ok(o) => o,
            Err(e) => {
                warn!("pattern learning LLM call failed: {e}");
                return;
            }
        };
        let pattern = outcome.content.trim();
        if pattern.is_empty() {
            return;
        }
        match self.store.preferences.save_pattern(
            preference_type,
            pattern,
            INITIAL_PATTERN_CONFIDENCE,
        ) {
            Ok(_) => info!(preference_type, pattern, "session preference learned"),
            Err(e) => warn!("failed to save session preference: {e}"),
        }
    }
}

/// Normalize LLM-provided 1-based indexes: integers only, in range,
/// duplicates removed, input order preserved.
pub fn normalize_source_indexes(raw: &[serde_json::Value], total: usize) -> Vec<usize> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for value in raw {
        let idx = match value {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        let Some(idx) = idx else { continue };
        if idx < 1 || idx as usize > total {
            continue;
        }
        let idx = idx as usize;
        if seen.insert(idx) {
            out.push(idx);
        }
    }
    out
}

/// Build an activity whose time range spans the referenced events.
fn build_activity(
    title: &str,
    description: &str,
    topic_tags: &[String],
    events: &[&Event],
) -> Option<Activity> {
    let source_event_ids: Vec<String> = events.iter().map(|e| e.id.clone()).collect();
    if source_event_ids.is_empty() {
        return None;
    }

    let starts: Vec<DateTime<Utc>> = events
        .iter()
        .filter_map(|e| DateTime::parse_from_rfc3339(&e.start_time).ok())
        .map(|t| t.with_timezone(&Utc))
        .collect();
    let ends: Vec<DateTime<Utc>> = events
        .iter()
        .filter_map(|e| DateTime::parse_from_rfc3339(&e.end_time).ok())
        .map(|t| t.with_timezone(&Utc))
        .collect();
    let start = starts.iter().min().copied().unwrap_or_else(Utc::now);
    let end = ends.iter().max().copied().unwrap_or(start).max(start);
    let duration_minutes = (end - start).num_minutes();

    Some(Activity {
        id: Uuid::new_v4().to_string(),
        title: if title.is_empty() {
            "Unnamed session".to_string()
        } else {
            title.to_string()
        },
        description: description.to_string(),
        start_time: start.to_rfc3339(),
        end_time: end.to_rfc3339(),
        source_event_ids,
        session_duration_minutes: Some(duration_minutes),
        topic_tags: topic_tags.to_vec(),
        version: 1,
        deleted: false,
        created_at: String::new(),
        updated_at: String::new(),
    })
}

/// Enforce the no-overlap invariant: sort by start, walk left to right,
/// merge any pair whose intervals intersect. Titles join with "; ",
/// descriptions with a blank line, event ids and tags are set-unioned,
/// and the later end wins.
pub fn merge_overlapping(activities: Vec<Activity>) -> Vec<Activity> {
    if activities.len() <= 1 {
        return activities;
    }
    let mut sorted = activities;
    sorted.sort_by(|a, b| a.start_time.cmp(&b.start_time));

    let mut merged: Vec<Activity> = Vec::with_capacity(sorted.len());
    let mut current = sorted.remove(0);

    for next in sorted {
        if next.start_time < current.end_time {
            debug!(
                current = %current.title,
                next = %next.title,
                "merging overlapping activities"
            );
            if !next.title.is_empty() && next.title != current.title {
                current.title = format!("{}; {}", current.title, next.title);
            }
            if !next.description.is_empty() && next.description != current.description {
                if current.description.is_empty() {
                    current.description = next.description.clone();
                } else {
                    current.description =
                        format!("{}\n\n{}", current.description, next.description);
                }
            }
            for id in next.source_event_ids {
                if !current.source_event_ids.contains(&id) {
                    current.source_event_ids.push(id);
                }
            }
            for tag in next.topic_tags {
                if !current.topic_tags.contains(&tag) {
                    current.topic_tags.push(tag);
                }
            }
            if next.end_time > current.end_time {
                current.end_time = next.end_time;
            }
            if let (Ok(start), Ok(end)) = (
                DateTime::parse_from_rfc3339(&current.start_time),
                DateTime::parse_from_rfc3339(&current.end_time),
            ) {
                current.session_duration_minutes = Some((end - start).num_minutes());
            }
        } else {
            merged.push(current);
            current = next;
        }
    }
    merged.push(current);
    merged
}

fn duration_seconds(start: &str, end: &str) -> Option<i64> {
    let start = DateTime::parse_from_rfc3339(start).ok()?;
    let end = DateTime::parse_from_rfc3339(end).ok()?;
    Some((end - start).num_seconds())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(id: &str, title: &str, start: &str, end: &str, events: &[&str]) -> Activity {
        Activity {
            id: id.to_string(),
            title: title.to_string(),
            description: format!("{title} description"),
            start_time: start.to_string(),
            end_time: end.to_string(),
            source_event_ids: events.iter().map(|s| s.to_string()).collect(),
            session_duration_minutes: None,
            topic_tags: vec![title.to_lowercase()],
            version: 1,
            deleted: false,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn normalize_rejects_bad_indexes() {
        let raw = vec![
            serde_json::json!(1),
            serde_json::json!("2"),
            serde_json::json!(2),   // duplicate
            serde_json::json!(0),   // out of range
            serde_json::json!(99),  // out of range
            serde_json::json!(1.5), // not an integer
            serde_json::json!(null),
        ];
        assert_eq!(normalize_source_indexes(&raw, 3), vec![1, 2]);
    }

    #[test]
    fn overlapping_pair_merges_into_one_span() {
        let a = activity(
            "a",
            "Refactor",
            "2025-06-01T10:00:00+00:00",
            "2025-06-01T10:40:00+00:00",
            &["e1", "e2"],
        );
        let b = activity(
            "b",
            "Review",
            "2025-06-01T10:30:00+00:00",
            "2025-06-01T11:00:00+00:00",
            &["e2", "e3"],
        );
        let merged = merge_overlapping(vec![b, a]);
        assert_eq!(merged.len(), 1);
        let m = &merged[0];
        assert_eq!(m.start_time, "2025-06-01T10:00:00+00:00");
        assert_eq!(m.end_time, "2025-06-01T11:00:00+00:00");
        assert!(m.title.contains("Refactor") && m.title.contains("Review"));
        assert_eq!(m.source_event_ids.len(), 3);
        assert!(m.description.contains("\n\n"));
    }

    #[test]
    fn disjoint_activities_stay_separate() {
        let a = activity(
            "a",
            "Morning",
            "2025-06-01T09:00:00+00:00",
            "2025-06-01T10:00:00+00:00",
            &["e1"],
        );
        let b = activity(
            "b",
            "Afternoon",
            "2025-06-01T13:00:00+00:00",
            "2025-06-01T14:00:00+00:00",
            &["e2"],
        );
        let merged = merge_overlapping(vec![a, b]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn touching_intervals_do_not_merge() {
        // end == next start is not an overlap.
        let a = activity(
            "a",
            "First",
            "2025-06-01T09:00:00+00:00",
            "2025-06-01T10:00:00+00:00",
            &["e1"],
        );
        let b = activity(
            "b",
            "Second",
            "2025-06-01T10:00:00+00:00",
            "2025-06-01T11:00:00+00:00",
            &["e2"],
        );
        assert_eq!(merge_overlapping(vec![a, b]).len(), 2);
    }

    #[test]
    fn chain_of_overlaps_collapses() {
        let a = activity(
            "a",
            "A",
            "2025-06-01T09:00:00+00:00",
            "2025-06-01T09:45:00+00:00",
            &["e1"],
        );
        let b = activity(
            "b",
            "B",
            "2025-06-01T09:30:00+00:00",
            "2025-06-01T10:15:00+00:00",
            &["e2"],
        );
        let c = activity(
            "c",
            "C",
            "2025-06-01T10:00:00+00:00",
            "2025-06-01T10:30:00+00:00",
            &["e3"],
        );
        let merged = merge_overlapping(vec![c, a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source_event_ids.len(), 3);
    }

    #[test]
    fn build_activity_spans_events() {
        let e1 = Event {
            id: "e1".to_string(),
            title: String::new(),
            description: String::new(),
            keywords: vec![],
            start_time: "2025-06-01T10:00:00+00:00".to_string(),
            end_time: "2025-06-01T10:10:00+00:00".to_string(),
            source_action_ids: vec!["a1".to_string()],
            aggregated_into_activity_id: None,
            deleted: false,
            created_at: String::new(),
        };
        let e2 = Event {
            id: "e2".to_string(),
            start_time: "2025-06-01T10:20:00+00:00".to_string(),
            end_time: "2025-06-01T10:50:00+00:00".to_string(),
            ..e1.clone()
        };
        let activity = build_activity("Session", "", &[], &[&e1, &e2]).unwrap();
        assert_eq!(activity.start_time, "2025-06-01T10:00:00+00:00");
        assert_eq!(activity.end_time, "2025-06-01T10:50:00+00:00");
        assert_eq!(activity.session_duration_minutes, Some(50));
    }
}
