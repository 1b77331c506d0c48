//! Prompt text for every LLM-backed stage. Kept in one place so the JSON
//! contracts stay in sync with the schema structs.

use chrono::{DateTime, Utc};

use rewind_perception::{RawRecord, RecordKind};
use rewind_store::types::{Action, Activity, Event, SessionPreference};

use crate::types::Scene;

pub const SCENE_SYSTEM: &str = "You are a screen-understanding assistant. You receive a sequence \
of desktop screenshots plus a summary of the user's keyboard and mouse activity, and you describe \
each screenshot as structured data. Respond ONLY with JSON of the form \
{\"scenes\": [{\"screenshot_index\": 0, \"visual_summary\": \"...\", \"detected_text\": \"...\", \
\"ui_elements\": \"...\", \"application_context\": \"...\", \"inferred_activity\": \"...\", \
\"focus_areas\": \"...\"}]}. screenshot_index is the zero-based position of the image in the \
order given. Describe only what is visible.";

pub const ACTION_SYSTEM: &str = "You are an activity-analysis assistant. From structured scene \
descriptions of a user's screen you extract short, single-intent user actions. Respond ONLY with \
JSON of the form {\"actions\": [{\"title\": \"...\", \"description\": \"...\", \
\"keywords\": [\"...\"], \"scene_index\": [0], \"extract_knowledge\": false}]}. scene_index lists \
the zero-based scenes that show the action. Set extract_knowledge true when the scenes contain \
reusable factual or procedural knowledge worth keeping. Merge near-identical moments into one \
action; do not invent actions not supported by the scenes.";

pub const ACTION_IMAGE_SYSTEM: &str = "You are an activity-analysis assistant. From a sequence of \
desktop screenshots you extract short, single-intent user actions. Respond ONLY with JSON of the \
form {\"actions\": [{\"title\": \"...\", \"description\": \"...\", \"keywords\": [\"...\"], \
\"image_index\": [0], \"extract_knowledge\": false}]}. image_index lists the zero-based \
screenshots that show the action.";

pub const EVENT_SYSTEM: &str = "You are an aggregation assistant. You receive a list of user \
actions and group them into medium-grained events. Cluster by (a) semantic similarity - actions \
describing the same work segment, (b) time continuity - short gaps between actions, and (c) task \
consistency - actions serving one coherent goal. Respond ONLY with JSON of the form \
{\"events\": [{\"title\": \"...\", \"description\": \"...\", \"keywords\": [\"...\"], \
\"start_time\": \"...\", \"end_time\": \"...\", \"source_action_ids\": [\"...\"]}]}. Every \
source_action_ids entry must be an id copied verbatim from the input. Every action belongs to at \
most one event.";

pub const SESSION_SYSTEM: &str = "You are a session-analysis assistant. You receive a numbered \
list of work events and group them into coarse work sessions. Cluster primarily by thematic \
relevance (same topic, project or problem domain); treat time continuity (gaps under 30 minutes) \
and goal association as strong signals, and project consistency and workflow continuity as \
auxiliary signals. Respond ONLY with JSON of the form {\"activities\": [{\"source\": [1, 2], \
\"title\": \"...\", \"description\": \"...\", \"topic_tags\": [\"...\"]}]}. source lists the \
one-based event numbers in the cluster.";

pub const KNOWLEDGE_SYSTEM: &str = "You are a knowledge-extraction assistant. From structured \
scene descriptions of a user's screen you extract reusable factual or procedural knowledge: \
commands, APIs, configuration values, domain facts, troubleshooting steps. Respond ONLY with \
JSON of the form {\"knowledge\": [{\"title\": \"...\", \"description\": \"...\", \
\"keywords\": [\"...\"]}]}. Skip transient screen state that has no reuse value; an empty list \
is a valid answer.";

pub const TODO_SYSTEM: &str = "You are a task-extraction assistant. From structured scene \
descriptions of a user's screen you extract actionable TODO items the user still needs to do: \
unfinished work, explicit reminders, review requests, follow-ups. Respond ONLY with JSON of the \
form {\"todos\": [{\"title\": \"...\", \"description\": \"...\", \"keywords\": [\"...\"]}]}. \
Only include items with a concrete next step; an empty list is a valid answer.";

pub const MERGE_SYSTEM: &str = "You are a curation assistant. You receive a list of items with \
ids and group the ones that describe the same underlying thing. Respond ONLY with JSON of the \
form {\"merged\": [{\"title\": \"...\", \"description\": \"...\", \"keywords\": [\"...\"], \
\"merged_from_ids\": [\"...\"]}]}. Each group must contain at least two input ids copied \
verbatim; items that stand alone are omitted from the answer.";

pub const DIARY_SYSTEM: &str = "You write a short first-person diary entry summarising one day \
of computer work from the listed activities. Be concrete about what was worked on and in what \
order; two to four paragraphs of plain prose, no headings.";

/// Human-readable keyboard/mouse activity hint for the scene prompt.
pub fn input_usage_hint(records: &[RawRecord]) -> String {
    let mut parts = Vec::new();
    for (kind, label) in [
        (RecordKind::Keyboard, "Keyboard activity"),
        (RecordKind::Mouse, "Mouse activity"),
    ] {
        let times: Vec<DateTime<Utc>> = records
            .iter()
            .filter(|r| r.kind() == kind)
            .map(|r| r.timestamp)
            .collect();
        if let (Some(min), Some(max)) = (times.iter().min(), times.iter().max()) {
            parts.push(format!(
                "{label}: {}-{} ({} events)",
                min.format("%H:%M:%S"),
                max.format("%H:%M:%S"),
                times.len()
            ));
        }
    }
    if parts.is_empty() {
        "No keyboard/mouse activity in this window.".to_string()
    } else {
        parts.join("\n")
    }
}

pub fn scene_user_prompt(hint: &str, screenshot_count: usize) -> String {
    format!(
        "The following {screenshot_count} screenshots were captured in order over the last few \
seconds.\n\nInput activity:\n{hint}\n\nDescribe each screenshot as a scene."
    )
}

pub fn action_from_scenes_prompt(scenes: &[Scene]) -> String {
    let rendered: Vec<serde_json::Value> = scenes
        .iter()
        .enumerate()
        .map(|(i, s)| {
            serde_json::json!({
                "scene_index": i,
                "timestamp": s.timestamp.to_rfc3339(),
                "visual_summary": s.visual_summary,
                "detected_text": s.detected_text,
                "application_context": s.application_context,
                "inferred_activity": s.inferred_activity,
            })
        })
        .collect();
    format!(
        "Scene descriptions, in capture order:\n{}\n\nExtract the user actions.",
        serde_json::to_string_pretty(&rendered).unwrap_or_default()
    )
}

pub fn event_aggregation_prompt(actions: &[Action]) -> String {
    let rendered: Vec<serde_json::Value> = actions
        .iter()
        .map(|a| {
            serde_json::json!({
                "id": a.id,
                "title": a.title,
                "description": a.description,
                "keywords": a.keywords,
                "timestamp": a.timestamp,
            })
        })
        .collect();
    format!(
        "Unaggregated actions:\n{}\n\nGroup them into events.",
        serde_json::to_string_pretty(&rendered).unwrap_or_default()
    )
}

pub fn session_clustering_prompt(events: &[Event], patterns: &[SessionPreference]) -> String {
    let rendered: Vec<serde_json::Value> = events
        .iter()
        .enumerate()
        .map(|(i, e)| {
            serde_json::json!({
                "index": i + 1,
                "title": e.title,
                "description": e.description,
                "start_time": e.start_time,
                "end_time": e.end_time,
            })
        })
        .collect();
    let mut prompt = format!(
        "Numbered events:\n{}\n\nGroup them into work sessions.",
        serde_json::to_string_pretty(&rendered).unwrap_or_default()
    );
    if !patterns.is_empty() {
        prompt.push_str("\n\nThe user has previously corrected session grouping. Apply these learned preferences where they fit:\n");
        for p in patterns {
            prompt.push_str(&format!("- {}\n", p.pattern_description));
        }
    }
    prompt
}

pub fn merge_items_prompt(kind: &str, items: &[(String, String, String)]) -> String {
    let rendered: Vec<serde_json::Value> = items
        .iter()
        .map(|(id, title, description)| {
            serde_json::json!({ "id": id, "title": title, "description": description })
        })
        .collect();
    format!(
        "Existing {kind} items:\n{}\n\nGroup the related ones.",
        serde_json::to_string_pretty(&rendered).unwrap_or_default()
    )
}

pub fn diary_prompt(date: &str, activities: &[Activity]) -> String {
    let rendered: Vec<serde_json::Value> = activities
        .iter()
        .map(|a| {
            serde_json::json!({
                "title": a.title,
                "description": a.description,
                "start_time": a.start_time,
                "end_time": a.end_time,
                "topic_tags": a.topic_tags,
            })
        })
        .collect();
    format!(
        "Activities on {date}:\n{}\n\nWrite the diary entry.",
        serde_json::to_string_pretty(&rendered).unwrap_or_default()
    )
}

/// Supervisor prompt for one category. The category names what the content
/// is so the validator can apply the right quality bar.
pub fn supervisor_prompt(category: &str, content_json: &str) -> (String, String) {
    let system = format!(
        "You are a quality reviewer for {category} items produced by an automated pipeline. \
Check for vagueness, duplication, hallucinated specifics and missing actionability. Respond \
ONLY with JSON of the form {{\"is_valid\": true, \"issues\": [\"...\"], \
\"suggestions\": [\"...\"], \"revised_content\": null}}. Put an improved version of the full \
content in revised_content when you can improve it; never drop items outright."
    );
    let user = format!("Content to review:\n{content_json}");
    (system, user)
}

pub fn user_merge_pattern_prompt(activities_json: &str) -> (String, String) {
    (
        "You analyse user behaviour patterns. The user manually merged the listed activities \
into one session. Extract a reusable rule explaining why, in one concise sentence."
            .to_string(),
        format!("User merged these activities:\n{activities_json}\n\nState the pattern."),
    )
}

pub fn user_split_pattern_prompt(activity_json: &str, parts: usize) -> (String, String) {
    (
        "You analyse user behaviour patterns. The user manually split the listed activity into \
separate sessions. Extract a reusable rule explaining why, in one concise sentence."
            .to_string(),
        format!(
            "User split this activity into {parts} separate activities:\n{activity_json}\n\nState the pattern."
        ),
    )
}
