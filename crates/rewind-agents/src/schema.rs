//! Serde shapes for the JSON the agents ask the LLM to return. Every
//! "maybe present" field is optional; validation happens after parsing,
//! never by probing raw maps.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SceneResponse {
    #[serde(default)]
    pub scenes: Vec<SceneEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SceneEntry {
    pub screenshot_index: Option<i64>,
    #[serde(default)]
    pub visual_summary: String,
    #[serde(default)]
    pub detected_text: String,
    #[serde(default)]
    pub ui_elements: String,
    #[serde(default)]
    pub application_context: String,
    #[serde(default)]
    pub inferred_activity: String,
    #[serde(default)]
    pub focus_areas: String,
}

#[derive(Debug, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub actions: Vec<ActionEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ActionEntry {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Zero-based indices into the scene array (scene path).
    #[serde(default)]
    pub scene_index: Vec<i64>,
    /// Zero-based indices into the screenshot batch (legacy path).
    #[serde(default)]
    pub image_index: Vec<i64>,
    /// Hint that this action likely contains extractable knowledge.
    #[serde(default)]
    pub extract_knowledge: bool,
}

#[derive(Debug, Deserialize)]
pub struct EventResponse {
    #[serde(default)]
    pub events: Vec<EventEntry>,
}

#[derive(Debug, Deserialize)]
pub struct EventEntry {
    /// Ignored on persist; rows always get a fresh id.
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    #[serde(default)]
    pub source_action_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionResponse {
    #[serde(default)]
    pub activities: Vec<SessionClusterEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SessionClusterEntry {
    /// One-based indices into the numbered event list.
    #[serde(default)]
    pub source: Vec<serde_json::Value>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub topic_tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct KnowledgeResponse {
    #[serde(default)]
    pub knowledge: Vec<ItemEntry>,
}

#[derive(Debug, Deserialize)]
pub struct TodoResponse {
    #[serde(default)]
    pub todos: Vec<ItemEntry>,
}

/// Shared shape for knowledge and TODO items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemEntry {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MergeResponse {
    #[serde(default)]
    pub merged: Vec<MergedEntry>,
}

#[derive(Debug, Deserialize)]
pub struct MergedEntry {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub merged_from_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SupervisorResponse {
    #[serde(default = "default_true")]
    pub is_valid: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub revised_content: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_llm::json::parse_json_response;

    #[test]
    fn action_response_tolerates_missing_fields() {
        let raw = r#"{"actions": [{"title": "edit file", "scene_index": [0, 1]}]}"#;
        let parsed: ActionResponse = parse_json_response(raw).unwrap();
        assert_eq!(parsed.actions.len(), 1);
        assert!(parsed.actions[0].description.is_empty());
        assert_eq!(parsed.actions[0].scene_index, vec![0, 1]);
        assert!(!parsed.actions[0].extract_knowledge);
    }

    #[test]
    fn session_response_accepts_mixed_index_types() {
        // Models sometimes return indices as strings.
        let raw = r#"{"activities": [{"source": [1, "2", 3], "title": "work"}]}"#;
        let parsed: SessionResponse = parse_json_response(raw).unwrap();
        assert_eq!(parsed.activities[0].source.len(), 3);
    }

    #[test]
    fn supervisor_defaults_to_valid() {
        let raw = r#"{"issues": []}"#;
        let parsed: SupervisorResponse = parse_json_response(raw).unwrap();
        assert!(parsed.is_valid);
        assert!(parsed.revised_content.is_none());
    }
}
