use serde::{Deserialize, Serialize};

/// A short, single-intent unit of user behaviour extracted from scenes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    /// Earliest timestamp among the referenced scenes (RFC3339 UTC).
    pub timestamp: String,
    /// At most 6 unique screenshot hashes, in scene-reference order.
    pub screenshots: Vec<String>,
    pub knowledge_extracted: bool,
    pub extract_knowledge: bool,
    pub deleted: bool,
    pub created_at: String,
}

/// Medium-grain aggregation of actions sharing a goal or time segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub start_time: String,
    pub end_time: String,
    pub source_action_ids: Vec<String>,
    pub aggregated_into_activity_id: Option<String>,
    pub deleted: bool,
    pub created_at: String,
}

/// Coarse work session made by clustering events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub title: String,
    pub description: String,
    pub start_time: String,
    pub end_time: String,
    pub source_event_ids: Vec<String>,
    pub session_duration_minutes: Option<i64>,
    pub topic_tags: Vec<String>,
    /// Monotonic per-row version, bumped on every update. Carried in
    /// activity-created/-updated notifications.
    pub version: i64,
    pub deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A reusable factual or procedural nugget. Rows read back from
/// `combined_knowledge` carry a non-empty `merged_from_ids`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub source_action_id: Option<String>,
    pub merged_from_ids: Vec<String>,
    pub deleted: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub merged_from_ids: Vec<String>,
    pub completed: bool,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub deleted: bool,
    pub created_at: String,
}

/// One diary row per calendar date (YYYY-MM-DD).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diary {
    pub id: String,
    pub date: String,
    pub content: String,
    pub source_activity_ids: Vec<String>,
    pub deleted: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub related_activity_ids: Vec<String>,
    pub metadata: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: String,
    pub metadata: serde_json::Value,
}

/// A configured LLM endpoint. At most one row has `is_active = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmModel {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub api_url: String,
    pub model_name: String,
    /// Price per million prompt tokens.
    pub input_token_price: f64,
    /// Price per million completion tokens.
    pub output_token_price: f64,
    pub currency: String,
    pub api_key: String,
    pub is_active: bool,
    pub last_test_status: Option<String>,
    pub last_tested_at: Option<String>,
    pub last_test_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Append-only token accounting row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub timestamp: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cost: f64,
    pub request_type: String,
}

/// A learned clustering preference from a user merge/split edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPreference {
    pub id: String,
    pub preference_type: String,
    pub pattern_description: String,
    pub confidence_score: f64,
    pub times_observed: u32,
    pub last_observed: String,
    pub created_at: String,
}

/// Thumbnail metadata for a persisted screenshot hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailRecord {
    pub hash: String,
    pub thumbnail_path: String,
    pub width: u32,
    pub height: u32,
    pub bytes: u64,
    pub created_at: String,
}
