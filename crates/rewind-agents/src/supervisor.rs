//! Generic quality validator for agent output. May revise content; must
//! never block the pipeline or reduce the output to nothing.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use rewind_llm::json::parse_json_response;
use rewind_llm::{ChatBackend, ChatMessage, ChatParams};

use crate::prompts;
use crate::schema::SupervisorResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorCategory {
    Todo,
    Knowledge,
    Diary,
}

impl SupervisorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Knowledge => "knowledge",
            Self::Diary => "diary",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorOutcome {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    /// The content to use downstream: the revision when one was provided,
    /// otherwise the original.
    pub content: Value,
}

pub struct Supervisor {
    llm: Arc<dyn ChatBackend>,
}

impl Supervisor {
    pub fn new(llm: Arc<dyn ChatBackend>) -> Self {
        Self { llm }
    }

    /// Validate `content`. On any failure (LLM error, non-JSON reply) the
    /// outcome is `is_valid = true` with the original content: the
    /// supervisor can only ever improve output, never lose it.
    pub async fn validate(&self, category: SupervisorCategory, content: Value) -> SupervisorOutcome {
        let passthrough = |issues: Vec<String>| SupervisorOutcome {
            is_valid: true,
            issues,
            suggestions: Vec::new(),
            content: content.clone(),
        };

        if is_empty_content(&content) {
            return passthrough(Vec::new());
        }

        let content_json = match serde_json::to_string_pretty(&content) {
            Ok(s) => s,
            Err(e) => {
                warn!("supervisor could not serialize content: {e}");
                return passthrough(vec!["Supervisor validation unavailable".to_string()]);
            }
        };
        let (system, user) = prompts::supervisor_prompt(category.as_str(), &content_json);
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let params = ChatParams {
            max_tokens: 2000,
            temperature: 0.2,
        };

        let outcome = match self
            .llm
            .chat_completion(&messages, &params, "supervisor")
            .await
        {
            Ok(o) => o,
            Err(e) => {
                warn!(category = category.as_str(), "supervisor LLM call failed: {e}");
                return passthrough(vec!["Supervisor validation unavailable".to_string()]);
            }
        };

        let parsed: SupervisorResponse = match parse_json_response(&outcome.content) {
            Some(p) => p,
            None => {
                warn!(category = category.as_str(), "supervisor returned non-JSON");
                return passthrough(vec!["Supervisor validation unavailable".to_string()]);
            }
        };

        // A revision that would empty the output is discarded.
        let revised = parsed
            .revised_content
            .filter(|v| !v.is_null() && !is_empty_content(v));
        let content = revised.unwrap_or(content);

        debug!(
            category = category.as_str(),
            is_valid = parsed.is_valid,
            issues = parsed.issues.len(),
            "supervisor pass complete"
        );
        SupervisorOutcome {
            is_valid: parsed.is_valid,
            issues: parsed.issues,
            suggestions: parsed.suggestions,
            content,
        }
    }

    /// Validate a typed list: serialize, run the supervisor, deserialize
    /// the (possibly revised) result. Falls back to the input on any
    /// shape mismatch.
    pub async fn validate_items<T>(&self, category: SupervisorCategory, items: Vec<T>) -> Vec<T>
    where
        T: serde::Serialize + DeserializeOwned + Clone,
    {
        if items.is_empty() {
            return items;
        }
        let value = match serde_json::to_value(&items) {
            Ok(v) => v,
            Err(_) => return items,
        };
        let outcome = self.validate(category, value).await;
        if !outcome.is_valid {
            warn!(
                category = category.as_str(),
                issues = ?outcome.issues,
                "supervisor flagged issues"
            );
        }
        match serde_json::from_value::<Vec<T>>(outcome.content) {
            Ok(revised) if !revised.is_empty() => revised,
            _ => items,
        }
    }
}

fn is_empty_content(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_detection() {
        assert!(is_empty_content(&serde_json::json!(null)));
        assert!(is_empty_content(&serde_json::json!([])));
        assert!(is_empty_content(&serde_json::json!("  ")));
        assert!(!is_empty_content(&serde_json::json!([1])));
        assert!(!is_empty_content(&serde_json::json!("text")));
    }
}
