//! TODO agent: extracts actionable follow-ups from scenes and periodically
//! merges related items. Same two-table shape as the knowledge agent.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use rewind_llm::json::parse_json_response;
use rewind_llm::{ChatBackend, ChatMessage, ChatParams};
use rewind_store::types::TodoItem;
use rewind_store::Store;

use crate::knowledge::scenes_digest;
use crate::prompts;
use crate::schema::{ItemEntry, MergeResponse, TodoResponse};
use crate::stats::PipelineStats;
use crate::supervisor::{Supervisor, SupervisorCategory};
use crate::types::Scene;

pub struct TodoAgent {
    store: Store,
    llm: Arc<dyn ChatBackend>,
    supervisor: Option<Arc<Supervisor>>,
    stats: Arc<PipelineStats>,
}

impl TodoAgent {
    pub fn new(
        store: Store,
        llm: Arc<dyn ChatBackend>,
        supervisor: Option<Arc<Supervisor>>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            store,
            llm,
            supervisor,
            stats,
        }
    }

    /// Extract TODOs from the tick's scenes and persist them.
    pub async fn extract_from_scenes(&self, scenes: &[Scene]) -> usize {
        if scenes.is_empty() {
            return 0;
        }
        let messages = vec![
            ChatMessage::system(prompts::TODO_SYSTEM),
            ChatMessage::user(format!(
                "Scene descriptions of the user's recent screen activity:\n{}\n\nExtract actionable TODO items.",
                scenes_digest(scenes)
            )),
        ];
        let params = ChatParams {
            max_tokens: 1500,
            temperature: 0.3,
        };
        let outcome = match self
            .llm
            .chat_completion(&messages, &params, "todo_extraction")
            .await
        {
            Ok(o) => o,
            Err(e) => {
                warn!("todo extraction LLM call failed: {e}");
                return 0;
            }
        };
        let entries = match parse_json_response::<TodoResponse>(&outcome.content) {
            Some(parsed) => parsed.todos,
            None => {
                warn!("todo extraction returned unparseable JSON");
                return 0;
            }
        };
        self.save_entries(entries).await
    }

    /// Merge related TODO rows into combined rows, soft-deleting sources.
    pub async fn merge_once(&self) {
        let unmerged = match self.store.todos.get_unmerged() {
            Ok(u) => u,
            Err(e) => {
                warn!("failed to load unmerged todos: {e}");
                PipelineStats::bump(&self.stats.stage_failures);
                return;
            }
        };
        if unmerged.len() < 2 {
            debug!("insufficient todo rows, skipping merge");
            return;
        }

        let items: Vec<(String, String, String)> = unmerged
            .iter()
            .map(|t| (t.id.clone(), t.title.clone(), t.description.clone()))
            .collect();
        let messages = vec![
            ChatMessage::system(prompts::MERGE_SYSTEM),
            ChatMessage::user(prompts::merge_items_prompt("TODO", &items)),
        ];
        let params = ChatParams {
            max_tokens: 2000,
            temperature: 0.3,
        };
        let outcome = match self
            .llm
            .chat_completion(&messages, &params, "todo_merge")
            .await
        {
            Ok(o) => o,
            Err(e) => {
                warn!("todo merge LLM call failed: {e}");
                PipelineStats::bump(&self.stats.stage_failures);
                return;
            }
        };
        let parsed: MergeResponse = match parse_json_response(&outcome.content) {
            Some(p) => p,
            None => {
                warn!("todo merge returned unparseable JSON");
                return;
            }
        };

        let known_ids: std::collections::HashSet<&str> =
            unmerged.iter().map(|t| t.id.as_str()).collect();
        for merged in parsed.merged {
            let sources: Vec<String> = merged
                .merged_from_ids
                .iter()
                .filter(|id| known_ids.contains(id.as_str()))
                .cloned()
                .collect();
            if sources.len() < 2 {
                warn!(title = %merged.title, "merged todo group too small, dropped");
                continue;
            }
            let todo = TodoItem {
                id: Uuid::new_v4().to_string(),
                title: merged.title,
                description: merged.description,
                keywords: merged.keywords,
                merged_from_ids: sources.clone(),
                completed: false,
                scheduled_date: None,
                scheduled_time: None,
                deleted: false,
                created_at: String::new(),
            };
            if let Err(e) = self.store.todos.save_combined(&todo) {
                warn!("failed to save combined todo: {e}");
                continue;
            }
            if let Err(e) = self.store.todos.delete_batch(&sources) {
                warn!("failed to soft-delete merged todo sources: {e}");
            }
            PipelineStats::bump(&self.stats.todos_merged);
        }
    }

    async fn save_entries(&self, entries: Vec<ItemEntry>) -> usize {
        if entries.is_empty() {
            return 0;
        }
        let entries = match &self.supervisor {
            Some(supervisor) => {
                supervisor
                    .validate_items(SupervisorCategory::Todo, entries)
                    .await
            }
            None => entries,
        };

        let mut saved = 0usize;
        for entry in entries {
            let todo = TodoItem {
                id: Uuid::new_v4().to_string(),
                title: entry.title,
                description: entry.description,
                keywords: entry.keywords,
                merged_from_ids: Vec::new(),
                completed: false,
                scheduled_date: None,
                scheduled_time: None,
                deleted: false,
                created_at: String::new(),
            };
            match self.store.todos.save(&todo) {
                Ok(()) => {
                    saved += 1;
                    PipelineStats::bump(&self.stats.todos_extracted);
                }
                Err(e) => warn!("failed to save todo item: {e}"),
            }
        }
        saved
    }
}
