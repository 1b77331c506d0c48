//! Knowledge agent: extracts reusable knowledge from scenes and actions,
//! and periodically merges overlapping items into combined rows.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use rewind_llm::json::parse_json_response;
use rewind_llm::{ChatBackend, ChatMessage, ChatParams};
use rewind_store::types::{Action, KnowledgeItem};
use rewind_store::Store;

use crate::prompts;
use crate::schema::{ItemEntry, KnowledgeResponse, MergeResponse};
use crate::stats::PipelineStats;
use crate::supervisor::{Supervisor, SupervisorCategory};
use crate::types::Scene;

pub struct KnowledgeAgent {
    store: Store,
    llm: Arc<dyn ChatBackend>,
    supervisor: Option<Arc<Supervisor>>,
    stats: Arc<PipelineStats>,
}

impl KnowledgeAgent {
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

    /// Extract knowledge items from the tick's scenes and persist them.
    pub async fn extract_from_scenes(&self, scenes: &[Scene]) -> usize {
        if scenes.is_empty() {
            return 0;
        }
        let prompt = format!(
            "Scene descriptions of the user's recent screen activity:\n{}\n\nExtract reusable knowledge.",
            scenes_digest(scenes)
        );
        let entries = self.call_llm(prompt, "knowledge_extraction").await;
        self.save_entries(entries, None).await
    }

    /// Extract knowledge from one action flagged `extract_knowledge`.
    pub async fn extract_from_action(&self, action: &Action) -> usize {
        let prompt = format!(
            "A recorded user action:\ntitle: {}\ndescription: {}\nkeywords: {}\n\nExtract reusable knowledge.",
            action.title,
            action.description,
            action.keywords.join(", ")
        );
        let entries = self.call_llm(prompt, "knowledge_catchup").await;
        self.save_entries(entries, Some(action.id.clone())).await
    }

    /// Catch-up pass over actions whose knowledge extraction was requested
    /// but has not run yet. Bounded batch per tick.
    pub async fn catchup_once(&self, batch_size: usize) {
        let pending = match self.store.actions.get_pending_knowledge_extraction(batch_size) {
            Ok(p) => p,
            Err(e) => {
                warn!("failed to load pending knowledge actions: {e}");
                PipelineStats::bump(&self.stats.stage_failures);
                return;
            }
        };
        if pending.is_empty() {
            return;
        }
        debug!(count = pending.len(), "knowledge catch-up running");
        let mut processed = Vec::new();
        for action in &pending {
            self.extract_from_action(action).await;
            // Extraction that found nothing still counts as processed, so
            // the same action is not re-sent every catch-up tick.
            processed.push(action.id.clone());
        }
        if let Err(e) = self.store.actions.mark_knowledge_extracted(&processed) {
            warn!("failed to mark actions knowledge-extracted: {e}");
        }
    }

    /// Merge related knowledge rows into combined rows, soft-deleting the
    /// sources. Skipped when there is nothing meaningful to merge.
    pub async fn merge_once(&self) {
        let unmerged = match self.store.knowledge.get_unmerged() {
            Ok(u) => u,
            Err(e) => {
                warn!("failed to load unmerged knowledge: {e}");
                PipelineStats::bump(&self.stats.stage_failures);
                return;
            }
        };
        if unmerged.len() < 2 {
            debug!("insufficient knowledge rows, skipping merge");
            return;
        }

        let items: Vec<(String, String, String)> = unmerged
            .iter()
            .map(|k| (k.id.clone(), k.title.clone(), k.description.clone()))
            .collect();
        let messages = vec![
            ChatMessage::system(prompts::MERGE_SYSTEM),
            ChatMessage::user(prompts::merge_items_prompt("knowledge", &items)),
        ];
        let params = ChatParams {
            max_tokens: 2000,
            temperature: 0.3,
        };
        let outcome = match self
            .llm
            .chat_completion(&messages, &params, "knowledge_merge")
            .await
        {
            Ok(o) => o,
            Err(e) => {
                warn!("knowledge merge LLM call failed: {e}");
                PipelineStats::bump(&self.stats.stage_failures);
                return;
            }
        };
        let parsed: MergeResponse = match parse_json_response(&outcome.content) {
            Some(p) => p,
            None => {
                warn!("knowledge merge returned unparseable JSON");
                return;
            }
        };

        let known_ids: std::collections::HashSet<&str> =
            unmerged.iter().map(|k| k.id.as_str()).collect();
        for merged in parsed.merged {
            let sources: Vec<String> = merged
                .merged_from_ids
                .iter()
                .filter(|id| known_ids.contains(id.as_str()))
                .cloned()
                .collect();
            if sources.len() < 2 {
                warn!(title = %merged.title, "merged knowledge group too small, dropped");
                continue;
            }
            let item = KnowledgeItem {
                id: Uuid::new_v4().to_string(),
                title: merged.title,
                description: merged.description,
                keywords: merged.keywords,
                source_action_id: None,
                merged_from_ids: sources.clone(),
                deleted: false,
                created_at: String::new(),
            };
            if let Err(e) = self.store.knowledge.save_combined(&item) {
                warn!("failed to save combined knowledge: {e}");
                continue;
            }
            if let Err(e) = self.store.knowledge.delete_batch(&sources) {
                warn!("failed to soft-delete merged knowledge sources: {e}");
            }
            PipelineStats::bump(&self.stats.knowledge_merged);
        }
    }

    async fn call_llm(&self, prompt: String, request_type: &str) -> Vec<ItemEntry> {
        let messages = vec![
            ChatMessage::system(prompts::KNOWLEDGE_SYSTEM),
            ChatMessage::user(prompt),
        ];
        let params = ChatParams {
            max_tokens: 1500,
            temperature: 0.3,
        };
        let outcome = match self.llm.chat_completion(&messages, &params, request_type).await {
            Ok(o) => o,
            Err(e) => {
                warn!("knowledge extraction LLM call failed: {e}");
                return Vec::new();
            }
        };
        match parse_json_response::<KnowledgeResponse>(&outcome.content) {
            Some(parsed) => parsed.knowledge,
            None => {
                warn!("knowledge extraction returned unparseable JSON");
                Vec::new()
            }
        }
    }

    async fn save_entries(&self, entries: Vec<ItemEntry>, source_action_id: Option<String>) -> usize {
        if entries.is_empty() {
            return 0;
        }
        let entries = match &self.supervisor {
            Some(supervisor) => {
                supervisor
                    .validate_items(SupervisorCategory::Knowledge, entries)
                    .await
            }
            None => entries,
        };

        let mut saved = 0usize;
        for entry in entries {
            let item = KnowledgeItem {
                id: Uuid::new_v4().to_string(),
                title: entry.title,
                description: entry.description,
                keywords: entry.keywords,
                source_action_id: source_action_id.clone(),
                merged_from_ids: Vec::new(),
                deleted: false,
                created_at: String::new(),
            };
            match self.store.knowledge.save(&item) {
                Ok(()) => {
                    saved += 1;
                    PipelineStats::bump(&self.stats.knowledge_extracted);
                }
                Err(e) => warn!("failed to save knowledge item: {e}"),
            }
        }
        saved
    }
}

/// Compact scene rendering for the text-only extraction prompts.
pub(crate) fn scenes_digest(scenes: &[Scene]) -> String {
    let rendered: Vec<serde_json::Value> = scenes
        .iter()
        .map(|s| {
            serde_json::json!({
                "timestamp": s.timestamp.to_rfc3339(),
                "visual_summary": s.visual_summary,
                "detected_text": s.detected_text,
                "application_context": s.application_context,
                "inferred_activity": s.inferred_activity,
            })
        })
        .collect();
    serde_json::to_string_pretty(&rendered).unwrap_or_default()
}
