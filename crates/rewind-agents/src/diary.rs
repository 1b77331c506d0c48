//! Diary agent: one LLM-written entry per calendar date, built from that
//! date's activities and checked by the diary supervisor.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use rewind_llm::{ChatBackend, ChatMessage, ChatParams};
use rewind_store::types::Diary;
use rewind_store::Store;

use crate::prompts;
use crate::stats::PipelineStats;
use crate::supervisor::{Supervisor, SupervisorCategory};

pub struct DiaryAgent {
    store: Store,
    llm: Arc<dyn ChatBackend>,
    supervisor: Option<Arc<Supervisor>>,
    stats: Arc<PipelineStats>,
}

impl DiaryAgent {
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

    /// Generate (or regenerate) the diary for a date (YYYY-MM-DD).
    /// Returns None when the date has no activities to write about.
    pub async fn generate(&self, date: &str) -> Result<Option<Diary>, rewind_core::RewindError> {
        let activities = self
            .store
            .activities
            .get_by_date(date)
            .map_err(|e| rewind_core::RewindError::Database(e.to_string()))?;
        if activities.is_empty() {
            debug!(date, "no activities for diary");
            return Ok(None);
        }

        let messages = vec![
            ChatMessage::system(prompts::DIARY_SYSTEM),
            ChatMessage::user(prompts::diary_prompt(date, &activities)),
        ];
        let params = ChatParams {
            max_tokens: 1500,
            temperature: 0.6,
        };
        let outcome = self
            .llm
            .chat_completion(&messages, &params, "diary_generation")
            .await
            .map_err(|e| rewind_core::RewindError::LlmProvider(e.to_string()))?;

        let mut content = outcome.content.trim().to_string();
        if content.is_empty() {
            warn!(date, "diary generation produced empty content");
            return Ok(None);
        }

        if let Some(supervisor) = &self.supervisor {
            let result = supervisor
                .validate(SupervisorCategory::Diary, serde_json::json!(content))
                .await;
            if let Some(revised) = result.content.as_str() {
                if !revised.trim().is_empty() {
                    content = revised.trim().to_string();
                }
            }
        }

        let diary = Diary {
            id: Uuid::new_v4().to_string(),
            date: date.to_string(),
            content,
            source_activity_ids: activities.iter().map(|a| a.id.clone()).collect(),
            deleted: false,
            created_at: String::new(),
        };
        self.store
            .diaries
            .save(&diary)
            .map_err(|e| rewind_core::RewindError::Database(e.to_string()))?;
        PipelineStats::bump(&self.stats.diaries_generated);
        Ok(Some(diary))
    }
}
