//! Action agent: extracts short single-intent user actions from scenes
//! (preferred) or directly from screenshots (legacy fallback), resolves
//! screenshot references, and persists the rows with their thumbnails.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use rewind_core::config::MAX_SCREENSHOTS_PER_ACTION;
use rewind_llm::json::parse_json_response;
use rewind_llm::{ChatBackend, ChatMessage, ChatParams};
use rewind_perception::{RawRecord, RecordKind};
use rewind_store::types::{Action, ThumbnailRecord};
use rewind_store::Store;
use rewind_vision::{to_data_url, ImageCache, ImageOptimizer, ThumbnailStore};

use crate::prompts;
use crate::schema::{ActionEntry, ActionResponse};
use crate::stats::PipelineStats;
use crate::types::{ActionExtractionInput, Scene};

pub struct ActionAgent {
    store: Store,
    llm: Arc<dyn ChatBackend>,
    cache: Arc<ImageCache>,
    thumbs: Arc<ThumbnailStore>,
    optimizer: Arc<Mutex<ImageOptimizer>>,
    stats: Arc<PipelineStats>,
}

impl ActionAgent {
    pub fn new(
        store: Store,
        llm: Arc<dyn ChatBackend>,
        cache: Arc<ImageCache>,
        thumbs: Arc<ThumbnailStore>,
        optimizer: Arc<Mutex<ImageOptimizer>>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            store,
            llm,
            cache,
            thumbs,
            optimizer,
            stats,
        }
    }

    /// Extract and persist actions. Returns the screenshot hashes that are
    /// now referenced by persisted rows, so the caller can purge their
    /// bytes from the sliding window.
    pub async fn extract_and_save(&self, input: ActionExtractionInput<'_>) -> Vec<String> {
        let entries = match &input {
            ActionExtractionInput::FromScenes(scenes) => self.extract_from_scenes(scenes).await,
            ActionExtractionInput::FromScreenshots(records) => {
                self.extract_from_screenshots(records).await
            }
        };
        if entries.is_empty() {
            return Vec::new();
        }

        let mut persisted_hashes = Vec::new();
        for entry in entries {
            // A failure in one action drops that action, never the batch.
            match self.resolve_and_save(&entry, &input) {
                Some(hashes) => persisted_hashes.extend(hashes),
                None => {
                    PipelineStats::bump(&self.stats.actions_filtered);
                }
            }
        }
        persisted_hashes
    }

    async fn extract_from_scenes(&self, scenes: &[Scene]) -> Vec<ActionEntry> {
        if scenes.is_empty() {
            return Vec::new();
        }
        let messages = vec![
            ChatMessage::system(prompts::ACTION_SYSTEM),
            ChatMessage::user(prompts::action_from_scenes_prompt(scenes)),
        ];
        self.call_llm(messages, "action_extraction").await
    }

    /// Legacy image-index path: sends the screenshots themselves.
    async fn extract_from_screenshots(&self, records: &[RawRecord]) -> Vec<ActionEntry> {
        let mut data_urls = Vec::new();
        for record in records.iter().filter(|r| r.kind() == RecordKind::Screenshot) {
            let Some(shot) = record.as_screenshot() else {
                continue;
            };
            let Some(bytes) = shot.bytes.clone().or_else(|| self.cache.get(&shot.hash)) else {
                continue;
            };
            let optimizer = self.optimizer.clone();
            let is_first = data_urls.is_empty();
            let optimized = tokio::task::spawn_blocking(move || {
                optimizer.lock().unwrap().optimize(&bytes, is_first).0
            })
            .await;
            if let Ok(bytes) = optimized {
                data_urls.push(to_data_url(&bytes));
            }
        }
        if data_urls.is_empty() {
            return Vec::new();
        }

        let hint = prompts::input_usage_hint(records);
        let messages = vec![
            ChatMessage::system(prompts::ACTION_IMAGE_SYSTEM),
            ChatMessage::user_with_images(
                format!(
                    "Screenshots in capture order.\n\nInput activity:\n{hint}\n\nExtract the user actions."
                ),
                data_urls,
            ),
        ];
        self.call_llm(messages, "action_extraction_legacy").await
    }

    async fn call_llm(&self, messages: Vec<ChatMessage>, request_type: &str) -> Vec<ActionEntry> {
        let params = ChatParams {
            max_tokens: 2000,
            temperature: 0.3,
        };
        let outcome = match self.llm.chat_completion(&messages, &params, request_type).await {
            Ok(o) => o,
            Err(e) => {
                warn!("action extraction LLM call failed: {e}");
                return Vec::new();
            }
        };
        match parse_json_response::<ActionResponse>(&outcome.content) {
            Some(parsed) => parsed.actions,
            None => {
                warn!("action extraction returned unparseable JSON");
                Vec::new()
            }
        }
    }

    /// Resolve screenshot references, compute the timestamp, write
    /// thumbnails, and persist. None means the action was dropped.
    fn resolve_and_save(
        &self,
        entry: &ActionEntry,
        input: &ActionExtractionInput<'_>,
    ) -> Option<Vec<String>> {
        let (hashes, timestamp) = match input {
            ActionExtractionInput::FromScenes(scenes) => {
                let hashes = resolve_hashes_from_scenes(&entry.scene_index, scenes)?;
                let timestamp = timestamp_from_scenes(&entry.scene_index, scenes);
                (hashes, timestamp)
            }
            ActionExtractionInput::FromScreenshots(records) => {
                let shots: Vec<&RawRecord> = records
                    .iter()
                    .filter(|r| r.kind() == RecordKind::Screenshot)
                    .collect();
                let hashes = resolve_hashes_from_screenshots(&entry.image_index, &shots)?;
                let timestamp = timestamp_from_screenshots(&entry.image_index, &shots);
                (hashes, timestamp)
            }
        };

        // Every persisted hash must have a thumbnail; hashes that can no
        // longer be materialised are dropped, and an action with none left
        // is dropped entirely.
        let hashes = self.persist_thumbnails(hashes);
        if hashes.is_empty() {
            warn!(title = %entry.title, "action dropped: no screenshot could be thumbnailed");
            return None;
        }

        let action = Action {
            id: Uuid::new_v4().to_string(),
            title: entry.title.clone(),
            description: entry.description.clone(),
            keywords: entry.keywords.clone(),
            timestamp: timestamp.to_rfc3339(),
            screenshots: hashes.clone(),
            knowledge_extracted: false,
            extract_knowledge: entry.extract_knowledge,
            deleted: false,
            created_at: String::new(),
        };
        if let Err(e) = self.store.actions.save(&action) {
            warn!(title = %entry.title, "failed to save action: {e}");
            return None;
        }
        PipelineStats::bump(&self.stats.actions_saved);
        debug!(action_id = %action.id, screenshots = hashes.len(), "action saved");
        Some(hashes)
    }

    fn persist_thumbnails(&self, hashes: Vec<String>) -> Vec<String> {
        let mut kept = Vec::with_capacity(hashes.len());
        for hash in hashes {
            match self.store.thumbnails.exists(&hash) {
                Ok(true) => {
                    kept.push(hash);
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(hash = %hash, "thumbnail lookup failed: {e}");
                    continue;
                }
            }
            let Some(bytes) = self.cache.get(&hash) else {
                warn!(hash = %hash, "screenshot bytes gone before thumbnailing");
                continue;
            };
            match self.thumbs.save(&hash, &bytes) {
                Ok(meta) => {
                    let record = ThumbnailRecord {
                        hash: hash.clone(),
                        thumbnail_path: meta.path.display().to_string(),
                        width: meta.width,
                        height: meta.height,
                        bytes: meta.bytes,
                        created_at: String::new(),
                    };
                    if let Err(e) = self.store.thumbnails.save(&record) {
                        warn!(hash = %hash, "thumbnail row save failed: {e}");
                        continue;
                    }
                    kept.push(hash);
                }
                Err(e) => warn!(hash = %hash, "thumbnail write failed: {e}"),
            }
        }
        kept
    }
}

/// At most 6 unique hashes in scene-index order. Any invalid index drops
/// the whole action.
fn resolve_hashes_from_scenes(indices: &[i64], scenes: &[Scene]) -> Option<Vec<String>> {
    if indices.is_empty() {
        warn!("action missing scene_index");
        return None;
    }
    let mut seen = std::collections::HashSet::new();
    let mut hashes = Vec::new();
    for &idx in indices {
        if idx < 0 || idx as usize >= scenes.len() {
            warn!(idx, max = scenes.len(), "invalid scene_index, action dropped");
            return None;
        }
        let hash = &scenes[idx as usize].screenshot_hash;
        if !hash.is_empty() && seen.insert(hash.clone()) {
            hashes.push(hash.clone());
            if hashes.len() >= MAX_SCREENSHOTS_PER_ACTION {
                break;
            }
        }
    }
    (!hashes.is_empty()).then_some(hashes)
}

fn resolve_hashes_from_screenshots(
    indices: &[i64],
    shots: &[&RawRecord],
) -> Option<Vec<String>> {
    if indices.is_empty() {
        warn!("action missing image_index");
        return None;
    }
    let mut seen = std::collections::HashSet::new();
    let mut hashes = Vec::new();
    for &idx in indices {
        if idx < 0 || idx as usize >= shots.len() {
            warn!(idx, max = shots.len(), "invalid image_index, action dropped");
            return None;
        }
        if let Some(shot) = shots[idx as usize].as_screenshot() {
            if !shot.hash.is_empty() && seen.insert(shot.hash.clone()) {
                hashes.push(shot.hash.clone());
                if hashes.len() >= MAX_SCREENSHOTS_PER_ACTION {
                    break;
                }
            }
        }
    }
    (!hashes.is_empty()).then_some(hashes)
}

/// Earliest referenced scene timestamp; falls back to the earliest scene
/// overall, then to now.
fn timestamp_from_scenes(indices: &[i64], scenes: &[Scene]) -> DateTime<Utc> {
    let referenced: Vec<DateTime<Utc>> = indices
        .iter()
        .filter(|&&i| i >= 0 && (i as usize) < scenes.len())
        .map(|&i| scenes[i as usize].timestamp)
        .collect();
    if let Some(min) = referenced.into_iter().min() {
        return min;
    }
    scenes
        .iter()
        .map(|s| s.timestamp)
        .min()
        .unwrap_or_else(Utc::now)
}

fn timestamp_from_screenshots(indices: &[i64], shots: &[&RawRecord]) -> DateTime<Utc> {
    let referenced: Vec<DateTime<Utc>> = indices
        .iter()
        .filter(|&&i| i >= 0 && (i as usize) < shots.len())
        .map(|&i| shots[i as usize].timestamp)
        .collect();
    if let Some(min) = referenced.into_iter().min() {
        return min;
    }
    shots
        .iter()
        .map(|r| r.timestamp)
        .min()
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scene(i: usize, hash: &str, minute: u32) -> Scene {
        Scene {
            screenshot_index: i,
            screenshot_hash: hash.to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 10, minute, 0).unwrap(),
            visual_summary: String::new(),
            detected_text: String::new(),
            ui_elements: String::new(),
            application_context: String::new(),
            inferred_activity: String::new(),
            focus_areas: String::new(),
        }
    }

    #[test]
    fn hashes_resolve_unique_in_order() {
        let scenes = vec![scene(0, "h0", 0), scene(1, "h1", 1), scene(2, "h0", 2)];
        let hashes = resolve_hashes_from_scenes(&[2, 0, 1], &scenes).unwrap();
        assert_eq!(hashes, vec!["h0".to_string(), "h1".to_string()]);
    }

    #[test]
    fn out_of_range_index_drops_action() {
        let scenes = vec![scene(0, "h0", 0)];
        assert!(resolve_hashes_from_scenes(&[0, 5], &scenes).is_none());
        assert!(resolve_hashes_from_scenes(&[-1], &scenes).is_none());
        assert!(resolve_hashes_from_scenes(&[], &scenes).is_none());
    }

    #[test]
    fn hash_cap_is_six() {
        let scenes: Vec<Scene> = (0..10).map(|i| scene(i, &format!("h{i}"), i as u32)).collect();
        let indices: Vec<i64> = (0..10).collect();
        let hashes = resolve_hashes_from_scenes(&indices, &scenes).unwrap();
        assert_eq!(hashes.len(), 6);
    }

    #[test]
    fn timestamp_is_earliest_referenced_scene() {
        let scenes = vec![scene(0, "h0", 5), scene(1, "h1", 2), scene(2, "h2", 9)];
        let ts = timestamp_from_scenes(&[2, 1], &scenes);
        assert_eq!(ts, scenes[1].timestamp);
    }

    #[test]
    fn timestamp_falls_back_to_earliest_scene() {
        let scenes = vec![scene(0, "h0", 5), scene(1, "h1", 2)];
        let ts = timestamp_from_scenes(&[99], &scenes);
        assert_eq!(ts, scenes[1].timestamp);
    }
}
