//! Raw→Scene agent. Pays the multimodal LLM cost exactly once per tick:
//! every downstream agent works from the scene text it produces.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use rewind_core::config::MAX_SCREENSHOTS_PER_TICK;
use rewind_llm::json::parse_json_response;
use rewind_llm::{ChatBackend, ChatMessage, ChatParams};
use rewind_perception::{RawRecord, RecordKind};
use rewind_vision::{to_data_url, ImageCache, ImageOptimizer};

use crate::prompts;
use crate::schema::SceneResponse;
use crate::types::Scene;

pub struct SceneAgent {
    llm: Arc<dyn ChatBackend>,
    cache: Arc<ImageCache>,
    optimizer: Arc<Mutex<ImageOptimizer>>,
    max_screenshots: usize,
}

impl SceneAgent {
    pub fn new(
        llm: Arc<dyn ChatBackend>,
        cache: Arc<ImageCache>,
        optimizer: Arc<Mutex<ImageOptimizer>>,
    ) -> Self {
        Self {
            llm,
            cache,
            optimizer,
            max_screenshots: MAX_SCREENSHOTS_PER_TICK,
        }
    }

    /// Turn a window batch into scene descriptions. Returns an empty list
    /// on any failure; scene extraction never aborts the tick.
    pub async fn extract_scenes(&self, records: &[RawRecord]) -> Vec<Scene> {
        let screenshots: Vec<&RawRecord> = records
            .iter()
            .filter(|r| r.kind() == RecordKind::Screenshot)
            .collect();
        if screenshots.is_empty() {
            return Vec::new();
        }

        // Newest-first truncation: when the batch exceeds the per-call cap,
        // keep the newest frames (still in chronological order).
        let screenshots: Vec<&RawRecord> = if screenshots.len() > self.max_screenshots {
            warn!(
                total = screenshots.len(),
                cap = self.max_screenshots,
                "screenshot batch truncated"
            );
            screenshots[screenshots.len() - self.max_screenshots..].to_vec()
        } else {
            screenshots
        };

        // Gather bytes from the record or the shared cache.
        let mut batch: Vec<(String, chrono::DateTime<chrono::Utc>, Vec<u8>)> = Vec::new();
        for record in &screenshots {
            let shot = match record.as_screenshot() {
                Some(s) => s,
                None => continue,
            };
            let bytes = shot
                .bytes
                .clone()
                .or_else(|| self.cache.get(&shot.hash));
            match bytes {
                Some(bytes) => batch.push((shot.hash.clone(), record.timestamp, bytes)),
                None => warn!(hash = %shot.hash, "screenshot bytes unavailable, skipping frame"),
            }
        }
        if batch.is_empty() {
            return Vec::new();
        }

        // Optimization is pixel math: run the batch on the blocking pool.
        let optimizer = self.optimizer.clone();
        let optimized = tokio::task::spawn_blocking(move || {
            let mut optimizer = optimizer.lock().unwrap();
            batch
                .into_iter()
                .enumerate()
                .map(|(i, (hash, ts, bytes))| {
                    let (out, _) = optimizer.optimize(&bytes, i == 0);
                    (hash, ts, out)
                })
                .collect::<Vec<_>>()
        })
        .await;
        let optimized = match optimized {
            Ok(o) => o,
            Err(e) => {
                warn!("image optimization task failed: {e}");
                return Vec::new();
            }
        };

        let hint = prompts::input_usage_hint(records);
        let data_urls: Vec<String> = optimized
            .iter()
            .map(|(_, _, bytes)| to_data_url(bytes))
            .collect();
        let messages = vec![
            ChatMessage::system(prompts::SCENE_SYSTEM),
            ChatMessage::user_with_images(
                prompts::scene_user_prompt(&hint, data_urls.len()),
                data_urls,
            ),
        ];
        let params = ChatParams {
            max_tokens: 3000,
            temperature: 0.3,
        };

        let outcome = match self
            .llm
            .chat_completion(&messages, &params, "scene_extraction")
            .await
        {
            Ok(o) => o,
            Err(e) => {
                warn!("scene extraction LLM call failed: {e}");
                return Vec::new();
            }
        };

        let parsed: SceneResponse = match parse_json_response(&outcome.content) {
            Some(p) => p,
            None => {
                warn!(
                    reply = %outcome.content.chars().take(200).collect::<String>(),
                    "scene extraction returned unparseable JSON"
                );
                return Vec::new();
            }
        };

        // Validate indices against the optimized batch, enrich with the
        // hash and capture timestamp.
        let mut scenes = Vec::new();
        for entry in parsed.scenes {
            let idx = match entry.screenshot_index {
                Some(i) if i >= 0 && (i as usize) < optimized.len() => i as usize,
                other => {
                    warn!(index = ?other, max = optimized.len(), "invalid screenshot_index, scene dropped");
                    continue;
                }
            };
            let (hash, timestamp, _) = &optimized[idx];
            scenes.push(Scene {
                screenshot_index: idx,
                screenshot_hash: hash.clone(),
                timestamp: *timestamp,
                visual_summary: entry.visual_summary,
                detected_text: entry.detected_text,
                ui_elements: entry.ui_elements,
                application_context: entry.application_context,
                inferred_activity: entry.inferred_activity,
                focus_areas: entry.focus_areas,
            });
        }

        debug!(scenes = scenes.len(), "scenes extracted");
        scenes
    }
}
