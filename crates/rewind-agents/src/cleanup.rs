//! Cleanup agent: retention hard-delete of soft-deleted rows plus
//! garbage collection of thumbnails no live action references.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use rewind_store::Store;
use rewind_vision::ThumbnailStore;

use crate::stats::PipelineStats;

pub struct CleanupAgent {
    store: Store,
    thumbs: Arc<ThumbnailStore>,
    stats: Arc<PipelineStats>,
    retention_days: i64,
}

impl CleanupAgent {
    pub fn new(
        store: Store,
        thumbs: Arc<ThumbnailStore>,
        stats: Arc<PipelineStats>,
        retention_days: i64,
    ) -> Self {
        Self {
            store,
            thumbs,
            stats,
            retention_days,
        }
    }

    pub async fn run_once(&self) {
        let cutoff = (Utc::now() - Duration::days(self.retention_days)).to_rfc3339();
        match self.store.purge_deleted_older_than(&cutoff) {
            Ok(counts) => {
                let total: usize = counts.values().sum();
                if total > 0 {
                    info!(total, ?counts, "retention cleanup removed rows");
                }
            }
            Err(e) => {
                warn!("retention cleanup failed: {e}");
                PipelineStats::bump(&self.stats.stage_failures);
                return;
            }
        }

        self.gc_orphan_thumbnails();
        PipelineStats::bump(&self.stats.cleanup_runs);
    }

    /// Thumbnails are derived data: once no live action references a hash,
    /// both the file and its metadata row go.
    fn gc_orphan_thumbnails(&self) {
        let live = match self.store.actions.live_screenshot_hashes() {
            Ok(l) => l,
            Err(e) => {
                warn!("thumbnail GC could not load live hashes: {e}");
                return;
            }
        };
        let all = match self.store.thumbnails.all() {
            Ok(a) => a,
            Err(e) => {
                warn!("thumbnail GC could not list thumbnails: {e}");
                return;
            }
        };

        let mut removed = 0u64;
        for record in all {
            if live.contains(&record.hash) {
                continue;
            }
            if let Err(e) = self.thumbs.remove(&record.hash) {
                warn!(hash = %record.hash, "thumbnail file removal failed: {e}");
                continue;
            }
            if let Err(e) = self.store.thumbnails.remove(&record.hash) {
                warn!(hash = %record.hash, "thumbnail row removal failed: {e}");
                continue;
            }
            removed += 1;
        }
        if removed > 0 {
            info!(removed, "orphaned thumbnails collected");
            PipelineStats::add(&self.stats.thumbnails_gc, removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_store::types::{Action, ThumbnailRecord};

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(64, 64, image::Rgb([9, 9, 9]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn orphaned_thumbnails_are_collected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let thumbs = Arc::new(ThumbnailStore::new(dir.path()));
        let stats = Arc::new(PipelineStats::default());

        // One thumbnail referenced by a live action, one orphan.
        for hash in ["live-hash", "orphan-hash"] {
            let meta = thumbs.save(hash, &png_bytes()).unwrap();
            store
                .thumbnails
                .save(&ThumbnailRecord {
                    hash: hash.to_string(),
                    thumbnail_path: meta.path.display().to_string(),
                    width: meta.width,
                    height: meta.height,
                    bytes: meta.bytes,
                    created_at: String::new(),
                })
                .unwrap();
        }
        store
            .actions
            .save(&Action {
                id: "a1".to_string(),
                title: "t".to_string(),
                description: String::new(),
                keywords: vec![],
                timestamp: "2025-06-01T10:00:00+00:00".to_string(),
                screenshots: vec!["live-hash".to_string()],
                knowledge_extracted: false,
                extract_knowledge: false,
                deleted: false,
                created_at: String::new(),
            })
            .unwrap();

        let agent = CleanupAgent::new(store.clone(), thumbs.clone(), stats.clone(), 30);
        agent.run_once().await;

        assert!(thumbs.exists("live-hash"));
        assert!(!thumbs.exists("orphan-hash"));
        assert!(store.thumbnails.get("live-hash").unwrap().is_some());
        assert!(store.thumbnails.get("orphan-hash").unwrap().is_none());
        assert_eq!(stats.snapshot().thumbnails_gc, 1);
    }
}
