use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Pipeline constants shared across crates
pub const WINDOW_SECONDS: i64 = 20; // sliding-window tail of raw records
pub const WINDOW_SWEEP_SECONDS: f64 = 5.0; // minimum gap between expiry sweeps
pub const MAX_SCREENSHOTS_PER_TICK: usize = 20; // per multimodal LLM call
pub const MAX_SCREENSHOTS_PER_ACTION: usize = 6;
pub const TOKENS_PER_KB: f64 = 85.0; // JPEG bytes → LLM token estimate
pub const THUMBNAIL_MAX_DIM: u32 = 600;
pub const THUMBNAIL_JPEG_QUALITY: u8 = 70;
pub const CHAT_HISTORY_LIMIT: usize = 20;
pub const CHAT_TITLE_MAX_CHARS: usize = 28;

/// Top-level config (rewind.toml + REWIND_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RewindConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Empty string means "use the default data dir".
    #[serde(default)]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Screenshot capture interval in milliseconds.
    #[serde(default = "default_capture_interval_ms")]
    pub interval_ms: u64,
    /// Frames with a pHash distance below this never enter the buffer.
    #[serde(default = "default_phash_threshold")]
    pub phash_threshold: u32,
    /// Which monitors to capture. Empty means all.
    #[serde(default)]
    pub monitors: Vec<u32>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_capture_interval_ms(),
            phash_threshold: default_phash_threshold(),
            monitors: Vec::new(),
        }
    }
}

/// Timer intervals for the periodic agents, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_process_interval")]
    pub process_interval_secs: u64,
    #[serde(default = "default_event_interval")]
    pub event_interval_secs: u64,
    #[serde(default = "default_event_window_hours")]
    pub event_window_hours: i64,
    #[serde(default = "default_session_interval")]
    pub session_interval_secs: u64,
    #[serde(default = "default_min_event_actions")]
    pub min_event_actions: usize,
    #[serde(default = "default_min_event_duration")]
    pub min_event_duration_seconds: i64,
    #[serde(default = "default_merge_interval")]
    pub knowledge_merge_interval_secs: u64,
    #[serde(default = "default_merge_interval")]
    pub todo_merge_interval_secs: u64,
    #[serde(default = "default_catchup_interval")]
    pub knowledge_catchup_interval_secs: u64,
    #[serde(default = "default_catchup_batch")]
    pub knowledge_catchup_batch: usize,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    /// Run supervisor validation over knowledge/todo/diary output.
    #[serde(default = "bool_true")]
    pub enable_supervisor: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            process_interval_secs: default_process_interval(),
            event_interval_secs: default_event_interval(),
            event_window_hours: default_event_window_hours(),
            session_interval_secs: default_session_interval(),
            min_event_actions: default_min_event_actions(),
            min_event_duration_seconds: default_min_event_duration(),
            knowledge_merge_interval_secs: default_merge_interval(),
            todo_merge_interval_secs: default_merge_interval(),
            knowledge_catchup_interval_secs: default_catchup_interval(),
            knowledge_catchup_batch: default_catchup_batch(),
            cleanup_interval_secs: default_cleanup_interval(),
            enable_supervisor: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// One of "ultra", "aggressive", "balanced", "quality".
    #[serde(default = "default_compression_level")]
    pub level: String,
    #[serde(default)]
    pub enable_region_cropping: bool,
    /// Per-pixel mean RGB difference (0-255) that counts as "changed".
    #[serde(default = "default_crop_threshold")]
    pub crop_threshold: u8,
    /// LRU capacity of the in-memory hash→bytes image cache.
    #[serde(default = "default_image_cache_capacity")]
    pub image_cache_capacity: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            level: default_compression_level(),
            enable_region_cropping: false,
            crop_threshold: default_crop_threshold(),
            image_cache_capacity: default_image_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Request timeout in seconds (connect + read).
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    /// Base backoff in milliseconds, multiplied by the attempt number.
    #[serde(default = "default_llm_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
            retry_backoff_ms: default_llm_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Soft-deleted rows older than this are hard-deleted by the cleanup agent.
    #[serde(default = "default_retention_days")]
    pub days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
        }
    }
}

fn default_capture_interval_ms() -> u64 {
    200
}
fn default_phash_threshold() -> u32 {
    6
}
fn default_process_interval() -> u64 {
    20
}
fn default_event_interval() -> u64 {
    600
}
fn default_event_window_hours() -> i64 {
    1
}
fn default_session_interval() -> u64 {
    1800
}
fn default_min_event_actions() -> usize {
    2
}
fn default_min_event_duration() -> i64 {
    120
}
fn default_merge_interval() -> u64 {
    1200
}
fn default_catchup_interval() -> u64 {
    300
}
fn default_catchup_batch() -> usize {
    20
}
fn default_cleanup_interval() -> u64 {
    86_400
}
fn default_compression_level() -> String {
    "aggressive".to_string()
}
fn default_crop_threshold() -> u8 {
    30
}
fn default_image_cache_capacity() -> usize {
    500
}
fn default_llm_timeout() -> u64 {
    30
}
fn default_llm_retries() -> u32 {
    2
}
fn default_llm_backoff_ms() -> u64 {
    1500
}
fn default_retention_days() -> i64 {
    30
}
fn bool_true() -> bool {
    true
}

impl RewindConfig {
    /// Load config from a TOML file with REWIND_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. <config_dir>/rewind/rewind.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(|| crate::paths::default_config_file().display().to_string());

        let config: RewindConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("REWIND_").split("_"))
            .extract()
            .map_err(|e| crate::error::RewindError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_cadence() {
        let cfg = RewindConfig::default();
        assert_eq!(cfg.capture.interval_ms, 200);
        assert_eq!(cfg.pipeline.event_interval_secs, 600);
        assert_eq!(cfg.pipeline.session_interval_secs, 1800);
        assert_eq!(cfg.pipeline.knowledge_merge_interval_secs, 1200);
        assert_eq!(cfg.pipeline.knowledge_catchup_interval_secs, 300);
        assert_eq!(cfg.retention.days, 30);
        assert_eq!(cfg.compression.level, "aggressive");
        assert!(cfg.pipeline.enable_supervisor);
    }

    #[test]
    fn load_from_toml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rewind.toml");
        std::fs::write(
            &path,
            "[pipeline]\nevent_interval_secs = 60\n\n[compression]\nlevel = \"balanced\"\n",
        )
        .unwrap();

        let cfg = RewindConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(cfg.pipeline.event_interval_secs, 60);
        assert_eq!(cfg.compression.level, "balanced");
        // Untouched sections keep defaults
        assert_eq!(cfg.pipeline.session_interval_secs, 1800);
    }
}
