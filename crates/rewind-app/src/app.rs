//! Process-wide application state. Owns the store, the LLM client, the
//! chat service and (while running) the pipeline coordinator. All command
//! handlers operate on this; there are no module-level singletons.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, watch};
use tracing::info;

use rewind_agents::{AgentContext, Coordinator, PipelineStats};
use rewind_chat::ChatService;
use rewind_core::emitter::Emitter;
use rewind_core::{paths, RewindConfig, RewindError};
use rewind_llm::LlmClient;
use rewind_perception::{
    pump_records, CaptureLoop, RawRecord, RecordSource, ScreenGrabber, SlidingWindow,
};
use rewind_store::Store;
use rewind_vision::{ImageCache, ThumbnailStore};

struct Services {
    store: Store,
    llm: Arc<LlmClient>,
    chat: Arc<ChatService>,
    thumbs: Arc<ThumbnailStore>,
    db_path: PathBuf,
}

pub struct App {
    pub config: RewindConfig,
    pub emitter: Arc<dyn Emitter>,
    pub window: Arc<SlidingWindow>,
    pub cache: Arc<ImageCache>,
    pub stats: Arc<PipelineStats>,
    services: RwLock<Services>,
    pipeline: tokio::sync::Mutex<Option<Arc<Coordinator>>>,
    capture_shutdown: watch::Sender<bool>,
}

impl App {
    /// Open the store (at the configured or default path) and build the
    /// shared services. Fatal-init errors surface to the caller; the
    /// process entry point decides what to do with them.
    pub fn new(config: RewindConfig, emitter: Arc<dyn Emitter>) -> Result<Self, RewindError> {
        let db_path = if config.database.path.trim().is_empty() {
            paths::default_db_path()
        } else {
            PathBuf::from(config.database.path.trim())
        };
        let services = Self::build_services(&config, &db_path, emitter.clone())?;

        Ok(Self {
            window: Arc::new(SlidingWindow::new()),
            cache: Arc::new(ImageCache::new(config.compression.image_cache_capacity)),
            stats: Arc::new(PipelineStats::default()),
            config,
            emitter,
            services: RwLock::new(services),
            pipeline: tokio::sync::Mutex::new(None),
            capture_shutdown: watch::channel(false).0,
        })
    }

    fn build_services(
        config: &RewindConfig,
        db_path: &Path,
        emitter: Arc<dyn Emitter>,
    ) -> Result<Services, RewindError> {
        std::fs::create_dir_all(paths::screenshots_dir())?;
        std::fs::create_dir_all(paths::logs_dir())?;

        let store = Store::open(db_path).map_err(|e| RewindError::Database(e.to_string()))?;
        let llm = Arc::new(LlmClient::new(store.clone(), config.llm.clone()));
        let chat = Arc::new(ChatService::new(store.clone(), llm.clone(), emitter));
        let thumbs = Arc::new(ThumbnailStore::new(paths::screenshots_dir()));
        Ok(Services {
            store,
            llm,
            chat,
            thumbs,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn store(&self) -> Store {
        self.services.read().unwrap().store.clone()
    }

    pub fn llm(&self) -> Arc<LlmClient> {
        self.services.read().unwrap().llm.clone()
    }

    pub fn chat(&self) -> Arc<ChatService> {
        self.services.read().unwrap().chat.clone()
    }

    pub fn thumbs(&self) -> Arc<ThumbnailStore> {
        self.services.read().unwrap().thumbs.clone()
    }

    pub fn db_path(&self) -> PathBuf {
        self.services.read().unwrap().db_path.clone()
    }

    /// Start the background pipeline. Refused without an active model
    /// (`requires_model` state); commands keep working either way.
    pub async fn start_system(&self) -> Result<(), RewindError> {
        let mut pipeline = self.pipeline.lock().await;
        if pipeline.is_some() {
            info!("pipeline already running");
            return Ok(());
        }
        let services = self.services.read().unwrap();
        let coordinator = Arc::new(Coordinator::new(AgentContext {
            store: services.store.clone(),
            llm: services.llm.clone(),
            window: self.window.clone(),
            cache: self.cache.clone(),
            thumbs: services.thumbs.clone(),
            emitter: self.emitter.clone(),
            config: self.config.clone(),
            stats: self.stats.clone(),
        }));
        drop(services);

        coordinator.start()?;
        *pipeline = Some(coordinator);
        Ok(())
    }

    /// Stop the pipeline and the capture tasks, draining agent timers.
    /// Idempotent.
    pub async fn stop_system(&self) {
        let _ = self.capture_shutdown.send(true);
        let coordinator = self.pipeline.lock().await.take();
        if let Some(coordinator) = coordinator {
            coordinator.stop().await;
        }
    }

    pub async fn is_pipeline_running(&self) -> bool {
        self.pipeline.lock().await.is_some()
    }

    pub async fn coordinator(&self) -> Option<Arc<Coordinator>> {
        self.pipeline.lock().await.clone()
    }

    /// Run the screenshot capture loop against a platform framebuffer
    /// implementation. Frames pass the pHash gate before buffering.
    pub fn spawn_capture(&self, grabber: Arc<dyn ScreenGrabber>) -> tokio::task::JoinHandle<()> {
        let capture = CaptureLoop::new(
            grabber,
            self.window.clone(),
            self.cache.clone(),
            self.config.capture.interval_ms,
            self.config.capture.phash_threshold,
        );
        let shutdown = self.capture_shutdown.subscribe();
        tokio::spawn(async move {
            let stats = capture.run(shutdown).await;
            info!(
                admitted = stats.frames_admitted,
                deduped = stats.frames_deduped,
                "capture loop exited"
            );
        })
    }

    /// Start the given platform input sources and pump their records into
    /// the sliding window. Sources run on their own threads and hand
    /// records over the returned channel.
    pub fn spawn_sources(
        &self,
        sources: &[Arc<dyn RecordSource>],
    ) -> Result<tokio::task::JoinHandle<()>, RewindError> {
        let (tx, rx) = mpsc::channel::<RawRecord>(1024);
        for source in sources {
            source
                .start(tx.clone())
                .map_err(|e| RewindError::Internal(e.to_string()))?;
            info!(source = source.name(), "record source started");
        }
        let shutdown = self.capture_shutdown.subscribe();
        Ok(tokio::spawn(pump_records(rx, self.window.clone(), shutdown)))
    }

    /// Rebind the store to a new database file. The pipeline must be
    /// stopped first; the chat service and LLM client follow the store.
    pub async fn set_database_path(&self, new_path: &str) -> Result<(), RewindError> {
        if self.is_pipeline_running().await {
            return Err(RewindError::Config(
                "stop the system before changing the database path".to_string(),
            ));
        }
        let new_path = PathBuf::from(new_path.trim());
        {
            let services = self.services.read().unwrap();
            if services.db_path == new_path {
                return Ok(());
            }
        }
        let rebuilt = Self::build_services(&self.config, &new_path, self.emitter.clone())?;
        *self.services.write().unwrap() = rebuilt;
        info!(path = %new_path.display(), "database rebound");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_core::emitter::NullEmitter;

    fn test_config(dir: &std::path::Path) -> RewindConfig {
        let mut config = RewindConfig::default();
        config.database.path = dir.join("test.db").display().to_string();
        config
    }

    #[tokio::test]
    async fn start_without_model_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::new(test_config(dir.path()), Arc::new(NullEmitter)).unwrap();
        let err = app.start_system().await.unwrap_err();
        assert!(matches!(err, RewindError::NoActiveModel));
        assert!(!app.is_pipeline_running().await);
    }

    #[tokio::test]
    async fn rebind_switches_database_path() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::new(test_config(dir.path()), Arc::new(NullEmitter)).unwrap();

        // Queries keep working without a running pipeline.
        assert_eq!(app.store().models.count().unwrap(), 0);

        let other = dir.path().join("other.db").display().to_string();
        app.set_database_path(&other).await.unwrap();
        assert_eq!(app.db_path().display().to_string(), other);
    }
}
