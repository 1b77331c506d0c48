//! The coordinator owns every periodic agent and the shared resources they
//! cooperate through. Agents never call each other; coupling is only
//! through the store, per the pipeline design.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use rewind_core::emitter::Emitter;
use rewind_core::{RewindConfig, RewindError};
use rewind_llm::ChatBackend;
use rewind_perception::{RecordFilter, RecordKind, SlidingWindow};
use rewind_store::Store;
use rewind_vision::{ImageCache, ImageOptimizer, ThumbnailStore};

use crate::action::ActionAgent;
use crate::cleanup::CleanupAgent;
use crate::diary::DiaryAgent;
use crate::event::EventAgent;
use crate::knowledge::KnowledgeAgent;
use crate::scene::SceneAgent;
use crate::session::SessionAgent;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::supervisor::Supervisor;
use crate::todo::TodoAgent;
use crate::types::ActionExtractionInput;

/// Everything the agents need, owned in one place and passed explicitly.
pub struct AgentContext {
    pub store: Store,
    pub llm: Arc<dyn ChatBackend>,
    pub window: Arc<SlidingWindow>,
    pub cache: Arc<ImageCache>,
    pub thumbs: Arc<ThumbnailStore>,
    pub emitter: Arc<dyn Emitter>,
    pub config: RewindConfig,
    pub stats: Arc<PipelineStats>,
}

pub struct Coordinator {
    window: Arc<SlidingWindow>,
    stats: Arc<PipelineStats>,
    config: RewindConfig,
    llm: Arc<dyn ChatBackend>,

    scene: Arc<SceneAgent>,
    action: Arc<ActionAgent>,
    event: Arc<EventAgent>,
    session: Arc<SessionAgent>,
    knowledge: Arc<KnowledgeAgent>,
    todo: Arc<TodoAgent>,
    diary: Arc<DiaryAgent>,
    cleanup: Arc<CleanupAgent>,

    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    stopped: AtomicBool,
}

impl Coordinator {
    pub fn new(ctx: AgentContext) -> Self {
        let optimizer = Arc::new(Mutex::new(ImageOptimizer::new(&ctx.config.compression)));
        let supervisor = ctx
            .config
            .pipeline
            .enable_supervisor
            .then(|| Arc::new(Supervisor::new(ctx.llm.clone())));

        let scene = Arc::new(SceneAgent::new(
            ctx.llm.clone(),
            ctx.cache.clone(),
            optimizer.clone(),
        ));
        let action = Arc::new(ActionAgent::new(
            ctx.store.clone(),
            ctx.llm.clone(),
            ctx.cache.clone(),
            ctx.thumbs.clone(),
            optimizer.clone(),
            ctx.stats.clone(),
        ));
        let event = Arc::new(EventAgent::new(
            ctx.store.clone(),
            ctx.llm.clone(),
            ctx.stats.clone(),
            ctx.config.pipeline.event_window_hours,
        ));
        let session = Arc::new(SessionAgent::new(
            ctx.store.clone(),
            ctx.llm.clone(),
            ctx.emitter.clone(),
            ctx.stats.clone(),
            ctx.config.pipeline.min_event_actions,
            ctx.config.pipeline.min_event_duration_seconds,
        ));
        let knowledge = Arc::new(KnowledgeAgent::new(
            ctx.store.clone(),
            ctx.llm.clone(),
            supervisor.clone(),
            ctx.stats.clone(),
        ));
        let todo = Arc::new(TodoAgent::new(
            ctx.store.clone(),
            ctx.llm.clone(),
            supervisor.clone(),
            ctx.stats.clone(),
        ));
        let diary = Arc::new(DiaryAgent::new(
            ctx.store.clone(),
            ctx.llm.clone(),
            supervisor,
            ctx.stats.clone(),
        ));
        let cleanup = Arc::new(CleanupAgent::new(
            ctx.store.clone(),
            ctx.thumbs.clone(),
            ctx.stats.clone(),
            ctx.config.retention.days,
        ));

        let (shutdown_tx, _) = watch::channel(false);
        Self {
            window: ctx.window,
            stats: ctx.stats,
            config: ctx.config,
            llm: ctx.llm,
            scene,
            action,
            event,
            session,
            knowledge,
            todo,
            diary,
            cleanup,
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Start every agent timer. Refuses to start without an active model;
    /// UI queries keep working in that state.
    pub fn start(&self) -> Result<(), RewindError> {
        if !self.llm.has_active_model() {
            warn!("pipeline start refused: no active model configured");
            return Err(RewindError::NoActiveModel);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("coordinator already running");
            return Ok(());
        }

        let p = &self.config.pipeline;
        let mut handles = self.handles.lock().unwrap();

        handles.push(self.spawn_loop("process", p.process_interval_secs, {
            let this = self.tick_deps();
            move || {
                let this = this.clone();
                async move { this.process_tick().await }
            }
        }));
        handles.push(self.spawn_loop("event", p.event_interval_secs, {
            let agent = self.event.clone();
            move || {
                let agent = agent.clone();
                async move { agent.aggregate_once().await }
            }
        }));
        handles.push(self.spawn_loop("session", p.session_interval_secs, {
            let agent = self.session.clone();
            move || {
                let agent = agent.clone();
                async move { agent.aggregate_once().await }
            }
        }));
        handles.push(self.spawn_loop("knowledge-merge", p.knowledge_merge_interval_secs, {
            let agent = self.knowledge.clone();
            move || {
                let agent = agent.clone();
                async move { agent.merge_once().await }
            }
        }));
        handles.push(self.spawn_loop("knowledge-catchup", p.knowledge_catchup_interval_secs, {
            let agent = self.knowledge.clone();
            let batch = p.knowledge_catchup_batch;
            move || {
                let agent = agent.clone();
                async move { agent.catchup_once(batch).await }
            }
        }));
        handles.push(self.spawn_loop("todo-merge", p.todo_merge_interval_secs, {
            let agent = self.todo.clone();
            move || {
                let agent = agent.clone();
                async move { agent.merge_once().await }
            }
        }));
        handles.push(self.spawn_loop("cleanup", p.cleanup_interval_secs, {
            let agent = self.cleanup.clone();
            move || {
                let agent = agent.clone();
                async move { agent.run_once().await }
            }
        }));

        info!(
            process = p.process_interval_secs,
            event = p.event_interval_secs,
            session = p.session_interval_secs,
            "coordinator started"
        );
        Ok(())
    }

    /// Stop all timers. Safe to call more than once; only the first call
    /// does the work, so signal-driven and explicit shutdown compose.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            if let Err(e) = handle.await {
                error!("agent task join failed: {e}");
            }
        }
        info!("coordinator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn session_agent(&self) -> Arc<SessionAgent> {
        self.session.clone()
    }

    pub fn diary_agent(&self) -> Arc<DiaryAgent> {
        self.diary.clone()
    }

    fn tick_deps(&self) -> Arc<TickDeps> {
        Arc::new(TickDeps {
            window: self.window.clone(),
            scene: self.scene.clone(),
            action: self.action.clone(),
            knowledge: self.knowledge.clone(),
            todo: self.todo.clone(),
            stats: self.stats.clone(),
        })
    }

    /// Run one pipeline tick immediately (also used by tests).
    pub async fn process_tick_now(&self) {
        self.tick_deps().process_tick().await;
    }

    fn spawn_loop<F, Fut>(
        &self,
        name: &'static str,
        interval_secs: u64,
        task: F,
    ) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
            // The immediate first tick would fire before any data exists.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        debug!(agent = name, "timer tick");
                        task().await;
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            debug!(agent = name, "agent loop shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }
}

/// The linear per-tick chain: window batch → scenes → {actions, knowledge,
/// todos}. C5/C6 run on their own timers over committed store state.
struct TickDeps {
    window: Arc<SlidingWindow>,
    scene: Arc<SceneAgent>,
    action: Arc<ActionAgent>,
    knowledge: Arc<KnowledgeAgent>,
    todo: Arc<TodoAgent>,
    stats: Arc<PipelineStats>,
}

impl TickDeps {
    async fn process_tick(&self) {
        PipelineStats::bump(&self.stats.ticks);

        let batch = self.window.get(&RecordFilter::default());
        let screenshot_count = batch
            .iter()
            .filter(|r| r.kind() == RecordKind::Screenshot)
            .count();
        if screenshot_count == 0 {
            debug!("empty window, tick skipped");
            return;
        }

        let scenes = self.scene.extract_scenes(&batch).await;
        PipelineStats::add(&self.stats.scenes_extracted, scenes.len() as u64);

        let persisted_hashes = if scenes.is_empty() {
            // Legacy fallback: extract straight from the screenshots.
            debug!("no scenes extracted, falling back to image-based actions");
            self.action
                .extract_and_save(ActionExtractionInput::FromScreenshots(&batch))
                .await
        } else {
            let hashes = self
                .action
                .extract_and_save(ActionExtractionInput::FromScenes(&scenes))
                .await;
            self.knowledge.extract_from_scenes(&scenes).await;
            self.todo.extract_from_scenes(&scenes).await;
            hashes
        };

        // Screenshot bytes are only needed until the hash is persisted.
        if !persisted_hashes.is_empty() {
            self.window.purge_screenshot_bytes(&persisted_hashes);
        }
    }
}
