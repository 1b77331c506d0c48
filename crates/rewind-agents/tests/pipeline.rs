//! End-to-end pipeline scenarios driven through a scripted LLM backend.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;

use rewind_agents::{AgentContext, Coordinator, PipelineStats};
use rewind_core::emitter::RecordingEmitter;
use rewind_core::RewindConfig;
use rewind_llm::{
    ChatBackend, ChatMessage, ChatOutcome, ChatParams, ProviderError, StreamEvent, Usage,
};
use rewind_perception::{KeyboardEvent, RawRecord, ScreenshotData, SlidingWindow};
use rewind_store::types::Action;
use rewind_store::Store;
use rewind_vision::{content_hash, ImageCache, ThumbnailStore};

/// Scripted backend: canned replies per request_type, consumed in order.
struct ScriptedBackend {
    replies: Mutex<HashMap<String, VecDeque<String>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn new(script: &[(&str, &str)]) -> Arc<Self> {
        let mut replies: HashMap<String, VecDeque<String>> = HashMap::new();
        for (request_type, reply) in script {
            replies
                .entry(request_type.to_string())
                .or_default()
                .push_back(reply.to_string());
        }
        Arc::new(Self {
            replies: Mutex::new(replies),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn has_active_model(&self) -> bool {
        true
    }

    async fn chat_completion(
        &self,
        _messages: &[ChatMessage],
        _params: &ChatParams,
        request_type: &str,
    ) -> Result<ChatOutcome, ProviderError> {
        self.calls.lock().unwrap().push(request_type.to_string());
        let content = self
            .replies
            .lock()
            .unwrap()
            .get_mut(request_type)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| "{}".to_string());
        Ok(ChatOutcome {
            content,
            model: "scripted".to_string(),
            usage: Usage::default(),
        })
    }

    async fn chat_completion_stream(
        &self,
        messages: Vec<ChatMessage>,
        params: ChatParams,
        request_type: &str,
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError> {
        let outcome = self.chat_completion(&messages, &params, request_type).await?;
        let (tx, rx) = mpsc::channel(4);
        let _ = tx
            .send(StreamEvent::TextDelta {
                text: outcome.content,
            })
            .await;
        let _ = tx
            .send(StreamEvent::Done {
                model: outcome.model,
                usage: outcome.usage,
            })
            .await;
        Ok(rx)
    }
}

struct Harness {
    store: Store,
    window: Arc<SlidingWindow>,
    cache: Arc<ImageCache>,
    emitter: Arc<RecordingEmitter>,
    coordinator: Coordinator,
    stats: Arc<PipelineStats>,
    _dir: tempfile::TempDir,
}

fn harness(backend: Arc<ScriptedBackend>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open_in_memory().unwrap();
    let window = Arc::new(SlidingWindow::new());
    let cache = Arc::new(ImageCache::new(64));
    let emitter = Arc::new(RecordingEmitter::new());
    let stats = Arc::new(PipelineStats::default());
    let mut config = RewindConfig::default();
    config.pipeline.enable_supervisor = false;

    let coordinator = Coordinator::new(AgentContext {
        store: store.clone(),
        llm: backend,
        window: window.clone(),
        cache: cache.clone(),
        thumbs: Arc::new(ThumbnailStore::new(dir.path())),
        emitter: emitter.clone(),
        config,
        stats: stats.clone(),
    });

    Harness {
        store,
        window,
        cache,
        emitter,
        coordinator,
        stats,
        _dir: dir,
    }
}

fn screenshot_png() -> Vec<u8> {
    let img = image::RgbImage::from_fn(320, 180, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 120])
    });
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

#[tokio::test]
async fn empty_window_tick_is_a_noop() {
    let backend = ScriptedBackend::new(&[]);
    let h = harness(backend.clone());

    h.coordinator.process_tick_now().await;

    let stats = h.stats.snapshot();
    assert_eq!(stats.ticks, 1);
    assert_eq!(stats.scenes_extracted, 0);
    assert_eq!(stats.actions_saved, 0);
    assert_eq!(stats.events_created, 0);
    assert!(backend.calls().is_empty(), "no LLM call on empty window");
    assert!(h.emitter.events().is_empty(), "no notifications emitted");
}

#[tokio::test]
async fn single_screenshot_tick_produces_one_action() {
    let png = screenshot_png();
    let hash = content_hash(&png);
    let at = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();

    let backend = ScriptedBackend::new(&[
        (
            "scene_extraction",
            r#"{"scenes": [{"screenshot_index": 0, "visual_summary": "code editor",
                "detected_text": "fn main", "ui_elements": "editor",
                "application_context": "IDE", "inferred_activity": "coding",
                "focus_areas": "editor pane"}]}"#,
        ),
        (
            "action_extraction",
            r#"{"actions": [{"title": "Edit main.rs", "description": "editing code",
                "keywords": ["rust"], "scene_index": [0]}]}"#,
        ),
        ("knowledge_extraction", r#"{"knowledge": []}"#),
        ("todo_extraction", r#"{"todos": []}"#),
    ]);
    let h = harness(backend.clone());

    h.cache.put(hash.clone(), png.clone());
    h.window.add(RawRecord::screenshot(
        at,
        ScreenshotData {
            hash: hash.clone(),
            width: 320,
            height: 180,
            monitor_index: 0,
            bytes: Some(png),
        },
    ));
    for i in 0..3 {
        h.window.add(RawRecord::keyboard(
            at + chrono::Duration::milliseconds(100 + i),
            KeyboardEvent {
                key: "Enter".to_string(),
                modifiers: vec![],
            },
        ));
    }

    h.coordinator.process_tick_now().await;

    let actions = h
        .store
        .actions
        .get_in_timeframe("2025-06-01T00:00:00+00:00", "2025-06-02T00:00:00+00:00")
        .unwrap();
    assert_eq!(actions.len(), 1);
    let action = &actions[0];
    assert_eq!(action.title, "Edit main.rs");
    assert_eq!(action.screenshots, vec![hash.clone()]);
    assert_eq!(action.timestamp, at.to_rfc3339());

    // Thumbnail row present for every referenced hash.
    assert!(h.store.thumbnails.get(&hash).unwrap().is_some());

    // No events yet: aggregation needs at least two actions.
    assert!(h.store.events.get_recent(10).unwrap().is_empty());

    // Screenshot bytes are purged from the window once persisted.
    let shots = h.window.get(&rewind_perception::RecordFilter {
        kind: Some(rewind_perception::RecordKind::Screenshot),
        ..Default::default()
    });
    assert!(shots[0].as_screenshot().unwrap().bytes.is_none());

    let stats = h.stats.snapshot();
    assert_eq!(stats.scenes_extracted, 1);
    assert_eq!(stats.actions_saved, 1);
    assert_eq!(stats.actions_filtered, 0);
}

#[tokio::test]
async fn invalid_scene_index_drops_only_that_action() {
    let png = screenshot_png();
    let hash = content_hash(&png);
    let at = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();

    let backend = ScriptedBackend::new(&[
        (
            "scene_extraction",
            r#"{"scenes": [{"screenshot_index": 0, "visual_summary": "terminal"}]}"#,
        ),
        (
            "action_extraction",
            r#"{"actions": [
                {"title": "Good", "scene_index": [0]},
                {"title": "Bad", "scene_index": [7]}
            ]}"#,
        ),
    ]);
    let h = harness(backend);

    h.cache.put(hash.clone(), png.clone());
    h.window.add(RawRecord::screenshot(
        at,
        ScreenshotData {
            hash,
            width: 320,
            height: 180,
            monitor_index: 0,
            bytes: Some(png),
        },
    ));

    h.coordinator.process_tick_now().await;

    let stats = h.stats.snapshot();
    assert_eq!(stats.actions_saved, 1);
    assert_eq!(stats.actions_filtered, 1);
}

#[tokio::test]
async fn four_actions_aggregate_into_one_event() {
    use rewind_agents::event::EventAgent;

    let store = Store::open_in_memory().unwrap();
    let stats = Arc::new(PipelineStats::default());
    let now = Utc::now();

    let titles = ["open IDE", "edit file X", "save file X", "run tests"];
    let mut ids = Vec::new();
    for (i, title) in titles.iter().enumerate() {
        let id = format!("a{i}");
        store
            .actions
            .save(&Action {
                id: id.clone(),
                title: title.to_string(),
                description: String::new(),
                keywords: vec![],
                timestamp: (now - chrono::Duration::seconds(30 * (4 - i as i64))).to_rfc3339(),
                screenshots: vec![],
                knowledge_extracted: false,
                extract_knowledge: false,
                deleted: false,
                created_at: String::new(),
            })
            .unwrap();
        ids.push(id);
    }

    let reply = format!(
        r#"{{"events": [{{"title": "Work on file X", "description": "coding session",
            "source_action_ids": ["{}", "{}", "{}", "{}"]}}]}}"#,
        ids[0], ids[1], ids[2], ids[3]
    );
    let backend = ScriptedBackend::new(&[("event_aggregation", &reply)]);

    let agent = EventAgent::new(store.clone(), backend, stats.clone(), 1);
    agent.aggregate_once().await;

    let events = store.events.get_recent(10).unwrap();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.source_action_ids.len(), 4);
    // Start/end span the referenced actions (LLM gave no timestamps).
    let first = store.actions.get_by_ids(&ids).unwrap()[0].timestamp.clone();
    assert_eq!(event.start_time, first);
    assert_eq!(stats.snapshot().events_created, 1);

    // A second pass finds no unaggregated candidates and skips.
    agent.aggregate_once().await;
    assert_eq!(store.events.get_recent(10).unwrap().len(), 1);
}

#[tokio::test]
async fn session_clustering_creates_activities_and_marks_events() {
    use rewind_agents::session::SessionAgent;
    use rewind_store::types::Event;

    let store = Store::open_in_memory().unwrap();
    let stats = Arc::new(PipelineStats::default());
    let emitter = Arc::new(RecordingEmitter::new());
    let now = Utc::now();

    // Two qualifying events close together in the lookback window.
    for (i, offset) in [60i64, 20].iter().enumerate() {
        let start = now - chrono::Duration::minutes(*offset);
        store
            .events
            .save(&Event {
                id: format!("e{i}"),
                title: format!("event {i}"),
                description: String::new(),
                keywords: vec![],
                start_time: start.to_rfc3339(),
                end_time: (start + chrono::Duration::minutes(10)).to_rfc3339(),
                source_action_ids: vec![format!("a{i}-1"), format!("a{i}-2")],
                aggregated_into_activity_id: None,
                deleted: false,
                created_at: String::new(),
            })
            .unwrap();
    }

    // The model returns two clusters that overlap in time; the overlap
    // pass must persist exactly one merged activity.
    let backend = ScriptedBackend::new(&[(
        "session_aggregation",
        r#"{"activities": [
            {"source": [1], "title": "Refactor", "topic_tags": ["code"]},
            {"source": [2], "title": "Refactor continued", "topic_tags": ["code"]}
        ]}"#,
    )]);

    let agent = SessionAgent::new(store.clone(), backend, emitter.clone(), stats.clone(), 2, 120);
    agent.aggregate_once().await;

    let activities = store.activities.get_recent(10).unwrap();
    // Events are 40 minutes apart with 10-minute spans: disjoint clusters
    // stay separate.
    assert_eq!(activities.len(), 2);

    // Every source event is now marked aggregated.
    for event in store.events.get_recent(10).unwrap() {
        assert!(event.aggregated_into_activity_id.is_some());
    }
    assert_eq!(emitter.events_named("activity-created").len(), 2);
    assert_eq!(stats.snapshot().activities_created, 2);
}

#[tokio::test]
async fn overlapping_clusters_persist_as_one_activity() {
    use rewind_agents::session::SessionAgent;
    use rewind_store::types::Event;

    let store = Store::open_in_memory().unwrap();
    let stats = Arc::new(PipelineStats::default());
    let emitter = Arc::new(RecordingEmitter::new());
    let now = Utc::now();

    // Two events whose spans intersect: [T, T+40] and [T+30, T+60].
    let t = now - chrono::Duration::minutes(90);
    let spans = [(0i64, 40i64), (30, 60)];
    for (i, (from, to)) in spans.iter().enumerate() {
        store
            .events
            .save(&Event {
                id: format!("e{i}"),
                title: format!("event {i}"),
                description: String::new(),
                keywords: vec![],
                start_time: (t + chrono::Duration::minutes(*from)).to_rfc3339(),
                end_time: (t + chrono::Duration::minutes(*to)).to_rfc3339(),
                source_action_ids: vec![format!("a{i}-1"), format!("a{i}-2")],
                aggregated_into_activity_id: None,
                deleted: false,
                created_at: String::new(),
            })
            .unwrap();
    }

    let backend = ScriptedBackend::new(&[(
        "session_aggregation",
        r#"{"activities": [
            {"source": [1], "title": "Part A"},
            {"source": [2], "title": "Part B"}
        ]}"#,
    )]);

    let agent = SessionAgent::new(store.clone(), backend, emitter, stats.clone(), 2, 120);
    agent.aggregate_once().await;

    let activities = store.activities.get_recent(10).unwrap();
    assert_eq!(activities.len(), 1, "overlapping clusters must merge");
    let merged = &activities[0];
    assert!(merged.title.contains("Part A") && merged.title.contains("Part B"));
    assert_eq!(merged.source_event_ids.len(), 2);
    assert_eq!(merged.start_time, t.to_rfc3339());
    assert_eq!(
        merged.end_time,
        (t + chrono::Duration::minutes(60)).to_rfc3339()
    );
    assert_eq!(stats.snapshot().activities_overlap_merged, 1);
}

#[tokio::test]
async fn knowledge_merge_hides_sources() {
    use rewind_agents::knowledge::KnowledgeAgent;
    use rewind_store::types::KnowledgeItem;

    let store = Store::open_in_memory().unwrap();
    let stats = Arc::new(PipelineStats::default());

    for i in 0..3 {
        store
            .knowledge
            .save(&KnowledgeItem {
                id: format!("k{i}"),
                title: format!("cargo tip {i}"),
                description: "desc".to_string(),
                keywords: vec![],
                source_action_id: None,
                merged_from_ids: vec![],
                deleted: false,
                created_at: String::new(),
            })
            .unwrap();
    }

    let backend = ScriptedBackend::new(&[(
        "knowledge_merge",
        r#"{"merged": [{"title": "Cargo tips", "description": "combined",
            "keywords": ["cargo"], "merged_from_ids": ["k0", "k1"]}]}"#,
    )]);
    let agent = KnowledgeAgent::new(store.clone(), backend, None, stats.clone());
    agent.merge_once().await;

    let list = store.knowledge.get_list().unwrap();
    let ids: Vec<&str> = list.iter().map(|k| k.id.as_str()).collect();
    assert!(!ids.contains(&"k0"));
    assert!(!ids.contains(&"k1"));
    assert!(ids.contains(&"k2"));
    assert!(list.iter().any(|k| k.title == "Cargo tips"));
    assert_eq!(stats.snapshot().knowledge_merged, 1);
}

#[tokio::test]
async fn supervisor_failure_never_loses_items() {
    use rewind_agents::{Supervisor, SupervisorCategory};

    // Backend that answers the supervisor with garbage.
    let backend = ScriptedBackend::new(&[("supervisor", "this is not json at all")]);
    let supervisor = Supervisor::new(backend);

    let items = vec![
        serde_json::json!({"title": "a", "description": "x", "keywords": []}),
        serde_json::json!({"title": "b", "description": "y", "keywords": []}),
    ];
    let out = supervisor
        .validate_items(SupervisorCategory::Knowledge, items.clone())
        .await;
    assert_eq!(out, items, "failed supervision must return the input");

    // A revision that would empty the output is discarded too.
    let backend = ScriptedBackend::new(&[(
        "supervisor",
        r#"{"is_valid": false, "issues": ["too vague"], "revised_content": []}"#,
    )]);
    let supervisor = Supervisor::new(backend);
    let out = supervisor
        .validate_items(SupervisorCategory::Knowledge, items.clone())
        .await;
    assert_eq!(out, items, "an emptying revision must be rejected");
}

#[tokio::test]
async fn supervisor_revision_is_applied() {
    use rewind_agents::{Supervisor, SupervisorCategory};

    let backend = ScriptedBackend::new(&[(
        "supervisor",
        r#"{"is_valid": true, "revised_content":
            [{"title": "sharper title", "description": "x", "keywords": []}]}"#,
    )]);
    let supervisor = Supervisor::new(backend);
    let items = vec![serde_json::json!({"title": "vague", "description": "x", "keywords": []})];
    let out = supervisor
        .validate_items(SupervisorCategory::Knowledge, items)
        .await;
    assert_eq!(out[0]["title"], "sharper title");
}

#[tokio::test]
async fn knowledge_catchup_marks_actions_processed() {
    use rewind_agents::knowledge::KnowledgeAgent;

    let store = Store::open_in_memory().unwrap();
    let stats = Arc::new(PipelineStats::default());
    store
        .actions
        .save(&Action {
            id: "a1".to_string(),
            title: "Read docs".to_string(),
            description: "reading the rusqlite docs".to_string(),
            keywords: vec![],
            timestamp: Utc::now().to_rfc3339(),
            screenshots: vec![],
            knowledge_extracted: false,
            extract_knowledge: true,
            deleted: false,
            created_at: String::new(),
        })
        .unwrap();

    let backend = ScriptedBackend::new(&[(
        "knowledge_catchup",
        r#"{"knowledge": [{"title": "rusqlite transactions",
            "description": "use conn.transaction()", "keywords": ["sqlite"]}]}"#,
    )]);
    let agent = KnowledgeAgent::new(store.clone(), backend, None, stats.clone());
    agent.catchup_once(20).await;

    let list = store.knowledge.get_list().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].source_action_id.as_deref(), Some("a1"));

    // The action is marked processed: a second pass finds nothing.
    assert!(store
        .actions
        .get_pending_knowledge_extraction(20)
        .unwrap()
        .is_empty());
}
