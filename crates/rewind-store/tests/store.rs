use rewind_store::types::*;
use rewind_store::Store;

fn sample_action(id: &str, ts: &str) -> Action {
    Action {
        id: id.to_string(),
        title: format!("action {id}"),
        description: "desc".to_string(),
        keywords: vec!["kw".to_string()],
        timestamp: ts.to_string(),
        screenshots: vec![format!("hash-{id}")],
        knowledge_extracted: false,
        extract_knowledge: false,
        deleted: false,
        created_at: ts.to_string(),
    }
}

fn sample_event(id: &str, start: &str, end: &str, action_ids: &[&str]) -> Event {
    Event {
        id: id.to_string(),
        title: format!("event {id}"),
        description: "desc".to_string(),
        keywords: vec![],
        start_time: start.to_string(),
        end_time: end.to_string(),
        source_action_ids: action_ids.iter().map(|s| s.to_string()).collect(),
        aggregated_into_activity_id: None,
        deleted: false,
        created_at: start.to_string(),
    }
}

fn sample_model(id: &str) -> LlmModel {
    LlmModel {
        id: id.to_string(),
        name: format!("model {id}"),
        provider: "openai".to_string(),
        api_url: "https://api.example.com".to_string(),
        model_name: "test-model".to_string(),
        input_token_price: 1.0,
        output_token_price: 2.0,
        currency: "USD".to_string(),
        api_key: "sk-test".to_string(),
        is_active: false,
        last_test_status: None,
        last_tested_at: None,
        last_test_error: None,
        created_at: String::new(),
        updated_at: String::new(),
    }
}

#[test]
fn actions_roundtrip_and_timeframe_query() {
    let store = Store::open_in_memory().unwrap();
    store
        .actions
        .save(&sample_action("a1", "2025-06-01T10:00:00+00:00"))
        .unwrap();
    store
        .actions
        .save(&sample_action("a2", "2025-06-01T11:00:00+00:00"))
        .unwrap();

    let hits = store
        .actions
        .get_in_timeframe("2025-06-01T09:00:00+00:00", "2025-06-01T10:30:00+00:00")
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "a1");
    assert_eq!(hits[0].screenshots, vec!["hash-a1".to_string()]);
}

#[test]
fn soft_delete_is_idempotent() {
    let store = Store::open_in_memory().unwrap();
    store
        .actions
        .save(&sample_action("a1", "2025-06-01T10:00:00+00:00"))
        .unwrap();

    store.actions.delete("a1").unwrap();
    // Deleting again must be a no-op, not an error.
    store.actions.delete("a1").unwrap();

    let hits = store
        .actions
        .get_in_timeframe("2025-06-01T00:00:00+00:00", "2025-06-02T00:00:00+00:00")
        .unwrap();
    assert!(hits.is_empty());
}

#[test]
fn event_source_action_ids_are_collected() {
    let store = Store::open_in_memory().unwrap();
    store
        .events
        .save(&sample_event(
            "e1",
            "2025-06-01T10:00:00+00:00",
            "2025-06-01T10:10:00+00:00",
            &["a1", "a2"],
        ))
        .unwrap();
    store
        .events
        .save(&sample_event(
            "e2",
            "2025-06-01T11:00:00+00:00",
            "2025-06-01T11:10:00+00:00",
            &["a3"],
        ))
        .unwrap();

    let ids = store.events.get_all_source_action_ids().unwrap();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains("a2"));

    // A deleted event stops hiding its actions.
    store.events.delete("e2").unwrap();
    let ids = store.events.get_all_source_action_ids().unwrap();
    assert!(!ids.contains("a3"));
}

#[test]
fn merged_knowledge_hides_sources() {
    let store = Store::open_in_memory().unwrap();
    for id in ["k1", "k2", "k3"] {
        store
            .knowledge
            .save(&KnowledgeItem {
                id: id.to_string(),
                title: format!("knowledge {id}"),
                description: "d".to_string(),
                keywords: vec![],
                source_action_id: None,
                merged_from_ids: vec![],
                deleted: false,
                created_at: String::new(),
            })
            .unwrap();
    }

    store
        .knowledge
        .save_combined(&KnowledgeItem {
            id: "merged".to_string(),
            title: "merged".to_string(),
            description: "d".to_string(),
            keywords: vec![],
            source_action_id: None,
            merged_from_ids: vec!["k1".to_string(), "k2".to_string()],
            deleted: false,
            created_at: String::new(),
        })
        .unwrap();
    store
        .knowledge
        .delete_batch(&["k1".to_string(), "k2".to_string()])
        .unwrap();

    let list = store.knowledge.get_list().unwrap();
    let ids: Vec<&str> = list.iter().map(|k| k.id.as_str()).collect();
    assert!(ids.contains(&"merged"));
    assert!(ids.contains(&"k3"));
    assert!(!ids.contains(&"k1"));
    assert!(!ids.contains(&"k2"));

    // Unmerged view excludes covered rows even before the soft delete lands.
    let unmerged = store.knowledge.get_unmerged().unwrap();
    assert_eq!(unmerged.len(), 1);
    assert_eq!(unmerged[0].id, "k3");
}

#[test]
fn todo_schedule_and_list() {
    let store = Store::open_in_memory().unwrap();
    store
        .todos
        .save(&TodoItem {
            id: "t1".to_string(),
            title: "write report".to_string(),
            description: "d".to_string(),
            keywords: vec![],
            merged_from_ids: vec![],
            completed: false,
            scheduled_date: None,
            scheduled_time: None,
            deleted: false,
            created_at: String::new(),
        })
        .unwrap();

    let updated = store
        .todos
        .schedule("t1", Some("2025-06-02"), Some("09:30"))
        .unwrap();
    assert_eq!(updated.scheduled_date.as_deref(), Some("2025-06-02"));
    assert_eq!(updated.scheduled_time.as_deref(), Some("09:30"));

    // Unschedule clears both fields.
    let cleared = store.todos.schedule("t1", None, None).unwrap();
    assert!(cleared.scheduled_date.is_none());

    // Scheduling an unknown id reports NotFound.
    assert!(store.todos.schedule("missing", Some("2025-06-02"), None).is_err());
}

#[test]
fn model_activation_is_exclusive() {
    let store = Store::open_in_memory().unwrap();
    store.models.create(&sample_model("m1")).unwrap();
    store.models.create(&sample_model("m2")).unwrap();

    store.models.select("m1").unwrap();
    store.models.select("m2").unwrap();

    let active: Vec<_> = store
        .models
        .list()
        .unwrap()
        .into_iter()
        .filter(|m| m.is_active)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "m2");
}

#[test]
fn conversation_delete_cascades_messages() {
    let store = Store::open_in_memory().unwrap();
    let conversation = Conversation {
        id: "c1".to_string(),
        title: "New chat".to_string(),
        related_activity_ids: vec![],
        metadata: serde_json::json!({"autoTitle": true}),
        created_at: String::new(),
        updated_at: String::new(),
    };
    store.conversations.insert(&conversation).unwrap();
    for i in 0..3 {
        store
            .conversations
            .insert_message(&Message {
                id: format!("m{i}"),
                conversation_id: "c1".to_string(),
                role: MessageRole::User,
                content: format!("message {i}"),
                timestamp: format!("2025-06-01T10:00:0{i}+00:00"),
                metadata: serde_json::json!({}),
            })
            .unwrap();
    }

    assert_eq!(
        store.conversations.get_messages("c1", 100, 0).unwrap().len(),
        3
    );

    let n = store.conversations.delete("c1").unwrap();
    assert_eq!(n, 1);
    assert!(store.conversations.get_messages("c1", 100, 0).unwrap().is_empty());
}

#[test]
fn purge_removes_only_old_soft_deleted_rows() {
    let store = Store::open_in_memory().unwrap();
    store
        .actions
        .save(&sample_action("old", "2025-01-01T00:00:00+00:00"))
        .unwrap();
    store
        .actions
        .save(&sample_action("kept", "2025-01-01T00:00:00+00:00"))
        .unwrap();
    store.actions.delete("old").unwrap();

    // Cutoff far in the future: the soft-deleted row qualifies.
    let counts = store
        .purge_deleted_older_than("2099-01-01T00:00:00+00:00")
        .unwrap();
    assert_eq!(counts.get("actions"), Some(&1));

    // The live row survives.
    assert_eq!(store.actions.count().unwrap(), 1);

    // Nothing left to purge.
    let counts = store
        .purge_deleted_older_than("2099-01-01T00:00:00+00:00")
        .unwrap();
    assert!(counts.is_empty());
}

#[test]
fn usage_summary_accumulates() {
    let store = Store::open_in_memory().unwrap();
    for i in 0..3 {
        store
            .usage
            .record(&TokenUsage {
                timestamp: format!("2025-06-01T10:0{i}:00+00:00"),
                model: "test-model".to_string(),
                prompt_tokens: 100,
                completion_tokens: 50,
                total_tokens: 150,
                cost: 0.001,
                request_type: "scene_extraction".to_string(),
            })
            .unwrap();
    }

    let summary = store.usage.summary_since("2025-06-01T00:00:00+00:00").unwrap();
    assert_eq!(summary.total_calls, 3);
    assert_eq!(summary.total_tokens, 450);
    assert!(summary.models_used.contains(&"test-model".to_string()));

    let daily = store.usage.daily(7).unwrap();
    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0].date, "2025-06-01");
    assert_eq!(daily[0].calls, 3);
}
