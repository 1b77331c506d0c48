//! Chat service scenarios: streaming, isolation, cancellation, titling.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use rewind_chat::ChatService;
use rewind_core::emitter::RecordingEmitter;
use rewind_llm::{
    ChatBackend, ChatMessage, ChatOutcome, ChatParams, ProviderError, StreamEvent, Usage,
};
use rewind_store::types::MessageRole;
use rewind_store::Store;

/// Backend whose streams emit one chunk, then stall for `delay_ms` before
/// finishing. Each call gets a numbered reply so tests can tell streams
/// apart.
struct SlowBackend {
    delay_ms: u64,
    counter: AtomicU32,
}

impl SlowBackend {
    fn new(delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            delay_ms,
            counter: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl ChatBackend for SlowBackend {
    fn has_active_model(&self) -> bool {
        true
    }

    async fn chat_completion(
        &self,
        _messages: &[ChatMessage],
        _params: &ChatParams,
        _request_type: &str,
    ) -> Result<ChatOutcome, ProviderError> {
        Ok(ChatOutcome {
            content: "unused".to_string(),
            model: "slow".to_string(),
            usage: Usage::default(),
        })
    }

    async fn chat_completion_stream(
        &self,
        _messages: Vec<ChatMessage>,
        _params: ChatParams,
        _request_type: &str,
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.delay_ms;
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            let _ = tx
                .send(StreamEvent::TextDelta {
                    text: format!("reply-{n}"),
                })
                .await;
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            let _ = tx
                .send(StreamEvent::Done {
                    model: "slow".to_string(),
                    usage: Usage::default(),
                })
                .await;
        });
        Ok(rx)
    }
}

fn service(backend: Arc<SlowBackend>) -> (ChatService, Store, Arc<RecordingEmitter>) {
    let store = Store::open_in_memory().unwrap();
    let emitter = Arc::new(RecordingEmitter::new());
    let service = ChatService::new(store.clone(), backend, emitter.clone());
    (service, store, emitter)
}

async fn wait_for_stream_end(emitter: &RecordingEmitter, expected_done: usize) {
    for _ in 0..100 {
        let done = emitter
            .events_named("chat-message-chunk")
            .iter()
            .filter(|p| p["done"] == true)
            .count();
        if done >= expected_done {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("stream did not finish in time");
}

#[tokio::test]
async fn message_streams_and_persists() {
    let (service, store, emitter) = service(SlowBackend::new(10));
    let conversation = service.create_conversation("New chat", vec![]).unwrap();

    service.send_message(&conversation.id, "hello there").await.unwrap();
    wait_for_stream_end(&emitter, 1).await;

    let messages = store
        .conversations
        .get_messages(&conversation.id, 100, 0)
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(messages[1].content, "reply-1");

    let chunks = emitter.events_named("chat-message-chunk");
    assert_eq!(chunks[0]["chunk"], "reply-1");
    assert_eq!(chunks[0]["done"], false);
    let last = chunks.last().unwrap();
    assert_eq!(last["done"], true);
    assert_eq!(last["message_id"], messages[1].id);
}

#[tokio::test]
async fn resubmission_cancels_previous_stream() {
    let (service, store, emitter) = service(SlowBackend::new(400));
    let conversation = service.create_conversation("New chat", vec![]).unwrap();

    service.send_message(&conversation.id, "first prompt").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    service.send_message(&conversation.id, "second prompt").await.unwrap();

    wait_for_stream_end(&emitter, 2).await;

    // The cancelled stream's terminal chunk carries error=true.
    let chunks = emitter.events_named("chat-message-chunk");
    let error_terminal = chunks
        .iter()
        .any(|p| p["done"] == true && p["error"] == true);
    assert!(error_terminal, "first stream must finalize with error");

    // Both user messages persisted in order; the final assistant message
    // answers the second prompt.
    let messages = store
        .conversations
        .get_messages(&conversation.id, 100, 0)
        .unwrap();
    let user_contents: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == MessageRole::User)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(user_contents, vec!["first prompt", "second prompt"]);

    let last_assistant = messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::Assistant && m.metadata["error"] != true)
        .expect("final assistant message");
    assert_eq!(last_assistant.content, "reply-2");
}

#[tokio::test]
async fn distinct_conversations_stream_independently() {
    let (service, store, emitter) = service(SlowBackend::new(50));
    let c1 = service.create_conversation("one", vec![]).unwrap();
    let c2 = service.create_conversation("two", vec![]).unwrap();

    service.send_message(&c1.id, "to c1").await.unwrap();
    service.send_message(&c2.id, "to c2").await.unwrap();
    wait_for_stream_end(&emitter, 2).await;

    // Neither stream was cancelled.
    let chunks = emitter.events_named("chat-message-chunk");
    assert!(!chunks.iter().any(|p| p["error"] == true));

    for id in [&c1.id, &c2.id] {
        let messages = store.conversations.get_messages(id, 100, 0).unwrap();
        assert_eq!(messages.len(), 2, "each conversation has user + assistant");
    }
}

#[tokio::test]
async fn first_user_message_titles_the_conversation() {
    let (service, store, emitter) = service(SlowBackend::new(5));
    let conversation = service.create_conversation("New conversation", vec![]).unwrap();

    service
        .send_message(&conversation.id, "How do I configure the capture interval?")
        .await
        .unwrap();
    wait_for_stream_end(&emitter, 1).await;

    let updated = store
        .conversations
        .get_by_id(&conversation.id)
        .unwrap()
        .unwrap();
    assert_ne!(updated.title, "New conversation");
    assert!(updated.title.chars().count() <= 28);
    assert_eq!(updated.metadata["titleFinalized"], true);

    // A later message must not retitle.
    let titled = updated.title.clone();
    service
        .send_message(&conversation.id, "Completely different topic now")
        .await
        .unwrap();
    wait_for_stream_end(&emitter, 2).await;
    let again = store
        .conversations
        .get_by_id(&conversation.id)
        .unwrap()
        .unwrap();
    assert_eq!(again.title, titled);
}

#[tokio::test]
async fn unknown_conversation_is_rejected() {
    let (service, _store, _emitter) = service(SlowBackend::new(5));
    let err = service.send_message("missing", "hello").await.unwrap_err();
    assert!(err.to_string().contains("missing"));
}
