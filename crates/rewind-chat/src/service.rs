//! Chat service: conversational access to the recorded artifacts with
//! streaming output, auto-titling, and per-conversation task isolation.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use rewind_core::config::{CHAT_HISTORY_LIMIT, CHAT_TITLE_MAX_CHARS};
use rewind_core::emitter::{Emitter, CHAT_MESSAGE_CHUNK};
use rewind_llm::{ChatBackend, ChatMessage, ChatParams, StreamEvent};
use rewind_store::types::{Activity, Conversation, Message, MessageRole};
use rewind_store::Store;

use crate::error::{ChatError, Result};
use crate::streams::ChatStreamManager;
use crate::title;

pub struct ChatService {
    store: Store,
    llm: Arc<dyn ChatBackend>,
    emitter: Arc<dyn Emitter>,
    streams: Arc<ChatStreamManager>,
}

impl ChatService {
    pub fn new(store: Store, llm: Arc<dyn ChatBackend>, emitter: Arc<dyn Emitter>) -> Self {
        Self {
            store,
            llm,
            emitter,
            streams: Arc::new(ChatStreamManager::new()),
        }
    }

    pub fn create_conversation(
        &self,
        title: &str,
        related_activity_ids: Vec<String>,
    ) -> Result<Conversation> {
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            related_activity_ids,
            metadata: json!({ "autoTitle": true, "titleFinalized": false }),
            created_at: String::new(),
            updated_at: String::new(),
        };
        self.store.conversations.insert(&conversation)?;
        // Return the stored row so timestamps are populated.
        Ok(self
            .store
            .conversations
            .get_by_id(&conversation.id)?
            .unwrap_or(conversation))
    }

    /// Seed a conversation from selected activities: the activities become
    /// a system context message and the title is finalized immediately.
    pub fn create_conversation_from_activities(
        &self,
        activity_ids: &[String],
    ) -> Result<Conversation> {
        if activity_ids.is_empty() {
            return Err(ChatError::InvalidRequest(
                "activity_ids must not be empty".to_string(),
            ));
        }
        let activities = self.store.activities.get_by_ids(activity_ids)?;
        let title = activities
            .first()
            .map(|a| format!("About: {}", title::truncate(&a.title, CHAT_TITLE_MAX_CHARS)))
            .unwrap_or_else(|| "About recent activities".to_string());

        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            title,
            related_activity_ids: activity_ids.to_vec(),
            metadata: json!({ "autoTitle": false, "titleFinalized": true }),
            created_at: String::new(),
            updated_at: String::new(),
        };
        self.store.conversations.insert(&conversation)?;

        let context = activity_context_prompt(&activities);
        self.persist_message(&conversation.id, MessageRole::System, &context, json!({}))?;
        info!(conversation_id = %conversation.id, activities = activity_ids.len(),
              "conversation seeded from activities");
        Ok(self
            .store
            .conversations
            .get_by_id(&conversation.id)?
            .unwrap_or(conversation))
    }

    /// Persist the user message and stream the assistant reply.
    ///
    /// Returns once the stream task is running; chunks arrive through the
    /// emitter as `chat-message-chunk` events. A second call for the same
    /// conversation cancels the first stream, which finalizes with an
    /// error message so the history stays consistent.
    pub async fn send_message(&self, conversation_id: &str, user_content: &str) -> Result<()> {
        if self.store.conversations.get_by_id(conversation_id)?.is_none() {
            return Err(ChatError::ConversationNotFound(conversation_id.to_string()));
        }

        self.persist_message(conversation_id, MessageRole::User, user_content, json!({}))?;
        self.maybe_autotitle(conversation_id);

        let history = self
            .store
            .conversations
            .get_recent_messages(conversation_id, CHAT_HISTORY_LIMIT)?;
        let mut messages: Vec<ChatMessage> = Vec::with_capacity(history.len() + 1);
        if !history.iter().any(|m| m.role == MessageRole::System) {
            messages.push(ChatMessage::system(MARKDOWN_SYSTEM_PROMPT));
        }
        for msg in &history {
            messages.push(match msg.role {
                MessageRole::System => ChatMessage::system(msg.content.clone()),
                MessageRole::User => ChatMessage::user(msg.content.clone()),
                MessageRole::Assistant => ChatMessage::assistant(msg.content.clone()),
            });
        }

        let (mut cancel_rx, generation) = self.streams.begin(conversation_id);

        let store = self.store.clone();
        let llm = self.llm.clone();
        let emitter = self.emitter.clone();
        let streams = self.streams.clone();
        let conv_id = conversation_id.to_string();

        let handle = tokio::spawn(async move {
            let outcome = run_stream(
                &store,
                &llm,
                &emitter,
                &conv_id,
                messages,
                &mut cancel_rx,
            )
            .await;
            if let Err(e) = outcome {
                finalize_with_error(&store, &emitter, &conv_id, &e.to_string());
            }
            streams.finish(&conv_id, generation);
        });
        self.streams.attach(conversation_id, generation, handle);
        Ok(())
    }

    pub fn cancel_stream(&self, conversation_id: &str) -> bool {
        self.streams.cancel(conversation_id)
    }

    pub fn get_conversations(&self, limit: usize, offset: usize) -> Result<Vec<Conversation>> {
        Ok(self.store.conversations.list(limit, offset)?)
    }

    pub fn get_messages(
        &self,
        conversation_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>> {
        Ok(self
            .store
            .conversations
            .get_messages(conversation_id, limit, offset)?)
    }

    /// Cascade-deletes the conversation's messages.
    pub fn delete_conversation(&self, conversation_id: &str) -> Result<bool> {
        self.streams.cancel(conversation_id);
        Ok(self.store.conversations.delete(conversation_id)? > 0)
    }

    fn persist_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            metadata,
        };
        self.store.conversations.insert_message(&message)?;
        self.store.conversations.update(conversation_id, None, None)?;
        Ok(message)
    }

    /// Derive a short title from the first non-empty user message while the
    /// conversation still carries the placeholder flag.
    fn maybe_autotitle(&self, conversation_id: &str) {
        let result: Result<()> = (|| {
            let Some(conversation) = self.store.conversations.get_by_id(conversation_id)? else {
                return Ok(());
            };
            let auto = conversation
                .metadata
                .get("autoTitle")
                .and_then(|v| v.as_bool())
                .unwrap_or(true);
            let finalized = conversation
                .metadata
                .get("titleFinalized")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if !auto || finalized {
                return Ok(());
            }

            let messages = self.store.conversations.get_messages(conversation_id, 10, 0)?;
            let candidate = messages
                .iter()
                .filter(|m| m.role == MessageRole::User)
                .map(|m| m.content.trim())
                .find(|c| !c.is_empty())
                .or_else(|| {
                    messages
                        .iter()
                        .map(|m| m.content.trim())
                        .find(|c| !c.is_empty())
                });
            let Some(candidate) = candidate else {
                return Ok(());
            };
            let new_title = title::derive(candidate, CHAT_TITLE_MAX_CHARS);
            if new_title.is_empty() || new_title == conversation.title {
                return Ok(());
            }

            let mut metadata = conversation.metadata.clone();
            metadata["autoTitle"] = json!(false);
            metadata["titleFinalized"] = json!(true);
            self.store
                .conversations
                .update(conversation_id, Some(&new_title), Some(&metadata))?;
            debug!(conversation_id, title = %new_title, "conversation auto-titled");
            Ok(())
        })();
        if let Err(e) = result {
            warn!(conversation_id, "auto-title failed: {e}");
        }
    }
}

const MARKDOWN_SYSTEM_PROMPT: &str = "You are a helpful assistant. Respond in Markdown: use \
`inline code` for identifiers, fenced code blocks for multi-line code, **bold** for emphasis, \
and - or 1. for lists. Do not use backticks in ordinary prose.";

/// Drive the LLM stream for one message, emitting chunk events and
/// persisting the final assistant message. Cancellation finalizes with an
/// error message instead of leaving the history dangling.
async fn run_stream(
    store: &Store,
    llm: &Arc<dyn ChatBackend>,
    emitter: &Arc<dyn Emitter>,
    conversation_id: &str,
    messages: Vec<ChatMessage>,
    cancel_rx: &mut tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    let params = ChatParams {
        max_tokens: 2000,
        temperature: 0.7,
    };
    let mut rx = llm
        .chat_completion_stream(messages, params, "chat")
        .await
        .map_err(|e| ChatError::Llm(e.to_string()))?;

    let mut full_response = String::new();
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(StreamEvent::TextDelta { text }) => {
                        full_response.push_str(&text);
                        emitter.emit(
                            CHAT_MESSAGE_CHUNK,
                            json!({
                                "conversation_id": conversation_id,
                                "chunk": text,
                                "done": false,
                            }),
                        );
                    }
                    Some(StreamEvent::Done { .. }) | None => break,
                    Some(StreamEvent::Error { message }) => {
                        return Err(ChatError::Llm(message));
                    }
                }
            }
            _ = cancel_rx.changed() => {
                if *cancel_rx.borrow() {
                    info!(conversation_id, "chat stream cancelled by newer message");
                    finalize_with_error(store, emitter, conversation_id, "cancelled");
                    return Ok(());
                }
            }
        }
    }

    let assistant = Message {
        id: Uuid::new_v4().to_string(),
        conversation_id: conversation_id.to_string(),
        role: MessageRole::Assistant,
        content: full_response,
        timestamp: chrono::Utc::now().to_rfc3339(),
        metadata: json!({}),
    };
    store.conversations.insert_message(&assistant)?;
    store.conversations.update(conversation_id, None, None)?;
    emitter.emit(
        CHAT_MESSAGE_CHUNK,
        json!({
            "conversation_id": conversation_id,
            "chunk": "",
            "done": true,
            "message_id": assistant.id,
        }),
    );
    info!(conversation_id, chars = assistant.content.len(), "chat stream completed");
    Ok(())
}

/// Persist a short error message and emit the terminal chunk.
fn finalize_with_error(
    store: &Store,
    emitter: &Arc<dyn Emitter>,
    conversation_id: &str,
    reason: &str,
) {
    let mut text = format!("[error] {reason}");
    text.truncate(120);
    let message = Message {
        id: Uuid::new_v4().to_string(),
        conversation_id: conversation_id.to_string(),
        role: MessageRole::Assistant,
        content: text.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        metadata: json!({ "error": true }),
    };
    if let Err(e) = store.conversations.insert_message(&message) {
        warn!(conversation_id, "failed to persist chat error message: {e}");
    }
    emitter.emit(
        CHAT_MESSAGE_CHUNK,
        json!({
            "conversation_id": conversation_id,
            "chunk": text,
            "done": true,
            "error": true,
            "message_id": message.id,
        }),
    );
}

fn activity_context_prompt(activities: &[Activity]) -> String {
    if activities.is_empty() {
        return "The user wants to discuss their recent activities.".to_string();
    }
    let mut parts = vec!["The user performed these recorded activities:".to_string()];
    for activity in activities {
        parts.push(format!(
            "\n[{} - {}] {}",
            activity.start_time, activity.end_time, activity.title
        ));
        if !activity.description.is_empty() {
            parts.push(format!("  {}", activity.description));
        }
    }
    parts.push("\nAnswer questions about these activities with this context.".to_string());
    parts.join("\n")
}
