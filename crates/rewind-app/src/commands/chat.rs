//! Chat commands: conversation lifecycle and streaming messages.

use serde::Deserialize;

use rewind_store::types::{Conversation, Message};

use crate::app::App;
use crate::response::{CommandResponse, Empty};

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub related_activity_ids: Vec<String>,
}

fn default_title() -> String {
    "New conversation".to_string()
}

pub async fn create_conversation(
    app: &App,
    req: CreateConversationRequest,
) -> CommandResponse<Conversation> {
    match app
        .chat()
        .create_conversation(&req.title, req.related_activity_ids)
    {
        Ok(conversation) => CommandResponse::ok(conversation),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

pub async fn create_conversation_from_activities(
    app: &App,
    activity_ids: Vec<String>,
) -> CommandResponse<Conversation> {
    match app.chat().create_conversation_from_activities(&activity_ids) {
        Ok(conversation) => CommandResponse::ok(conversation),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: String,
    pub content: String,
}

/// Kicks off the stream; chunks arrive as `chat-message-chunk` events.
pub async fn send_message(app: &App, req: SendMessageRequest) -> CommandResponse<Empty> {
    match app.chat().send_message(&req.conversation_id, &req.content).await {
        Ok(()) => CommandResponse::ok(Empty {}),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

pub async fn get_conversations(
    app: &App,
    limit: usize,
    offset: usize,
) -> CommandResponse<Vec<Conversation>> {
    match app.chat().get_conversations(limit.clamp(1, 200), offset) {
        Ok(conversations) => CommandResponse::ok(conversations),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

pub async fn get_messages(
    app: &App,
    conversation_id: &str,
    limit: usize,
    offset: usize,
) -> CommandResponse<Vec<Message>> {
    match app
        .chat()
        .get_messages(conversation_id, limit.clamp(1, 500), offset)
    {
        Ok(messages) => CommandResponse::ok(messages),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

pub async fn delete_conversation(app: &App, conversation_id: &str) -> CommandResponse<Empty> {
    match app.chat().delete_conversation(conversation_id) {
        Ok(true) => CommandResponse::ok(Empty {}),
        Ok(false) => CommandResponse::err(format!("conversation not found: {conversation_id}")),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}
