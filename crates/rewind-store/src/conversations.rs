use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::types::{Conversation, Message, MessageRole};
use crate::util::{json_vec, now_rfc3339, vec_json};

/// Repository for conversations and their messages.
///
/// Deleting a conversation cascades to its messages (FK + explicit delete,
/// since SQLite foreign keys are off by default).
#[derive(Clone)]
pub struct ConversationRepo {
    conn: Arc<Mutex<Connection>>,
}

impl ConversationRepo {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn insert(&self, conversation: &Conversation) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO conversations
             (id, title, related_activity_ids, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![
                conversation.id,
                conversation.title,
                vec_json(&conversation.related_activity_ids),
                conversation.metadata.to_string(),
                now,
            ],
        )?;
        debug!(conversation_id = %conversation.id, "conversation created");
        Ok(())
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<Conversation>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            "SELECT id, title, related_activity_ids, metadata, created_at, updated_at
             FROM conversations WHERE id = ?1",
            [id],
            row_to_conversation,
        ) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    pub fn list(&self, limit: usize, offset: usize) -> Result<Vec<Conversation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, related_activity_ids, metadata, created_at, updated_at
             FROM conversations ORDER BY updated_at DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![limit as i64, offset as i64],
            row_to_conversation,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Update title and/or metadata; always bumps `updated_at`.
    pub fn update(
        &self,
        id: &str,
        title: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        if let Some(title) = title {
            conn.execute(
                "UPDATE conversations SET title = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![title, now, id],
            )?;
        }
        if let Some(metadata) = metadata {
            conn.execute(
                "UPDATE conversations SET metadata = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![metadata.to_string(), now, id],
            )?;
        }
        if title.is_none() && metadata.is_none() {
            conn.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![now, id],
            )?;
        }
        Ok(())
    }

    /// Hard delete a conversation and all its messages in one transaction.
    pub fn delete(&self, id: &str) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM messages WHERE conversation_id = ?1", [id])?;
        let n = tx.execute("DELETE FROM conversations WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(n)
    }

    pub fn insert_message(&self, message: &Message) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO messages
             (id, conversation_id, role, content, timestamp, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                message.id,
                message.conversation_id,
                message.role.to_string(),
                message.content,
                message.timestamp,
                message.metadata.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Messages of a conversation in chronological order.
    pub fn get_messages(
        &self,
        conversation_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, role, content, timestamp, metadata
             FROM messages WHERE conversation_id = ?1
             ORDER BY timestamp LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![conversation_id, limit as i64, offset as i64],
            row_to_message,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// The last `limit` messages in chronological order (for LLM context).
    pub fn get_recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, role, content, timestamp, metadata
             FROM messages WHERE conversation_id = ?1
             ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![conversation_id, limit as i64],
            row_to_message,
        )?;
        let mut msgs: Vec<_> = rows.filter_map(|r| r.ok()).collect();
        msgs.reverse();
        Ok(msgs)
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let metadata_raw: String = row.get(3)?;
    Ok(Conversation {
        id: row.get(0)?,
        title: row.get(1)?,
        related_activity_ids: json_vec(row.get(2)?),
        metadata: serde_json::from_str(&metadata_raw)
            .unwrap_or(serde_json::Value::Object(Default::default())),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let role_str: String = row.get(2)?;
    let metadata_raw: String = row.get(5)?;
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: role_str.parse().unwrap_or(MessageRole::User),
        content: row.get(3)?,
        timestamp: row.get(4)?,
        metadata: serde_json::from_str(&metadata_raw)
            .unwrap_or(serde_json::Value::Object(Default::default())),
    })
}
