use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;
use crate::types::Action;
use crate::util::{json_vec, now_rfc3339, vec_json};

/// Repository for action rows.
#[derive(Clone)]
pub struct ActionRepo {
    conn: Arc<Mutex<Connection>>,
}

impl ActionRepo {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Insert a new action. `timestamp` must already be RFC3339.
    pub fn save(&self, action: &Action) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        conn.execute(
            "INSERT OR REPLACE INTO actions
             (id, title, description, keywords, timestamp, screenshots,
              knowledge_extracted, extract_knowledge, deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)",
            rusqlite::params![
                action.id,
                action.title,
                action.description,
                vec_json(&action.keywords),
                action.timestamp,
                vec_json(&action.screenshots),
                action.knowledge_extracted,
                action.extract_knowledge,
                now,
            ],
        )?;
        debug!(action_id = %action.id, "action saved");
        Ok(())
    }

    /// Non-deleted actions whose timestamp lies in `[start, end]`, oldest first.
    pub fn get_in_timeframe(&self, start: &str, end: &str) -> Result<Vec<Action>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, description, keywords, timestamp, screenshots,
                    knowledge_extracted, extract_knowledge, deleted, created_at
             FROM actions
             WHERE deleted = 0 AND timestamp >= ?1 AND timestamp <= ?2
             ORDER BY timestamp",
        )?;
        let rows = stmt.query_map(rusqlite::params![start, end], row_to_action)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Action>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, description, keywords, timestamp, screenshots,
                    knowledge_extracted, extract_knowledge, deleted, created_at
             FROM actions WHERE id = ?1 AND deleted = 0",
        )?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(action) = stmt.query_row([id], row_to_action) {
                out.push(action);
            }
        }
        Ok(out)
    }

    /// Actions flagged for knowledge extraction that have not been processed.
    pub fn get_pending_knowledge_extraction(&self, limit: usize) -> Result<Vec<Action>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, description, keywords, timestamp, screenshots,
                    knowledge_extracted, extract_knowledge, deleted, created_at
             FROM actions
             WHERE deleted = 0 AND extract_knowledge = 1 AND knowledge_extracted = 0
             ORDER BY timestamp
             LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], row_to_action)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn mark_knowledge_extracted(&self, ids: &[String]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = now_rfc3339();
        for id in ids {
            tx.execute(
                "UPDATE actions SET knowledge_extracted = 1, updated_at = ?1 WHERE id = ?2",
                rusqlite::params![now, id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Soft delete. Deleting an already-deleted row is a no-op.
    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE actions SET deleted = 1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Every screenshot hash referenced by a non-deleted action.
    /// Used by the cleanup agent to garbage-collect orphaned thumbnails.
    pub fn live_screenshot_hashes(&self) -> Result<std::collections::HashSet<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT screenshots FROM actions WHERE deleted = 0")?;
        let rows = stmt.query_map([], |row| row.get::<_, Option<String>>(0))?;
        let mut hashes = std::collections::HashSet::new();
        for raw in rows.filter_map(|r| r.ok()) {
            for h in json_vec(raw) {
                hashes.insert(h);
            }
        }
        Ok(hashes)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let n: i64 =
            conn.query_row("SELECT COUNT(*) FROM actions WHERE deleted = 0", [], |r| {
                r.get(0)
            })?;
        Ok(n as u64)
    }
}

fn row_to_action(row: &rusqlite::Row<'_>) -> rusqlite::Result<Action> {
    Ok(Action {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        keywords: json_vec(row.get(3)?),
        timestamp: row.get(4)?,
        screenshots: json_vec(row.get(5)?),
        knowledge_extracted: row.get(6)?,
        extract_knowledge: row.get(7)?,
        deleted: row.get(8)?,
        created_at: row.get(9)?,
    })
}
