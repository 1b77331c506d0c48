use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;
use crate::types::Event;
use crate::util::{json_vec, now_rfc3339, vec_json};

/// Repository for event rows.
#[derive(Clone)]
pub struct EventRepo {
    conn: Arc<Mutex<Connection>>,
}

impl EventRepo {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn save(&self, event: &Event) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        conn.execute(
            "INSERT OR REPLACE INTO events
             (id, title, description, keywords, start_time, end_time,
              source_action_ids, aggregated_into_activity_id, deleted,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)",
            rusqlite::params![
                event.id,
                event.title,
                event.description,
                vec_json(&event.keywords),
                event.start_time,
                event.end_time,
                vec_json(&event.source_action_ids),
                event.aggregated_into_activity_id,
                now,
            ],
        )?;
        debug!(event_id = %event.id, "event saved");
        Ok(())
    }

    /// Non-deleted events whose start_time lies in `[start, end]`, oldest first.
    pub fn get_in_timeframe(&self, start: &str, end: &str) -> Result<Vec<Event>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, description, keywords, start_time, end_time,
                    source_action_ids, aggregated_into_activity_id, deleted, created_at
             FROM events
             WHERE deleted = 0 AND start_time >= ?1 AND start_time <= ?2
             ORDER BY start_time",
        )?;
        let rows = stmt.query_map(rusqlite::params![start, end], row_to_event)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn get_recent(&self, limit: usize) -> Result<Vec<Event>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, description, keywords, start_time, end_time,
                    source_action_ids, aggregated_into_activity_id, deleted, created_at
             FROM events
             WHERE deleted = 0
             ORDER BY start_time DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], row_to_event)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Event>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, description, keywords, start_time, end_time,
                    source_action_ids, aggregated_into_activity_id, deleted, created_at
             FROM events WHERE id = ?1 AND deleted = 0",
        )?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(event) = stmt.query_row([id], row_to_event) {
                out.push(event);
            }
        }
        Ok(out)
    }

    /// Every action id referenced by any non-deleted event.
    pub fn get_all_source_action_ids(&self) -> Result<HashSet<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT source_action_ids FROM events WHERE deleted = 0")?;
        let rows = stmt.query_map([], |row| row.get::<_, Option<String>>(0))?;
        let mut ids = HashSet::new();
        for raw in rows.filter_map(|r| r.ok()) {
            for id in json_vec(raw) {
                ids.insert(id);
            }
        }
        Ok(ids)
    }

    /// Stamp events as consumed by an activity.
    pub fn mark_aggregated(&self, event_ids: &[String], activity_id: &str) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = now_rfc3339();
        for id in event_ids {
            tx.execute(
                "UPDATE events SET aggregated_into_activity_id = ?1, updated_at = ?2
                 WHERE id = ?3",
                rusqlite::params![activity_id, now, id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Soft delete. Deleting an already-deleted row is a no-op.
    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE events SET deleted = 1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Count of non-deleted events whose start_time falls on the given
    /// calendar date (YYYY-MM-DD).
    pub fn count_by_date(&self, date: &str) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events
             WHERE deleted = 0 AND substr(start_time, 1, 10) = ?1",
            [date],
            |r| r.get(0),
        )?;
        Ok(n as u64)
    }
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        keywords: json_vec(row.get(3)?),
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        source_action_ids: json_vec(row.get(6)?),
        aggregated_into_activity_id: row.get(7)?,
        deleted: row.get(8)?,
        created_at: row.get(9)?,
    })
}
