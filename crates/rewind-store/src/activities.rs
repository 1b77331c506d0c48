use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::types::Activity;
use crate::util::{json_vec, now_rfc3339, vec_json};

/// Repository for activity (work session) rows.
#[derive(Clone)]
pub struct ActivityRepo {
    conn: Arc<Mutex<Connection>>,
}

impl ActivityRepo {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn save(&self, activity: &Activity) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        conn.execute(
            "INSERT OR REPLACE INTO activities
             (id, title, description, start_time, end_time, source_event_ids,
              session_duration_minutes, topic_tags, version, deleted,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, 0, ?9, ?9)",
            rusqlite::params![
                activity.id,
                activity.title,
                activity.description,
                activity.start_time,
                activity.end_time,
                vec_json(&activity.source_event_ids),
                activity.session_duration_minutes,
                vec_json(&activity.topic_tags),
                now,
            ],
        )?;
        debug!(activity_id = %activity.id, "activity saved");
        Ok(())
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<Activity>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            &format!("{SELECT_COLS} FROM activities WHERE id = ?1 AND deleted = 0"),
            [id],
            row_to_activity,
        ) {
            Ok(a) => Ok(Some(a)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    pub fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Activity>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(a) = self.get_by_id(id)? {
                out.push(a);
            }
        }
        Ok(out)
    }

    pub fn get_recent(&self, limit: usize) -> Result<Vec<Activity>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLS} FROM activities WHERE deleted = 0
             ORDER BY start_time DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map([limit as i64], row_to_activity)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// All non-deleted activities ordered by start_time, for overlap checks.
    pub fn get_all_ordered(&self) -> Result<Vec<Activity>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLS} FROM activities WHERE deleted = 0 ORDER BY start_time"
        ))?;
        let rows = stmt.query_map([], row_to_activity)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Rewrite a row from a user edit or an overlap merge. Bumps `version`
    /// and returns the updated row.
    pub fn update(&self, activity: &Activity) -> Result<Activity> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        let changed = conn.execute(
            "UPDATE activities
             SET title = ?1, description = ?2, start_time = ?3, end_time = ?4,
                 source_event_ids = ?5, session_duration_minutes = ?6,
                 topic_tags = ?7, version = version + 1, updated_at = ?8
             WHERE id = ?9 AND deleted = 0",
            rusqlite::params![
                activity.title,
                activity.description,
                activity.start_time,
                activity.end_time,
                vec_json(&activity.source_event_ids),
                activity.session_duration_minutes,
                vec_json(&activity.topic_tags),
                now,
                activity.id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                kind: "activity",
                id: activity.id.clone(),
            });
        }
        conn.query_row(
            &format!("{SELECT_COLS} FROM activities WHERE id = ?1"),
            [&activity.id],
            row_to_activity,
        )
        .map_err(StoreError::Database)
    }

    /// Soft delete. Deleting an already-deleted row is a no-op.
    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE activities SET deleted = 1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Non-deleted activities whose start_time falls on a calendar date.
    pub fn get_by_date(&self, date: &str) -> Result<Vec<Activity>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLS} FROM activities
             WHERE deleted = 0 AND substr(start_time, 1, 10) = ?1
             ORDER BY start_time"
        ))?;
        let rows = stmt.query_map([date], row_to_activity)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM activities WHERE deleted = 0",
            [],
            |r| r.get(0),
        )?;
        Ok(n as u64)
    }
}

const SELECT_COLS: &str = "SELECT id, title, description, start_time, end_time,
        source_event_ids, session_duration_minutes, topic_tags, version,
        deleted, created_at, updated_at";

fn row_to_activity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Activity> {
    Ok(Activity {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        source_event_ids: json_vec(row.get(5)?),
        session_duration_minutes: row.get(6)?,
        topic_tags: json_vec(row.get(7)?),
        version: row.get(8)?,
        deleted: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}
