use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::types::Diary;
use crate::util::{json_vec, now_rfc3339, vec_json};

/// Repository for diary rows, one per calendar date.
#[derive(Clone)]
pub struct DiaryRepo {
    conn: Arc<Mutex<Connection>>,
}

impl DiaryRepo {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Upsert the diary for a date. Regenerating replaces the content.
    pub fn save(&self, diary: &Diary) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO diaries
             (id, date, content, source_activity_ids, deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)
             ON CONFLICT(date) DO UPDATE SET
                content = excluded.content,
                source_activity_ids = excluded.source_activity_ids,
                deleted = 0,
                updated_at = excluded.updated_at",
            rusqlite::params![
                diary.id,
                diary.date,
                diary.content,
                vec_json(&diary.source_activity_ids),
                now,
            ],
        )?;
        debug!(date = %diary.date, "diary saved");
        Ok(())
    }

    pub fn get_by_date(&self, date: &str) -> Result<Option<Diary>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            "SELECT id, date, content, source_activity_ids, deleted, created_at
             FROM diaries WHERE date = ?1 AND deleted = 0",
            [date],
            row_to_diary,
        ) {
            Ok(d) => Ok(Some(d)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    pub fn get_list(&self, limit: usize) -> Result<Vec<Diary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, date, content, source_activity_ids, deleted, created_at
             FROM diaries WHERE deleted = 0
             ORDER BY date DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], row_to_diary)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Soft delete. Deleting an already-deleted row is a no-op.
    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE diaries SET deleted = 1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now_rfc3339(), id],
        )?;
        Ok(())
    }
}

fn row_to_diary(row: &rusqlite::Row<'_>) -> rusqlite::Result<Diary> {
    Ok(Diary {
        id: row.get(0)?,
        date: row.get(1)?,
        content: row.get(2)?,
        source_activity_ids: json_vec(row.get(3)?),
        deleted: row.get(4)?,
        created_at: row.get(5)?,
    })
}
