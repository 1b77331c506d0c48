use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::types::TodoItem;
use crate::util::{json_vec, now_rfc3339, vec_json};

/// Repository for TODO rows (primary + combined tables).
#[derive(Clone)]
pub struct TodoRepo {
    conn: Arc<Mutex<Connection>>,
}

impl TodoRepo {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn save(&self, todo: &TodoItem) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        conn.execute(
            "INSERT OR REPLACE INTO todos
             (id, title, description, keywords, completed, scheduled_date,
              scheduled_time, deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, 0, ?7, ?7)",
            rusqlite::params![
                todo.id,
                todo.title,
                todo.description,
                vec_json(&todo.keywords),
                todo.scheduled_date,
                todo.scheduled_time,
                now,
            ],
        )?;
        debug!(todo_id = %todo.id, "todo saved");
        Ok(())
    }

    pub fn save_combined(&self, todo: &TodoItem) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        conn.execute(
            "INSERT OR REPLACE INTO combined_todos
             (id, title, description, keywords, merged_from_ids, completed,
              scheduled_date, scheduled_time, deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, 0, ?8, ?8)",
            rusqlite::params![
                todo.id,
                todo.title,
                todo.description,
                vec_json(&todo.keywords),
                vec_json(&todo.merged_from_ids),
                todo.scheduled_date,
                todo.scheduled_time,
                now,
            ],
        )?;
        debug!(todo_id = %todo.id, "combined todo saved");
        Ok(())
    }

    /// Primary rows not yet covered by a combined row.
    pub fn get_unmerged(&self) -> Result<Vec<TodoItem>> {
        let merged = self.merged_source_ids()?;
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, description, keywords, completed,
                    scheduled_date, scheduled_time, deleted, created_at
             FROM todos WHERE deleted = 0 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_primary)?;
        Ok(rows
            .filter_map(|r| r.ok())
            .filter(|t| !merged.contains(&t.id))
            .collect())
    }

    /// Combined rows first, then uncovered primary rows. Completed rows are
    /// excluded unless `include_completed`.
    pub fn get_list(&self, include_completed: bool) -> Result<Vec<TodoItem>> {
        let merged_ids = self.merged_source_ids()?;
        let completed_clause = if include_completed {
            ""
        } else {
            " AND completed = 0"
        };
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(&format!(
            "SELECT id, title, description, keywords, merged_from_ids, completed,
                    scheduled_date, scheduled_time, deleted, created_at
             FROM combined_todos WHERE deleted = 0{completed_clause}
             ORDER BY completed ASC, created_at DESC"
        ))?;
        let mut out: Vec<TodoItem> = stmt
            .query_map([], row_to_combined)?
            .filter_map(|r| r.ok())
            .collect();

        let mut stmt = conn.prepare(&format!(
            "SELECT id, title, description, keywords, completed,
                    scheduled_date, scheduled_time, deleted, created_at
             FROM todos WHERE deleted = 0{completed_clause}
             ORDER BY completed ASC, created_at DESC"
        ))?;
        out.extend(
            stmt.query_map([], row_to_primary)?
                .filter_map(|r| r.ok())
                .filter(|t| !merged_ids.contains(&t.id)),
        );
        Ok(out)
    }

    /// Schedule a todo to a date (and optional HH:MM time). Tries the
    /// combined table first, then the primary. Returns the updated row.
    pub fn schedule(
        &self,
        id: &str,
        date: Option<&str>,
        time: Option<&str>,
    ) -> Result<TodoItem> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();

        let changed = conn.execute(
            "UPDATE combined_todos SET scheduled_date = ?1, scheduled_time = ?2,
             updated_at = ?3 WHERE id = ?4 AND deleted = 0",
            rusqlite::params![date, time, now, id],
        )?;
        if changed > 0 {
            return conn
                .query_row(
                    "SELECT id, title, description, keywords, merged_from_ids,
                            completed, scheduled_date, scheduled_time, deleted, created_at
                     FROM combined_todos WHERE id = ?1",
                    [id],
                    row_to_combined,
                )
                .map_err(StoreError::Database);
        }

        let changed = conn.execute(
            "UPDATE todos SET scheduled_date = ?1, scheduled_time = ?2,
             updated_at = ?3 WHERE id = ?4 AND deleted = 0",
            rusqlite::params![date, time, now, id],
        )?;
        if changed > 0 {
            return conn
                .query_row(
                    "SELECT id, title, description, keywords, completed,
                            scheduled_date, scheduled_time, deleted, created_at
                     FROM todos WHERE id = ?1",
                    [id],
                    row_to_primary,
                )
                .map_err(StoreError::Database);
        }

        Err(StoreError::NotFound {
            kind: "todo",
            id: id.to_string(),
        })
    }

    pub fn set_completed(&self, id: &str, completed: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        conn.execute(
            "UPDATE combined_todos SET completed = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![completed, now, id],
        )?;
        conn.execute(
            "UPDATE todos SET completed = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![completed, now, id],
        )?;
        Ok(())
    }

    /// Soft delete a batch of primary rows (after merging).
    pub fn delete_batch(&self, ids: &[String]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = now_rfc3339();
        for id in ids {
            tx.execute(
                "UPDATE todos SET deleted = 1, updated_at = ?1 WHERE id = ?2",
                rusqlite::params![now, id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Soft delete one row in either table. Idempotent.
    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        conn.execute(
            "UPDATE combined_todos SET deleted = 1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, id],
        )?;
        conn.execute(
            "UPDATE todos SET deleted = 1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, id],
        )?;
        Ok(())
    }

    fn merged_source_ids(&self) -> Result<std::collections::HashSet<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT merged_from_ids FROM combined_todos WHERE deleted = 0")?;
        let rows = stmt.query_map([], |row| row.get::<_, Option<String>>(0))?;
        let mut ids = std::collections::HashSet::new();
        for raw in rows.filter_map(|r| r.ok()) {
            for id in json_vec(raw) {
                ids.insert(id);
            }
        }
        Ok(ids)
    }
}

fn row_to_primary(row: &rusqlite::Row<'_>) -> rusqlite::Result<TodoItem> {
    Ok(TodoItem {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        keywords: json_vec(row.get(3)?),
        merged_from_ids: Vec::new(),
        completed: row.get(4)?,
        scheduled_date: row.get(5)?,
        scheduled_time: row.get(6)?,
        deleted: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn row_to_combined(row: &rusqlite::Row<'_>) -> rusqlite::Result<TodoItem> {
    Ok(TodoItem {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        keywords: json_vec(row.get(3)?),
        merged_from_ids: json_vec(row.get(4)?),
        completed: row.get(5)?,
        scheduled_date: row.get(6)?,
        scheduled_time: row.get(7)?,
        deleted: row.get(8)?,
        created_at: row.get(9)?,
    })
}
