use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;
use crate::types::KnowledgeItem;
use crate::util::{json_vec, now_rfc3339, vec_json};

/// Repository for knowledge rows (primary + combined tables).
///
/// Read precedence: combined rows hide the primary rows they merged.
#[derive(Clone)]
pub struct KnowledgeRepo {
    conn: Arc<Mutex<Connection>>,
}

impl KnowledgeRepo {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn save(&self, item: &KnowledgeItem) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        conn.execute(
            "INSERT OR REPLACE INTO knowledge
             (id, title, description, keywords, source_action_id, deleted,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
            rusqlite::params![
                item.id,
                item.title,
                item.description,
                vec_json(&item.keywords),
                item.source_action_id,
                now,
            ],
        )?;
        debug!(knowledge_id = %item.id, "knowledge saved");
        Ok(())
    }

    pub fn save_combined(&self, item: &KnowledgeItem) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        conn.execute(
            "INSERT OR REPLACE INTO combined_knowledge
             (id, title, description, keywords, merged_from_ids, deleted,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
            rusqlite::params![
                item.id,
                item.title,
                item.description,
                vec_json(&item.keywords),
                vec_json(&item.merged_from_ids),
                now,
            ],
        )?;
        debug!(knowledge_id = %item.id, "combined knowledge saved");
        Ok(())
    }

    /// Primary rows not yet covered by a combined row, newest first.
    pub fn get_unmerged(&self) -> Result<Vec<KnowledgeItem>> {
        let merged = self.merged_source_ids()?;
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, description, keywords, source_action_id,
                    deleted, created_at
             FROM knowledge WHERE deleted = 0 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_primary)?;
        Ok(rows
            .filter_map(|r| r.ok())
            .filter(|k| !merged.contains(&k.id))
            .collect())
    }

    /// Merged rows first; primary rows that no merged row covers appended.
    pub fn get_list(&self) -> Result<Vec<KnowledgeItem>> {
        let merged_ids = self.merged_source_ids()?;
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, title, description, keywords, merged_from_ids,
                    deleted, created_at
             FROM combined_knowledge WHERE deleted = 0
             ORDER BY created_at DESC",
        )?;
        let mut out: Vec<KnowledgeItem> = stmt
            .query_map([], row_to_combined)?
            .filter_map(|r| r.ok())
            .collect();

        let mut stmt = conn.prepare(
            "SELECT id, title, description, keywords, source_action_id,
                    deleted, created_at
             FROM knowledge WHERE deleted = 0 ORDER BY created_at DESC",
        )?;
        out.extend(
            stmt.query_map([], row_to_primary)?
                .filter_map(|r| r.ok())
                .filter(|k| !merged_ids.contains(&k.id)),
        );
        Ok(out)
    }

    /// Soft delete a batch of primary rows (after merging).
    pub fn delete_batch(&self, ids: &[String]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = now_rfc3339();
        for id in ids {
            tx.execute(
                "UPDATE knowledge SET deleted = 1, updated_at = ?1 WHERE id = ?2",
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
            "UPDATE combined_knowledge SET deleted = 1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, id],
        )?;
        conn.execute(
            "UPDATE knowledge SET deleted = 1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, id],
        )?;
        Ok(())
    }

    pub fn count_by_date(&self, date: &str) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let primary: i64 = conn.query_row(
            "SELECT COUNT(*) FROM knowledge
             WHERE deleted = 0 AND substr(created_at, 1, 10) = ?1",
            [date],
            |r| r.get(0),
        )?;
        let combined: i64 = conn.query_row(
            "SELECT COUNT(*) FROM combined_knowledge
             WHERE deleted = 0 AND substr(created_at, 1, 10) = ?1",
            [date],
            |r| r.get(0),
        )?;
        Ok((primary + combined) as u64)
    }

    /// Ids hidden by any non-deleted combined row.
    fn merged_source_ids(&self) -> Result<std::collections::HashSet<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT merged_from_ids FROM combined_knowledge WHERE deleted = 0")?;
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

fn row_to_primary(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeItem> {
    Ok(KnowledgeItem {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        keywords: json_vec(row.get(3)?),
        source_action_id: row.get(4)?,
        merged_from_ids: Vec::new(),
        deleted: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn row_to_combined(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeItem> {
    Ok(KnowledgeItem {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        keywords: json_vec(row.get(3)?),
        source_action_id: None,
        merged_from_ids: json_vec(row.get(4)?),
        deleted: row.get(5)?,
        created_at: row.get(6)?,
    })
}
