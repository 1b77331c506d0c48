use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::types::ThumbnailRecord;
use crate::util::now_rfc3339;

/// Metadata rows for persisted screenshot thumbnails.
/// The JPEG files themselves live under `<data_dir>/screenshots/`.
#[derive(Clone)]
pub struct ThumbnailRepo {
    conn: Arc<Mutex<Connection>>,
}

impl ThumbnailRepo {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn save(&self, record: &ThumbnailRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO image_thumbnails
             (hash, thumbnail_path, width, height, bytes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.hash,
                record.thumbnail_path,
                record.width,
                record.height,
                record.bytes as i64,
                now_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, hash: &str) -> Result<Option<ThumbnailRecord>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            "SELECT hash, thumbnail_path, width, height, bytes, created_at
             FROM image_thumbnails WHERE hash = ?1",
            [hash],
            row_to_thumbnail,
        ) {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    pub fn exists(&self, hash: &str) -> Result<bool> {
        Ok(self.get(hash)?.is_some())
    }

    pub fn all(&self) -> Result<Vec<ThumbnailRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT hash, thumbnail_path, width, height, bytes, created_at
             FROM image_thumbnails",
        )?;
        let rows = stmt.query_map([], row_to_thumbnail)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn remove(&self, hash: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM image_thumbnails WHERE hash = ?1", [hash])?;
        Ok(())
    }
}

fn row_to_thumbnail(row: &rusqlite::Row<'_>) -> rusqlite::Result<ThumbnailRecord> {
    Ok(ThumbnailRecord {
        hash: row.get(0)?,
        thumbnail_path: row.get(1)?,
        width: row.get(2)?,
        height: row.get(3)?,
        bytes: row.get::<_, i64>(4)? as u64,
        created_at: row.get(5)?,
    })
}
