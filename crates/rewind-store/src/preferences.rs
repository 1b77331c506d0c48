use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::types::SessionPreference;
use crate::util::now_rfc3339;

/// Learned session-clustering preferences from user merge/split edits.
#[derive(Clone)]
pub struct PreferenceRepo {
    conn: Arc<Mutex<Connection>>,
}

impl PreferenceRepo {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Store a newly learned pattern at its initial confidence.
    pub fn save_pattern(
        &self,
        preference_type: &str,
        pattern_description: &str,
        confidence_score: f64,
    ) -> Result<SessionPreference> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO session_preferences
             (id, preference_type, pattern_description, confidence_score,
              times_observed, last_observed, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
            rusqlite::params![id, preference_type, pattern_description, confidence_score, now],
        )?;
        debug!(pattern = %pattern_description, "session preference learned");
        Ok(SessionPreference {
            id,
            preference_type: preference_type.to_string(),
            pattern_description: pattern_description.to_string(),
            confidence_score,
            times_observed: 1,
            last_observed: now.clone(),
            created_at: now,
        })
    }

    /// Most recently observed patterns above a confidence floor.
    pub fn recent_patterns(
        &self,
        limit: usize,
        min_confidence: f64,
    ) -> Result<Vec<SessionPreference>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, preference_type, pattern_description, confidence_score,
                    times_observed, last_observed, created_at
             FROM session_preferences
             WHERE confidence_score >= ?1
             ORDER BY last_observed DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![min_confidence, limit as i64],
            |row| {
                Ok(SessionPreference {
                    id: row.get(0)?,
                    preference_type: row.get(1)?,
                    pattern_description: row.get(2)?,
                    confidence_score: row.get(3)?,
                    times_observed: row.get::<_, i64>(4)? as u32,
                    last_observed: row.get(5)?,
                    created_at: row.get(6)?,
                })
            },
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}
