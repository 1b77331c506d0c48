use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::Serialize;

use crate::error::Result;
use crate::types::TokenUsage;

/// Aggregate LLM usage over a period.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageSummary {
    pub total_calls: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub models_used: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyUsage {
    pub date: String,
    pub tokens: u64,
    pub calls: u64,
    pub cost: f64,
}

/// Append-only repository for LLM token accounting.
#[derive(Clone)]
pub struct UsageRepo {
    conn: Arc<Mutex<Connection>>,
}

impl UsageRepo {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn record(&self, usage: &TokenUsage) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO llm_token_usage
             (timestamp, model, prompt_tokens, completion_tokens, total_tokens,
              cost, request_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                usage.timestamp,
                usage.model,
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.total_tokens,
                usage.cost,
                usage.request_type,
            ],
        )?;
        Ok(())
    }

    /// Totals for rows with `timestamp >= since` (RFC3339).
    pub fn summary_since(&self, since: &str) -> Result<UsageSummary> {
        let conn = self.conn.lock().unwrap();
        let (calls, tokens, cost, models): (i64, Option<i64>, Option<f64>, Option<String>) =
            conn.query_row(
                "SELECT COUNT(*), SUM(total_tokens), SUM(cost),
                        GROUP_CONCAT(DISTINCT model)
                 FROM llm_token_usage WHERE timestamp >= ?1",
                [since],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;
        Ok(UsageSummary {
            total_calls: calls as u64,
            total_tokens: tokens.unwrap_or(0) as u64,
            total_cost: cost.unwrap_or(0.0),
            models_used: models
                .map(|s| s.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
        })
    }

    /// Per-day totals, newest first.
    pub fn daily(&self, days: usize) -> Result<Vec<DailyUsage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT substr(timestamp, 1, 10) AS day,
                    SUM(total_tokens), COUNT(*), SUM(cost)
             FROM llm_token_usage
             GROUP BY day ORDER BY day DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([days as i64], |row| {
            Ok(DailyUsage {
                date: row.get(0)?,
                tokens: row.get::<_, i64>(1)? as u64,
                calls: row.get::<_, i64>(2)? as u64,
                cost: row.get(3)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}
