use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::types::LlmModel;
use crate::util::now_rfc3339;

/// Repository for configured LLM model endpoints.
///
/// Invariant: at most one row has `is_active = 1`; `select` flips the flag
/// inside a single transaction.
#[derive(Clone)]
pub struct ModelRepo {
    conn: Arc<Mutex<Connection>>,
}

impl ModelRepo {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn create(&self, model: &LlmModel) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO llm_models
             (id, name, provider, api_url, model_name, input_token_price,
              output_token_price, currency, api_key, is_active,
              last_test_status, last_tested_at, last_test_error,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, NULL, NULL, NULL, ?10, ?10)",
            rusqlite::params![
                model.id,
                model.name,
                model.provider,
                model.api_url,
                model.model_name,
                model.input_token_price,
                model.output_token_price,
                model.currency,
                model.api_key,
                now,
            ],
        )?;
        info!(model_id = %model.id, name = %model.name, "model created");
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<LlmModel>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLS} FROM llm_models ORDER BY created_at"
        ))?;
        let rows = stmt.query_map([], row_to_model)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<LlmModel>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            &format!("{SELECT_COLS} FROM llm_models WHERE id = ?1"),
            [id],
            row_to_model,
        ) {
            Ok(m) => Ok(Some(m)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    pub fn get_active(&self) -> Result<Option<LlmModel>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            &format!("{SELECT_COLS} FROM llm_models WHERE is_active = 1"),
            [],
            row_to_model,
        ) {
            Ok(m) => Ok(Some(m)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Make a model the single active one.
    pub fn select(&self, id: &str) -> Result<LlmModel> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = now_rfc3339();
        tx.execute(
            "UPDATE llm_models SET is_active = 0, updated_at = ?1 WHERE is_active = 1",
            [&now],
        )?;
        let changed = tx.execute(
            "UPDATE llm_models SET is_active = 1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                kind: "model",
                id: id.to_string(),
            });
        }
        let model = tx.query_row(
            &format!("{SELECT_COLS} FROM llm_models WHERE id = ?1"),
            [id],
            row_to_model,
        )?;
        tx.commit()?;
        info!(model_id = %id, "model selected as active");
        Ok(model)
    }

    pub fn update(&self, model: &LlmModel) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE llm_models
             SET name = ?1, provider = ?2, api_url = ?3, model_name = ?4,
                 input_token_price = ?5, output_token_price = ?6, currency = ?7,
                 api_key = ?8, updated_at = ?9
             WHERE id = ?10",
            rusqlite::params![
                model.name,
                model.provider,
                model.api_url,
                model.model_name,
                model.input_token_price,
                model.output_token_price,
                model.currency,
                model.api_key,
                now_rfc3339(),
                model.id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                kind: "model",
                id: model.id.clone(),
            });
        }
        debug!(model_id = %model.id, "model updated");
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM llm_models WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(StoreError::NotFound {
                kind: "model",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Record the outcome of a live connectivity test.
    pub fn record_test(&self, id: &str, ok: bool, error: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        let status = if ok { "ok" } else { "failed" };
        let changed = conn.execute(
            "UPDATE llm_models
             SET last_test_status = ?1, last_tested_at = ?2, last_test_error = ?3,
                 updated_at = ?2
             WHERE id = ?4",
            rusqlite::params![status, now, error, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                kind: "model",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM llm_models", [], |r| r.get(0))?;
        Ok(n as u64)
    }
}

const SELECT_COLS: &str = "SELECT id, name, provider, api_url, model_name,
        input_token_price, output_token_price, currency, api_key, is_active,
        last_test_status, last_tested_at, last_test_error, created_at, updated_at";

fn row_to_model(row: &rusqlite::Row<'_>) -> rusqlite::Result<LlmModel> {
    Ok(LlmModel {
        id: row.get(0)?,
        name: row.get(1)?,
        provider: row.get(2)?,
        api_url: row.get(3)?,
        model_name: row.get(4)?,
        input_token_price: row.get(5)?,
        output_token_price: row.get(6)?,
        currency: row.get(7)?,
        api_key: row.get(8)?,
        is_active: row.get(9)?,
        last_test_status: row.get(10)?,
        last_tested_at: row.get(11)?,
        last_test_error: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}
