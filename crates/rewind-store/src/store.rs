use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::info;

use crate::actions::ActionRepo;
use crate::activities::ActivityRepo;
use crate::conversations::ConversationRepo;
use crate::db::init_db;
use crate::diaries::DiaryRepo;
use crate::error::Result;
use crate::events::EventRepo;
use crate::knowledge::KnowledgeRepo;
use crate::models::ModelRepo;
use crate::preferences::PreferenceRepo;
use crate::settings::SettingsRepo;
use crate::thumbnails::ThumbnailRepo;
use crate::todos::TodoRepo;
use crate::usage::UsageRepo;

/// The single persistent store: one SQLite file, per-domain repositories
/// sharing one connection behind a Mutex.
///
/// Agents and command handlers only ever talk to the repositories; all
/// mutations are single transactions inside the repository methods.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    pub actions: ActionRepo,
    pub events: EventRepo,
    pub activities: ActivityRepo,
    pub knowledge: KnowledgeRepo,
    pub todos: TodoRepo,
    pub diaries: DiaryRepo,
    pub conversations: ConversationRepo,
    pub models: ModelRepo,
    pub usage: UsageRepo,
    pub settings: SettingsRepo,
    pub preferences: PreferenceRepo,
    pub thumbnails: ThumbnailRepo,
}

impl Store {
    /// Open (creating if needed) the database file and initialise the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn)?;
        info!(path = %path.display(), "store opened");
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        let conn = Arc::new(Mutex::new(conn));
        Ok(Self {
            actions: ActionRepo::new(conn.clone()),
            events: EventRepo::new(conn.clone()),
            activities: ActivityRepo::new(conn.clone()),
            knowledge: KnowledgeRepo::new(conn.clone()),
            todos: TodoRepo::new(conn.clone()),
            diaries: DiaryRepo::new(conn.clone()),
            conversations: ConversationRepo::new(conn.clone()),
            models: ModelRepo::new(conn.clone()),
            usage: UsageRepo::new(conn.clone()),
            settings: SettingsRepo::new(conn.clone()),
            preferences: PreferenceRepo::new(conn.clone()),
            thumbnails: ThumbnailRepo::new(conn.clone()),
            conn,
        })
    }

    /// Hard-delete rows that were soft-deleted before `cutoff` (RFC3339).
    /// Returns per-table deletion counts.
    pub fn purge_deleted_older_than(&self, cutoff: &str) -> Result<HashMap<&'static str, usize>> {
        const TABLES: &[&str] = &[
            "actions",
            "events",
            "activities",
            "knowledge",
            "combined_knowledge",
            "todos",
            "combined_todos",
            "diaries",
        ];
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut counts = HashMap::new();
        for table in TABLES {
            let n = tx.execute(
                &format!("DELETE FROM {table} WHERE deleted = 1 AND updated_at < ?1"),
                [cutoff],
            )?;
            if n > 0 {
                counts.insert(*table, n);
            }
        }
        tx.commit()?;
        Ok(counts)
    }
}
