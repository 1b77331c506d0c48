use rusqlite::{Connection, Result};

/// Initialise all tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_artifact_tables(conn)?;
    create_knowledge_tables(conn)?;
    create_todo_tables(conn)?;
    create_diary_table(conn)?;
    create_chat_tables(conn)?;
    create_model_tables(conn)?;
    create_misc_tables(conn)?;
    Ok(())
}

fn create_artifact_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS actions (
            id                  TEXT PRIMARY KEY,
            title               TEXT NOT NULL,
            description         TEXT NOT NULL,
            keywords            TEXT NOT NULL DEFAULT '[]',
            timestamp           TEXT NOT NULL,
            screenshots         TEXT NOT NULL DEFAULT '[]',
            knowledge_extracted INTEGER NOT NULL DEFAULT 0,
            extract_knowledge   INTEGER NOT NULL DEFAULT 0,
            deleted             INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_actions_timestamp
            ON actions(timestamp);

        CREATE TABLE IF NOT EXISTS events (
            id                          TEXT PRIMARY KEY,
            title                       TEXT NOT NULL,
            description                 TEXT NOT NULL,
            keywords                    TEXT NOT NULL DEFAULT '[]',
            start_time                  TEXT NOT NULL,
            end_time                    TEXT NOT NULL,
            source_action_ids           TEXT NOT NULL DEFAULT '[]',
            aggregated_into_activity_id TEXT,
            deleted                     INTEGER NOT NULL DEFAULT 0,
            created_at                  TEXT NOT NULL,
            updated_at                  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_start
            ON events(start_time);

        CREATE TABLE IF NOT EXISTS activities (
            id                       TEXT PRIMARY KEY,
            title                    TEXT NOT NULL,
            description              TEXT NOT NULL,
            start_time               TEXT NOT NULL,
            end_time                 TEXT NOT NULL,
            source_event_ids         TEXT NOT NULL DEFAULT '[]',
            session_duration_minutes INTEGER,
            topic_tags               TEXT NOT NULL DEFAULT '[]',
            version                  INTEGER NOT NULL DEFAULT 1,
            deleted                  INTEGER NOT NULL DEFAULT 0,
            created_at               TEXT NOT NULL,
            updated_at               TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_activities_start
            ON activities(start_time);",
    )
}

fn create_knowledge_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS knowledge (
            id               TEXT PRIMARY KEY,
            title            TEXT NOT NULL,
            description      TEXT NOT NULL,
            keywords         TEXT NOT NULL DEFAULT '[]',
            source_action_id TEXT,
            deleted          INTEGER NOT NULL DEFAULT 0,
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS combined_knowledge (
            id              TEXT PRIMARY KEY,
            title           TEXT NOT NULL,
            description     TEXT NOT NULL,
            keywords        TEXT NOT NULL DEFAULT '[]',
            merged_from_ids TEXT NOT NULL DEFAULT '[]',
            deleted         INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );",
    )
}

fn create_todo_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS todos (
            id             TEXT PRIMARY KEY,
            title          TEXT NOT NULL,
            description    TEXT NOT NULL,
            keywords       TEXT NOT NULL DEFAULT '[]',
            completed      INTEGER NOT NULL DEFAULT 0,
            scheduled_date TEXT,
            scheduled_time TEXT,
            deleted        INTEGER NOT NULL DEFAULT 0,
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS combined_todos (
            id              TEXT PRIMARY KEY,
            title           TEXT NOT NULL,
            description     TEXT NOT NULL,
            keywords        TEXT NOT NULL DEFAULT '[]',
            merged_from_ids TEXT NOT NULL DEFAULT '[]',
            completed       INTEGER NOT NULL DEFAULT 0,
            scheduled_date  TEXT,
            scheduled_time  TEXT,
            deleted         INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );",
    )
}

fn create_diary_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS diaries (
            id                  TEXT PRIMARY KEY,
            date                TEXT NOT NULL UNIQUE,
            content             TEXT NOT NULL,
            source_activity_ids TEXT NOT NULL DEFAULT '[]',
            deleted             INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );",
    )
}

fn create_chat_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            id                   TEXT PRIMARY KEY,
            title                TEXT NOT NULL,
            related_activity_ids TEXT NOT NULL DEFAULT '[]',
            metadata             TEXT NOT NULL DEFAULT '{}',
            created_at           TEXT NOT NULL,
            updated_at           TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL
                REFERENCES conversations(id) ON DELETE CASCADE,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            timestamp       TEXT NOT NULL,
            metadata        TEXT NOT NULL DEFAULT '{}'
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, timestamp);",
    )
}

fn create_model_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS llm_models (
            id                 TEXT PRIMARY KEY,
            name               TEXT NOT NULL,
            provider           TEXT NOT NULL,
            api_url            TEXT NOT NULL,
            model_name         TEXT NOT NULL,
            input_token_price  REAL NOT NULL DEFAULT 0,
            output_token_price REAL NOT NULL DEFAULT 0,
            currency           TEXT NOT NULL DEFAULT 'USD',
            api_key            TEXT NOT NULL,
            is_active          INTEGER NOT NULL DEFAULT 0,
            last_test_status   TEXT,
            last_tested_at     TEXT,
            last_test_error    TEXT,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS llm_token_usage (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp         TEXT NOT NULL,
            model             TEXT NOT NULL,
            prompt_tokens     INTEGER NOT NULL DEFAULT 0,
            completion_tokens INTEGER NOT NULL DEFAULT 0,
            total_tokens      INTEGER NOT NULL DEFAULT 0,
            cost              REAL NOT NULL DEFAULT 0,
            request_type      TEXT NOT NULL DEFAULT 'unknown'
        );
        CREATE INDEX IF NOT EXISTS idx_usage_timestamp
            ON llm_token_usage(timestamp);",
    )
}

fn create_misc_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS settings (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_preferences (
            id                  TEXT PRIMARY KEY,
            preference_type     TEXT NOT NULL,
            pattern_description TEXT NOT NULL,
            confidence_score    REAL NOT NULL DEFAULT 0.6,
            times_observed      INTEGER NOT NULL DEFAULT 1,
            last_observed       TEXT NOT NULL,
            created_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS image_thumbnails (
            hash           TEXT PRIMARY KEY,
            thumbnail_path TEXT NOT NULL,
            width          INTEGER NOT NULL,
            height         INTEGER NOT NULL,
            bytes          INTEGER NOT NULL,
            created_at     TEXT NOT NULL
        );",
    )
}
