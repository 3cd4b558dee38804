//! Database schema migrations.
//!
//! Version 1 creates the conversations, appointments, user_sessions and
//! knowledge_base tables. Every timestamp column holds unix milliseconds.

use rusqlite::Connection;
use tracing::info;

use inookey_core::error::InookeyError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), InookeyError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| InookeyError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| InookeyError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), InookeyError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS conversations (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id      TEXT NOT NULL,
            user_message    TEXT NOT NULL,
            ai_response     TEXT NOT NULL,
            intent          TEXT NOT NULL DEFAULT 'general',
            confidence      REAL NOT NULL DEFAULT 0,
            timestamp       INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_session
            ON conversations (session_id, timestamp DESC);

        CREATE TABLE IF NOT EXISTS appointments (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id          TEXT,
            customer_name       TEXT NOT NULL,
            customer_email      TEXT NOT NULL,
            customer_phone      TEXT,
            project_description TEXT NOT NULL,
            preferred_date      TEXT NOT NULL,
            preferred_time      TEXT NOT NULL,
            status              TEXT NOT NULL DEFAULT 'pending'
                                CHECK (status IN ('pending', 'confirmed', 'cancelled', 'completed')),
            notes               TEXT,
            created_at          INTEGER NOT NULL,
            updated_at          INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_appointments_session
            ON appointments (session_id);

        CREATE TABLE IF NOT EXISTS user_sessions (
            session_id      TEXT PRIMARY KEY NOT NULL,
            user_agent      TEXT,
            ip_address      TEXT,
            started_at      INTEGER NOT NULL,
            last_activity   INTEGER NOT NULL,
            total_messages  INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS knowledge_base (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            category    TEXT NOT NULL,
            question    TEXT NOT NULL,
            answer      TEXT NOT NULL,
            keywords    TEXT,
            created_at  INTEGER NOT NULL
        );

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| InookeyError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}
