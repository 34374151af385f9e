// Database schema for the memory store.
// Called once per connection by MemoryStore::open(). Every statement is
// idempotent; adding a table or column means appending a new
// CREATE TABLE IF NOT EXISTS / ALTER TABLE at the end, never editing
// existing SQL.

use crate::atoms::error::EngineResult;
use rusqlite::Connection;

pub(crate) fn run_migrations(conn: &Connection) -> EngineResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS working_memory (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            channel TEXT NOT NULL,
            thread TEXT NOT NULL,
            actor TEXT NOT NULL,
            entry_type TEXT NOT NULL,
            verb TEXT,
            content TEXT NOT NULL DEFAULT '',
            metadata TEXT NOT NULL DEFAULT '{}',
            trace_id TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_wm_thread
            ON working_memory(channel, thread, id);
        CREATE INDEX IF NOT EXISTS idx_wm_trace
            ON working_memory(trace_id, id);
        CREATE INDEX IF NOT EXISTS idx_wm_created
            ON working_memory(created_at);

        CREATE TABLE IF NOT EXISTS user_profiles (
            user_id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL DEFAULT '',
            profile_text TEXT NOT NULL DEFAULT '',
            interaction_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dossiers (
            name TEXT PRIMARY KEY COLLATE NOCASE,
            kind TEXT NOT NULL DEFAULT 'subject',
            content TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS global_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_map (
            channel TEXT NOT NULL,
            thread TEXT NOT NULL,
            session_handle TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            last_used INTEGER NOT NULL,
            PRIMARY KEY (channel, thread)
        );

        CREATE TABLE IF NOT EXISTS whispers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            consumed_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_whispers_pending
            ON whispers(consumed_at, id);

        CREATE TABLE IF NOT EXISTS inbound_queue (
            source_id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            channel TEXT NOT NULL,
            thread TEXT NOT NULL,
            user_id TEXT NOT NULL,
            display_name TEXT NOT NULL DEFAULT '',
            received_at TEXT NOT NULL,
            handled_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_inbound_pending
            ON inbound_queue(handled_at, received_at);
        ",
    )?;
    Ok(())
}
