// Daimon Engine — Memory Store
// Embedded SQLite (rusqlite) holding every durable table the engine owns.
// Each process / worker opens its own connection to the same file; WAL mode
// plus a busy timeout lets the dashboard read while the orchestrator writes.
//
// Module layout:
//   schema          — idempotent DDL
//   working_memory  — ephemeral per-thread entries, traces, sweep
//   profiles        — per-user profiles and third-party dossiers
//   global_state    — fixed scalar keys with defaults
//   session_map     — (channel, thread) → backend session handle with TTL
//   whispers        — advisory observations awaiting injection
//   inbox           — durable inbound queue with idempotent claim

use crate::atoms::error::{EngineError, EngineResult};
use chrono::{SecondsFormat, Utc};
use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod global_state;
mod inbox;
mod profiles;
mod schema;
pub mod session_map;
mod whispers;
mod working_memory;

pub use global_state::{parse_state_lines, GlobalState};
pub use session_map::SessionMap;

/// How long a connection waits on another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Thread-safe database wrapper. One instance per worker; clone-by-`reopen`.
pub struct MemoryStore {
    path: Option<PathBuf>,
    /// `pub(crate)` so submodules can lock it directly.
    pub(crate) conn: Mutex<Connection>,
}

impl MemoryStore {
    /// Open (or create) the store at `path` and initialize tables.
    pub fn open(path: &Path) -> EngineResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("[store] Opening memory store at {:?}", path);
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // journal_mode returns a row, so it cannot go through execute_batch.
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(())).ok();
        schema::run_migrations(&conn)?;
        Ok(MemoryStore { path: Some(path.to_path_buf()), conn: Mutex::new(conn) })
    }

    /// Private in-memory database. Used by tests and terminal sessions that
    /// should leave nothing behind.
    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(MemoryStore { path: None, conn: Mutex::new(conn) })
    }

    /// A fresh connection to the same file, for another worker thread.
    pub fn reopen(&self) -> EngineResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Err(EngineError::Config("an in-memory store cannot be reopened".into())),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Timestamp format used for every TEXT time column. Fixed width with a `Z`
/// suffix so lexical order equals chronological order.
pub(crate) fn now_iso() -> String {
    iso(Utc::now())
}

pub(crate) fn iso(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
