// Session Map — (channel, thread) → backend session handle.
//
// Lets consecutive turns in one thread resume the backend's own conversation
// instead of re-deriving it. A mapping idle longer than the TTL is treated as
// absent and deleted on the read that notices it.

use super::MemoryStore;
use crate::atoms::error::EngineResult;
use crate::atoms::types::SessionMapping;
use chrono::Utc;
use log::{debug, info};
use rusqlite::{params, OptionalExtension};

impl SessionMapping {
    /// Row: (channel, thread, session_handle, created_at, last_used).
    fn from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(SessionMapping {
            channel: r.get(0)?,
            thread: r.get(1)?,
            session_handle: r.get(2)?,
            created_at: r.get(3)?,
            last_used: r.get(4)?,
        })
    }
}

/// Borrowing view over the store's `session_map` table with a fixed TTL.
pub struct SessionMap<'a> {
    store: &'a MemoryStore,
    ttl_secs: i64,
}

impl MemoryStore {
    pub fn sessions(&self, ttl_secs: i64) -> SessionMap<'_> {
        SessionMap { store: self, ttl_secs }
    }
}

fn now_secs() -> i64 {
    Utc::now().timestamp()
}

impl SessionMap<'_> {
    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    pub fn get(&self, channel: &str, thread: &str) -> EngineResult<Option<String>> {
        self.get_at(channel, thread, now_secs())
    }

    /// `get` against an explicit clock (unix seconds).
    pub fn get_at(&self, channel: &str, thread: &str, now: i64) -> EngineResult<Option<String>> {
        let conn = self.store.conn.lock();
        let row = conn
            .query_row(
                "SELECT channel, thread, session_handle, created_at, last_used
                 FROM session_map WHERE channel = ?1 AND thread = ?2",
                params![channel, thread],
                SessionMapping::from_row,
            )
            .optional()?;

        match row {
            Some(m) if now - m.last_used > self.ttl_secs => {
                conn.execute(
                    "DELETE FROM session_map WHERE channel = ?1 AND thread = ?2",
                    params![channel, thread],
                )?;
                debug!(
                    "[sessions] {}/{} expired ({}s idle > {}s)",
                    channel,
                    thread,
                    now - m.last_used,
                    self.ttl_secs
                );
                Ok(None)
            }
            Some(m) => Ok(Some(m.session_handle)),
            None => Ok(None),
        }
    }

    pub fn save(&self, channel: &str, thread: &str, handle: &str) -> EngineResult<()> {
        self.save_at(channel, thread, handle, now_secs())
    }

    /// Idempotent upsert. `created_at` is kept when only the handle changes.
    pub fn save_at(&self, channel: &str, thread: &str, handle: &str, now: i64) -> EngineResult<()> {
        let conn = self.store.conn.lock();
        conn.execute(
            "INSERT INTO session_map (channel, thread, session_handle, created_at, last_used)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(channel, thread) DO UPDATE SET
                session_handle = excluded.session_handle,
                last_used = excluded.last_used",
            params![channel, thread, handle, now],
        )?;
        Ok(())
    }

    /// Refresh recency without changing the handle. Returns whether a
    /// mapping existed.
    pub fn touch(&self, channel: &str, thread: &str) -> EngineResult<bool> {
        self.touch_at(channel, thread, now_secs())
    }

    pub fn touch_at(&self, channel: &str, thread: &str, now: i64) -> EngineResult<bool> {
        let conn = self.store.conn.lock();
        let n = conn.execute(
            "UPDATE session_map SET last_used = ?3 WHERE channel = ?1 AND thread = ?2",
            params![channel, thread, now],
        )?;
        Ok(n > 0)
    }

    /// Delete every stale mapping. Returns the count removed.
    pub fn cleanup(&self) -> EngineResult<usize> {
        self.cleanup_at(now_secs())
    }

    pub fn cleanup_at(&self, now: i64) -> EngineResult<usize> {
        let conn = self.store.conn.lock();
        let n = conn.execute("DELETE FROM session_map WHERE ?1 - last_used > ?2", params![now, self.ttl_secs])?;
        if n > 0 {
            info!("[sessions] Removed {} stale session mapping(s)", n);
        }
        Ok(n)
    }

    /// Raw row, including stale ones. For inspection.
    pub fn mapping(&self, channel: &str, thread: &str) -> EngineResult<Option<SessionMapping>> {
        let conn = self.store.conn.lock();
        let m = conn
            .query_row(
                "SELECT channel, thread, session_handle, created_at, last_used
                 FROM session_map WHERE channel = ?1 AND thread = ?2",
                params![channel, thread],
                SessionMapping::from_row,
            )
            .optional()?;
        Ok(m)
    }
}
