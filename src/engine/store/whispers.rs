use super::{now_iso, MemoryStore};
use crate::atoms::error::EngineResult;
use crate::atoms::types::Whisper;
use rusqlite::params;

impl MemoryStore {
    // ── Whispers ───────────────────────────────────────────────────────

    /// Store an advisory observation for the next cycle. Returns its id.
    pub fn add_whisper(&self, source: &str, content: &str) -> EngineResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO whispers (source, content, created_at) VALUES (?1, ?2, ?3)",
            params![source, content, now_iso()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Whispers not yet consumed, oldest first.
    pub fn pending_whispers(&self) -> EngineResult<Vec<Whisper>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, source, content, created_at FROM whispers
             WHERE consumed_at IS NULL ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(Whisper { id: r.get(0)?, source: r.get(1)?, content: r.get(2)?, created_at: r.get(3)? })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Mark the given whispers consumed. Already-consumed ids are ignored.
    pub fn consume_whispers(&self, ids: &[i64]) -> EngineResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let now = now_iso();
        let mut n = 0;
        for id in ids {
            n += tx.execute(
                "UPDATE whispers SET consumed_at = ?2 WHERE id = ?1 AND consumed_at IS NULL",
                params![id, now],
            )?;
        }
        tx.commit()?;
        Ok(n)
    }
}
