// Durable inbound queue for polling adapters (SMS, WhatsApp).
// A platform message can be fetched more than once; `claim_inbound` is the
// single point that decides which reader processes it, so a duplicate read
// never produces a second visible send.

use super::{now_iso, MemoryStore};
use crate::atoms::error::EngineResult;
use crate::atoms::types::{InboundMessage, InboundRecord};
use log::debug;
use rusqlite::params;

impl MemoryStore {
    // ── Inbound queue ──────────────────────────────────────────────────

    /// Record a message keyed by its platform id. Returns `false` when the
    /// id was already known (the row is left untouched).
    pub fn enqueue_inbound(&self, source_id: &str, message: &InboundMessage) -> EngineResult<bool> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "INSERT OR IGNORE INTO inbound_queue
                (source_id, text, channel, thread, user_id, display_name, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                source_id,
                message.text,
                message.channel,
                message.thread,
                message.user_id,
                message.display_name,
                now_iso(),
            ],
        )?;
        if n == 0 {
            debug!("[inbox] duplicate inbound {}", source_id);
        }
        Ok(n > 0)
    }

    /// Unhandled messages, oldest first.
    pub fn pending_inbound(&self, limit: usize) -> EngineResult<Vec<InboundRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT source_id, text, channel, thread, user_id, display_name, received_at, handled_at
             FROM inbound_queue WHERE handled_at IS NULL
             ORDER BY received_at ASC, rowid ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |r| {
                Ok(InboundRecord {
                    source_id: r.get(0)?,
                    message: InboundMessage {
                        text: r.get(1)?,
                        channel: r.get(2)?,
                        thread: r.get(3)?,
                        user_id: r.get(4)?,
                        display_name: r.get(5)?,
                    },
                    received_at: r.get(6)?,
                    handled_at: r.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Atomically mark a message handled. Only the first caller gets `true`.
    pub fn claim_inbound(&self, source_id: &str) -> EngineResult<bool> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE inbound_queue SET handled_at = ?2 WHERE source_id = ?1 AND handled_at IS NULL",
            params![source_id, now_iso()],
        )?;
        Ok(n == 1)
    }
}
