use super::{iso, now_iso, MemoryStore};
use crate::atoms::error::EngineResult;
use crate::atoms::types::{EntryType, NewEntry, WorkingMemoryEntry};
use chrono::{DateTime, Utc};
use log::{info, warn};
use rusqlite::{params, OptionalExtension};

const ENTRY_COLUMNS: &str =
    "id, channel, thread, actor, entry_type, verb, content, metadata, trace_id, created_at";

impl WorkingMemoryEntry {
    /// Map a row selected with ENTRY_COLUMNS → WorkingMemoryEntry.
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let kind: String = row.get(4)?;
        let metadata: String = row.get(7)?;
        Ok(WorkingMemoryEntry {
            id: row.get(0)?,
            channel: row.get(1)?,
            thread: row.get(2)?,
            actor: row.get(3)?,
            // Rows written by a newer build with an unknown type read as mutations.
            entry_type: EntryType::parse(&kind).unwrap_or(EntryType::Mutation),
            verb: row.get(5)?,
            content: row.get(6)?,
            metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
            trace_id: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

impl MemoryStore {
    // ── Working memory ─────────────────────────────────────────────────

    /// Append one entry. Returns its row id.
    pub fn add(&self, entry: &NewEntry<'_>) -> EngineResult<i64> {
        let metadata = entry
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?
            .unwrap_or_else(|| "{}".to_string());
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO working_memory
                (channel, thread, actor, entry_type, verb, content, metadata, trace_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.channel,
                entry.thread,
                entry.actor,
                entry.entry_type.as_str(),
                entry.verb,
                entry.content,
                metadata,
                entry.trace_id,
                now_iso(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The most recent `limit` entries of a thread, oldest first.
    pub fn get_recent(&self, channel: &str, thread: &str, limit: usize) -> EngineResult<Vec<WorkingMemoryEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {cols} FROM (
                SELECT {cols} FROM working_memory
                WHERE channel = ?1 AND thread = ?2
                ORDER BY id DESC LIMIT ?3
             ) ORDER BY id ASC",
            cols = ENTRY_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![channel, thread, limit as i64], WorkingMemoryEntry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every entry of one cycle, in creation order.
    pub fn get_trace(&self, trace_id: &str) -> EngineResult<Vec<WorkingMemoryEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM working_memory WHERE trace_id = ?1 ORDER BY id ASC",
            ENTRY_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![trace_id], WorkingMemoryEntry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Number of entries currently held for a thread.
    pub fn count_entries(&self, channel: &str, thread: &str) -> EngineResult<i64> {
        let conn = self.conn.lock();
        let n = conn.query_row(
            "SELECT COUNT(*) FROM working_memory WHERE channel = ?1 AND thread = ?2",
            params![channel, thread],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    /// All entries of one type in a thread, oldest first.
    pub fn entries_of_type(
        &self,
        channel: &str,
        thread: &str,
        entry_type: EntryType,
    ) -> EngineResult<Vec<WorkingMemoryEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM working_memory
             WHERE channel = ?1 AND thread = ?2 AND entry_type = ?3
             ORDER BY id ASC",
            ENTRY_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![channel, thread, entry_type.as_str()], WorkingMemoryEntry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Attach a narrator-chosen verb to the newest user message of a thread.
    /// The only in-place update working memory ever sees. Returns whether a
    /// row was found.
    pub fn set_verb_on_latest_user_message(&self, channel: &str, thread: &str, verb: &str) -> EngineResult<bool> {
        let conn = self.conn.lock();
        let latest: Option<i64> = conn
            .query_row(
                "SELECT id FROM working_memory
                 WHERE channel = ?1 AND thread = ?2 AND entry_type = ?3
                 ORDER BY id DESC LIMIT 1",
                params![channel, thread, EntryType::UserMessage.as_str()],
                |r| r.get(0),
            )
            .optional()?;
        match latest {
            Some(id) => {
                conn.execute("UPDATE working_memory SET verb = ?1 WHERE id = ?2", params![verb, id])?;
                Ok(true)
            }
            None => {
                warn!("[store] No user message in {}/{} to attach verb '{}'", channel, thread, verb);
                Ok(false)
            }
        }
    }

    /// Delete entries older than `max_age_hours`. Returns the count removed.
    pub fn cleanup(&self, max_age_hours: i64) -> EngineResult<usize> {
        self.cleanup_before(Utc::now() - chrono::Duration::hours(max_age_hours))
    }

    /// Delete entries created strictly before `cutoff`.
    pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> EngineResult<usize> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM working_memory WHERE created_at < ?1",
            params![iso(cutoff)],
        )?;
        if deleted > 0 {
            info!("[store] Swept {} working-memory entr(ies) older than {}", deleted, iso(cutoff));
        }
        Ok(deleted)
    }
}
