use super::{now_iso, MemoryStore};
use crate::atoms::error::EngineResult;
use crate::atoms::types::{Dossier, DossierKind, UserProfile};
use crate::engine::profile;
use log::info;
use rusqlite::{params, OptionalExtension};

impl UserProfile {
    /// Row: (user_id, display_name, profile_text, interaction_count, created_at, updated_at).
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(UserProfile {
            user_id: row.get(0)?,
            display_name: row.get(1)?,
            profile_text: row.get(2)?,
            interaction_count: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

impl Dossier {
    /// Row: (name, kind, content, created_at, updated_at).
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let kind: String = row.get(1)?;
        Ok(Dossier {
            name: row.get(0)?,
            kind: DossierKind::parse(&kind),
            content: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}

impl MemoryStore {
    // ── User profiles ──────────────────────────────────────────────────

    pub fn get_profile(&self, user_id: &str) -> EngineResult<Option<UserProfile>> {
        let conn = self.conn.lock();
        let p = conn
            .query_row(
                "SELECT user_id, display_name, profile_text, interaction_count, created_at, updated_at
                 FROM user_profiles WHERE user_id = ?1",
                params![user_id],
                UserProfile::from_row,
            )
            .optional()?;
        Ok(p)
    }

    /// Fetch the profile, creating it from the blank template on first contact.
    /// Returns the profile and whether it was just created.
    pub fn get_or_create_profile(&self, user_id: &str, display_name: &str) -> EngineResult<(UserProfile, bool)> {
        if let Some(p) = self.get_profile(user_id)? {
            return Ok((p, false));
        }
        let now = now_iso();
        let text = profile::blank_template(display_name);
        {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT OR IGNORE INTO user_profiles
                    (user_id, display_name, profile_text, interaction_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?4)",
                params![user_id, display_name, text, now],
            )?;
        }
        info!("[store] Created profile for user {} ({})", user_id, display_name);
        let p = self
            .get_profile(user_id)?
            .ok_or_else(|| format!("profile for {} vanished after insert", user_id))?;
        Ok((p, true))
    }

    /// Whole-document replace. Creates the row when missing.
    pub fn save_profile(&self, user_id: &str, display_name: &str, profile_text: &str) -> EngineResult<()> {
        let conn = self.conn.lock();
        let now = now_iso();
        conn.execute(
            "INSERT INTO user_profiles
                (user_id, display_name, profile_text, interaction_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name,
                profile_text = excluded.profile_text,
                updated_at = excluded.updated_at",
            params![user_id, display_name, profile_text, now],
        )?;
        Ok(())
    }

    /// Bump the persistent interaction counter. Returns the new value.
    pub fn increment_interaction(&self, user_id: &str) -> EngineResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE user_profiles SET interaction_count = interaction_count + 1, updated_at = ?2
             WHERE user_id = ?1",
            params![user_id, now_iso()],
        )?;
        let n = conn
            .query_row(
                "SELECT interaction_count FROM user_profiles WHERE user_id = ?1",
                params![user_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(n.unwrap_or(0))
    }

    // ── Dossiers ───────────────────────────────────────────────────────

    /// Case-insensitive lookup by entity name.
    pub fn get_dossier(&self, name: &str) -> EngineResult<Option<Dossier>> {
        let conn = self.conn.lock();
        let d = conn
            .query_row(
                "SELECT name, kind, content, created_at, updated_at FROM dossiers WHERE name = ?1",
                params![name.trim()],
                Dossier::from_row,
            )
            .optional()?;
        Ok(d)
    }

    /// Whole-document replace keyed by entity name.
    pub fn save_dossier(&self, name: &str, kind: DossierKind, content: &str) -> EngineResult<()> {
        let conn = self.conn.lock();
        let now = now_iso();
        conn.execute(
            "INSERT INTO dossiers (name, kind, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(name) DO UPDATE SET
                kind = excluded.kind,
                content = excluded.content,
                updated_at = excluded.updated_at",
            params![name.trim(), kind.as_str(), content, now],
        )?;
        Ok(())
    }

    pub fn list_dossier_names(&self) -> EngineResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM dossiers ORDER BY updated_at DESC")?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }
}
