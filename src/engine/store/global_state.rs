use super::{now_iso, MemoryStore};
use crate::atoms::constants::GLOBAL_STATE_DEFAULTS;
use crate::atoms::error::EngineResult;
use log::debug;
use rusqlite::{params, OptionalExtension};

/// Snapshot of every global key, in declaration order, defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalState {
    values: Vec<(String, String)>,
}

impl GlobalState {
    pub fn get(&self, key: &str) -> &str {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True when nothing has moved off its default.
    pub fn is_all_default(&self) -> bool {
        self.values.iter().all(|(k, v)| default_for(k) == Some(v.as_str()))
    }

    /// `key: value` lines, skipping empty values.
    pub fn to_lines(&self) -> String {
        self.iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub(crate) fn default_for(key: &str) -> Option<&'static str> {
    GLOBAL_STATE_DEFAULTS.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Parse `key: value` lines, keeping only known keys. Unknown keys and
/// malformed lines are dropped.
pub fn parse_state_lines(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim().trim_start_matches(['-', '*']).trim();
            let (k, v) = line.split_once(':')?;
            let key = k.trim().to_ascii_lowercase().replace([' ', '-'], "_");
            if default_for(&key).is_none() {
                debug!("[store] dropping unknown state key '{}'", key);
                return None;
            }
            Some((key, v.trim().to_string()))
        })
        .collect()
}

impl MemoryStore {
    // ── Global state ───────────────────────────────────────────────────

    /// Value of a known key, or its default when never set.
    /// Unknown keys read as empty.
    pub fn get_global(&self, key: &str) -> EngineResult<String> {
        let Some(default) = default_for(key) else {
            return Ok(String::new());
        };
        let conn = self.conn.lock();
        let v: Option<String> = conn
            .query_row("SELECT value FROM global_state WHERE key = ?1", params![key], |r| r.get(0))
            .optional()?;
        Ok(v.unwrap_or_else(|| default.to_string()))
    }

    /// Set a known key. Returns `false` (and writes nothing) for unknown keys.
    pub fn set_global(&self, key: &str, value: &str) -> EngineResult<bool> {
        if default_for(key).is_none() {
            debug!("[store] set_global ignored unknown key '{}'", key);
            return Ok(false);
        }
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO global_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now_iso()],
        )?;
        Ok(true)
    }

    /// All keys with defaults applied.
    pub fn global_state(&self) -> EngineResult<GlobalState> {
        let values = GLOBAL_STATE_DEFAULTS
            .iter()
            .map(|(k, _)| Ok((k.to_string(), self.get_global(k)?)))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(GlobalState { values })
    }
}
