// Daimon Engine — Advisory whispers
// After a cycle an optional advisor sees a minimal snapshot (mood, topic, a
// short monologue excerpt; never the profile) and may leave one observation.
// It is stored and shown in the next cycle's "Intuitions" section, then
// consumed.

use crate::atoms::constants::WHISPER_EXCERPT_CHARS;
use crate::atoms::error::EngineResult;
use crate::atoms::traits::{Advisor, WhisperSnapshot};
use crate::engine::store::MemoryStore;
use log::{debug, info, warn};
use std::time::Duration;

/// First `WHISPER_EXCERPT_CHARS` characters, on a char boundary.
pub fn excerpt(monologue: &str) -> String {
    monologue.trim().chars().take(WHISPER_EXCERPT_CHARS).collect()
}

pub fn snapshot(store: &MemoryStore, monologue: &str) -> EngineResult<WhisperSnapshot> {
    Ok(WhisperSnapshot {
        emotional_state: store.get_global("emotional_state")?,
        topic: store.get_global("current_topic")?,
        monologue_excerpt: excerpt(monologue),
    })
}

/// Ask the advisor and store what it says. Returns the new whisper id.
/// Advisor errors and timeouts are logged, never propagated.
pub async fn collect(
    store: &MemoryStore,
    advisor: &dyn Advisor,
    snapshot: &WhisperSnapshot,
    timeout_secs: u64,
) -> EngineResult<Option<i64>> {
    let answer = match tokio::time::timeout(Duration::from_secs(timeout_secs), advisor.whisper(snapshot)).await {
        Ok(Ok(a)) => a,
        Ok(Err(e)) => {
            warn!("[whisper] {} failed: {}", advisor.source(), e);
            return Ok(None);
        }
        Err(_) => {
            warn!("[whisper] {} timed out after {}s", advisor.source(), timeout_secs);
            return Ok(None);
        }
    };
    match answer.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()) {
        Some(text) => {
            let id = store.add_whisper(advisor.source(), &text)?;
            info!("[whisper] {} left whisper {}", advisor.source(), id);
            Ok(Some(id))
        }
        None => {
            debug!("[whisper] {} had nothing to say", advisor.source());
            Ok(None)
        }
    }
}
