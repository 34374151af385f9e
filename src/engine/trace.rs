// Daimon Engine — Observability stream
// Append-only JSONL, one phase-tagged event per line, keyed by trace id, for
// external tailing. Writing is best effort: a failed write is logged and the
// cycle goes on.

use chrono::Utc;
use log::warn;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracePhase {
    Stimulus,
    Context,
    Cognition,
    Decision,
    Memory,
    Response,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub trace_id: String,
    pub phase: TracePhase,
    pub at: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

/// Writer for the stream. `disabled()` drops every event.
pub struct TraceLog {
    path: Option<PathBuf>,
    lock: Mutex<()>,
}

impl TraceLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        TraceLog { path, lock: Mutex::new(()) }
    }

    pub fn disabled() -> Self {
        TraceLog::new(None)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn emit(&self, trace_id: &str, phase: TracePhase, summary: impl Into<String>, data: Value) {
        let Some(path) = &self.path else { return };
        let event = TraceEvent {
            trace_id: trace_id.to_string(),
            phase,
            at: Utc::now().to_rfc3339(),
            summary: summary.into(),
            data,
        };
        if let Err(e) = self.append(path, &event) {
            warn!("[trace] Could not write {:?} event to {}: {}", phase, path.display(), e);
        }
    }

    fn append(&self, path: &Path, event: &TraceEvent) -> std::io::Result<()> {
        let line = serde_json::to_string(event)?;
        let _guard = self.lock.lock();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut f = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(f, "{}", line)
    }
}

/// Read every event of one trace back from a stream file. Unparseable lines
/// are skipped.
pub fn read_trace(path: &Path, trace_id: &str) -> std::io::Result<Vec<TraceEvent>> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    Ok(text
        .lines()
        .filter_map(|l| serde_json::from_str::<TraceEvent>(l).ok())
        .filter(|e| e.trace_id == trace_id)
        .collect())
}
