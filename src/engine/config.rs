// Daimon Engine — Configuration
// One TOML file, every field optional. Missing file → built-in defaults.
//
//   mode = "split"
//   default_provider = "anthropic"
//   fallback_providers = ["ollama"]
//
//   [[providers]]
//   id = "ollama"
//   kind = "ollama"
//   default_model = "llama3"
//
//   [steps.profile_update]
//   provider = "anthropic"
//   model = "claude-3-5-sonnet-latest"

use crate::atoms::constants::*;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{BackendTarget, ExecutionMode, ProviderConfig};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "daimon.toml";
const DB_FILE: &str = "daimon.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub persona_id: String,
    pub persona_name: String,
    pub db_path: PathBuf,
    /// Markdown persona document. Missing file → built-in persona.
    pub persona_path: Option<PathBuf>,
    /// Capabilities reference shown on a thread's first turn.
    pub capabilities_path: Option<PathBuf>,
    /// JSONL observability stream. `None` disables it.
    pub trace_path: Option<PathBuf>,

    pub mode: ExecutionMode,
    pub default_provider: String,
    pub default_model: Option<String>,
    /// Tried in order after the step's own provider fails.
    pub fallback_providers: Vec<String>,
    /// Per-step routing, keyed by step name.
    pub steps: HashMap<String, BackendTarget>,
    pub providers: Vec<ProviderConfig>,

    pub soul_state_interval: u64,
    pub working_memory_max_age_hours: i64,
    pub session_ttl_secs: i64,
    pub backend_timeout_secs: u64,
    pub advisor_timeout_secs: u64,

    pub dossiers_enabled: bool,
    pub max_dossiers: usize,
    pub dossier_scan_depth: usize,
    pub recent_entries: usize,
    pub onboarding_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let dir = default_data_dir();
        EngineConfig {
            persona_id: DEFAULT_PERSONA_ID.into(),
            persona_name: DEFAULT_PERSONA_NAME.into(),
            db_path: dir.join(DB_FILE),
            persona_path: Some(dir.join("persona.md")),
            capabilities_path: Some(dir.join("capabilities.md")),
            trace_path: Some(dir.join("trace.jsonl")),
            mode: ExecutionMode::Unified,
            default_provider: "openai".into(),
            default_model: None,
            fallback_providers: Vec::new(),
            steps: HashMap::new(),
            providers: Vec::new(),
            soul_state_interval: DEFAULT_SOUL_STATE_INTERVAL,
            working_memory_max_age_hours: DEFAULT_WORKING_MEMORY_MAX_AGE_HOURS,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            backend_timeout_secs: DEFAULT_BACKEND_TIMEOUT_SECS,
            advisor_timeout_secs: DEFAULT_ADVISOR_TIMEOUT_SECS,
            dossiers_enabled: true,
            max_dossiers: DEFAULT_MAX_DOSSIERS,
            dossier_scan_depth: DEFAULT_DOSSIER_SCAN_DEPTH,
            recent_entries: DEFAULT_RECENT_ENTRIES,
            onboarding_enabled: true,
        }
    }
}

/// `<platform data dir>/daimon`, or `./.daimon` when the platform has none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("daimon"))
        .unwrap_or_else(|| PathBuf::from(".daimon"))
}

pub fn default_config_path() -> PathBuf {
    default_data_dir().join(CONFIG_FILE)
}

impl EngineConfig {
    pub fn from_toml(text: &str) -> EngineResult<Self> {
        let cfg: EngineConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and validate a config file.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg = Self::from_toml(&text)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        info!("[config] Loaded {}", path.display());
        Ok(cfg)
    }

    /// `load`, except a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> EngineResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            info!("[config] {} not found, using defaults", path.display());
            Ok(EngineConfig::default())
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.soul_state_interval == 0 {
            return Err(EngineError::Config("soul_state_interval must be at least 1".into()));
        }
        if self.backend_timeout_secs == 0 {
            return Err(EngineError::Config("backend_timeout_secs must be at least 1".into()));
        }
        if self.session_ttl_secs <= 0 || self.working_memory_max_age_hours <= 0 {
            return Err(EngineError::Config("lifetimes must be positive".into()));
        }
        if self.default_provider.trim().is_empty() {
            return Err(EngineError::Config("default_provider is empty".into()));
        }
        Ok(())
    }

    /// Store-less config for tests and throwaway terminal sessions: no files
    /// are read or written.
    pub fn ephemeral() -> Self {
        EngineConfig {
            persona_path: None,
            capabilities_path: None,
            trace_path: None,
            ..EngineConfig::default()
        }
    }

    /// Ordered backends for one call: the override (or default) target
    /// first, then each fallback provider with its own default model.
    /// A provider name appears at most once.
    pub fn backend_chain(&self, step_override: Option<&BackendTarget>) -> Vec<BackendTarget> {
        let primary_provider = step_override
            .and_then(|t| t.provider.clone())
            .unwrap_or_else(|| self.default_provider.clone());
        let primary_model = step_override
            .and_then(|t| t.model.clone())
            .or_else(|| self.default_model.clone());

        let mut chain = vec![BackendTarget { provider: Some(primary_provider), model: primary_model }];
        for name in std::iter::once(&self.default_provider).chain(&self.fallback_providers) {
            if chain.iter().any(|t| t.provider.as_deref() == Some(name.as_str())) {
                continue;
            }
            let model = if *name == self.default_provider { self.default_model.clone() } else { None };
            chain.push(BackendTarget { provider: Some(name.clone()), model });
        }
        chain
    }
}
