// ── Daimon Atoms: Error Types ──────────────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, DB, Provider, Config…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • No variant carries secret material (API keys) in its message.
//   • Nothing in here is ever shown to an end user; the cycle maps every
//     failure to FALLBACK_REPLY before it reaches an adapter.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// SQLite / rusqlite database failure. Fatal for the current cycle.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Backend failure after the whole fallback chain was exhausted.
    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    /// Engine configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A bounded wait expired.
    #[error("Timed out after {secs}s: {what}")]
    Timeout { what: String, secs: u64 },

    /// Catch-all for errors that do not yet have a dedicated variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl EngineError {
    /// Create a provider error with name and message.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider { provider: provider.into(), message: message.into() }
    }

    pub fn timeout(what: impl Into<String>, secs: u64) -> Self {
        Self::Timeout { what: what.into(), secs }
    }

    /// True when the underlying store failed. The cycle must not continue
    /// without memory, so callers use this to pick fatal vs degraded paths.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, EngineError::Database(_))
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(e: toml::de::Error) -> Self {
        EngineError::Config(e.to_string())
    }
}

// ── Migration bridge: String → EngineError ─────────────────────────────────

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Other(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Other(s.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All engine operations return this type.
pub type EngineResult<T> = Result<T, EngineError>;

// ── Provider-level errors ──────────────────────────────────────────────────
// Returned by `AiProvider::generate`. The registry's fallback helper logs
// these and moves to the next backend; they only surface as
// `EngineError::Provider` once every backend failed.

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Connection / stream failure before any status was received.
    #[error("transport: {0}")]
    Transport(String),

    /// 401 / 403 — never retried.
    #[error("auth: {0}")]
    Auth(String),

    #[error("rate limited: {message}")]
    RateLimited { message: String, retry_after_secs: Option<u64> },

    /// Non-2xx response that is not auth or rate limiting.
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("timed out after {0}s")]
    Timeout(u64),

    /// 2xx response whose body could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Provider cannot serve requests (not configured, circuit open, binary missing).
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<ProviderError> for EngineError {
    fn from(e: ProviderError) -> Self {
        EngineError::provider("backend", e.to_string())
    }
}
