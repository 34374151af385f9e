// ── Daimon Atoms: Traits ───────────────────────────────────────────────────
// The two seams the engine talks through:
//   AiProvider — a backend that turns a prompt into text
//   Advisor    — an out-of-band collaborator that whispers observations

use crate::atoms::error::{EngineResult, ProviderError};
use crate::atoms::types::{GenerateRequest, Generation, ProviderKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Every backend implements this. The registry holds them as
/// `Arc<dyn AiProvider>` so adding one never touches the cycle code.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Registry name this instance was constructed under.
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Perform one completion. `request.model == None` means the provider's
    /// configured default.
    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError>;
}

/// Blocking form of `AiProvider::generate` for synchronous callers
/// (scripts, the dashboard). Must not be called from inside a tokio runtime.
pub fn generate_blocking(
    provider: &dyn AiProvider,
    request: &GenerateRequest,
) -> Result<Generation, ProviderError> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(ProviderError::Unavailable(
            "generate_blocking called from inside an async runtime".into(),
        ));
    }
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ProviderError::Unavailable(format!("runtime: {}", e)))?;
    rt.block_on(provider.generate(request))
}

/// Minimal state an advisor is allowed to see. Deliberately excludes the
/// user profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhisperSnapshot {
    pub emotional_state: String,
    pub topic: String,
    pub monologue_excerpt: String,
}

/// External advisory collaborator asked once per cycle.
#[async_trait]
pub trait Advisor: Send + Sync {
    /// Label stored with the whisper, e.g. "muse".
    fn source(&self) -> &str;

    /// A short observation, or `None` when there is nothing worth saying.
    async fn whisper(&self, snapshot: &WhisperSnapshot) -> EngineResult<Option<String>>;
}
