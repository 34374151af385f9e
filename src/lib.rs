// Daimon — cognitive cycle engine for a persistent chat persona.

pub mod atoms;
pub mod engine;

pub use atoms::error::{EngineError, EngineResult, ProviderError};
pub use atoms::traits::{Advisor, AiProvider, WhisperSnapshot};
pub use atoms::types::{BackendTarget, ExecutionMode, GenerateRequest, Generation, InboundMessage};
pub use engine::config::EngineConfig;
pub use engine::cycle::CycleEngine;
pub use engine::providers::ProviderRegistry;
pub use engine::queue::{drain_inbox, CycleQueue};
pub use engine::store::MemoryStore;
