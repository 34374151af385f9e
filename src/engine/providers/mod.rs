// Daimon Engine — Provider Registry
// Name → `Arc<dyn AiProvider>`. Built-ins are constructed lazily from their
// config the first time a name is resolved; anything else (tests, custom
// backends) is registered directly. Adding a backend never touches the cycle.

pub mod anthropic;
pub mod cli;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use cli::CliProvider;
pub use openai::OpenAiProvider;

use crate::atoms::error::{EngineError, EngineResult, ProviderError};
use crate::atoms::traits::AiProvider;
use crate::atoms::types::{BackendTarget, GenerateRequest, Generation, ProviderConfig, ProviderKind};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct ProviderRegistry {
    configs: HashMap<String, ProviderConfig>,
    providers: RwLock<HashMap<String, Arc<dyn AiProvider>>>,
    /// Bound on a single provider attempt, not on the whole chain.
    timeout_secs: AtomicU64,
}

/// Construct the concrete provider for a config.
///
/// OpenAI, Ollama, OpenRouter and Custom all speak chat/completions and share
/// one implementation; only Anthropic and Cli have their own wire format.
pub fn from_config(config: &ProviderConfig, timeout_secs: u64) -> Arc<dyn AiProvider> {
    match config.kind {
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(config, timeout_secs)),
        ProviderKind::Cli => Arc::new(CliProvider::new(config)),
        _ => Arc::new(OpenAiProvider::new(config, timeout_secs)),
    }
}

/// Config for a well-known name that was never configured explicitly.
/// API keys come from the conventional environment variables.
fn builtin_config(name: &str) -> Option<ProviderConfig> {
    let (kind, key_var) = match name {
        "openai" => (ProviderKind::OpenAI, Some("OPENAI_API_KEY")),
        "anthropic" => (ProviderKind::Anthropic, Some("ANTHROPIC_API_KEY")),
        "openrouter" => (ProviderKind::OpenRouter, Some("OPENROUTER_API_KEY")),
        "ollama" => (ProviderKind::Ollama, None),
        _ => return None,
    };
    Some(ProviderConfig {
        id: name.to_string(),
        kind,
        api_key: key_var.and_then(|v| std::env::var(v).ok()).unwrap_or_default(),
        base_url: None,
        default_model: None,
        command: Vec::new(),
    })
}

impl ProviderRegistry {
    pub fn new(configs: impl IntoIterator<Item = ProviderConfig>, timeout_secs: u64) -> Self {
        ProviderRegistry {
            configs: configs.into_iter().map(|c| (c.id.clone(), c)).collect(),
            providers: RwLock::new(HashMap::new()),
            timeout_secs: AtomicU64::new(timeout_secs.max(1)),
        }
    }

    pub fn attempt_timeout_secs(&self) -> u64 {
        self.timeout_secs.load(Ordering::Relaxed)
    }

    /// Change the per-attempt bound. Providers built after this call also
    /// get it as their HTTP client timeout.
    pub fn set_attempt_timeout(&self, secs: u64) {
        self.timeout_secs.store(secs.max(1), Ordering::Relaxed);
    }

    /// Registry with no configs; only registered providers and env-keyed
    /// built-ins resolve.
    pub fn empty() -> Self {
        ProviderRegistry::new(Vec::new(), crate::atoms::constants::DEFAULT_BACKEND_TIMEOUT_SECS)
    }

    /// Install (or replace) a provider under its own name.
    pub fn register(&self, provider: Arc<dyn AiProvider>) {
        let name = provider.name().to_string();
        debug!("[provider] Registered {}", name);
        self.providers.write().insert(name, provider);
    }

    /// Look a provider up, building it from config on first use.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn AiProvider>> {
        if let Some(p) = self.providers.read().get(name) {
            return Some(Arc::clone(p));
        }
        let config = self.configs.get(name).cloned().or_else(|| builtin_config(name))?;
        let mut providers = self.providers.write();
        // Another caller may have built it between the two locks.
        let p = providers
            .entry(name.to_string())
            .or_insert_with(|| {
                info!("[provider] Initializing {} ({:?})", name, config.kind);
                from_config(&config, self.attempt_timeout_secs())
            })
            .clone();
        Some(p)
    }

    /// Names that can currently resolve: registered plus configured.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().keys().cloned().collect();
        names.extend(self.configs.keys().cloned());
        names.sort();
        names.dedup();
        names
    }

    /// Try `names` in order with the provider's default model. Failures are
    /// logged and skipped; an error is returned only when every name failed.
    pub async fn generate_with_fallback(&self, prompt: &str, names: &[&str]) -> EngineResult<Generation> {
        let targets: Vec<BackendTarget> = names
            .iter()
            .map(|n| BackendTarget { provider: Some(n.to_string()), model: None })
            .collect();
        self.generate_with_targets(&GenerateRequest::new(prompt), &targets).await
    }

    /// Like `generate_with_fallback`, with a model per target. A target's
    /// model overrides `request.model`. Each attempt is bounded by the
    /// attempt timeout; a hung target counts as a failure and the next one
    /// is tried.
    pub async fn generate_with_targets(
        &self,
        request: &GenerateRequest,
        targets: &[BackendTarget],
    ) -> EngineResult<Generation> {
        let secs = self.attempt_timeout_secs();
        let mut failures = Vec::new();
        for target in targets {
            let Some(name) = target.provider.as_deref() else { continue };
            let Some(provider) = self.resolve(name) else {
                warn!("[provider] Unknown provider '{}', skipping", name);
                failures.push(format!("{}: unknown", name));
                continue;
            };
            let mut req = request.clone();
            if target.model.is_some() {
                req.model = target.model.clone();
            }
            let attempt = tokio::time::timeout(Duration::from_secs(secs), provider.generate(&req))
                .await
                .unwrap_or(Err(ProviderError::Timeout(secs)));
            match attempt {
                Ok(mut g) => {
                    if failures.is_empty() {
                        debug!("[provider] {} answered", name);
                    } else {
                        info!("[provider] {} answered after {} failure(s)", name, failures.len());
                    }
                    if g.provider.is_empty() {
                        g.provider = name.to_string();
                    }
                    return Ok(g);
                }
                Err(e) => {
                    warn!("[provider] {} failed: {}", name, e);
                    failures.push(format!("{}: {}", name, e));
                }
            }
        }
        if failures.is_empty() {
            return Err(EngineError::Config("no provider configured".into()));
        }
        Err(EngineError::provider("all", failures.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct Scripted {
        name: &'static str,
        fail: bool,
        hang: bool,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Scripted { name, fail, hang: false, calls: AtomicUsize::new(0) })
        }

        fn hanging(name: &'static str) -> Arc<Self> {
            Arc::new(Scripted { name, fail: false, hang: true, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl AiProvider for Scripted {
        fn name(&self) -> &str {
            self.name
        }
        fn kind(&self) -> ProviderKind {
            ProviderKind::Custom
        }
        async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail {
                return Err(ProviderError::Transport("down".into()));
            }
            Ok(Generation {
                text: format!("{}:{}", self.name, request.model.as_deref().unwrap_or("default")),
                session_handle: None,
                provider: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn fallback_stops_at_first_success() {
        let reg = ProviderRegistry::empty();
        let (a, b, c) = (Scripted::new("a", true), Scripted::new("b", false), Scripted::new("c", false));
        reg.register(a.clone());
        reg.register(b.clone());
        reg.register(c.clone());

        let g = reg.generate_with_fallback("hi", &["a", "b", "c"]).await.unwrap();
        assert_eq!(g.text, "b:default");
        assert_eq!(g.provider, "b");
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
        assert_eq!(c.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_failing_is_an_error() {
        let reg = ProviderRegistry::empty();
        reg.register(Scripted::new("a", true));
        let err = reg.generate_with_fallback("hi", &["a", "missing"]).await.unwrap_err();
        assert!(matches!(err, EngineError::Provider { .. }));
        assert!(err.to_string().contains("missing: unknown"));
    }

    #[tokio::test]
    async fn hung_target_falls_through_to_next() {
        let reg = ProviderRegistry::empty();
        reg.set_attempt_timeout(1);
        let (slow, b) = (Scripted::hanging("slow"), Scripted::new("b", false));
        reg.register(slow.clone());
        reg.register(b.clone());

        let g = reg.generate_with_fallback("hi", &["slow", "b"]).await.unwrap();
        assert_eq!(g.provider, "b");
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);

        let err = reg.generate_with_fallback("hi", &["slow"]).await.unwrap_err();
        assert!(err.to_string().contains("slow: timed out after 1s"), "{}", err);
    }

    #[tokio::test]
    async fn target_model_overrides_request() {
        let reg = ProviderRegistry::empty();
        reg.register(Scripted::new("a", false));
        let targets = [BackendTarget { provider: Some("a".into()), model: Some("big".into()) }];
        let g = reg
            .generate_with_targets(&GenerateRequest::new("x").with_model(Some("small".into())), &targets)
            .await
            .unwrap();
        assert_eq!(g.text, "a:big");
    }

    #[test]
    fn configured_providers_build_lazily_once() {
        let reg = ProviderRegistry::new(
            vec![ProviderConfig {
                id: "local".into(),
                kind: ProviderKind::Ollama,
                api_key: String::new(),
                base_url: None,
                default_model: None,
                command: vec![],
            }],
            30,
        );
        let first = reg.resolve("local").unwrap();
        let second = reg.resolve("local").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.kind(), ProviderKind::Ollama);
        assert!(reg.resolve("nope").is_none());
        assert!(reg.resolve("ollama").is_some());
    }
}
