use async_trait::async_trait;
use daimon::atoms::types::ProviderKind;
use daimon::{
    AiProvider, CycleEngine, EngineConfig, GenerateRequest, Generation, MemoryStore, ProviderError, ProviderRegistry,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Script = dyn Fn(&GenerateRequest) -> Result<String, ProviderError> + Send + Sync;

/// Backend whose answers come from a closure. Records every request.
pub struct MockProvider {
    name: String,
    script: Box<Script>,
    session: Option<String>,
    delay: Option<Duration>,
    requests: Mutex<Vec<GenerateRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProvider {
    pub fn scripted(
        name: &str,
        script: impl Fn(&GenerateRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        MockProvider {
            name: name.to_string(),
            script: Box::new(script),
            session: None,
            delay: None,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn replying(name: &str, text: &str) -> Self {
        let text = text.to_string();
        Self::scripted(name, move |_| Ok(text.clone()))
    }

    pub fn failing(name: &str) -> Self {
        Self::scripted(name, |_| Err(ProviderError::Api { status: 503, message: "down".into() }))
    }

    /// Issue this handle with every generation.
    pub fn with_session(mut self, handle: &str) -> Self {
        self.session = Some(handle.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.prompt.clone()).collect()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Custom
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
        self.requests.lock().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let text = (self.script)(request)?;
        Ok(Generation { text, session_handle: self.session.clone(), provider: self.name.clone() })
    }
}

/// Defaults for engine tests: no files, onboarding off, backend "mock".
pub fn config() -> EngineConfig {
    EngineConfig { default_provider: "mock".into(), onboarding_enabled: false, ..EngineConfig::ephemeral() }
}

pub fn engine(config: EngineConfig, providers: &[Arc<MockProvider>]) -> CycleEngine {
    let registry = ProviderRegistry::empty();
    for p in providers {
        registry.register(p.clone());
    }
    CycleEngine::new(config, MemoryStore::open_in_memory().unwrap(), Arc::new(registry))
}

/// Well-formed unified answer with every gate false.
pub fn unified_reply(dialogue: &str) -> String {
    format!(
        "<internal_monologue verb=\"pondered\">thinking about it</internal_monologue>\n\
<external_dialogue verb=\"said\">{}</external_dialogue>\n\
<user_verb>asked</user_verb>\n\
<user_model_check>false</user_model_check>\n\
<dossier_check>false</dossier_check>",
        dialogue
    )
}

/// Section of a split-mode prompt describing the current step.
pub fn task(prompt: &str) -> &str {
    prompt.rsplit("## Your task").next().unwrap_or("")
}

pub async fn say(engine: &CycleEngine, text: &str) -> String {
    engine.process_cycle(text, "dm", "t", "u1", "Ada").await.unwrap()
}
