// ── Daimon Atoms: Pure Data Types ─────────────────────────────────────────────
// All plain struct/enum definitions with no logic beyond string mapping.
// Atoms layer rule: no I/O, no side effects, no imports from engine/.

use serde::{Deserialize, Serialize};

// ── Providers ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registry name, e.g. "openai", "haiku", "local".
    pub id: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    /// Program + leading args for `ProviderKind::Cli`.
    #[serde(default)]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
    Ollama,
    OpenRouter,
    Custom,
    /// External command that reads a prompt on stdin and prints JSON.
    Cli,
}

impl ProviderKind {
    pub fn default_base_url(&self) -> &str {
        match self {
            ProviderKind::OpenAI => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com",
            ProviderKind::Ollama => "http://localhost:11434/v1",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
            ProviderKind::Custom | ProviderKind::Cli => "",
        }
    }
}

/// One backend call.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub prompt: String,
    /// `None` → the provider's own default model.
    pub model: Option<String>,
    /// Backend-side conversation to resume, if the backend supports it.
    pub resume_session: Option<String>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        GenerateRequest { prompt: prompt.into(), ..Default::default() }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn resuming(mut self, session: Option<String>) -> Self {
        self.resume_session = session;
        self
    }
}

/// Result of one backend call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    pub text: String,
    /// New backend session handle, when the backend issued one.
    pub session_handle: Option<String>,
    /// Name of the provider that actually answered (after fallback).
    pub provider: String,
}

/// Provider + model a step is routed to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendTarget {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl BackendTarget {
    pub fn is_empty(&self) -> bool {
        self.provider.is_none() && self.model.is_none()
    }
}

// ── Channels ─────────────────────────────────────────────────────────────────

/// Normalized message every channel adapter produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub text: String,
    pub channel: String,
    pub thread: String,
    pub user_id: String,
    pub display_name: String,
}

impl InboundMessage {
    pub fn new(
        text: impl Into<String>,
        channel: impl Into<String>,
        thread: impl Into<String>,
        user_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        InboundMessage {
            text: text.into(),
            channel: channel.into(),
            thread: thread.into(),
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Durable inbound queue row (SMS / WhatsApp polling feeds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundRecord {
    /// Platform message id; the dedup key.
    pub source_id: String,
    pub message: InboundMessage,
    pub received_at: String,
    pub handled_at: Option<String>,
}

// ── Cognitive steps ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepCategory {
    /// Always runs (monologue, dialogue).
    Core,
    /// Produces a boolean guarding a conditional step.
    Gate,
    /// Runs only when its gate was true.
    Conditional,
    /// Inner-voice steps that follow a profile update.
    Daimonic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One composite backend call per cycle.
    #[default]
    Unified,
    /// One backend call per step, each independently routable.
    Split,
}

// ── Working memory ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    UserMessage,
    Monologue,
    Dialogue,
    GateResult,
    Mutation,
    OnboardingStep,
    InnerVoice,
    Whisper,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::UserMessage => "user_message",
            EntryType::Monologue => "monologue",
            EntryType::Dialogue => "dialogue",
            EntryType::GateResult => "gate_result",
            EntryType::Mutation => "mutation",
            EntryType::OnboardingStep => "onboarding_step",
            EntryType::InnerVoice => "inner_voice",
            EntryType::Whisper => "whisper",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "user_message" => EntryType::UserMessage,
            "monologue" => EntryType::Monologue,
            "dialogue" => EntryType::Dialogue,
            "gate_result" => EntryType::GateResult,
            "mutation" => EntryType::Mutation,
            "onboarding_step" => EntryType::OnboardingStep,
            "inner_voice" => EntryType::InnerVoice,
            "whisper" => EntryType::Whisper,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingMemoryEntry {
    pub id: i64,
    pub channel: String,
    pub thread: String,
    pub actor: String,
    pub entry_type: EntryType,
    pub verb: Option<String>,
    pub content: String,
    pub metadata: serde_json::Value,
    pub trace_id: Option<String>,
    pub created_at: String,
}

impl WorkingMemoryEntry {
    /// Boolean stored by a gate entry under `metadata.result`.
    pub fn gate_result(&self) -> Option<bool> {
        if self.entry_type != EntryType::GateResult {
            return None;
        }
        self.metadata.get("result").and_then(|v| v.as_bool())
    }
}

/// Fields for a new working-memory row. Borrowed so call sites stay cheap.
#[derive(Debug, Clone)]
pub struct NewEntry<'a> {
    pub channel: &'a str,
    pub thread: &'a str,
    pub actor: &'a str,
    pub entry_type: EntryType,
    pub content: &'a str,
    pub verb: Option<&'a str>,
    pub metadata: Option<serde_json::Value>,
    pub trace_id: Option<&'a str>,
}

// ── Persistent documents ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: String,
    pub profile_text: String,
    pub interaction_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DossierKind {
    Person,
    Subject,
}

impl DossierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DossierKind::Person => "person",
            DossierKind::Subject => "subject",
        }
    }

    /// Anything that is not clearly a person is filed as a subject.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "person" | "people" | "human" => DossierKind::Person,
            _ => DossierKind::Subject,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dossier {
    pub name: String,
    pub kind: DossierKind,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMapping {
    pub channel: String,
    pub thread: String,
    pub session_handle: String,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds.
    pub last_used: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Whisper {
    pub id: i64,
    pub source: String,
    pub content: String,
    pub created_at: String,
}
