// Daimon Engine — Cognitive Cycle
// One inbound message → context → backend call(s) → tag parsing → trace-linked
// memory writes → the reply text.
//
// Module layout:
//   mod.rs        — CycleEngine, entry points, shared bookkeeping
//   unified.rs    — one composite backend call per cycle
//   split.rs      — one call per step, each independently routed
//   onboarding.rs — four-stage first-contact interview
//   terminal.rs   — persona-less local mode

mod onboarding;
mod split;
mod terminal;
mod unified;

use crate::atoms::constants::*;
use crate::atoms::error::EngineResult;
use crate::atoms::traits::Advisor;
use crate::atoms::types::{
    BackendTarget, EntryType, ExecutionMode, GenerateRequest, Generation, InboundMessage, NewEntry,
};
use crate::engine::config::EngineConfig;
use crate::engine::context::{AssembledContext, ContextAssembler, ContextRequest};
use crate::engine::profile;
use crate::engine::providers::ProviderRegistry;
use crate::engine::steps::{base_vars, StepRegistry};
use crate::engine::store::{parse_state_lines, MemoryStore};
use crate::engine::tags;
use crate::engine::template::TemplateVars;
use crate::engine::trace::{TraceLog, TracePhase};
use crate::engine::whisper;
use log::{error, info, warn};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Characters of user text echoed into the observability stream.
const PREVIEW_CHARS: usize = 120;

fn preview(text: &str) -> String {
    let mut p: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        p.push('…');
    }
    p
}

/// One cycle's identity, threaded through every helper.
#[derive(Debug, Clone)]
pub(crate) struct Turn<'a> {
    pub text: &'a str,
    pub channel: &'a str,
    pub thread: &'a str,
    pub user_id: &'a str,
    pub display_name: &'a str,
    pub trace_id: String,
    /// Value of the engine's interaction counter for this cycle (1-based).
    pub interaction: u64,
}

/// Dialogue fallback chain: tag → tag-stripped text → fixed apology.
pub(crate) fn resolve_dialogue(raw: &str) -> (String, Option<String>) {
    let d = tags::extract(raw, TAG_DIALOGUE);
    if !d.is_empty() {
        return (d.content, d.attribute);
    }
    let stripped = tags::strip_all(raw);
    if !stripped.is_empty() {
        warn!("[cycle] No <{}> section, replying with stripped text", TAG_DIALOGUE);
        return (stripped, None);
    }
    warn!("[cycle] Backend produced nothing usable, replying with fallback");
    (FALLBACK_REPLY.to_string(), None)
}

/// Tagged section, or the whole stripped response for single-step calls
/// whose backend skipped the tags.
pub(crate) fn extract_or_strip(raw: &str, tag: &str) -> tags::Extracted {
    let e = tags::extract(raw, tag);
    if e.is_empty() {
        tags::Extracted { content: tags::strip_all(raw), attribute: None }
    } else {
        e
    }
}

pub struct CycleEngine {
    config: EngineConfig,
    store: MemoryStore,
    providers: Arc<ProviderRegistry>,
    steps: StepRegistry,
    assembler: ContextAssembler,
    trace: TraceLog,
    advisor: Option<Arc<dyn Advisor>>,
    /// Cycles run by this instance. Drives the periodic soul-state steps.
    interactions: AtomicU64,
}

impl CycleEngine {
    pub fn new(config: EngineConfig, store: MemoryStore, providers: Arc<ProviderRegistry>) -> Self {
        providers.set_attempt_timeout(config.backend_timeout_secs);
        CycleEngine {
            steps: StepRegistry::with_overrides(&config.steps),
            assembler: ContextAssembler::new(&config),
            trace: TraceLog::new(config.trace_path.clone()),
            config,
            store,
            providers,
            advisor: None,
            interactions: AtomicU64::new(0),
        }
    }

    /// Open the store at `config.db_path` and build providers from config.
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let store = MemoryStore::open(&config.db_path)?;
        let providers = Arc::new(ProviderRegistry::new(config.providers.clone(), config.backend_timeout_secs));
        info!(
            "[cycle] Engine ready: mode={:?} provider={} fallbacks={:?}",
            config.mode, config.default_provider, config.fallback_providers
        );
        Ok(CycleEngine::new(config, store, providers))
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn Advisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn steps(&self) -> &StepRegistry {
        &self.steps
    }

    pub fn interaction_count(&self) -> u64 {
        self.interactions.load(Ordering::SeqCst)
    }

    /// Whether the soul-state pair runs on interaction `n`.
    pub fn soul_state_due(&self, n: u64) -> bool {
        n > 0 && n % self.config.soul_state_interval.max(1) == 0
    }

    // ── Entry points ───────────────────────────────────────────────────────

    /// Run one cycle and return the text to deliver.
    ///
    /// Backend trouble never surfaces here: it degrades to fallback text.
    /// A store failure does, because continuing without memory would corrupt
    /// later gating; the caller decides what the user sees.
    pub async fn process_cycle(
        &self,
        text: &str,
        channel: &str,
        thread: &str,
        user_id: &str,
        display_name: &str,
    ) -> EngineResult<String> {
        let trace_id = uuid::Uuid::new_v4().to_string();
        self.trace.emit(
            &trace_id,
            TracePhase::Stimulus,
            preview(text),
            json!({ "channel": channel, "thread": thread, "user_id": user_id }),
        );

        let result = self.run_cycle(text, channel, thread, user_id, display_name, &trace_id).await;
        match &result {
            Ok(reply) => self.trace.emit(&trace_id, TracePhase::Response, preview(reply), Value::Null),
            Err(e) => {
                error!("[cycle] {} failed: {}", trace_id, e);
                self.trace.emit(&trace_id, TracePhase::Error, e.to_string(), json!({ "fatal": true }));
            }
        }
        result
    }

    pub async fn process_message(&self, message: &InboundMessage) -> EngineResult<String> {
        self.process_cycle(&message.text, &message.channel, &message.thread, &message.user_id, &message.display_name)
            .await
    }

    async fn run_cycle(
        &self,
        text: &str,
        channel: &str,
        thread: &str,
        user_id: &str,
        display_name: &str,
        trace_id: &str,
    ) -> EngineResult<String> {
        let (user_profile, created) = self.store.get_or_create_profile(user_id, display_name)?;
        if created {
            info!("[cycle] First contact with {} ({})", user_id, display_name);
        }
        self.store.increment_interaction(user_id)?;
        let interaction = self.interactions.fetch_add(1, Ordering::SeqCst) + 1;

        let turn = Turn { text, channel, thread, user_id, display_name, trace_id: trace_id.to_string(), interaction };

        if self.config.onboarding_enabled && !profile::parse_meta(&user_profile.profile_text).onboarding_complete {
            if let Some(reply) = self.onboard(&turn, &user_profile).await? {
                return Ok(reply);
            }
        }

        match self.config.mode {
            ExecutionMode::Unified => self.run_unified(&turn).await,
            ExecutionMode::Split => self.run_split(&turn).await,
        }
    }

    /// Working-memory sweep plus stale session mappings. Returns both counts.
    pub fn cleanup(&self) -> EngineResult<(usize, usize)> {
        let entries = self.store.cleanup(self.config.working_memory_max_age_hours)?;
        let sessions = self.store.sessions(self.config.session_ttl_secs).cleanup()?;
        Ok((entries, sessions))
    }

    // ── Shared bookkeeping ─────────────────────────────────────────────────

    fn persona_id(&self) -> &str {
        &self.config.persona_id
    }

    fn record(
        &self,
        turn: &Turn<'_>,
        actor: &str,
        entry_type: EntryType,
        content: &str,
        verb: Option<&str>,
        metadata: Option<Value>,
    ) -> EngineResult<i64> {
        self.store.add(&NewEntry {
            channel: turn.channel,
            thread: turn.thread,
            actor,
            entry_type,
            content,
            verb,
            metadata,
            trace_id: Some(&turn.trace_id),
        })
    }

    fn record_user_message(&self, turn: &Turn<'_>) -> EngineResult<i64> {
        self.record(
            turn,
            turn.user_id,
            EntryType::UserMessage,
            turn.text,
            None,
            Some(json!({ "display_name": turn.display_name })),
        )
    }

    fn record_gate(&self, turn: &Turn<'_>, step: &str, question: &str, result: bool) -> EngineResult<()> {
        self.record(
            turn,
            self.persona_id(),
            EntryType::GateResult,
            question,
            None,
            Some(json!({ "gate": step, "result": result })),
        )?;
        self.trace.emit(&turn.trace_id, TracePhase::Decision, format!("{} = {}", step, result), Value::Null);
        Ok(())
    }

    /// Assemble context before the user's message is recorded.
    fn assemble(&self, turn: &Turn<'_>, instructions: &str) -> EngineResult<AssembledContext> {
        let ctx = self.assembler.build(
            &self.store,
            &ContextRequest {
                text: turn.text,
                user_id: turn.user_id,
                channel: turn.channel,
                thread: turn.thread,
                display_name: turn.display_name,
                step_instructions: instructions,
                trace_id: &turn.trace_id,
            },
        )?;
        self.trace.emit(
            &turn.trace_id,
            TracePhase::Context,
            format!("{} chars", ctx.prompt.len()),
            json!({
                "sections": ctx.sections,
                "profile_injected": ctx.profile_injected,
                "dossiers": ctx.dossiers,
                "whispers": ctx.whispers.len(),
            }),
        );
        Ok(ctx)
    }

    /// Template variables for this user's step prompts.
    fn step_vars(&self, turn: &Turn<'_>) -> EngineResult<TemplateVars<'static>> {
        let profile_text = self.store.get_profile(turn.user_id)?.map(|p| p.profile_text).unwrap_or_default();
        let user_name = profile::parse_meta(&profile_text)
            .canonical_name
            .unwrap_or_else(|| turn.display_name.to_string());
        let names = self.store.list_dossier_names()?;
        let dossier_names = if names.is_empty() { "(none)".to_string() } else { names.join(", ") };
        Ok(base_vars(&self.config.persona_name, &user_name)
            .set("profile", profile::body(&profile_text))
            .set("global_state", self.store.global_state()?.to_lines())
            .set("dossier_names", dossier_names))
    }

    /// One backend call through the fallback chain. Each target is bounded by
    /// the backend timeout inside the registry; the outer bound only catches a
    /// chain that outlives every attempt. Failures are logged and come back as
    /// `None`.
    async fn call(
        &self,
        turn: &Turn<'_>,
        label: &str,
        route: Option<&BackendTarget>,
        prompt: String,
        resume: Option<String>,
    ) -> Option<Generation> {
        let chain = self.config.backend_chain(route);
        let request = GenerateRequest::new(prompt).resuming(resume);
        let secs = self.config.backend_timeout_secs.max(1) * chain.len().max(1) as u64 + 1;

        let outcome = tokio::time::timeout(
            Duration::from_secs(secs),
            self.providers.generate_with_targets(&request, &chain),
        )
        .await;

        match outcome {
            Ok(Ok(g)) => {
                self.trace.emit(
                    &turn.trace_id,
                    TracePhase::Cognition,
                    format!("{} via {}", label, g.provider),
                    json!({ "step": label, "provider": g.provider, "chars": g.text.len() }),
                );
                Some(g)
            }
            Ok(Err(e)) => {
                warn!("[cycle] {} step '{}' failed: {}", turn.trace_id, label, e);
                self.trace.emit(&turn.trace_id, TracePhase::Error, format!("{} failed", label), json!({ "error": e.to_string() }));
                None
            }
            Err(_) => {
                warn!("[cycle] {} step '{}' timed out after {}s", turn.trace_id, label, secs);
                self.trace.emit(&turn.trace_id, TracePhase::Error, format!("{} timed out", label), json!({ "secs": secs }));
                None
            }
        }
    }

    /// Save a newly issued session handle, or refresh the existing one.
    fn update_session(&self, turn: &Turn<'_>, previous: Option<&str>, generation: &Generation) -> EngineResult<()> {
        let sessions = self.store.sessions(self.config.session_ttl_secs);
        match generation.session_handle.as_deref() {
            Some(handle) if Some(handle) != previous => sessions.save(turn.channel, turn.thread, handle),
            _ if previous.is_some() => sessions.touch(turn.channel, turn.thread).map(|_| ()),
            _ => Ok(()),
        }
    }

    /// Attach the backend's classification of the user's message.
    fn apply_user_verb(&self, turn: &Turn<'_>, raw: &str) -> EngineResult<()> {
        let verb = tags::extract(raw, TAG_USER_VERB).content;
        let verb: String = verb.split_whitespace().next().unwrap_or("").to_lowercase().chars().take(32).collect();
        if !verb.is_empty() {
            self.store.set_verb_on_latest_user_message(turn.channel, turn.thread, &verb)?;
        }
        Ok(())
    }

    // ── Conditional writes ─────────────────────────────────────────────────
    // A gate said true. A missing or empty section is a gate inconsistency:
    // warn, skip the write, keep going.

    fn apply_profile_update(&self, turn: &Turn<'_>, content: &str) -> EngineResult<bool> {
        if content.trim().is_empty() {
            warn!("[cycle] {} profile gate true but no <{}>, skipping", turn.trace_id, TAG_PROFILE_UPDATE);
            return Ok(false);
        }
        let (current, _) = self.store.get_or_create_profile(turn.user_id, turn.display_name)?;
        let updated = profile::replace_keeping_meta(&current.profile_text, content);
        self.store.save_profile(turn.user_id, &current.display_name, &updated)?;
        self.record(
            turn,
            self.persona_id(),
            EntryType::Mutation,
            &format!("Rewrote profile of {}", turn.user_id),
            None,
            Some(json!({ "target": "profile", "user_id": turn.user_id, "chars": updated.len() })),
        )?;
        self.trace.emit(&turn.trace_id, TracePhase::Memory, "profile rewritten", json!({ "user_id": turn.user_id }));
        Ok(true)
    }

    fn apply_dossier_updates(&self, turn: &Turn<'_>, raw: &str) -> EngineResult<usize> {
        let updates: Vec<_> = tags::extract_all_dual(raw, TAG_DOSSIER_UPDATE, "name", "type")
            .into_iter()
            .filter(|d| d.first.is_some() && !d.content.is_empty())
            .collect();
        if updates.is_empty() {
            warn!("[cycle] {} dossier gate true but no named <{}>, skipping", turn.trace_id, TAG_DOSSIER_UPDATE);
            return Ok(0);
        }
        for d in &updates {
            let name = d.first.as_deref().unwrap_or_default();
            let kind = crate::atoms::types::DossierKind::parse(d.second.as_deref().unwrap_or(""));
            self.store.save_dossier(name, kind, &d.content)?;
            self.record(
                turn,
                self.persona_id(),
                EntryType::Mutation,
                &format!("Rewrote dossier {}", name),
                None,
                Some(json!({ "target": "dossier", "name": name, "kind": kind.as_str() })),
            )?;
            self.trace.emit(&turn.trace_id, TracePhase::Memory, format!("dossier {}", name), Value::Null);
        }
        Ok(updates.len())
    }

    fn apply_state_update(&self, turn: &Turn<'_>, content: &str) -> EngineResult<usize> {
        let pairs = parse_state_lines(content);
        if pairs.is_empty() {
            warn!("[cycle] {} state gate true but no usable <{}>, skipping", turn.trace_id, TAG_STATE_UPDATE);
            return Ok(0);
        }
        let mut keys = Vec::new();
        for (k, v) in &pairs {
            if self.store.set_global(k, v)? {
                keys.push(k.clone());
            }
        }
        self.record(
            turn,
            self.persona_id(),
            EntryType::Mutation,
            &format!("Updated state: {}", keys.join(", ")),
            None,
            Some(json!({ "target": "global_state", "keys": keys })),
        )?;
        self.trace.emit(&turn.trace_id, TracePhase::Memory, "global state updated", json!({ "keys": keys }));
        Ok(keys.len())
    }

    /// End-of-cycle bookkeeping shared by both modes: consume injected
    /// whispers, then give the advisor its turn.
    async fn finish(&self, turn: &Turn<'_>, ctx: &AssembledContext, monologue: &str, reply: String) -> EngineResult<String> {
        if !ctx.whispers.is_empty() {
            self.store.consume_whispers(&ctx.whisper_ids())?;
            for w in &ctx.whispers {
                self.record(turn, &w.source, EntryType::Whisper, &w.content, None, Some(json!({ "whisper_id": w.id })))?;
            }
        }
        if let Some(advisor) = &self.advisor {
            let snapshot = whisper::snapshot(&self.store, monologue)?;
            whisper::collect(&self.store, advisor.as_ref(), &snapshot, self.config.advisor_timeout_secs).await?;
        }
        Ok(reply)
    }
}
