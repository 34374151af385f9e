// Split mode: every step is its own call, routed by its override, and sees
// the shared context plus all earlier tagged outputs. A failed step yields
// nothing and the chain continues.
//
//   monologue → dialogue → profile_check
//     → (profile_reflection → profile_update → inner_voice)  if true
//   → state_check  every Nth cycle
//     → state_update  if true

use super::{extract_or_strip, resolve_dialogue, CycleEngine, Turn};
use crate::atoms::constants::*;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{EntryType, Generation};
use crate::engine::context::AssembledContext;
use crate::engine::steps::*;
use crate::engine::tags;
use crate::engine::template::TemplateVars;
use serde_json::json;

/// Everything a step call needs besides the step itself.
struct Chain<'c> {
    ctx: &'c AssembledContext,
    vars: &'c TemplateVars<'static>,
    prior: String,
}

impl CycleEngine {
    fn step(&self, name: &str) -> EngineResult<&CognitiveStep> {
        self.steps.get(name).ok_or_else(|| EngineError::Config(format!("step '{}' is not registered", name)))
    }

    async fn run_step(
        &self,
        turn: &Turn<'_>,
        step: &CognitiveStep,
        chain: &Chain<'_>,
        resume: Option<String>,
    ) -> Option<Generation> {
        let prompt = self.steps.split_prompt(step, &chain.ctx.prompt, &chain.prior, chain.vars);
        self.call(turn, step.name, Some(&step.backend_override), prompt, resume).await
    }

    /// Run a gate step. `None` when the call failed; nothing is recorded then.
    async fn run_gate(&self, turn: &Turn<'_>, name: &str, question: &str, chain: &mut Chain<'_>) -> EngineResult<Option<bool>> {
        let step = self.step(name)?;
        let Some(g) = self.run_step(turn, step, chain, None).await else {
            return Ok(None);
        };
        let result = tags::parse_gate(&g.text, step.output_tag);
        self.record_gate(turn, name, question, result)?;
        append_prior(&mut chain.prior, step.output_tag, if result { GATE_TRUE } else { "false" }, None);
        Ok(Some(result))
    }

    /// Free-text step whose output is recorded as `entry_type`.
    async fn run_text_step(
        &self,
        turn: &Turn<'_>,
        name: &str,
        entry_type: EntryType,
        chain: &mut Chain<'_>,
    ) -> EngineResult<tags::Extracted> {
        let step = self.step(name)?;
        let out = match self.run_step(turn, step, chain, None).await {
            Some(g) => extract_or_strip(&g.text, step.output_tag),
            None => tags::Extracted::default(),
        };
        if !out.is_empty() {
            self.record(
                turn,
                self.persona_id(),
                entry_type,
                &out.content,
                out.attribute.as_deref(),
                Some(json!({ "step": name })),
            )?;
            append_prior(&mut chain.prior, step.output_tag, &out.content, out.attribute.as_deref());
        }
        Ok(out)
    }

    pub(super) async fn run_split(&self, turn: &Turn<'_>) -> EngineResult<String> {
        let vars = self.step_vars(turn)?;
        let ctx = self.assemble(turn, "")?;
        self.record_user_message(turn)?;
        let mut chain = Chain { ctx: &ctx, vars: &vars, prior: String::new() };

        let monologue = self.run_text_step(turn, STEP_MONOLOGUE, EntryType::Monologue, &mut chain).await?;

        // Only the dialogue step continues the backend session.
        let dialogue = self.step(STEP_DIALOGUE)?;
        let previous = self.store.sessions(self.config.session_ttl_secs).get(turn.channel, turn.thread)?;
        let (reply, verb) = match self.run_step(turn, dialogue, &chain, previous.clone()).await {
            Some(g) => {
                self.update_session(turn, previous.as_deref(), &g)?;
                self.apply_user_verb(turn, &g.text)?;
                resolve_dialogue(&g.text)
            }
            None => (FALLBACK_REPLY.to_string(), None),
        };
        let fallback = reply == FALLBACK_REPLY;
        self.record(
            turn,
            self.persona_id(),
            EntryType::Dialogue,
            &reply,
            verb.as_deref(),
            fallback.then(|| json!({ "fallback": true })),
        )?;
        if !fallback {
            append_prior(&mut chain.prior, TAG_DIALOGUE, &reply, verb.as_deref());
        }

        if self.run_gate(turn, STEP_PROFILE_CHECK, PROFILE_GATE_QUESTION, &mut chain).await? == Some(true) {
            self.run_text_step(turn, STEP_PROFILE_REFLECTION, EntryType::Monologue, &mut chain).await?;

            let update_step = self.step(STEP_PROFILE_UPDATE)?;
            let content = match self.run_step(turn, update_step, &chain, None).await {
                Some(g) => tags::extract(&g.text, update_step.output_tag).content,
                None => String::new(),
            };
            if self.apply_profile_update(turn, &content)? {
                append_prior(&mut chain.prior, update_step.output_tag, &content, None);
            }

            self.run_text_step(turn, STEP_INNER_VOICE, EntryType::InnerVoice, &mut chain).await?;
        }

        if self.soul_state_due(turn.interaction)
            && self.run_gate(turn, STEP_STATE_CHECK, STATE_GATE_QUESTION, &mut chain).await? == Some(true)
        {
            let update_step = self.step(STEP_STATE_UPDATE)?;
            let content = match self.run_step(turn, update_step, &chain, None).await {
                Some(g) => tags::extract(&g.text, update_step.output_tag).content,
                None => String::new(),
            };
            self.apply_state_update(turn, &content)?;
        }

        self.finish(turn, &ctx, &monologue.content, reply).await
    }
}
