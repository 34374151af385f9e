// Unified mode: one composite call carries every active step. Gates are read
// from the same response and their conditional writes fire on the gate alone.

use super::{resolve_dialogue, CycleEngine, Turn};
use crate::atoms::constants::*;
use crate::atoms::error::EngineResult;
use crate::atoms::types::EntryType;
use crate::engine::steps::{UnifiedPlan, STEP_DOSSIER_CHECK, STEP_PROFILE_CHECK, STEP_STATE_CHECK};
use crate::engine::tags;
use serde_json::json;

impl CycleEngine {
    pub(super) async fn run_unified(&self, turn: &Turn<'_>) -> EngineResult<String> {
        let plan = UnifiedPlan {
            dossiers: self.config.dossiers_enabled,
            soul_state: self.soul_state_due(turn.interaction),
        };
        let vars = self.step_vars(turn)?;
        let instructions = self.steps.unified_instructions(plan, &vars);
        let ctx = self.assemble(turn, &instructions)?;
        self.record_user_message(turn)?;

        let previous = self.store.sessions(self.config.session_ttl_secs).get(turn.channel, turn.thread)?;
        let Some(generation) = self.call(turn, "unified", None, ctx.prompt.clone(), previous.clone()).await else {
            let reply = FALLBACK_REPLY.to_string();
            self.record(turn, self.persona_id(), EntryType::Dialogue, &reply, None, Some(json!({ "fallback": true })))?;
            return self.finish(turn, &ctx, "", reply).await;
        };
        self.update_session(turn, previous.as_deref(), &generation)?;
        let raw = generation.text.as_str();

        let monologue = tags::extract(raw, TAG_MONOLOGUE);
        if !monologue.is_empty() {
            self.record(turn, self.persona_id(), EntryType::Monologue, &monologue.content, monologue.attribute.as_deref(), None)?;
        }
        self.apply_user_verb(turn, raw)?;

        let (reply, verb) = resolve_dialogue(raw);
        self.record(turn, self.persona_id(), EntryType::Dialogue, &reply, verb.as_deref(), None)?;

        let profile_gate = tags::parse_gate(raw, TAG_PROFILE_CHECK);
        self.record_gate(turn, STEP_PROFILE_CHECK, PROFILE_GATE_QUESTION, profile_gate)?;
        if profile_gate {
            self.apply_profile_update(turn, &tags::extract(raw, TAG_PROFILE_UPDATE).content)?;
        }

        if plan.dossiers {
            let dossier_gate = tags::parse_gate(raw, TAG_DOSSIER_CHECK);
            self.record_gate(turn, STEP_DOSSIER_CHECK, DOSSIER_GATE_QUESTION, dossier_gate)?;
            if dossier_gate {
                self.apply_dossier_updates(turn, raw)?;
            }
        }

        if plan.soul_state {
            let state_gate = tags::parse_gate(raw, TAG_STATE_CHECK);
            self.record_gate(turn, STEP_STATE_CHECK, STATE_GATE_QUESTION, state_gate)?;
            if state_gate {
                self.apply_state_update(turn, &tags::extract(raw, TAG_STATE_UPDATE).content)?;
            }
        }

        self.finish(turn, &ctx, &monologue.content, reply).await
    }
}
