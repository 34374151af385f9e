// Terminal mode: a local operator talks to the backend with no persona, no
// profile, no gates and no onboarding. Core steps only; entries are still
// trace-linked under the terminal channel.

use super::{resolve_dialogue, CycleEngine, Turn};
use crate::atoms::constants::*;
use crate::atoms::error::EngineResult;
use crate::atoms::types::EntryType;
use crate::engine::steps::base_vars;
use crate::engine::tags;
use crate::engine::trace::TracePhase;
use serde_json::{json, Value};

const OPERATOR: &str = "operator";

impl CycleEngine {
    pub async fn process_terminal(&self, text: &str, thread: &str) -> EngineResult<String> {
        let turn = Turn {
            text,
            channel: TERMINAL_CHANNEL,
            thread,
            user_id: OPERATOR,
            display_name: OPERATOR,
            trace_id: uuid::Uuid::new_v4().to_string(),
            interaction: 0,
        };
        self.trace.emit(&turn.trace_id, TracePhase::Stimulus, super::preview(text), json!({ "channel": TERMINAL_CHANNEL }));

        let result = self.run_terminal(&turn).await;
        match &result {
            Ok(reply) => self.trace.emit(&turn.trace_id, TracePhase::Response, super::preview(reply), Value::Null),
            Err(e) => self.trace.emit(&turn.trace_id, TracePhase::Error, e.to_string(), json!({ "fatal": true })),
        }
        result
    }

    async fn run_terminal(&self, turn: &Turn<'_>) -> EngineResult<String> {
        let instructions = self.steps.core_instructions(&base_vars("the assistant", OPERATOR));
        let ctx = self.assembler.build_terminal(&self.store, turn.text, &instructions)?;
        self.record_user_message(turn)?;

        let previous = self.store.sessions(self.config.session_ttl_secs).get(turn.channel, turn.thread)?;
        let Some(generation) = self.call(turn, "terminal", None, ctx.prompt, previous.clone()).await else {
            let reply = FALLBACK_REPLY.to_string();
            self.record(turn, self.persona_id(), EntryType::Dialogue, &reply, None, Some(json!({ "fallback": true })))?;
            return Ok(reply);
        };
        self.update_session(turn, previous.as_deref(), &generation)?;

        let monologue = tags::extract(&generation.text, TAG_MONOLOGUE);
        if !monologue.is_empty() {
            self.record(turn, self.persona_id(), EntryType::Monologue, &monologue.content, monologue.attribute.as_deref(), None)?;
        }
        let (reply, verb) = resolve_dialogue(&generation.text);
        self.record(turn, self.persona_id(), EntryType::Dialogue, &reply, verb.as_deref(), None)?;
        Ok(reply)
    }
}
