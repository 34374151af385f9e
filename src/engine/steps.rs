// Daimon Engine — Step Registry
//
// The fixed catalog of cognitive steps. Both execution modes read it:
//   unified — every active step's prompt is folded into one instruction block
//   split   — each step is its own call, routed by its backend override
//
// Step prompts are templates over these placeholders:
//   {persona_name} {user_name} {profile} {global_state} {state_keys}
//   {dossier_names} {profile_gate_question} {dossier_gate_question}
//   {state_gate_question}

use crate::atoms::constants::*;
use crate::atoms::types::{BackendTarget, StepCategory};
use crate::engine::tags;
use crate::engine::template::{render, TemplateVars};
use log::warn;
use std::collections::HashMap;

pub const STEP_MONOLOGUE: &str = "monologue";
pub const STEP_DIALOGUE: &str = "dialogue";
pub const STEP_PROFILE_CHECK: &str = "profile_check";
pub const STEP_PROFILE_REFLECTION: &str = "profile_reflection";
pub const STEP_PROFILE_UPDATE: &str = "profile_update";
pub const STEP_INNER_VOICE: &str = "inner_voice";
pub const STEP_DOSSIER_CHECK: &str = "dossier_check";
pub const STEP_DOSSIER_UPDATE: &str = "dossier_update";
pub const STEP_STATE_CHECK: &str = "state_check";
pub const STEP_STATE_UPDATE: &str = "state_update";

#[derive(Debug, Clone)]
pub struct CognitiveStep {
    pub name: &'static str,
    pub prompt_template: &'static str,
    pub output_tag: &'static str,
    pub category: StepCategory,
    /// Gate step that must be true before this one runs.
    pub gated_by: Option<&'static str>,
    /// Empty → inherit the engine default.
    pub backend_override: BackendTarget,
}

impl CognitiveStep {
    const fn new(
        name: &'static str,
        category: StepCategory,
        output_tag: &'static str,
        gated_by: Option<&'static str>,
        prompt_template: &'static str,
    ) -> Self {
        CognitiveStep {
            name,
            prompt_template,
            output_tag,
            category,
            gated_by,
            backend_override: BackendTarget { provider: None, model: None },
        }
    }

    pub fn render(&self, vars: &TemplateVars<'_>) -> String {
        render(self.prompt_template, vars)
    }
}

fn builtin_steps() -> Vec<CognitiveStep> {
    use StepCategory::*;
    vec![
        CognitiveStep::new(
            STEP_MONOLOGUE,
            Core,
            TAG_MONOLOGUE,
            None,
            "Think privately, as {persona_name}, about what {user_name} just said and what they need. \
Write it inside <internal_monologue verb=\"...\">...</internal_monologue>, where the verb is one \
word for how you thought (pondered, noticed, wondered).",
        ),
        CognitiveStep::new(
            STEP_DIALOGUE,
            Core,
            TAG_DIALOGUE,
            None,
            "Reply to {user_name} as {persona_name}. Put exactly the words they should see inside \
<external_dialogue verb=\"...\">...</external_dialogue>, with a one-word verb for how you said it. \
Optionally classify their message with <user_verb>asked</user_verb> (asked, said, joked, vented...).",
        ),
        CognitiveStep::new(
            STEP_PROFILE_CHECK,
            Gate,
            TAG_PROFILE_CHECK,
            None,
            "{profile_gate_question} Answer with exactly <user_model_check>true</user_model_check> \
or <user_model_check>false</user_model_check>.",
        ),
        CognitiveStep::new(
            STEP_PROFILE_REFLECTION,
            Conditional,
            TAG_PROFILE_REFLECTION,
            Some(STEP_PROFILE_CHECK),
            "Reflect on what this exchange taught you about {user_name} that you did not know. \
Write it inside <user_model_reflection>...</user_model_reflection>.",
        ),
        CognitiveStep::new(
            STEP_PROFILE_UPDATE,
            Conditional,
            TAG_PROFILE_UPDATE,
            Some(STEP_PROFILE_CHECK),
            "Rewrite {user_name}'s complete profile, keeping everything still true and adding what \
you learned. Current profile:\n{profile}\nReturn the whole document inside \
<user_model_update>...</user_model_update>.",
        ),
        CognitiveStep::new(
            STEP_INNER_VOICE,
            Daimonic,
            TAG_INNER_VOICE,
            Some(STEP_PROFILE_CHECK),
            "As your inner voice, say in one or two sentences how {user_name} feels to you now. \
Write it inside <inner_voice>...</inner_voice>.",
        ),
        CognitiveStep::new(
            STEP_DOSSIER_CHECK,
            Gate,
            TAG_DOSSIER_CHECK,
            None,
            "{dossier_gate_question} Answer with exactly <dossier_check>true</dossier_check> or \
<dossier_check>false</dossier_check>.",
        ),
        CognitiveStep::new(
            STEP_DOSSIER_UPDATE,
            Conditional,
            TAG_DOSSIER_UPDATE,
            Some(STEP_DOSSIER_CHECK),
            "For each person or subject worth remembering, write its complete dossier inside \
<dossier_update name=\"...\" type=\"person|subject\">...</dossier_update>. Known dossiers: {dossier_names}.",
        ),
        CognitiveStep::new(
            STEP_STATE_CHECK,
            Gate,
            TAG_STATE_CHECK,
            None,
            "{state_gate_question} Answer with exactly <soul_state_check>true</soul_state_check> or \
<soul_state_check>false</soul_state_check>.",
        ),
        CognitiveStep::new(
            STEP_STATE_UPDATE,
            Conditional,
            TAG_STATE_UPDATE,
            Some(STEP_STATE_CHECK),
            "Write your updated state as `key: value` lines inside \
<soul_state_update>...</soul_state_update>. Allowed keys: {state_keys}. Current state:\n{global_state}",
        ),
    ]
}

/// Which optional steps a unified call carries this cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnifiedPlan {
    pub dossiers: bool,
    pub soul_state: bool,
}

#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: Vec<CognitiveStep>,
}

impl StepRegistry {
    pub fn builtin() -> Self {
        StepRegistry { steps: builtin_steps() }
    }

    /// Built-in steps with per-step routing applied. Unknown step names are
    /// logged and ignored.
    pub fn with_overrides(overrides: &HashMap<String, BackendTarget>) -> Self {
        let mut reg = Self::builtin();
        for (name, target) in overrides {
            match reg.steps.iter_mut().find(|s| s.name == name) {
                Some(step) => step.backend_override = target.clone(),
                None => warn!("[steps] Override for unknown step '{}' ignored", name),
            }
        }
        reg
    }

    pub fn get(&self, name: &str) -> Option<&CognitiveStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CognitiveStep> {
        self.steps.iter()
    }

    pub fn by_category(&self, category: StepCategory) -> impl Iterator<Item = &CognitiveStep> {
        self.steps.iter().filter(move |s| s.category == category)
    }

    fn render_step(&self, name: &str, vars: &TemplateVars<'_>) -> String {
        self.get(name).map(|s| s.render(vars)).unwrap_or_default()
    }

    /// Instruction block for a unified call: core steps, then each gate
    /// followed by its conditional write.
    pub fn unified_instructions(&self, plan: UnifiedPlan, vars: &TemplateVars<'_>) -> String {
        let mut pairs = vec![(STEP_PROFILE_CHECK, STEP_PROFILE_UPDATE)];
        if plan.dossiers {
            pairs.push((STEP_DOSSIER_CHECK, STEP_DOSSIER_UPDATE));
        }
        if plan.soul_state {
            pairs.push((STEP_STATE_CHECK, STEP_STATE_UPDATE));
        }

        let mut out = String::from(
            "## Instructions\nAnswer in tagged sections, in this order. Only text inside \
<external_dialogue> is shown to the user.\n",
        );
        let mut n = 0;
        for name in [STEP_MONOLOGUE, STEP_DIALOGUE] {
            n += 1;
            out.push_str(&format!("{}. {}\n", n, self.render_step(name, vars)));
        }
        for (gate, conditional) in pairs {
            n += 1;
            out.push_str(&format!(
                "{}. {}\n   Only if that answer is true: {}\n",
                n,
                self.render_step(gate, vars),
                self.render_step(conditional, vars)
            ));
        }
        out
    }

    /// Core steps only (terminal mode).
    pub fn core_instructions(&self, vars: &TemplateVars<'_>) -> String {
        let mut out = String::from("## Instructions\n");
        for (i, step) in self.by_category(StepCategory::Core).enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, step.render(vars)));
        }
        out
    }

    /// Prompt for one split-mode call: shared context, every prior tagged
    /// output verbatim, then this step's task.
    pub fn split_prompt(&self, step: &CognitiveStep, context: &str, prior: &str, vars: &TemplateVars<'_>) -> String {
        let mut out = String::with_capacity(context.len() + prior.len() + 512);
        out.push_str(context);
        if !prior.is_empty() {
            out.push_str("\n\n## Prior cognitive steps\n");
            out.push_str(prior);
        }
        out.push_str("\n\n## Your task\n");
        out.push_str(&step.render(vars));
        out
    }
}

/// Append one step's tagged output to the running "prior steps" block.
pub fn append_prior(prior: &mut String, tag: &str, content: &str, verb: Option<&str>) {
    if content.is_empty() {
        return;
    }
    if !prior.is_empty() {
        prior.push('\n');
    }
    prior.push_str(&tags::wrap(tag, content, verb.map(|v| ("verb", v))));
}

/// Variables shared by every step prompt.
pub fn base_vars<'a>(persona_name: &str, user_name: &str) -> TemplateVars<'a> {
    let keys: Vec<&str> = GLOBAL_STATE_DEFAULTS.iter().map(|(k, _)| *k).collect();
    TemplateVars::new()
        .set("persona_name", persona_name)
        .set("user_name", user_name)
        .set("profile_gate_question", PROFILE_GATE_QUESTION)
        .set("dossier_gate_question", DOSSIER_GATE_QUESTION)
        .set("state_gate_question", STATE_GATE_QUESTION)
        .set("state_keys", keys.join(", "))
}
