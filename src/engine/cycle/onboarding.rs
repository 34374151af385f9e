// First-contact interview. Intercepts the cycle while a profile is marked
// incomplete; no cognitive steps run meanwhile.
//
// Stage = number of answered onboarding entries in working memory (or the
// front-matter mirror, whichever is further along). Each turn records the
// answer to the current stage and asks the next question; the last answer
// marks the profile complete. The greeting is asked once per user: the
// profile's `onboarding_greeted` flag covers threads with no entries yet.

use super::{CycleEngine, Turn};
use crate::atoms::constants::*;
use crate::atoms::error::EngineResult;
use crate::atoms::types::{EntryType, UserProfile, WorkingMemoryEntry};
use crate::engine::context::fence_message;
use crate::engine::{profile, tags};
use log::info;
use serde_json::json;

/// Longest name taken verbatim from a reply the backend did not tag.
const MAX_NAME_CHARS: usize = 64;

struct Stage {
    key: &'static str,
    tag: &'static str,
    question: &'static str,
}

const STAGES: [Stage; ONBOARDING_STAGES] = [
    Stage { key: "name", tag: TAG_ONBOARDING_NAME, question: "What name would you like me to call you?" },
    Stage {
        key: "primary_user",
        tag: TAG_ONBOARDING_PRIMARY,
        question: "Are you my primary person, the one I mainly work with? (yes or no)",
    },
    Stage {
        key: "preferences",
        tag: TAG_ONBOARDING_PREFERENCES,
        question: "How would you like me to be with you? Brief or chatty, playful or serious?",
    },
    Stage {
        key: "features",
        tag: TAG_ONBOARDING_FEATURES,
        question: "Should I keep notes on people and subjects you mention, track what you're working on, or both?",
    },
];

const DONE_MESSAGE: &str = "Thank you, that's everything I need. What's on your mind?";

fn phase(e: &WorkingMemoryEntry) -> &str {
    e.metadata.get("phase").and_then(|v| v.as_str()).unwrap_or("")
}

fn is_affirmative(answer: &str) -> bool {
    let a = answer.trim().to_lowercase();
    let first = a.split(|c: char| !c.is_alphanumeric()).next().unwrap_or("");
    matches!(first, "yes" | "y" | "yeah" | "yep" | "sure" | "true" | "primary" | "me") || a.contains("i am")
}

/// Answer to use when the backend gave no tagged extraction.
fn untagged_answer(stage: &Stage, text: &str) -> String {
    let line = text.trim().lines().next().unwrap_or("").trim();
    if stage.key == "name" {
        line.chars().take(MAX_NAME_CHARS).collect()
    } else {
        line.to_string()
    }
}

/// Fold one stage's answer into the profile document.
fn apply_answer(text: &str, stage: &Stage, answer: &str) -> String {
    match stage.key {
        "name" => profile::set_field(text, "canonical_name", answer),
        "primary_user" => profile::set_field(text, "role", if is_affirmative(answer) { "primary" } else { "guest" }),
        "preferences" => profile::append_to_section(text, "Preferences", &format!("- {}", answer)),
        _ => profile::append_to_section(text, "Features", &format!("- {}", answer)),
    }
}

impl CycleEngine {
    /// Run the interview turn. `None` means onboarding is already finished
    /// and the normal cycle should run.
    pub(super) async fn onboard(&self, turn: &Turn<'_>, user: &UserProfile) -> EngineResult<Option<String>> {
        let meta = profile::parse_meta(&user.profile_text);
        let entries = self.store.entries_of_type(turn.channel, turn.thread, EntryType::OnboardingStep)?;
        let answered = entries.iter().filter(|e| phase(e) == "answered").count();
        let stage = answered.max(meta.onboarding_stage);

        if stage >= ONBOARDING_STAGES {
            let text = profile::set_field(&user.profile_text, "onboarding_complete", "true");
            self.store.save_profile(turn.user_id, &user.display_name, &text)?;
            info!("[onboarding] {} already answered every stage, marking complete", turn.user_id);
            return Ok(None);
        }

        self.record_user_message(turn)?;

        if entries.is_empty() && stage == 0 && !meta.onboarding_greeted {
            let text = profile::set_field(&user.profile_text, "onboarding_greeted", "true");
            self.store.save_profile(turn.user_id, &user.display_name, &text)?;
            let reply = self.greet(turn).await;
            self.record(
                turn,
                self.persona_id(),
                EntryType::OnboardingStep,
                STAGES[0].question,
                None,
                Some(json!({ "stage": 0, "phase": "asked", "key": STAGES[0].key })),
            )?;
            self.record(turn, self.persona_id(), EntryType::Dialogue, &reply, None, None)?;
            return Ok(Some(reply));
        }

        let current = &STAGES[stage];
        let next = STAGES.get(stage + 1);
        let raw = self
            .call(turn, "onboarding", None, self.interview_prompt(turn, current, next), None)
            .await
            .map(|g| g.text)
            .unwrap_or_default();

        let tagged = tags::extract(&raw, current.tag).content;
        let answer = if tagged.is_empty() { untagged_answer(current, turn.text) } else { tagged };

        let mut text = apply_answer(&user.profile_text, current, &answer);
        text = profile::set_field(&text, "onboarding_stage", &(stage + 1).to_string());
        let complete = next.is_none();
        if complete {
            text = profile::set_field(&text, "onboarding_complete", "true");
        }
        self.store.save_profile(turn.user_id, &user.display_name, &text)?;
        info!("[onboarding] {} answered stage {} ({})", turn.user_id, stage, current.key);

        self.record(
            turn,
            turn.user_id,
            EntryType::OnboardingStep,
            &answer,
            None,
            Some(json!({ "stage": stage, "phase": "answered", "key": current.key })),
        )?;
        self.record(
            turn,
            self.persona_id(),
            EntryType::Mutation,
            &format!("Onboarding {} recorded", current.key),
            None,
            Some(json!({ "target": "profile", "field": current.key, "complete": complete })),
        )?;
        if let Some(n) = next {
            self.record(
                turn,
                self.persona_id(),
                EntryType::OnboardingStep,
                n.question,
                None,
                Some(json!({ "stage": stage + 1, "phase": "asked", "key": n.key })),
            )?;
        }

        let dialogue = tags::extract(&raw, TAG_DIALOGUE).content;
        let reply = if !dialogue.is_empty() {
            dialogue
        } else {
            next.map(|n| n.question).unwrap_or(DONE_MESSAGE).to_string()
        };
        self.record(turn, self.persona_id(), EntryType::Dialogue, &reply, None, None)?;
        Ok(Some(reply))
    }

    async fn greet(&self, turn: &Turn<'_>) -> String {
        let prompt = format!(
            "{}\n\n## First meeting\nThis is the first time you are talking with {}. Greet them briefly and ask \
what name they would like you to use. Put your reply inside <{}>...</{}>.\n\n{}",
            self.assembler.persona(),
            turn.display_name,
            TAG_DIALOGUE,
            TAG_DIALOGUE,
            fence_message(turn.display_name, turn.text)
        );
        let fixed = format!("Hi, I'm {}. Before we begin, what should I call you?", self.config.persona_name);
        match self.call(turn, "onboarding_greeting", None, prompt, None).await {
            Some(g) => {
                let d = tags::extract(&g.text, TAG_DIALOGUE).content;
                if d.is_empty() {
                    let stripped = tags::strip_all(&g.text);
                    if stripped.is_empty() { fixed } else { stripped }
                } else {
                    d
                }
            }
            None => fixed,
        }
    }

    fn interview_prompt(&self, turn: &Turn<'_>, current: &Stage, next: Option<&Stage>) -> String {
        let follow_up = match next {
            Some(n) => format!("acknowledge it in a few words and then ask: \"{}\"", n.question),
            None => "thank them and tell them you're ready to talk.".to_string(),
        };
        format!(
            "{}\n\n## Getting to know {}\nYou asked them: \"{}\"\n\n{}\n\nPut their answer, as briefly as possible, \
inside <{tag}>...</{tag}>. Then, inside <{d}>...</{d}>, {}",
            self.assembler.persona(),
            turn.display_name,
            current.question,
            fence_message(turn.display_name, turn.text),
            follow_up,
            tag = current.tag,
            d = TAG_DIALOGUE,
        )
    }
}
