use crate::common::*;
use daimon::atoms::types::{EntryType, ExecutionMode};
use daimon::{EngineConfig, ProviderError};

fn split_config() -> EngineConfig {
    EngineConfig { mode: ExecutionMode::Split, ..config() }
}

/// Answers each step by the tag its task asks for.
fn stepper(monologue_fails: bool, profile_gate: bool) -> MockProvider {
    MockProvider::scripted("mock", move |req| {
        let t = task(&req.prompt);
        let out = if t.contains("<internal_monologue") {
            if monologue_fails {
                return Err(ProviderError::Api { status: 500, message: "boom".into() });
            }
            "<internal_monologue verb=\"wondered\">They seem curious.</internal_monologue>"
        } else if t.contains("<external_dialogue") {
            "<external_dialogue verb=\"said\">Hi from split</external_dialogue>"
        } else if t.contains("<user_model_check>") {
            if profile_gate {
                "<user_model_check>true</user_model_check>"
            } else {
                "<user_model_check>false</user_model_check>"
            }
        } else if t.contains("<user_model_reflection>") {
            "<user_model_reflection>They like trains.</user_model_reflection>"
        } else if t.contains("<user_model_update>") {
            "<user_model_update># Ada\n\nLikes trains.</user_model_update>"
        } else if t.contains("<inner_voice>") {
            "<inner_voice>Warm toward them.</inner_voice>"
        } else {
            ""
        };
        Ok(out.to_string())
    })
}

#[tokio::test]
async fn failed_monologue_does_not_block_dialogue() {
    let mock = stepper(true, false).arc();
    let engine = engine(split_config(), &[mock.clone()]);

    assert_eq!(say(&engine, "hello").await, "Hi from split");

    let kinds: Vec<EntryType> =
        engine.store().get_recent("dm", "t", 100).unwrap().iter().map(|e| e.entry_type).collect();
    assert_eq!(kinds, vec![EntryType::UserMessage, EntryType::Dialogue, EntryType::GateResult]);
    // monologue, dialogue, profile gate
    assert_eq!(mock.calls(), 3);
}

#[tokio::test]
async fn profile_gate_runs_reflection_update_and_inner_voice() {
    let mock = stepper(false, true).arc();
    let engine = engine(split_config(), &[mock.clone()]);

    say(&engine, "I love trains").await;

    let entries = engine.store().get_recent("dm", "t", 100).unwrap();
    let kinds: Vec<EntryType> = entries.iter().map(|e| e.entry_type).collect();
    assert_eq!(
        kinds,
        vec![
            EntryType::UserMessage,
            EntryType::Monologue,
            EntryType::Dialogue,
            EntryType::GateResult,
            EntryType::Monologue,
            EntryType::Mutation,
            EntryType::InnerVoice,
        ]
    );
    assert_eq!(entries[4].metadata["step"], "profile_reflection");
    assert!(engine.store().get_profile("u1").unwrap().unwrap().profile_text.contains("Likes trains."));

    // Later steps see earlier outputs verbatim.
    let prompts = mock.prompts();
    let reflection = prompts.iter().find(|p| task(p).contains("<user_model_reflection>")).unwrap();
    assert!(reflection.contains("## Prior cognitive steps"));
    assert!(reflection.contains("<external_dialogue verb=\"said\">Hi from split</external_dialogue>"));
    assert!(reflection.contains("<user_model_check>true</user_model_check>"));
}

#[tokio::test]
async fn step_override_routes_to_its_own_backend() {
    let main = stepper(false, false).arc();
    let thinker = MockProvider::replying("thinker", "<internal_monologue>deep thought</internal_monologue>").arc();
    let mut cfg = split_config();
    cfg.steps.insert(
        "monologue".into(),
        daimon::BackendTarget { provider: Some("thinker".into()), model: Some("big".into()) },
    );
    let engine = engine(cfg, &[main.clone(), thinker.clone()]);

    say(&engine, "hello").await;

    let thinker_requests = thinker.requests();
    assert_eq!(thinker_requests.len(), 1);
    assert_eq!(thinker_requests[0].model.as_deref(), Some("big"));
    assert!(main.prompts().iter().all(|p| !task(p).contains("<internal_monologue")));
}
