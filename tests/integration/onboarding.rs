use crate::common::*;
use daimon::atoms::types::EntryType;
use daimon::engine::profile;
use daimon::EngineConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn interviewer() -> MockProvider {
    MockProvider::scripted("mock", |req| {
        let p = &req.prompt;
        let out = if p.contains("## First meeting") {
            "<external_dialogue>Hello there! What should I call you?</external_dialogue>"
        } else if p.contains("<name>...</name>") {
            "<name>Ada</name><external_dialogue>Lovely to meet you, Ada. Are you my primary person?</external_dialogue>"
        } else if p.contains("<primary_user>...</primary_user>") {
            "<primary_user>yes</primary_user>"
        } else if p.contains("<preferences>...</preferences>") {
            "<preferences>brief replies</preferences>"
        } else if p.contains("<features>...</features>") {
            "<features>both</features>"
        } else {
            return Ok(unified_reply("Back to normal."));
        };
        Ok(out.to_string())
    })
}

#[tokio::test]
async fn four_stage_interview_then_normal_cycle() {
    let mock = interviewer().arc();
    let cfg = EngineConfig { onboarding_enabled: true, ..config() };
    let engine = engine(cfg, &[mock.clone()]);

    assert_eq!(say(&engine, "hi").await, "Hello there! What should I call you?");
    assert_eq!(say(&engine, "call me Ada").await, "Lovely to meet you, Ada. Are you my primary person?");
    // No dialogue from the backend: the next question is asked verbatim.
    assert!(say(&engine, "yes").await.starts_with("How would you like me to be"));
    say(&engine, "keep it short").await;
    assert!(say(&engine, "both please").await.contains("everything I need"));

    let text = engine.store().get_profile("u1").unwrap().unwrap().profile_text;
    let meta = profile::parse_meta(&text);
    assert!(meta.onboarding_complete);
    assert_eq!(meta.onboarding_stage, 4);
    assert_eq!(meta.canonical_name.as_deref(), Some("Ada"));
    assert_eq!(meta.role.as_deref(), Some("primary"));
    assert!(text.contains("- brief replies"));
    assert!(text.contains("## Features\n- both"));

    let answered = engine
        .store()
        .entries_of_type("dm", "t", EntryType::OnboardingStep)
        .unwrap()
        .into_iter()
        .filter(|e| e.metadata["phase"] == "answered")
        .count();
    assert_eq!(answered, 4);

    assert_eq!(say(&engine, "what now?").await, "Back to normal.");
    let prompts = mock.prompts();
    assert!(prompts[..5].iter().all(|p| !p.contains("## Instructions")));
    assert!(prompts[5].contains("## Instructions"));
}

#[tokio::test]
async fn greeting_survives_backend_failure() {
    let cfg = EngineConfig { onboarding_enabled: true, ..config() };
    let engine = engine(cfg, &[MockProvider::failing("mock").arc()]);
    let reply = say(&engine, "hi").await;
    assert!(reply.contains("what should I call you?"));

    // Failed extraction still advances, using the user's own words.
    say(&engine, "Ada").await;
    let text = engine.store().get_profile("u1").unwrap().unwrap().profile_text;
    assert_eq!(profile::parse_meta(&text).canonical_name.as_deref(), Some("Ada"));
    assert_eq!(profile::parse_meta(&text).onboarding_stage, 1);
}

#[tokio::test]
async fn onboarding_off_skips_interview() {
    let mock = interviewer().arc();
    let engine = engine(config(), &[mock.clone()]);
    assert_eq!(say(&engine, "hi").await, "Back to normal.");
    assert!(engine.store().entries_of_type("dm", "t", EntryType::OnboardingStep).unwrap().is_empty());
}

#[tokio::test]
async fn greeting_is_not_repeated_in_another_thread() {
    let mock = interviewer().arc();
    let cfg = EngineConfig { onboarding_enabled: true, ..config() };
    let engine = engine(cfg, &[mock.clone()]);

    assert_eq!(say(&engine, "hi").await, "Hello there! What should I call you?");
    let reply = engine.process_cycle("call me Ada", "dm", "elsewhere", "u1", "Ada").await.unwrap();
    assert_eq!(reply, "Lovely to meet you, Ada. Are you my primary person?");

    let meta = profile::parse_meta(&engine.store().get_profile("u1").unwrap().unwrap().profile_text);
    assert!(meta.onboarding_greeted);
    assert_eq!(meta.onboarding_stage, 1);
    assert_eq!(meta.canonical_name.as_deref(), Some("Ada"));
    assert_eq!(mock.prompts().iter().filter(|p| p.contains("## First meeting")).count(), 1);
}

#[tokio::test]
async fn profile_rewrite_with_front_matter_keeps_onboarding_done() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mock = MockProvider::scripted("mock", move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(unified_reply("Noted.").replace(
                "<user_model_check>false</user_model_check>",
                "<user_model_check>true</user_model_check>\n\
<user_model_update>---\ncanonical_name: Ada\n---\n# Ada\n\nLikes tea.</user_model_update>",
            ))
        } else {
            Ok(unified_reply("Back to normal."))
        }
    })
    .arc();
    let cfg = EngineConfig { onboarding_enabled: true, ..config() };
    let engine = engine(cfg, &[mock]);

    let store = engine.store();
    let (user, _) = store.get_or_create_profile("u1", "Ada").unwrap();
    let mut text = profile::set_field(&user.profile_text, "onboarding_complete", "true");
    text = profile::set_field(&text, "onboarding_stage", "4");
    store.save_profile("u1", "Ada", &text).unwrap();

    assert_eq!(say(&engine, "I like tea").await, "Noted.");
    let text = store.get_profile("u1").unwrap().unwrap().profile_text;
    assert!(text.contains("Likes tea."));
    assert!(profile::parse_meta(&text).onboarding_complete);

    // Working memory expires; the profile alone must keep the interview closed.
    store.cleanup_before(chrono::Utc::now() + chrono::Duration::hours(1)).unwrap();
    assert_eq!(say(&engine, "hello again").await, "Back to normal.");
    assert!(store.entries_of_type("dm", "t", EntryType::OnboardingStep).unwrap().is_empty());
}
