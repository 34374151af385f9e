use crate::common::*;
use async_trait::async_trait;
use daimon::atoms::constants::FALLBACK_REPLY;
use daimon::atoms::types::EntryType;
use daimon::engine::profile;
use daimon::engine::trace::{read_trace, TracePhase};
use daimon::{Advisor, EngineConfig, EngineResult, WhisperSnapshot};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn kinds(engine: &daimon::CycleEngine) -> Vec<EntryType> {
    engine.store().get_recent("dm", "t", 100).unwrap().iter().map(|e| e.entry_type).collect()
}

#[tokio::test]
async fn first_contact_creates_profile_and_shows_everything() {
    let mock = MockProvider::replying("mock", &unified_reply("Hello Ada!")).arc();
    let engine = engine(config(), &[mock.clone()]);

    assert_eq!(say(&engine, "hi there").await, "Hello Ada!");

    let p = engine.store().get_profile("u1").unwrap().unwrap();
    assert_eq!(p.profile_text, profile::blank_template("Ada"));
    assert_eq!(p.interaction_count, 1);

    let prompt = &mock.prompts()[0];
    assert!(prompt.contains("## What you can do"));
    assert!(prompt.contains("## What you know about Ada"));
    assert!(prompt.contains("hi there"));

    let entries = engine.store().get_recent("dm", "t", 100).unwrap();
    assert_eq!(entries[0].entry_type, EntryType::UserMessage);
    assert_eq!(entries[0].verb.as_deref(), Some("asked"));
    assert!(entries.iter().any(|e| e.entry_type == EntryType::Monologue && e.verb.as_deref() == Some("pondered")));
    let gates: Vec<_> = entries.iter().filter_map(|e| e.gate_result()).collect();
    assert_eq!(gates, vec![false, false]);
}

#[tokio::test]
async fn capabilities_only_on_first_turn_of_thread() {
    let mock = MockProvider::replying("mock", &unified_reply("ok")).arc();
    let engine = engine(config(), &[mock.clone()]);
    say(&engine, "one").await;
    say(&engine, "two").await;
    let prompts = mock.prompts();
    assert!(prompts[0].contains("## What you can do"));
    assert!(!prompts[1].contains("## What you can do"));
}

#[tokio::test]
async fn profile_gate_rewrites_and_controls_injection() {
    let mock = MockProvider::scripted("mock", |req| {
        if req.prompt.contains("first message") {
            Ok(format!(
                "{}\n<user_model_check>TRUE</user_model_check>\n<user_model_update># Ada\n\nLoves analytical engines.</user_model_update>",
                unified_reply("Noted!").replace("<user_model_check>false</user_model_check>", "")
            ))
        } else {
            Ok(unified_reply("Sure."))
        }
    })
    .arc();
    let engine = engine(config(), &[mock.clone()]);

    say(&engine, "first message").await;
    let p = engine.store().get_profile("u1").unwrap().unwrap();
    assert!(p.profile_text.contains("Loves analytical engines."));
    // Front matter survives a rewrite that omitted it.
    assert_eq!(profile::parse_meta(&p.profile_text).canonical_name.as_deref(), Some("Ada"));
    assert!(kinds(&engine).contains(&EntryType::Mutation));

    say(&engine, "second").await;
    say(&engine, "third").await;
    let prompts = mock.prompts();
    assert!(prompts[1].contains("## What you know about Ada"), "last gate was true");
    assert!(!prompts[2].contains("## What you know about Ada"), "last gate was false");
}

#[tokio::test]
async fn gate_true_without_content_skips_write() {
    let mock = MockProvider::replying(
        "mock",
        "<external_dialogue>ok</external_dialogue><user_model_check>true</user_model_check>",
    )
    .arc();
    let engine = engine(config(), &[mock]);
    assert_eq!(say(&engine, "hello").await, "ok");

    let p = engine.store().get_profile("u1").unwrap().unwrap();
    assert_eq!(p.profile_text, profile::blank_template("Ada"));
    assert!(!kinds(&engine).contains(&EntryType::Mutation));
}

#[tokio::test]
async fn soul_state_runs_every_third_cycle() {
    let mock = MockProvider::replying(
        "mock",
        "<external_dialogue>ok</external_dialogue>\
<soul_state_check>true</soul_state_check>\
<soul_state_update>current_topic: rust\nfavorite_color: blue</soul_state_update>",
    )
    .arc();
    let engine = engine(config(), &[mock.clone()]);

    for i in 1..=9 {
        say(&engine, &format!("message {}", i)).await;
        if i == 1 {
            // Due only from the third cycle on; the tag is ignored before.
            assert_eq!(engine.store().get_global("current_topic").unwrap(), "none");
        }
    }

    let due: Vec<usize> = mock
        .prompts()
        .iter()
        .enumerate()
        .filter(|(_, p)| p.contains("soul_state_check"))
        .map(|(i, _)| i + 1)
        .collect();
    assert_eq!(due, vec![3, 6, 9]);
    assert_eq!(engine.interaction_count(), 9);
    assert_eq!(engine.store().get_global("current_topic").unwrap(), "rust");
    assert_eq!(engine.store().get_global("favorite_color").unwrap(), "");
}

#[tokio::test]
async fn untagged_output_is_used_as_reply() {
    let mock = MockProvider::replying("mock", "Sure thing, no tags at all.").arc();
    let engine = engine(config(), &[mock]);
    assert_eq!(say(&engine, "hello").await, "Sure thing, no tags at all.");
    let gates: Vec<_> = engine.store().get_recent("dm", "t", 100).unwrap().iter().filter_map(|e| e.gate_result()).collect();
    assert_eq!(gates, vec![false, false]);
}

#[tokio::test]
async fn empty_output_gives_fallback_reply() {
    let mock = MockProvider::replying("mock", "   ").arc();
    let engine = engine(config(), &[mock]);
    assert_eq!(say(&engine, "hello").await, FALLBACK_REPLY);
}

#[tokio::test]
async fn fallback_chain_stops_at_first_success() {
    let a = MockProvider::failing("a").arc();
    let b = MockProvider::replying("b", &unified_reply("from b")).arc();
    let c = MockProvider::replying("c", &unified_reply("from c")).arc();
    let cfg = EngineConfig {
        default_provider: "a".into(),
        fallback_providers: vec!["b".into(), "c".into()],
        ..config()
    };
    let engine = engine(cfg, &[a.clone(), b.clone(), c.clone()]);

    assert_eq!(say(&engine, "hi").await, "from b");
    assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 0));
}

#[tokio::test]
async fn every_backend_failing_degrades_to_fallback() {
    let a = MockProvider::failing("a").arc();
    let b = MockProvider::failing("b").arc();
    let cfg = EngineConfig { default_provider: "a".into(), fallback_providers: vec!["b".into()], ..config() };
    let engine = engine(cfg, &[a, b]);

    assert_eq!(say(&engine, "hi").await, FALLBACK_REPLY);
    let entries = engine.store().get_recent("dm", "t", 100).unwrap();
    let last = entries.last().unwrap();
    assert_eq!(last.entry_type, EntryType::Dialogue);
    assert_eq!(last.metadata["fallback"], true);
    // No gates without a backend answer.
    assert!(entries.iter().all(|e| e.entry_type != EntryType::GateResult));
}

#[tokio::test]
async fn slow_backend_times_out() {
    let slow = MockProvider::replying("mock", &unified_reply("too late")).with_delay(Duration::from_secs(3)).arc();
    let cfg = EngineConfig { backend_timeout_secs: 1, ..config() };
    let engine = engine(cfg, &[slow]);
    assert_eq!(say(&engine, "hi").await, FALLBACK_REPLY);
}

#[tokio::test]
async fn hung_primary_falls_back_to_next_backend() {
    let hung = MockProvider::replying("a", &unified_reply("too late")).with_delay(Duration::from_secs(30)).arc();
    let b = MockProvider::replying("b", &unified_reply("from fallback")).arc();
    let cfg = EngineConfig {
        default_provider: "a".into(),
        fallback_providers: vec!["b".into()],
        backend_timeout_secs: 1,
        ..config()
    };
    let engine = engine(cfg, &[hung.clone(), b.clone()]);

    let started = std::time::Instant::now();
    assert_eq!(say(&engine, "hi").await, "from fallback");
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!((hung.calls(), b.calls()), (1, 1));
}

#[tokio::test]
async fn session_handle_is_resumed_until_ttl() {
    let mock = MockProvider::replying("mock", &unified_reply("ok")).with_session("s1").arc();
    let engine = engine(config(), &[mock.clone()]);

    say(&engine, "one").await;
    say(&engine, "two").await;

    let ttl = engine.config().session_ttl_secs;
    let stale = chrono::Utc::now().timestamp() - ttl - 1;
    engine.store().sessions(ttl).save_at("dm", "t", "s1", stale).unwrap();
    say(&engine, "three").await;

    let resumes: Vec<_> = mock.requests().into_iter().map(|r| r.resume_session).collect();
    assert_eq!(resumes, vec![None, Some("s1".to_string()), None]);
}

#[tokio::test]
async fn trace_links_entries_and_events() {
    let dir = tempfile::tempdir().unwrap();
    let trace_path = dir.path().join("trace.jsonl");
    let mock = MockProvider::replying("mock", &unified_reply("traced")).arc();
    let cfg = EngineConfig { trace_path: Some(trace_path.clone()), ..config() };
    let engine = engine(cfg, &[mock]);

    say(&engine, "hello").await;

    let entries = engine.store().get_recent("dm", "t", 100).unwrap();
    let trace_id = entries[0].trace_id.clone().unwrap();
    assert!(entries.iter().all(|e| e.trace_id.as_deref() == Some(trace_id.as_str())));
    assert_eq!(engine.store().get_trace(&trace_id).unwrap().len(), entries.len());

    let phases: Vec<TracePhase> = read_trace(&trace_path, &trace_id).unwrap().iter().map(|e| e.phase).collect();
    assert_eq!(phases.first(), Some(&TracePhase::Stimulus));
    assert_eq!(phases.last(), Some(&TracePhase::Response));
    for p in [TracePhase::Context, TracePhase::Cognition, TracePhase::Decision] {
        assert!(phases.contains(&p), "missing {:?}", p);
    }
    assert!(!phases.contains(&TracePhase::Error));
}

#[tokio::test]
async fn dossier_gate_writes_named_dossiers() {
    let mock = MockProvider::scripted("mock", |req| {
        if req.prompt.contains("Grace") && !req.prompt.contains("## Dossiers") {
            Ok(unified_reply("Tell me more about Grace.").replace(
                "<dossier_check>false</dossier_check>",
                "<dossier_check>true</dossier_check>\
<dossier_update name=\"Grace\" type=\"person\">Ada's colleague, writes compilers.</dossier_update>",
            ))
        } else {
            Ok(unified_reply("ok"))
        }
    })
    .arc();
    let engine = engine(config(), &[mock.clone()]);

    say(&engine, "I work with Grace").await;
    let d = engine.store().get_dossier("grace").unwrap().unwrap();
    assert_eq!(d.content, "Ada's colleague, writes compilers.");

    say(&engine, "Grace says hi").await;
    assert!(mock.prompts()[1].contains("### Grace (person)"));
}

struct OnceAdvisor {
    said: AtomicBool,
    seen: Mutex<Vec<WhisperSnapshot>>,
}

#[async_trait]
impl Advisor for OnceAdvisor {
    fn source(&self) -> &str {
        "muse"
    }

    async fn whisper(&self, snapshot: &WhisperSnapshot) -> EngineResult<Option<String>> {
        self.seen.lock().push(snapshot.clone());
        if self.said.swap(true, Ordering::SeqCst) {
            Ok(None)
        } else {
            Ok(Some("They sound tired.".into()))
        }
    }
}

#[tokio::test]
async fn whispers_are_shown_once_then_consumed() {
    let mock = MockProvider::replying("mock", &unified_reply("ok")).arc();
    let advisor = Arc::new(OnceAdvisor { said: AtomicBool::new(false), seen: Mutex::new(Vec::new()) });
    let engine = engine(config(), &[mock.clone()]).with_advisor(advisor.clone());

    say(&engine, "one").await;
    assert_eq!(engine.store().pending_whispers().unwrap().len(), 1);
    say(&engine, "two").await;
    assert!(engine.store().pending_whispers().unwrap().is_empty());
    say(&engine, "three").await;

    let prompts = mock.prompts();
    assert!(!prompts[0].contains("## Intuitions"));
    assert!(prompts[1].contains("## Intuitions") && prompts[1].contains("They sound tired."));
    assert!(!prompts[2].contains("## Intuitions"));

    let whisper_entries: Vec<_> = engine
        .store()
        .get_recent("dm", "t", 100)
        .unwrap()
        .into_iter()
        .filter(|e| e.entry_type == EntryType::Whisper)
        .collect();
    assert_eq!(whisper_entries.len(), 1);
    assert_eq!(whisper_entries[0].actor, "muse");

    let seen = advisor.seen.lock();
    assert_eq!(seen[0].monologue_excerpt, "thinking about it");
    assert_eq!(seen[0].emotional_state, "neutral");
}

#[tokio::test]
async fn cleanup_reports_stale_sessions() {
    let engine = engine(config(), &[]);
    let ttl = engine.config().session_ttl_secs;
    let sessions = engine.store().sessions(ttl);
    sessions.save_at("dm", "old", "s0", chrono::Utc::now().timestamp() - ttl - 10).unwrap();
    sessions.save("dm", "fresh", "s1").unwrap();
    assert_eq!(engine.cleanup().unwrap(), (0, 1));
}
