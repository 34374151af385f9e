use crate::common::*;
use daimon::atoms::constants::TERMINAL_CHANNEL;
use daimon::atoms::types::EntryType;

#[tokio::test]
async fn terminal_mode_has_no_persona_or_profile() {
    let mock = MockProvider::replying(
        "mock",
        "<internal_monologue>simple sum</internal_monologue><external_dialogue>42</external_dialogue>",
    )
    .with_session("term-1")
    .arc();
    let engine = engine(config(), &[mock.clone()]);

    assert_eq!(engine.process_terminal("what is 6*7?", "local").await.unwrap(), "42");
    engine.process_terminal("and 6*8?", "local").await.unwrap();

    assert!(engine.store().get_profile("operator").unwrap().is_none());
    assert_eq!(engine.interaction_count(), 0);

    let kinds: Vec<EntryType> =
        engine.store().get_recent(TERMINAL_CHANNEL, "local", 3).unwrap().iter().map(|e| e.entry_type).collect();
    assert_eq!(kinds, vec![EntryType::UserMessage, EntryType::Monologue, EntryType::Dialogue]);

    let prompts = mock.prompts();
    assert!(!prompts[0].contains("persistent companion"));
    assert!(prompts[0].contains("## Instructions"));
    assert!(!prompts[0].contains("user_model_check"));
    assert_eq!(mock.requests()[1].resume_session.as_deref(), Some("term-1"));
}
