// ── Daimon Atoms: Constants ────────────────────────────────────────────────
// Named constants shared across the engine. Tag names are part of the wire
// contract with the backend: renaming one breaks every stored prompt.

// ── Fixed user-visible fallback ───────────────────────────────────────────
// The only sentence a user ever sees when nothing usable came back.
pub const FALLBACK_REPLY: &str =
    "Sorry, I lost my train of thought there. Could you say that again?";

// ── Identity defaults ─────────────────────────────────────────────────────
pub const DEFAULT_PERSONA_ID: &str = "daimon";
pub const DEFAULT_PERSONA_NAME: &str = "Daimon";
pub const TERMINAL_CHANNEL: &str = "terminal";

// ── Section tags exchanged with the backend ───────────────────────────────
pub const TAG_MONOLOGUE: &str = "internal_monologue";
pub const TAG_DIALOGUE: &str = "external_dialogue";
pub const TAG_USER_VERB: &str = "user_verb";
pub const TAG_PROFILE_CHECK: &str = "user_model_check";
pub const TAG_PROFILE_REFLECTION: &str = "user_model_reflection";
pub const TAG_PROFILE_UPDATE: &str = "user_model_update";
pub const TAG_INNER_VOICE: &str = "inner_voice";
pub const TAG_DOSSIER_CHECK: &str = "dossier_check";
pub const TAG_DOSSIER_UPDATE: &str = "dossier_update";
pub const TAG_STATE_CHECK: &str = "soul_state_check";
pub const TAG_STATE_UPDATE: &str = "soul_state_update";
pub const TAG_ONBOARDING_NAME: &str = "name";
pub const TAG_ONBOARDING_PRIMARY: &str = "primary_user";
pub const TAG_ONBOARDING_PREFERENCES: &str = "preferences";
pub const TAG_ONBOARDING_FEATURES: &str = "features";

/// Every tag `strip_all` removes.
pub const KNOWN_TAGS: &[&str] = &[
    TAG_MONOLOGUE,
    TAG_DIALOGUE,
    TAG_USER_VERB,
    TAG_PROFILE_CHECK,
    TAG_PROFILE_REFLECTION,
    TAG_PROFILE_UPDATE,
    TAG_INNER_VOICE,
    TAG_DOSSIER_CHECK,
    TAG_DOSSIER_UPDATE,
    TAG_STATE_CHECK,
    TAG_STATE_UPDATE,
    TAG_ONBOARDING_NAME,
    TAG_ONBOARDING_PRIMARY,
    TAG_ONBOARDING_PREFERENCES,
    TAG_ONBOARDING_FEATURES,
];

/// Literal token a gate must emit to count as true.
pub const GATE_TRUE: &str = "true";

// ── Gate questions ────────────────────────────────────────────────────────
// Stored verbatim as the content of gate_result entries. The profile
// injection gate finds its entry by matching PROFILE_GATE_MARKER.
pub const PROFILE_GATE_QUESTION: &str =
    "Did this exchange reveal something new that belongs in the user profile?";
pub const PROFILE_GATE_MARKER: &str = "user profile";
pub const DOSSIER_GATE_QUESTION: &str =
    "Did this exchange mention a third party or subject worth a dossier?";
pub const STATE_GATE_QUESTION: &str =
    "Has my own state (project, task, topic, mood) shifted?";

// ── Global state keys and defaults ────────────────────────────────────────
pub const GLOBAL_STATE_DEFAULTS: &[(&str, &str)] = &[
    ("current_project", "none"),
    ("current_task", "none"),
    ("current_topic", "none"),
    ("emotional_state", "neutral"),
    ("conversation_summary", ""),
];

// ── Context assembly limits ───────────────────────────────────────────────
pub const DEFAULT_MAX_DOSSIERS: usize = 3;
pub const DEFAULT_DOSSIER_SCAN_DEPTH: usize = 5;
pub const DEFAULT_RECENT_ENTRIES: usize = 20;

// ── Lifecycles ────────────────────────────────────────────────────────────
pub const DEFAULT_WORKING_MEMORY_MAX_AGE_HOURS: i64 = 72;
pub const DEFAULT_SESSION_TTL_SECS: i64 = 24 * 3600;
pub const DEFAULT_SOUL_STATE_INTERVAL: u64 = 3;
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_ADVISOR_TIMEOUT_SECS: u64 = 20;

/// Characters of the monologue an advisor may see.
pub const WHISPER_EXCERPT_CHARS: usize = 200;

/// Number of onboarding stages (name, primary user, preferences, features).
pub const ONBOARDING_STAGES: usize = 4;
