// Daimon Engine — Profile documents
//
// A profile is an opaque markdown body with one small front-matter block the
// engine does read:
//
//   ---
//   canonical_name: Ada
//   role: primary
//   onboarding_complete: true
//   onboarding_stage: 4
//   onboarding_greeted: true
//   ---
//
// Everything below the block belongs to the backend. Saves replace the whole
// document; the previous block is always carried over so onboarding state
// survives a rewrite. A rewrite may only change `canonical_name` and `role`.

const FENCE: &str = "---";

/// Front-matter keys a backend rewrite is allowed to change.
const REWRITABLE_KEYS: &[&str] = &["canonical_name", "role"];

/// Parsed front-matter fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileMeta {
    pub canonical_name: Option<String>,
    pub role: Option<String>,
    pub onboarding_complete: bool,
    pub onboarding_stage: usize,
    /// The opening question was asked, in any thread.
    pub onboarding_greeted: bool,
}

/// Deterministic template for a first-contact profile.
pub fn blank_template(display_name: &str) -> String {
    let name = display_name.trim();
    let heading = if name.is_empty() { "Unknown" } else { name };
    format!(
        "{FENCE}\ncanonical_name: {name}\nrole: unknown\nonboarding_complete: false\nonboarding_stage: 0\n{FENCE}\n\
# {heading}\n\n## Who they are\n(nothing recorded yet)\n\n## Preferences\n(nothing recorded yet)\n\n## Notes\n"
    )
}

/// Split into (front-matter lines, body). Documents without a leading block
/// return `None` for the block.
fn split(text: &str) -> (Option<&str>, &str) {
    let trimmed = text.trim_start();
    let Some(after) = trimmed.strip_prefix(FENCE) else {
        return (None, text);
    };
    let Some(after) = after.strip_prefix('\n').or_else(|| after.strip_prefix("\r\n")) else {
        return (None, text);
    };
    // Closing fence must sit on its own line.
    let mut offset = 0;
    for line in after.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            let block = &after[..offset];
            let body = after[offset + line.len()..].trim_start_matches(['\r', '\n']);
            return (Some(block), body);
        }
        offset += line.len();
    }
    (None, text)
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1")
}

pub fn parse_meta(text: &str) -> ProfileMeta {
    let (block, _) = split(text);
    let mut meta = ProfileMeta::default();
    for line in block.unwrap_or("").lines() {
        let Some((k, v)) = line.split_once(':') else { continue };
        let v = v.trim();
        match k.trim() {
            "canonical_name" if !v.is_empty() => meta.canonical_name = Some(v.to_string()),
            "role" if !v.is_empty() && v != "unknown" => meta.role = Some(v.to_string()),
            "onboarding_complete" => meta.onboarding_complete = parse_bool(v),
            "onboarding_stage" => meta.onboarding_stage = v.parse().unwrap_or(0),
            "onboarding_greeted" => meta.onboarding_greeted = parse_bool(v),
            _ => {}
        }
    }
    meta
}

/// Markdown body without the front-matter block.
pub fn body(text: &str) -> &str {
    split(text).1
}

/// Set (or add) one front-matter field, creating the block when missing.
pub fn set_field(text: &str, key: &str, value: &str) -> String {
    let (block, body) = split(text);
    let mut lines: Vec<String> = block
        .unwrap_or("")
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect();
    let new_line = format!("{}: {}", key, value.trim());
    match lines.iter_mut().find(|l| l.split_once(':').map(|(k, _)| k.trim() == key).unwrap_or(false)) {
        Some(line) => *line = new_line,
        None => lines.push(new_line),
    }
    format!("{FENCE}\n{}\n{FENCE}\n{}", lines.join("\n"), body)
}

/// Whole-document replacement that keeps the old front matter. Fields in the
/// new document's block other than `canonical_name` and `role` are ignored.
pub fn replace_keeping_meta(old: &str, new: &str) -> String {
    let (new_block, new_body) = split(new);
    let Some(old_block) = split(old).0 else {
        return new.trim().to_string() + "\n";
    };
    let mut merged = format!("{FENCE}\n{}{FENCE}\n{}\n", old_block, new_body.trim());
    for line in new_block.unwrap_or("").lines() {
        let Some((k, v)) = line.split_once(':') else { continue };
        let k = k.trim();
        if REWRITABLE_KEYS.contains(&k) && !v.trim().is_empty() {
            merged = set_field(&merged, k, v);
        }
    }
    merged
}

/// Append a line under a `## heading`, creating the section at the end when
/// it does not exist. Placeholder lines are replaced.
pub fn append_to_section(text: &str, heading: &str, line: &str) -> String {
    let marker = format!("## {}", heading);
    let mut out: Vec<String> = text.lines().map(str::to_string).collect();
    match out.iter().position(|l| l.trim() == marker) {
        Some(idx) => {
            let mut end = idx + 1;
            while end < out.len() && !out[end].starts_with("## ") {
                end += 1;
            }
            if let Some(ph) = (idx + 1..end).find(|&i| out[i].trim() == "(nothing recorded yet)") {
                out[ph] = line.to_string();
            } else {
                // Insert after the last non-empty line of the section.
                let mut at = end;
                while at > idx + 1 && out[at - 1].trim().is_empty() {
                    at -= 1;
                }
                out.insert(at, line.to_string());
            }
        }
        None => {
            out.push(String::new());
            out.push(marker);
            out.push(line.to_string());
        }
    }
    out.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_template_is_incomplete() {
        let t = blank_template("Ada");
        let m = parse_meta(&t);
        assert_eq!(m.canonical_name.as_deref(), Some("Ada"));
        assert_eq!(m.role, None);
        assert!(!m.onboarding_complete);
        assert_eq!(m.onboarding_stage, 0);
        assert!(body(&t).starts_with("# Ada"));
        assert_eq!(blank_template("Ada"), t);
    }

    #[test]
    fn blank_template_without_name() {
        let m = parse_meta(&blank_template("  "));
        assert_eq!(m.canonical_name, None);
    }

    #[test]
    fn set_field_replaces_and_adds() {
        let t = blank_template("Ada");
        let t = set_field(&t, "canonical_name", "Ada Lovelace");
        let t = set_field(&t, "favorite", "engines");
        let m = parse_meta(&t);
        assert_eq!(m.canonical_name.as_deref(), Some("Ada Lovelace"));
        assert!(t.contains("favorite: engines"));
        assert!(body(&t).starts_with("# Ada"));
    }

    #[test]
    fn set_field_creates_block() {
        let t = set_field("# Just a body\n", "onboarding_complete", "true");
        assert!(parse_meta(&t).onboarding_complete);
        assert_eq!(body(&t), "# Just a body\n");
    }

    #[test]
    fn replace_keeps_old_meta_when_missing() {
        let old = set_field(&blank_template("Ada"), "onboarding_complete", "true");
        let merged = replace_keeping_meta(&old, "# Ada\n\nLoves analytical engines.");
        let m = parse_meta(&merged);
        assert!(m.onboarding_complete);
        assert!(merged.contains("Loves analytical engines."));

        let explicit = "---\ncanonical_name: Countess\n---\n# New";
        let replaced = replace_keeping_meta(&old, explicit);
        let m = parse_meta(&replaced);
        assert_eq!(m.canonical_name.as_deref(), Some("Countess"));
        assert!(m.onboarding_complete);
        assert_eq!(body(&replaced).trim(), "# New");
    }

    #[test]
    fn rewrite_cannot_reset_onboarding_fields() {
        let old = set_field(&set_field(&blank_template("Ada"), "onboarding_complete", "true"), "onboarding_stage", "4");
        let hostile = "---\nrole: primary\nonboarding_complete: false\nonboarding_stage: 0\n---\n# Ada";
        let m = parse_meta(&replace_keeping_meta(&old, hostile));
        assert_eq!(m.role.as_deref(), Some("primary"));
        assert!(m.onboarding_complete);
        assert_eq!(m.onboarding_stage, 4);
        assert_eq!(m.canonical_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn append_to_existing_and_new_sections() {
        let t = blank_template("Ada");
        let t = append_to_section(&t, "Preferences", "- prefers short replies");
        assert!(t.contains("## Preferences\n- prefers short replies"));
        assert!(!t.contains("## Preferences\n(nothing recorded yet)"));
        let t = append_to_section(&t, "Preferences", "- likes puns");
        assert!(t.contains("- prefers short replies\n- likes puns"));
        let t = append_to_section(&t, "Features", "- dossiers");
        assert!(t.trim_end().ends_with("## Features\n- dossiers"));
    }

    #[test]
    fn unterminated_block_is_body() {
        let text = "---\ncanonical_name: X\nno closing fence";
        assert_eq!(parse_meta(text), ProfileMeta::default());
        assert_eq!(body(text), text);
    }
}
