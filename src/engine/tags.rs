// Daimon Engine — Tag Codec
// Pulls the structured sections (`<tag attr="v">content</tag>`) out of backend
// output and renders them back for split-mode "prior steps" blocks.
//
// Absence is never an error: a missing section extracts as empty content and
// callers read that as "the step did not fire".

use crate::atoms::constants::{GATE_TRUE, KNOWN_TAGS};
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

/// `name="value"` or `name='value'`.
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][\w-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("static regex")
});

/// Opening, closing and self-closing forms of every known tag.
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    let names: Vec<String> = KNOWN_TAGS.iter().map(|t| regex::escape(t)).collect();
    Regex::new(&format!(r"</?(?:{})\b[^<>]*/?>", names.join("|"))).expect("static regex")
});

/// Result of a single-attribute extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub content: String,
    pub attribute: Option<String>,
}

impl Extracted {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Result of a two-attribute extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DualExtracted {
    pub content: String,
    pub first: Option<String>,
    pub second: Option<String>,
}

fn compile_section_re(tag: &str) -> Option<Regex> {
    let t = regex::escape(tag);
    // Attributes are captured as a blob and parsed separately so any
    // ordering and either quote style is accepted.
    Regex::new(&format!(r"(?s)<{t}((?:\s+[^<>]*?)?)\s*>(.*?)</{t}\s*>")).ok()
}

/// Section patterns for every known tag, compiled once.
static SECTION_RES: LazyLock<HashMap<&'static str, Regex>> = LazyLock::new(|| {
    KNOWN_TAGS.iter().filter_map(|t| compile_section_re(t).map(|re| (*t, re))).collect()
});

/// Cached pattern for known tags; anything else is compiled on demand.
fn section_re(tag: &str) -> Option<Cow<'static, Regex>> {
    match SECTION_RES.get(tag) {
        Some(re) => Some(Cow::Borrowed(re)),
        None => compile_section_re(tag).map(Cow::Owned),
    }
}

fn parse_attrs(blob: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(blob)
        .map(|c| {
            let value = c.get(2).or_else(|| c.get(3)).map(|m| m.as_str()).unwrap_or("");
            (c[1].to_string(), value.to_string())
        })
        .collect()
}

/// First well-formed `<tag>` section. A single optional attribute of any
/// name is returned as `attribute` (the verb that colors monologue/dialogue).
pub fn extract(text: &str, tag: &str) -> Extracted {
    let Some(re) = section_re(tag) else {
        return Extracted::default();
    };
    let Some(caps) = re.captures(text) else {
        return Extracted::default();
    };
    let attrs = parse_attrs(caps.get(1).map(|m| m.as_str()).unwrap_or(""));
    Extracted {
        content: caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
        attribute: attrs.into_iter().next().map(|(_, v)| v).filter(|v| !v.is_empty()),
    }
}

/// First section carrying two named attributes, in either order.
/// Missing attributes come back as `None`; the section itself still counts.
pub fn extract_dual(text: &str, tag: &str, first: &str, second: &str) -> Option<DualExtracted> {
    extract_all_dual(text, tag, first, second).into_iter().next()
}

/// Every two-attribute section of `tag`, in document order.
pub fn extract_all_dual(text: &str, tag: &str, first: &str, second: &str) -> Vec<DualExtracted> {
    let Some(re) = section_re(tag) else {
        return Vec::new();
    };
    re.captures_iter(text)
        .map(|caps| {
            let attrs = parse_attrs(caps.get(1).map(|m| m.as_str()).unwrap_or(""));
            let find = |key: &str| {
                attrs
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v.trim().to_string())
                    .filter(|v| !v.is_empty())
            };
            DualExtracted {
                content: caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
                first: find(first),
                second: find(second),
            }
        })
        .collect()
}

/// Remove every known section marker and return the bare prose.
pub fn strip_all(text: &str) -> String {
    let stripped = MARKER_RE.replace_all(text, "");
    stripped
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Gate boolean: only the literal true-token (trimmed, ASCII case-insensitive)
/// is true. Missing, empty, "yes", "maybe" are all false.
pub fn parse_gate(text: &str, tag: &str) -> bool {
    extract(text, tag).content.eq_ignore_ascii_case(GATE_TRUE)
}

/// Render a section, optionally with one attribute.
pub fn wrap(tag: &str, content: &str, attribute: Option<(&str, &str)>) -> String {
    match attribute {
        Some((k, v)) => format!("<{tag} {k}=\"{}\">{content}</{tag}>", v.replace('"', "'")),
        None => format!("<{tag}>{content}</{tag}>"),
    }
}

/// Neutralize markup in untrusted text so it cannot open or close sections.
pub fn escape_markup(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
