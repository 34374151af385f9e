// Daimon Engine — Prompt template rendering
//
// Step prompts use `{name}` placeholders. Rendering never fails:
//   • a known placeholder is replaced by its value
//   • an unknown placeholder is left in the output verbatim and logged at
//     debug level, so a typo in a prompt degrades the prompt instead of
//     aborting the cycle
//   • `{{` and `}}` render as literal braces

use log::debug;
use std::collections::HashMap;

/// Placeholder values for one render.
#[derive(Debug, Default, Clone)]
pub struct TemplateVars<'a> {
    values: HashMap<&'a str, String>,
}

impl<'a> TemplateVars<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &'a str, value: impl Into<String>) -> Self {
        self.values.insert(key, value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Render `template`, substituting every `{key}` found in `vars`.
pub fn render(template: &str, vars: &TemplateVars<'_>) -> String {
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        // tail starts with a single '{'
        match tail[1..].find('}') {
            Some(end) if is_placeholder_name(&tail[1..1 + end]) => {
                let key = &tail[1..1 + end];
                match vars.get(key) {
                    Some(v) => out.push_str(v),
                    None => {
                        debug!("[template] unknown placeholder {{{}}} left verbatim", key);
                        out.push_str(&tail[..end + 2]);
                    }
                }
                rest = &tail[end + 2..];
            }
            _ => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_placeholder_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
