//! `${KEY}` substitution for compose templates.
//!
//! Placeholders whose key is not supplied are left as-is so the caller can
//! report them with [`unresolved_placeholders`].

use std::borrow::Cow;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"));

/// Template variables, in the order they were added.
pub type TemplateVars = IndexMap<String, String>;

/// Replace every `${KEY}` whose key is in `vars`.
pub fn render<'a>(template: &'a str, vars: &TemplateVars) -> Cow<'a, str> {
    PLACEHOLDER_RE.replace_all(template, |caps: &Captures| {
        match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        }
    })
}

/// Keys of placeholders still present in `text`, deduplicated.
pub fn unresolved_placeholders(text: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for caps in PLACEHOLDER_RE.captures_iter(text) {
        let key = &caps[1];
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }
    keys
}
