// src/template.rs

//! Placeholder substitution for component attributes
//!
//! Expands `{{$app.<attr>}}` and `{{<key>}}` placeholders against an
//! attribute map. Unresolved keys expand to the empty string so templates
//! never leak raw placeholders into rendered paths or configuration.

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("placeholder regex"))
}

/// Render a JSON value the way it should appear inside a template
///
/// Strings render unquoted; null renders empty; everything else renders as
/// its compact JSON form ("true", "12", ...).
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Expand all placeholders in `template` against `attributes`
///
/// Keys may be written bare (`{{foo}}`) or with the component prefix
/// (`{{$app.foo}}`); both resolve against the same map.
pub fn expand(template: &str, attributes: &BTreeMap<String, Value>) -> String {
    placeholder_re()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let key = caps[1].trim();
            let key = key.strip_prefix("$app.").unwrap_or(key);
            attributes.get(key).map(render_value).unwrap_or_default()
        })
        .into_owned()
}

/// Whether a string contains anything that [`expand`] would rewrite
pub fn has_placeholders(text: &str) -> bool {
    placeholder_re().is_match(text)
}
