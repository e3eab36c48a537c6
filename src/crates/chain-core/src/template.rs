//! `{{ path }}` templating over execution scopes
//!
//! Tool arguments and prompt templates may embed placeholders that are
//! resolved against a [`Scope`]: the node's input context plus a
//! `result.<node_id>.<path>` namespace over the accumulated results. There
//! is no expression evaluation here: a placeholder is exactly one dotted
//! path, resolved with [`crate::path::resolve_path`].
//!
//! Two substitution modes keep JSON types intact:
//! - a string that is *exactly* one placeholder (`"{{ items }}"`) is
//!   replaced by the resolved value itself, whatever its type;
//! - a string with surrounding text gets placeholders rendered inline
//!   (strings verbatim, other values as compact JSON).
//!
//! # Example
//!
//! ```rust
//! use chain_core::template::{render_str, Scope};
//! use serde_json::json;
//! use std::collections::HashMap;
//!
//! let context = json!({"total": 6});
//! let results = HashMap::new();
//! let scope = Scope::new(&context, &results);
//!
//! assert_eq!(render_str("Total is {{ total }}", &scope).unwrap(), "Total is 6");
//! ```

use crate::path::resolve_path;
use crate::result::NodeExecutionResult;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Failure to render a template
#[derive(Debug, Clone)]
pub struct TemplateError {
    /// The placeholder path that failed
    pub placeholder: String,
    /// What went wrong
    pub reason: String,
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "template placeholder '{{{{ {} }}}}' failed: {}",
            self.placeholder, self.reason
        )
    }
}

impl std::error::Error for TemplateError {}

/// Resolution scope for template placeholders
///
/// Paths resolve against the input context by default; paths beginning
/// with `result.<node_id>.` resolve against that node's recorded output.
pub struct Scope<'a> {
    context: &'a Value,
    results: &'a HashMap<String, NodeExecutionResult>,
}

impl<'a> Scope<'a> {
    /// Build a scope over an input context and accumulated results
    pub fn new(context: &'a Value, results: &'a HashMap<String, NodeExecutionResult>) -> Self {
        Self { context, results }
    }

    /// Resolve one placeholder path
    pub fn lookup(&self, raw_path: &str) -> Result<Value, TemplateError> {
        let path = raw_path.trim();

        if let Some(rest) = path.strip_prefix("result.") {
            let (node_id, sub_path) = match rest.split_once('.') {
                Some((id, sub)) => (id, sub),
                None => (rest, ""),
            };
            let result = self.results.get(node_id).ok_or_else(|| TemplateError {
                placeholder: path.to_string(),
                reason: format!("no result recorded for node '{node_id}'"),
            })?;
            let output = result.output.as_ref().ok_or_else(|| TemplateError {
                placeholder: path.to_string(),
                reason: format!("node '{node_id}' produced no output"),
            })?;
            return resolve_path(output, sub_path)
                .map(Value::clone)
                .map_err(|e| TemplateError {
                    placeholder: path.to_string(),
                    reason: e.to_string(),
                });
        }

        resolve_path(self.context, path)
            .map(Value::clone)
            .map_err(|e| TemplateError {
                placeholder: path.to_string(),
                reason: e.to_string(),
            })
    }
}

fn placeholder_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("valid regex"))
}

/// Render a resolved value into surrounding text
fn inline(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a template string, substituting every `{{ path }}` placeholder
pub fn render_str(template: &str, scope: &Scope<'_>) -> Result<String, TemplateError> {
    let re = placeholder_regex();
    let mut rendered = String::with_capacity(template.len());
    let mut last_end = 0;

    for caps in re.captures_iter(template) {
        let whole = caps.get(0).expect("capture 0 always present");
        let path = caps.get(1).expect("capture 1 always present").as_str();
        rendered.push_str(&template[last_end..whole.start()]);
        rendered.push_str(&inline(&scope.lookup(path)?));
        last_end = whole.end();
    }
    rendered.push_str(&template[last_end..]);
    Ok(rendered)
}

/// Whether a string is exactly one placeholder and nothing else
fn sole_placeholder(s: &str) -> Option<&str> {
    let re = placeholder_regex();
    let caps = re.captures(s)?;
    let whole = caps.get(0)?;
    if whole.start() == 0 && whole.end() == s.len() {
        Some(caps.get(1)?.as_str())
    } else {
        None
    }
}

/// Deep-render a JSON value, walking objects and arrays
///
/// Strings that are exactly one placeholder are replaced by the resolved
/// value (preserving its type); other strings are rendered inline.
pub fn render_value(value: &Value, scope: &Scope<'_>) -> Result<Value, TemplateError> {
    match value {
        Value::String(s) => {
            if let Some(path) = sole_placeholder(s) {
                scope.lookup(path)
            } else {
                render_str(s, scope).map(Value::String)
            }
        }
        Value::Array(items) => items
            .iter()
            .map(|v| render_value(v, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut rendered = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                rendered.insert(k.clone(), render_value(v, scope)?);
            }
            Ok(Value::Object(rendered))
        }
        other => Ok(other.clone()),
    }
}
