//! Context store and per-node input construction
//!
//! Before a node runs, the engine builds its `input_context` from the
//! node's declared input mappings and the accumulated results, then records
//! it in the [`ContextStore`] under `(node_id, execution_id)`. The store is
//! an injected interface (hosts may persist contexts to a database); the
//! default [`InMemoryContextStore`] keeps them for the duration of the run.
//!
//! Mapping resolution collects *all* failures before giving up, so a node
//! with three broken mappings reports three errors in one
//! `DependencyError`, and the executor is never invoked for a node whose
//! context could not be built.

use crate::error::{ChainError, Result};
use crate::node::{InputMapping, NodeConfig};
use crate::path::resolve_path;
use crate::result::NodeExecutionResult;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Storage for per-node input/output contexts, scoped by execution id
///
/// Writes are last-writer-wins; each node writes at most twice per run
/// (input context, then output when persistence is enabled).
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Record content for a node under the given execution id
    async fn put(&self, node_id: &str, execution_id: &str, content: Value);

    /// Fetch previously recorded content
    async fn get(&self, node_id: &str, execution_id: &str) -> Option<Value>;
}

/// In-memory context store, the default for embedded use
#[derive(Default)]
pub struct InMemoryContextStore {
    entries: RwLock<HashMap<(String, String), Value>>,
}

impl InMemoryContextStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn put(&self, node_id: &str, execution_id: &str, content: Value) {
        self.entries
            .write()
            .await
            .insert((node_id.to_string(), execution_id.to_string()), content);
    }

    async fn get(&self, node_id: &str, execution_id: &str) -> Option<Value> {
        self.entries
            .read()
            .await
            .get(&(node_id.to_string(), execution_id.to_string()))
            .cloned()
    }
}

/// Build a node's input context from its mappings and the accumulated
/// results
///
/// Resolution rules, per `(placeholder, mapping)`:
/// 1. A reference mapping requires its source dependency to be present and
///    successful; the `source_output_path` is resolved against the
///    dependency's output (`""`/`"."` = whole output).
/// 2. A literal mapping binds its value verbatim.
///
/// `initial_context` keys (workflow-level inputs) are bound first, so
/// explicit mappings override them on collision. All failures are
/// collected; any failure yields a single [`ChainError::Dependency`].
pub fn build_node_context(
    node: &NodeConfig,
    results: &HashMap<String, NodeExecutionResult>,
    initial_context: Option<&Value>,
) -> Result<Value> {
    let mut context = Map::new();
    let mut validation_errors: Vec<String> = Vec::new();

    if let Some(Value::Object(initial)) = initial_context {
        for (k, v) in initial {
            context.insert(k.clone(), v.clone());
        }
    }

    for (placeholder, mapping) in &node.base().input_mappings {
        match mapping {
            InputMapping::Reference {
                source_node_id,
                source_output_path,
                ..
            } => {
                let dep_result = results.get(source_node_id);
                let Some(dep_result) = dep_result.filter(|r| r.success) else {
                    validation_errors.push(format!(
                        "dependency '{source_node_id}' failed or did not run"
                    ));
                    continue;
                };
                let output = dep_result.output.as_ref().unwrap_or(&Value::Null);
                match resolve_path(output, source_output_path) {
                    Ok(value) => {
                        context.insert(placeholder.clone(), value.clone());
                    }
                    Err(e) => validation_errors.push(format!(
                        "failed to resolve path '{source_output_path}' in dependency \
                         '{source_node_id}': {e}"
                    )),
                }
            }
            InputMapping::Literal(value) => {
                context.insert(placeholder.clone(), value.clone());
            }
        }
    }

    if !validation_errors.is_empty() {
        return Err(ChainError::dependency(
            node.id(),
            validation_errors.join("; "),
        ));
    }

    Ok(Value::Object(context))
}

/// Check and coerce a built context against a `{field → type-name}` input
/// schema
///
/// Known type names: `int`, `float`/`number`, `bool`, `str`/`string`; other
/// names pass values through unchanged. A missing field or impossible
/// coercion is a dependency error (deterministic, so non-retryable). Full
/// JSON Schema input documents are not coerced, only validated by the
/// output-side machinery when declared there.
pub fn apply_input_schema(node: &NodeConfig, context: Value) -> Result<Value> {
    let Some(schema) = node.base().input_schema.as_ref() else {
        return Ok(context);
    };
    let Some(fields) = crate::validation::field_schema(schema) else {
        return Ok(context);
    };
    let Value::Object(mut map) = context else {
        return Err(ChainError::dependency(
            node.id(),
            "input context is not an object",
        ));
    };

    let mut errors = Vec::new();
    for (field, type_name) in fields {
        let type_name = type_name.as_str().expect("checked above");
        let Some(value) = map.get(field) else {
            errors.push(format!("missing required input field '{field}'"));
            continue;
        };
        match coerce(value, type_name) {
            Ok(Some(coerced)) => {
                map.insert(field.clone(), coerced);
            }
            Ok(None) => {}
            Err(reason) => errors.push(format!(
                "could not coerce input field '{field}' to {type_name}: {reason}"
            )),
        }
    }

    if !errors.is_empty() {
        return Err(ChainError::dependency(node.id(), errors.join("; ")));
    }
    Ok(Value::Object(map))
}

/// Coerce a value to a named primitive type
///
/// Returns `Ok(Some(v))` when a replacement is needed, `Ok(None)` when the
/// value is already acceptable, `Err` when coercion is impossible.
fn coerce(value: &Value, type_name: &str) -> std::result::Result<Option<Value>, String> {
    match type_name {
        "int" => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(None),
            Value::Number(n) => {
                let f = n.as_f64().unwrap_or(0.0);
                if f.fract() == 0.0 {
                    Ok(Some(Value::from(f as i64)))
                } else {
                    Err(format!("{f} has a fractional part"))
                }
            }
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|n| Some(Value::from(n)))
                .map_err(|e| e.to_string()),
            Value::Bool(b) => Ok(Some(Value::from(*b as i64))),
            other => Err(format!("cannot convert {other} to int")),
        },
        "float" | "number" => match value {
            Value::Number(_) => Ok(None),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(|n| Some(Value::from(n)))
                .map_err(|e| e.to_string()),
            other => Err(format!("cannot convert {other} to float")),
        },
        "bool" => match value {
            Value::Bool(_) => Ok(None),
            Value::Number(n) => Ok(Some(Value::Bool(n.as_f64() != Some(0.0)))),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Some(Value::Bool(true))),
                "false" | "0" | "no" => Ok(Some(Value::Bool(false))),
                other => Err(format!("'{other}' is not a boolean")),
            },
            other => Err(format!("cannot convert {other} to bool")),
        },
        "str" | "string" => match value {
            Value::String(_) => Ok(None),
            Value::Number(n) => Ok(Some(Value::String(n.to_string()))),
            Value::Bool(b) => Ok(Some(Value::String(b.to_string()))),
            other => Ok(Some(Value::String(other.to_string()))),
        },
        // Unknown type names pass through (list, dict, any, ...)
        _ => Ok(None),
    }
}
