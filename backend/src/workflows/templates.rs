// Workflow Templates - `{{ expr }}` substitution over action configuration

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use super::executor::ExecutionContext;

fn marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\{\{([^}]+)\}\}").expect("template marker pattern is valid"))
}

/// Return a deep copy of `config` with every template marker substituted.
///
/// Lookup order for a marker expression:
/// - `trigger.<path>` reads the trigger data
/// - `action_<id>.<path>` reads previous results, falling back to variables
/// - anything else reads the variables
///
/// Unresolvable paths and nulls become the empty string. Object keys are
/// never rewritten.
pub fn resolve(config: &Value, ctx: &ExecutionContext) -> Value {
    match config {
        Value::String(s) => Value::String(resolve_str(s, ctx)),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Substitute markers in a single string
pub fn resolve_str(template: &str, ctx: &ExecutionContext) -> String {
    marker()
        .replace_all(template, |caps: &Captures| {
            lookup_expr(caps[1].trim(), ctx)
                .map(display_value)
                .unwrap_or_default()
        })
        .into_owned()
}

fn lookup_expr<'a>(expr: &str, ctx: &'a ExecutionContext) -> Option<&'a Value> {
    if let Some(path) = expr.strip_prefix("trigger.") {
        return lookup_path(ctx.trigger_data(), path);
    }

    if expr.starts_with("action_") {
        return lookup_path(ctx.previous_results(), expr)
            .or_else(|| lookup_path(ctx.variables(), expr));
    }

    lookup_path(ctx.variables(), expr)
}

/// Walk a dotted path through nested objects; numeric segments index arrays.
pub fn lookup_path<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = root.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// String form of a JSON value as it appears inside a substituted string
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
