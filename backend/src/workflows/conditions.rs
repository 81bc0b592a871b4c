// Workflow Conditions - Predicates that gate an action

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::templates::{display_value, lookup_path};

/// A single condition attached to an action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Field path to evaluate (dot notation for nested fields)
    pub field: String,
    pub operator: ConditionOperator,
    /// Value to compare against
    #[serde(default)]
    pub value: Value,
    /// How this condition combines with the next one in the list
    #[serde(default)]
    pub logic: ConditionLogic,
}

/// Condition operators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    #[serde(alias = "not-equals")]
    NotEquals,
    Contains,
    #[serde(alias = "greater")]
    GreaterThan,
    #[serde(alias = "less")]
    LessThan,
    Exists,
    #[serde(alias = "not-exists")]
    NotExists,
    Matches,
    /// Any operator this build does not know; always false
    #[serde(other)]
    Unsupported,
}

/// Trailing logic joining a condition to its successor
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConditionLogic {
    #[default]
    #[serde(alias = "AND")]
    And,
    #[serde(alias = "OR")]
    Or,
}

impl Condition {
    pub fn new(field: &str, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
            logic: ConditionLogic::And,
        }
    }

    pub fn equals(field: &str, value: Value) -> Self {
        Self::new(field, ConditionOperator::Equals, value)
    }

    pub fn not_equals(field: &str, value: Value) -> Self {
        Self::new(field, ConditionOperator::NotEquals, value)
    }

    pub fn contains(field: &str, value: &str) -> Self {
        Self::new(field, ConditionOperator::Contains, Value::String(value.to_string()))
    }

    pub fn greater_than(field: &str, value: f64) -> Self {
        Self::new(field, ConditionOperator::GreaterThan, serde_json::json!(value))
    }

    pub fn less_than(field: &str, value: f64) -> Self {
        Self::new(field, ConditionOperator::LessThan, serde_json::json!(value))
    }

    pub fn exists(field: &str) -> Self {
        Self::new(field, ConditionOperator::Exists, Value::Null)
    }

    pub fn not_exists(field: &str) -> Self {
        Self::new(field, ConditionOperator::NotExists, Value::Null)
    }

    pub fn matches(field: &str, pattern: &str) -> Self {
        Self::new(field, ConditionOperator::Matches, Value::String(pattern.to_string()))
    }

    /// Join this condition to the next one with OR instead of AND
    pub fn or(mut self) -> Self {
        self.logic = ConditionLogic::Or;
        self
    }

    /// Evaluate this condition alone against the variables
    pub fn check(&self, variables: &Map<String, Value>) -> bool {
        let actual = lookup_path(variables, &self.field);

        match self.operator {
            ConditionOperator::Equals => actual.is_some_and(|v| v == &self.value),
            ConditionOperator::NotEquals => actual.is_none_or(|v| v != &self.value),
            ConditionOperator::Contains => match actual {
                Some(v) => display_value(v).contains(&display_value(&self.value)),
                None => false,
            },
            ConditionOperator::GreaterThan => compare_numbers(actual, &self.value, |a, b| a > b),
            ConditionOperator::LessThan => compare_numbers(actual, &self.value, |a, b| a < b),
            ConditionOperator::Exists => actual.is_some_and(|v| !v.is_null()),
            ConditionOperator::NotExists => actual.is_none_or(Value::is_null),
            ConditionOperator::Matches => {
                let pattern = display_value(&self.value);
                match Regex::new(&pattern) {
                    Ok(re) => actual.is_some_and(|v| re.is_match(&display_value(v))),
                    Err(e) => {
                        warn!(field = %self.field, pattern = %pattern, "Invalid condition pattern: {}", e);
                        false
                    }
                }
            }
            ConditionOperator::Unsupported => {
                warn!(field = %self.field, "Unsupported condition operator");
                false
            }
        }
    }
}

/// Evaluate a condition list left to right.
///
/// Each outcome is folded into the running result with the previous
/// condition's trailing logic. There is no short-circuit and no precedence,
/// so `a OR b AND c` means `(a OR b) AND c`. An empty list is true.
pub fn evaluate(conditions: &[Condition], variables: &Map<String, Value>) -> bool {
    let mut result = true;
    let mut logic = ConditionLogic::And;

    for condition in conditions {
        let outcome = condition.check(variables);
        result = match logic {
            ConditionLogic::And => result && outcome,
            ConditionLogic::Or => result || outcome,
        };
        logic = condition.logic;
    }

    result
}

fn compare_numbers(actual: Option<&Value>, expected: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(to_number), to_number(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

/// Numeric coercion used by the ordering operators
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse::<f64>().ok().filter(|n| !n.is_nan())
            }
        }
        Value::Array(_) | Value::Object(_) => None,
    }
}
