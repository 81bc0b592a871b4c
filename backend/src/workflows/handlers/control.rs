// Control-flow handlers - delay and condition

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::HandlerError;
use crate::workflows::actions::ActionSpec;
use crate::workflows::conditions::{self, to_number, Condition};
use crate::workflows::executor::ExecutionContext;
use crate::workflows::registry::ActionHandler;

/// Longest pause a single delay action may take
pub const MAX_DELAY: Duration = Duration::from_secs(5 * 60);

pub struct DelayHandler;

impl DelayHandler {
    /// Requested pause in milliseconds, before capping
    pub fn requested_ms(config: &Value) -> Result<u64, HandlerError> {
        let duration = config
            .get("duration")
            .and_then(to_number)
            .ok_or_else(|| HandlerError::missing("duration"))?;
        if duration < 0.0 || !duration.is_finite() {
            return Err(HandlerError::config("'duration' must be a non-negative number"));
        }

        let unit = config.get("unit").and_then(Value::as_str).unwrap_or("seconds");
        let multiplier = match unit {
            "ms" | "millisecond" | "milliseconds" => 1.0,
            "s" | "second" | "seconds" => 1_000.0,
            "m" | "minute" | "minutes" => 60_000.0,
            "h" | "hour" | "hours" => 3_600_000.0,
            other => return Err(HandlerError::config(format!("unknown delay unit '{}'", other))),
        };

        Ok((duration * multiplier).round() as u64)
    }
}

#[async_trait]
impl ActionHandler for DelayHandler {
    async fn execute(&self, action: &ActionSpec, _ctx: &ExecutionContext) -> Result<Option<Value>, HandlerError> {
        let requested = Self::requested_ms(&action.config)?;
        let max = MAX_DELAY.as_millis() as u64;
        let delayed_ms = requested.min(max);

        tokio::time::sleep(Duration::from_millis(delayed_ms)).await;

        Ok(Some(json!({ "delayed_ms": delayed_ms, "capped": requested > max })))
    }
}

/// Evaluates one inline condition and reports which branch it selects.
/// Execution stays linear; the branch is informational.
pub struct ConditionHandler;

#[async_trait]
impl ActionHandler for ConditionHandler {
    async fn execute(&self, action: &ActionSpec, ctx: &ExecutionContext) -> Result<Option<Value>, HandlerError> {
        let config = &action.config;
        let condition: Condition = serde_json::from_value(json!({
            "field": config.get("field").cloned().unwrap_or(Value::Null),
            "operator": config.get("operator").cloned().unwrap_or_else(|| json!("equals")),
            "value": config.get("value").cloned().unwrap_or(Value::Null),
        }))
        .map_err(|e| HandlerError::config(format!("invalid condition: {}", e)))?;

        let met = conditions::evaluate(std::slice::from_ref(&condition), ctx.variables());
        let (branch, next) = if met {
            ("if_true", config.get("if_true"))
        } else {
            ("if_false", config.get("if_false"))
        };

        Ok(Some(json!({
            "condition_met": met,
            "branch": branch,
            "next_action": next.cloned().unwrap_or(Value::Null),
        })))
    }
}
