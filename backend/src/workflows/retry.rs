// Workflow Retry - Per-attempt deadline and retry/backoff around a handler

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::warn;

use super::actions::{ActionResult, ActionSpec, RetryPolicy};
use super::executor::ExecutionContext;
use super::registry::ActionHandler;

pub const ACTION_TIMEOUT: &str = "Action timeout";

/// Default per-attempt deadline when neither the action nor the engine sets one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// One handler invocation, kept for the audit trail
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Final result plus every attempt that produced it
#[derive(Debug, Clone)]
pub struct ControlledOutcome {
    pub result: ActionResult,
    pub attempts: Vec<AttemptRecord>,
}

/// Wait before retry number `retry_index` (0-based)
pub fn backoff_delay(policy: &RetryPolicy, retry_index: u32) -> Duration {
    let millis = if policy.exponential_backoff {
        policy.delay_ms.saturating_mul(2u64.saturating_pow(retry_index))
    } else {
        policy.delay_ms
    };
    Duration::from_millis(millis)
}

/// Invoke `handler` under the action's deadline, retrying per its policy.
///
/// A timed-out attempt drops the handler future. Work already handed to an
/// external system may still complete; only the wait is abandoned.
pub async fn execute_with_policy(
    handler: &dyn ActionHandler,
    action: &ActionSpec,
    ctx: &ExecutionContext,
    default_timeout: Duration,
) -> ControlledOutcome {
    let policy = action.retry.clone().unwrap_or_default();
    let deadline = action
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(default_timeout);
    let max_attempts = policy.max_retries.saturating_add(1);

    let overall = Instant::now();
    let mut attempts = Vec::new();
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        let started_at = Utc::now();
        let attempt_start = Instant::now();

        let (output, error) = match timeout(deadline, handler.execute(action, ctx)).await {
            Ok(Ok(output)) => (output, None),
            Ok(Err(e)) => (None, Some(e.to_string())),
            Err(_) => (None, Some(ACTION_TIMEOUT.to_string())),
        };

        attempts.push(AttemptRecord {
            attempt,
            started_at,
            completed_at: Utc::now(),
            duration_ms: attempt_start.elapsed().as_millis() as i64,
            output: output.clone(),
            error: error.clone(),
        });

        match error {
            None => {
                let result = ActionResult::success(output)
                    .with_attempts(attempt)
                    .with_duration(overall.elapsed().as_millis() as i64);
                return ControlledOutcome { result, attempts };
            }
            Some(e) => {
                if attempt < max_attempts {
                    let delay = backoff_delay(&policy, attempt - 1);
                    warn!(
                        "Action '{}' attempt {}/{} failed: {}. Retrying in {}ms",
                        action.id,
                        attempt,
                        max_attempts,
                        e,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                }
                last_error = e;
            }
        }
    }

    let result = ActionResult::failure(&last_error)
        .with_attempts(max_attempts)
        .with_duration(overall.elapsed().as_millis() as i64);
    ControlledOutcome { result, attempts }
}
