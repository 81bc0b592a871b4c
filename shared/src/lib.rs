use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of one workflow run
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "execution_status", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Outcome recorded for a single action attempt
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "action_status", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Skipped,
    Succeeded,
    Failed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// Persisted audit record for one workflow run
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    pub trigger_data: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
}

impl ExecutionRecord {
    pub fn started(id: Uuid, workflow_id: Uuid, trigger_data: serde_json::Value) -> Self {
        Self {
            id,
            workflow_id,
            status: ExecutionStatus::Running,
            trigger_data,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            error_message: None,
        }
    }
}

/// Persisted audit row for one action attempt (skips included)
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogRecord {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub action_id: String,
    pub action_type: String,
    pub action_name: String,
    pub attempt: i32,
    pub status: ActionStatus,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// A business record written by the record-mutation actions
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: Uuid,
    pub entity: String,
    pub owner_id: Option<Uuid>,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Rolling run statistics kept on each workflow
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunStats {
    pub run_count: i64,
    pub success_rate: Decimal,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl Default for RunStats {
    fn default() -> Self {
        Self {
            run_count: 0,
            success_rate: Decimal::ZERO,
            last_run_at: None,
        }
    }
}

impl RunStats {
    /// Fold one more finished run into the counters.
    ///
    /// `success_rate` is a percentage rounded to two decimal places, the same
    /// rounding the database applies with `ROUND(x, 2)`.
    pub fn after_run(&self, succeeded: bool, at: DateTime<Utc>) -> Self {
        let previous = Decimal::from(self.run_count.max(0));
        let run_count = self.run_count.max(0) + 1;
        let gained = if succeeded { Decimal::ONE_HUNDRED } else { Decimal::ZERO };

        let success_rate = ((self.success_rate * previous + gained) / Decimal::from(run_count))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

        Self {
            run_count,
            success_rate,
            last_run_at: Some(at),
        }
    }
}
