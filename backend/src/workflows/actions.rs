// Workflow Actions - Typed steps a workflow executes

use serde::{Deserialize, Serialize};

use super::conditions::Condition;

/// Types of actions that workflows can execute
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    // Communication
    #[serde(alias = "email")]
    SendEmail,
    #[serde(alias = "sms")]
    SendSms,
    #[serde(alias = "slack-message", alias = "teams-message")]
    SendChat,

    // Records
    CreateRecord,
    #[serde(alias = "update-record")]
    UpdateRecord,
    #[serde(alias = "create-task")]
    CreateTask,
    #[serde(alias = "notification")]
    CreateNotification,

    // Control flow
    Delay,
    Condition,

    // Outbound
    #[serde(alias = "api-call")]
    ApiCall,
    Webhook,

    /// A tag this build has no variant for
    #[serde(other)]
    Unknown,
}

impl ActionType {
    /// Every type that can be bound to a handler
    pub const ALL: [ActionType; 11] = [
        ActionType::SendEmail,
        ActionType::SendSms,
        ActionType::SendChat,
        ActionType::CreateRecord,
        ActionType::UpdateRecord,
        ActionType::CreateTask,
        ActionType::CreateNotification,
        ActionType::Delay,
        ActionType::Condition,
        ActionType::ApiCall,
        ActionType::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendEmail => "send_email",
            Self::SendSms => "send_sms",
            Self::SendChat => "send_chat",
            Self::CreateRecord => "create_record",
            Self::UpdateRecord => "update_record",
            Self::CreateTask => "create_task",
            Self::CreateNotification => "create_notification",
            Self::Delay => "delay",
            Self::Condition => "condition",
            Self::ApiCall => "api_call",
            Self::Webhook => "webhook",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry behaviour for a single action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    #[serde(default, alias = "maxRetries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms", alias = "delayMs")]
    pub delay_ms: u64,
    #[serde(default, alias = "exponentialBackoff")]
    pub exponential_backoff: bool,
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            delay_ms: default_retry_delay_ms(),
            exponential_backoff: false,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_retries: u32, delay_ms: u64) -> Self {
        Self {
            max_retries,
            delay_ms,
            exponential_backoff: false,
        }
    }

    pub fn exponential(max_retries: u32, delay_ms: u64) -> Self {
        Self {
            max_retries,
            delay_ms,
            exponential_backoff: true,
        }
    }
}

/// An action as stored in a workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "StoredAction", into = "StoredAction")]
pub struct ActionSpec {
    pub id: String,
    pub action_type: ActionType,
    /// Tag as written by the builder when this build does not know it
    pub unknown_tag: Option<String>,
    pub name: String,
    /// Execution order within the workflow
    pub position: i32,
    pub config: serde_json::Value,
    pub conditions: Option<Vec<Condition>>,
    pub retry: Option<RetryPolicy>,
    pub timeout_ms: Option<u64>,
}

/// Wire form of [`ActionSpec`]; the type travels as its raw tag
#[derive(Serialize, Deserialize)]
struct StoredAction {
    id: String,
    #[serde(rename = "type", alias = "action_type")]
    tag: String,
    #[serde(default)]
    name: String,
    position: i32,
    #[serde(default)]
    config: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    conditions: Option<Vec<Condition>>,
    #[serde(default, alias = "retryConfig", skip_serializing_if = "Option::is_none")]
    retry: Option<RetryPolicy>,
    #[serde(default, alias = "timeoutMs", skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
}

impl From<StoredAction> for ActionSpec {
    fn from(stored: StoredAction) -> Self {
        let action_type = serde_json::from_value(serde_json::Value::String(stored.tag.clone()))
            .unwrap_or(ActionType::Unknown);
        Self {
            id: stored.id,
            action_type,
            unknown_tag: (action_type == ActionType::Unknown).then_some(stored.tag),
            name: stored.name,
            position: stored.position,
            config: stored.config,
            conditions: stored.conditions,
            retry: stored.retry,
            timeout_ms: stored.timeout_ms,
        }
    }
}

impl From<ActionSpec> for StoredAction {
    fn from(spec: ActionSpec) -> Self {
        let tag = match spec.unknown_tag {
            Some(tag) if spec.action_type == ActionType::Unknown => tag,
            _ => spec.action_type.as_str().to_string(),
        };
        Self {
            id: spec.id,
            tag,
            name: spec.name,
            position: spec.position,
            config: spec.config,
            conditions: spec.conditions,
            retry: spec.retry,
            timeout_ms: spec.timeout_ms,
        }
    }
}

impl ActionSpec {
    pub fn new(id: &str, action_type: ActionType, position: i32, config: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            action_type,
            unknown_tag: None,
            name: action_type.as_str().to_string(),
            position,
            config,
            conditions: None,
            retry: None,
            timeout_ms: None,
        }
    }

    /// The stored tag, which for unknown types is the builder's own
    pub fn type_tag(&self) -> &str {
        match (&self.action_type, &self.unknown_tag) {
            (ActionType::Unknown, Some(tag)) => tag,
            (action_type, _) => action_type.as_str(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Copy of this action carrying a different (resolved) configuration
    pub fn with_config(&self, config: serde_json::Value) -> Self {
        Self {
            config,
            ..self.clone()
        }
    }

    // ===== Builders for common actions =====

    pub fn send_email(id: &str, position: i32, to: &str, subject: &str, body: &str) -> Self {
        Self::new(
            id,
            ActionType::SendEmail,
            position,
            serde_json::json!({ "to": to, "subject": subject, "body": body }),
        )
    }

    pub fn create_task(id: &str, position: i32, title: &str) -> Self {
        Self::new(id, ActionType::CreateTask, position, serde_json::json!({ "title": title }))
    }

    pub fn delay_ms(id: &str, position: i32, duration: u64) -> Self {
        Self::new(
            id,
            ActionType::Delay,
            position,
            serde_json::json!({ "duration": duration, "unit": "milliseconds" }),
        )
    }

    pub fn webhook(id: &str, position: i32, url: &str, payload: serde_json::Value) -> Self {
        Self::new(
            id,
            ActionType::Webhook,
            position,
            serde_json::json!({ "url": url, "payload": payload }),
        )
    }
}

/// Result of executing an action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Handler invocations made, 0 for skipped actions
    pub attempts: u32,
    pub duration_ms: i64,
}

impl ActionResult {
    pub fn success(output: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            output,
            error: None,
            attempts: 1,
            duration_ms: 0,
        }
    }

    pub fn failure(error: &str) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.to_string()),
            attempts: 1,
            duration_ms: 0,
        }
    }

    /// Conditions were false; the handler never ran
    pub fn skipped() -> Self {
        Self {
            success: true,
            output: Some(serde_json::json!({ "skipped": true })),
            error: None,
            attempts: 0,
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_skipped(&self) -> bool {
        self.attempts == 0
            && self
                .output
                .as_ref()
                .and_then(|o| o.get("skipped"))
                .and_then(|s| s.as_bool())
                .unwrap_or(false)
    }
}
