// Workflow Triggers - Event classes that start a workflow run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Types of events that can start a workflow
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Schedule,
    Webhook,
    Event,
    Form,
    #[serde(alias = "record-change")]
    RecordChange,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Schedule => "schedule",
            Self::Webhook => "webhook",
            Self::Event => "event",
            Self::Form => "form",
            Self::RecordChange => "record_change",
        }
    }
}

impl std::str::FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "schedule" => Ok(Self::Schedule),
            "webhook" => Ok(Self::Webhook),
            "event" => Ok(Self::Event),
            "form" => Ok(Self::Form),
            "record_change" | "record-change" => Ok(Self::RecordChange),
            other => Err(format!("unknown trigger type '{}'", other)),
        }
    }
}

/// Data handed to a run by whatever delivered the trigger
pub type TriggerData = serde_json::Map<String, serde_json::Value>;

/// A delivered trigger, independent of how it was produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_id: Uuid,
    pub trigger_type: TriggerType,
    pub payload: TriggerData,
    pub source: EventSource,
    pub timestamp: DateTime<Utc>,
}

/// Source of the trigger event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EventSource {
    System,
    User(Uuid),
    Api,
    Webhook,
    Scheduler,
    Integration(String),
}

impl TriggerEvent {
    pub fn new(trigger_type: TriggerType, payload: TriggerData, source: EventSource) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            trigger_type,
            payload,
            source,
            timestamp: Utc::now(),
        }
    }

    /// A user pressed "run" on a workflow
    pub fn manual(user_id: Uuid, payload: TriggerData) -> Self {
        Self::new(TriggerType::Manual, payload, EventSource::User(user_id))
    }

    /// An application event such as `client.created`
    pub fn event(event_type: &str, mut payload: TriggerData) -> Self {
        payload.insert("event_type".to_string(), serde_json::json!(event_type));
        Self::new(TriggerType::Event, payload, EventSource::System)
    }

    pub fn webhook_received(webhook_id: &str, body: serde_json::Value) -> Self {
        let mut payload = TriggerData::new();
        payload.insert("webhook_id".to_string(), serde_json::json!(webhook_id));
        payload.insert("body".to_string(), body);
        Self::new(TriggerType::Webhook, payload, EventSource::Webhook)
    }

    pub fn form_submitted(form_id: &str, fields: serde_json::Value) -> Self {
        let mut payload = TriggerData::new();
        payload.insert("form_id".to_string(), serde_json::json!(form_id));
        payload.insert("fields".to_string(), fields);
        Self::new(TriggerType::Form, payload, EventSource::Api)
    }

    /// A row changed in the business store
    pub fn record_changed(entity: &str, operation: &str, record: serde_json::Value) -> Self {
        let mut payload = TriggerData::new();
        payload.insert("entity".to_string(), serde_json::json!(entity));
        payload.insert("operation".to_string(), serde_json::json!(operation));
        payload.insert("record".to_string(), record);
        Self::new(TriggerType::RecordChange, payload, EventSource::System)
    }

    pub fn scheduled(schedule_name: &str) -> Self {
        let mut payload = TriggerData::new();
        payload.insert("schedule_name".to_string(), serde_json::json!(schedule_name));
        payload.insert("fired_at".to_string(), serde_json::json!(Utc::now().to_rfc3339()));
        Self::new(TriggerType::Schedule, payload, EventSource::Scheduler)
    }
}
