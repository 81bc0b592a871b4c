// Action handlers, grouped by the collaborator they delegate to

pub mod communication;
pub mod control;
pub mod http;
pub mod records;

use serde_json::Value;

use crate::error::HandlerError;

/// Required string field from an action config
pub(crate) fn required_str<'a>(config: &'a Value, field: &str) -> Result<&'a str, HandlerError> {
    match config.get(field).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(HandlerError::missing(field)),
    }
}

/// First non-empty string among `fields`
pub(crate) fn first_str<'a>(config: &'a Value, fields: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .filter_map(|f| config.get(*f).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
}
