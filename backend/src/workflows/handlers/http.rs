// Outbound HTTP handlers - api_call and webhook

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use url::Url;

use super::required_str;
use crate::error::HandlerError;
use crate::workflows::actions::ActionSpec;
use crate::workflows::executor::ExecutionContext;
use crate::workflows::registry::ActionHandler;

fn parse_url(config: &Value) -> Result<Url, HandlerError> {
    let raw = required_str(config, "url")?;
    let url = Url::parse(raw).map_err(|e| HandlerError::config(format!("invalid url '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(HandlerError::config(format!("unsupported url scheme '{}'", other))),
    }
}

fn parse_headers(config: &Value) -> Result<HeaderMap, HandlerError> {
    let mut headers = HeaderMap::new();
    let Some(map) = config.get("headers").and_then(Value::as_object) else {
        return Ok(headers);
    };

    for (name, value) in map {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| HandlerError::config(format!("invalid header name '{}'", name)))?;
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let value = HeaderValue::from_str(&value)
            .map_err(|_| HandlerError::config(format!("invalid value for header '{}'", name)))?;
        headers.insert(name, value);
    }

    Ok(headers)
}

/// Send the request and turn the response into `{ status, body }`.
/// Non-2xx responses are failures carrying the status code.
async fn send(request: reqwest::RequestBuilder) -> Result<Value, HandlerError> {
    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(HandlerError::Http(format!(
            "request returned status {}",
            status.as_u16()
        )));
    }

    let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
    Ok(json!({ "status": status.as_u16(), "body": body }))
}

pub struct ApiCallHandler {
    client: reqwest::Client,
}

impl ApiCallHandler {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ActionHandler for ApiCallHandler {
    async fn execute(&self, action: &ActionSpec, _ctx: &ExecutionContext) -> Result<Option<Value>, HandlerError> {
        let config = &action.config;
        let url = parse_url(config)?;
        let method = config
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| HandlerError::config(format!("invalid method '{}'", method)))?;

        let mut request = self.client.request(method, url).headers(parse_headers(config)?);
        request = match config.get("body") {
            None | Some(Value::Null) => request,
            Some(Value::String(text)) => request.body(text.clone()),
            Some(body) => request.json(body),
        };

        Ok(Some(send(request).await?))
    }
}

pub struct WebhookHandler {
    client: reqwest::Client,
}

impl WebhookHandler {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ActionHandler for WebhookHandler {
    async fn execute(&self, action: &ActionSpec, _ctx: &ExecutionContext) -> Result<Option<Value>, HandlerError> {
        let config = &action.config;
        let url = parse_url(config)?;
        let payload = config.get("payload").cloned().unwrap_or_else(|| json!({}));

        let request = self
            .client
            .post(url)
            .headers(parse_headers(config)?)
            .json(&payload);

        Ok(Some(send(request).await?))
    }
}
