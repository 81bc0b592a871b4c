// HTTP routes over the in-memory store

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use crate::tests::fixtures::*;
use crate::tests::helpers::*;
use crate::workflows::{ActionSpec, ActionType, HandlerRegistry, InMemoryStore, WorkflowDefinition};
use crate::{build_router, AppState};

async fn app(registry: HandlerRegistry, workflows: Vec<WorkflowDefinition>) -> (Arc<InMemoryStore>, Router) {
    let (store, engine) = engine_with(registry, workflows).await;
    let state = Arc::new(AppState::new(Arc::new(engine), store.clone()));
    (store, build_router(state))
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = router.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let (_, router) = app(HandlerRegistry::new(), Vec::new()).await;

    let (status, body) = send(&router, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_run_workflow_and_read_history() {
    let handler = RecordingHandler::new();
    let workflow = onboarding_workflow();
    let registry = registry_for(&[ActionType::SendEmail, ActionType::CreateTask], handler.clone());
    let (_, router) = app(registry, vec![workflow.clone()]).await;

    let (status, run) = send(
        &router,
        "POST",
        &format!("/api/v1/workflows/{}/run", workflow.id),
        Some(json!({ "email": "a@b.com", "name": "Ann" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["status"], "completed");
    assert_eq!(run["results"]["welcome"]["success"], true);
    // No phone in the trigger, so the follow-up task is skipped
    assert_eq!(run["results"]["follow_up"]["output"]["skipped"], true);
    assert_eq!(handler.calls(), 1);
    assert_eq!(handler.configs().await[0]["to"], "a@b.com");

    let (status, page) = send(
        &router,
        "GET",
        &format!("/api/v1/workflows/{}/executions?page=1&per_page=10", workflow.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["meta"]["total"], 1);
    assert_eq!(page["data"][0]["id"], run["execution_id"]);

    let execution_id = run["execution_id"].as_str().unwrap();
    let (status, detail) = send(&router, "GET", &format!("/api/v1/executions/{}", execution_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["execution"]["status"], "completed");
    assert_eq!(detail["action_logs"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_history_past_the_last_page_is_empty() {
    let workflow = single_action_workflow(ActionSpec::create_task("task", 1, "x"));
    let (_, router) = app(registry_for(&[ActionType::CreateTask], RecordingHandler::new()), vec![workflow.clone()]).await;

    let (status, page) = send(
        &router,
        "GET",
        &format!("/api/v1/workflows/{}/executions?page={}", workflow.id, i64::MAX),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["data"], json!([]));
    assert_eq!(page["meta"]["total"], 0);
}

#[tokio::test]
async fn test_run_without_body_uses_empty_trigger() {
    let handler = RecordingHandler::new();
    let workflow = single_action_workflow(ActionSpec::create_task("task", 1, "Review {{trigger.name}}"));
    let (_, router) = app(registry_for(&[ActionType::CreateTask], handler.clone()), vec![workflow.clone()]).await;

    let (status, run) = send(&router, "POST", &format!("/api/v1/workflows/{}/run", workflow.id), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["status"], "completed");
    assert_eq!(handler.configs().await[0]["title"], "Review ");
}

#[tokio::test]
async fn test_unknown_workflow_is_not_found() {
    let (_, router) = app(HandlerRegistry::new(), Vec::new()).await;

    let (status, body) = send(&router, "POST", &format!("/api/v1/workflows/{}/run", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = send(&router, "GET", &format!("/api/v1/executions/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_inactive_workflow_conflicts() {
    let workflow = single_action_workflow(ActionSpec::create_task("task", 1, "x")).inactive();
    let (_, router) = app(HandlerRegistry::new(), vec![workflow.clone()]).await;

    let (status, body) = send(&router, "POST", &format!("/api/v1/workflows/{}/run", workflow.id), None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_trigger_dispatch_matches_event_type() {
    let handler = RecordingHandler::new();
    let workflow = onboarding_workflow();
    let registry = registry_for(&[ActionType::SendEmail, ActionType::CreateTask], handler.clone());
    let (_, router) = app(registry, vec![workflow]).await;

    let (status, runs) = send(
        &router,
        "POST",
        "/api/v1/triggers/event",
        Some(json!({ "event_type": "client.deleted", "email": "a@b.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(runs.as_array().unwrap().len(), 0);

    let (status, runs) = send(
        &router,
        "POST",
        "/api/v1/triggers/event",
        Some(json!({ "event_type": "client.created", "email": "a@b.com", "phone": "555" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(runs.as_array().unwrap().len(), 1);
    assert_eq!(handler.calls(), 2);

    let (status, _) = send(&router, "POST", "/api/v1/triggers/carrier-pigeon", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
