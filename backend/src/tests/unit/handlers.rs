// Standard handlers against a mock HTTP server and the in-memory store

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use relay_shared::ExecutionStatus;

use crate::services::{ChatWebhook, MessagingService};
use crate::tests::helpers::*;
use crate::workflows::executor::ExecutionContext;
use crate::workflows::handlers::http::{ApiCallHandler, WebhookHandler};
use crate::workflows::{
    ActionHandler, ActionSpec, ActionType, DefinitionStore, HandlerDeps, HandlerRegistry, InMemoryStore,
    RetryPolicy, TriggerType, WorkflowDefinition, WorkflowEngine,
};

fn ctx() -> ExecutionContext {
    ExecutionContext::new(Uuid::new_v4(), Uuid::new_v4(), None, Default::default())
}

#[tokio::test]
async fn test_api_call_returns_status_and_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/crm/contacts"))
        .and(header("x-api-key", "secret"))
        .and(body_json(json!({ "name": "Ann" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 42 })))
        .expect(1)
        .mount(&server)
        .await;

    let action = ActionSpec::new(
        "crm",
        ActionType::ApiCall,
        1,
        json!({
            "url": format!("{}/crm/contacts", server.uri()),
            "method": "post",
            "headers": { "X-Api-Key": "secret" },
            "body": { "name": "Ann" }
        }),
    );

    let output = ApiCallHandler::new(reqwest::Client::new())
        .execute(&action, &ctx())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(output, json!({ "status": 201, "body": { "id": 42 } }));
}

#[tokio::test]
async fn test_api_call_non_success_status_is_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .mount(&server)
        .await;

    let action = ActionSpec::new("probe", ActionType::ApiCall, 1, json!({ "url": server.uri() }));
    let err = ApiCallHandler::new(reqwest::Client::new())
        .execute(&action, &ctx())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("503"), "{}", err);
}

#[tokio::test]
async fn test_api_call_plain_text_body_kept_as_string() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .mount(&server)
        .await;

    let action = ActionSpec::new("ping", ActionType::ApiCall, 1, json!({ "url": server.uri() }));
    let output = ApiCallHandler::new(reqwest::Client::new())
        .execute(&action, &ctx())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(output["body"], "pong");
}

#[tokio::test]
async fn test_webhook_posts_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/order"))
        .and(body_json(json!({ "order": 7 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let action = ActionSpec::webhook("notify", 1, &format!("{}/hooks/order", server.uri()), json!({ "order": 7 }));
    let output = WebhookHandler::new(reqwest::Client::new())
        .execute(&action, &ctx())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(output["status"], 200);
    assert_eq!(output["body"]["ok"], true);
}

#[tokio::test]
async fn test_webhook_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let workflow = WorkflowDefinition::new(
        Uuid::new_v4(),
        "Retrying hook",
        TriggerType::Manual,
        vec![ActionSpec::webhook("hook", 1, &server.uri(), json!({})).with_retry(RetryPolicy::fixed(2, 10))],
    );
    let registry = HandlerRegistry::new().with(ActionType::Webhook, Arc::new(WebhookHandler::new(reqwest::Client::new())));
    let (_store, engine) = engine_with(registry, vec![workflow.clone()]).await;

    let result = engine.run_workflow(workflow.id, trigger(json!({}))).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.results["hook"].attempts, 3);
}

#[tokio::test]
async fn test_standard_registry_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/lookup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tier": "gold" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(body_json(json!({ "text": "New gold client Ann", "channel": "sales" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryStore::new());
    let http = reqwest::Client::new();
    let messages = MessagingService::new().with_chat(Arc::new(ChatWebhook::new(
        http.clone(),
        Some(format!("{}/chat", server.uri())),
    )));
    let registry = HandlerRegistry::standard(HandlerDeps {
        records: store.clone(),
        messages: Arc::new(messages),
        http,
    });

    let workflow = WorkflowDefinition::new(
        Uuid::new_v4(),
        "New client",
        TriggerType::Event,
        vec![
            ActionSpec::new(
                "lookup",
                ActionType::ApiCall,
                1,
                json!({ "url": format!("{}/lookup", server.uri()), "method": "POST", "body": { "name": "{{name}}" } }),
            ),
            ActionSpec::new(
                "save",
                ActionType::CreateRecord,
                2,
                json!({ "entity": "clients", "data": { "name": "{{name}}", "tier": "{{action_lookup.body.tier}}" } }),
            ),
            ActionSpec::new(
                "announce",
                ActionType::SendChat,
                3,
                json!({ "channel": "sales", "message": "New {{action_lookup.body.tier}} client {{trigger.name}}" }),
            ),
        ],
    )
    .with_trigger_config(json!({ "event_type": "client.created" }));

    store.save_workflow(&workflow).await.unwrap();
    let engine = WorkflowEngine::new(store.clone(), store.clone(), registry, Duration::from_secs(5))
        .await
        .unwrap();

    let results = engine
        .dispatch(
            TriggerType::Event,
            trigger(json!({ "event_type": "client.created", "name": "Ann" })),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, ExecutionStatus::Completed, "{:?}", results[0].error);

    let clients = store.records_for("clients").await;
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].data["tier"], "gold");
    assert_eq!(clients[0].owner_id, Some(workflow.owner_id));

    let logs = store.records_for("communication_logs").await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].data["channel"], "chat");
}
