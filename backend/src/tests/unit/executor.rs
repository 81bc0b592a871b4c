// Executor behaviour: skips, retries, timeouts, fail-fast and statistics

use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_shared::{ActionStatus, ExecutionStatus};

use crate::tests::fixtures::*;
use crate::tests::helpers::*;
use crate::workflows::executor::UNKNOWN_ACTION_TYPE;
use crate::workflows::retry::ACTION_TIMEOUT;
use crate::workflows::{
    ActionSpec, ActionType, Condition, DefinitionStore, ExecutionStore, HandlerRegistry, RetryPolicy,
};

#[tokio::test]
async fn test_false_condition_skips_without_invoking_handler() {
    let handler = RecordingHandler::new();
    let workflow = single_action_workflow(
        ActionSpec::new("notify", ActionType::CreateNotification, 1, json!({ "message": "hi" }))
            .with_conditions(vec![Condition::equals("status", json!("vip"))]),
    );
    let (store, engine) = engine_with(
        registry_for(&[ActionType::CreateNotification], handler.clone()),
        vec![workflow.clone()],
    )
    .await;

    let result = engine
        .run_workflow(workflow.id, trigger(json!({ "status": "regular" })))
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    let notify = &result.results["notify"];
    assert!(notify.success);
    assert_eq!(notify.output, Some(json!({ "skipped": true })));
    assert_eq!(handler.calls(), 0);

    let logs = store.list_action_logs(result.execution_id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, ActionStatus::Skipped);
    assert_eq!(logs[0].attempt, 0);
}

#[tokio::test]
async fn test_retry_succeeds_on_third_attempt_with_backoff() {
    let handler = FlakyHandler::new(2);
    let workflow = single_action_workflow(retrying_action(ActionType::ApiCall));
    let (store, engine) = engine_with(
        registry_for(&[ActionType::ApiCall], handler.clone()),
        vec![workflow.clone()],
    )
    .await;

    let start = Instant::now();
    let result = engine.run_workflow(workflow.id, trigger(json!({}))).await.unwrap();
    let elapsed = start.elapsed();

    assert!(result.succeeded());
    assert_eq!(handler.calls(), 3);
    assert_eq!(result.results["flaky"].attempts, 3);
    // 100ms then 200ms between attempts
    assert!(elapsed >= Duration::from_millis(300), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "elapsed {:?}", elapsed);

    let logs = store.list_action_logs(result.execution_id).await.unwrap();
    let attempts: Vec<i32> = logs.iter().map(|l| l.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert_eq!(logs[0].status, ActionStatus::Failed);
    assert_eq!(logs[2].status, ActionStatus::Succeeded);
}

#[tokio::test]
async fn test_retries_exhausted_fails_with_last_error() {
    let handler = FlakyHandler::new(10);
    let workflow = single_action_workflow(
        ActionSpec::new("flaky", ActionType::Webhook, 1, json!({})).with_retry(RetryPolicy::fixed(2, 10)),
    );
    let (_store, engine) = engine_with(
        registry_for(&[ActionType::Webhook], handler.clone()),
        vec![workflow.clone()],
    )
    .await;

    let result = engine.run_workflow(workflow.id, trigger(json!({}))).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(handler.calls(), 3);
    let error = result.results["flaky"].error.clone().unwrap();
    assert!(error.contains("transient failure #3"), "{}", error);
    assert_eq!(result.error.as_deref(), Some(error.as_str()));
}

#[tokio::test]
async fn test_hanging_action_times_out() {
    let workflow = single_action_workflow(
        ActionSpec::new("slow", ActionType::ApiCall, 1, json!({})).with_timeout_ms(50),
    );
    let (_store, engine) = engine_with(
        registry_for(&[ActionType::ApiCall], Arc::new(HangingHandler)),
        vec![workflow.clone()],
    )
    .await;

    let start = Instant::now();
    let result = engine.run_workflow(workflow.id, trigger(json!({}))).await.unwrap();
    let elapsed = start.elapsed();

    let slow = &result.results["slow"];
    assert!(!slow.success);
    assert_eq!(slow.error.as_deref(), Some(ACTION_TIMEOUT));
    assert!(elapsed >= Duration::from_millis(50), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(250), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_timed_out_attempt_is_retried_with_a_fresh_deadline() {
    let handler = StallOnceHandler::new();
    let workflow = single_action_workflow(
        ActionSpec::new("stall", ActionType::ApiCall, 1, json!({}))
            .with_timeout_ms(50)
            .with_retry(RetryPolicy::fixed(2, 20)),
    );
    let (store, engine) = engine_with(
        registry_for(&[ActionType::ApiCall], handler.clone()),
        vec![workflow.clone()],
    )
    .await;

    let start = Instant::now();
    let result = engine.run_workflow(workflow.id, trigger(json!({}))).await.unwrap();
    let elapsed = start.elapsed();

    assert!(result.succeeded());
    assert_eq!(handler.calls(), 2);
    assert_eq!(result.results["stall"].attempts, 2);
    assert!(elapsed >= Duration::from_millis(70), "elapsed {:?}", elapsed);

    let logs = store.list_action_logs(result.execution_id).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].status, ActionStatus::Failed);
    assert_eq!(logs[0].error.as_deref(), Some(ACTION_TIMEOUT));
    assert_eq!(logs[1].status, ActionStatus::Succeeded);
    assert_eq!(logs[1].attempt, 2);
}

#[tokio::test]
async fn test_actions_run_in_position_order_not_declaration_order() {
    let handler = RecordingHandler::new();
    let actions = [("third", 3), ("first", 1), ("second", 2)]
        .into_iter()
        .map(|(id, position)| ActionSpec::new(id, ActionType::CreateRecord, position, json!({ "step": id })))
        .collect();
    let workflow = crate::workflows::WorkflowDefinition::new(
        uuid::Uuid::new_v4(),
        "Shuffled",
        crate::workflows::TriggerType::Manual,
        actions,
    );
    let (store, engine) = engine_with(
        registry_for(&[ActionType::CreateRecord], handler.clone()),
        vec![workflow.clone()],
    )
    .await;

    let result = engine.run_workflow(workflow.id, trigger(json!({}))).await.unwrap();
    assert!(result.succeeded());

    let steps: Vec<Value> = handler.configs().await.into_iter().map(|c| c["step"].clone()).collect();
    assert_eq!(steps, vec![json!("first"), json!("second"), json!("third")]);

    let logged: Vec<String> = store
        .list_action_logs(result.execution_id)
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.action_id)
        .collect();
    assert_eq!(logged, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_failure_stops_remaining_actions() {
    // step1 succeeds, step2 fails permanently, step3 must never run
    let recorder = RecordingHandler::new();
    let mut workflow = three_step_workflow(ActionType::CreateRecord);
    workflow.actions[1].action_type = ActionType::Webhook;
    workflow.actions[2].action_type = ActionType::CreateTask;

    let registry = HandlerRegistry::new()
        .with(ActionType::CreateRecord, recorder.clone())
        .with(ActionType::Webhook, FlakyHandler::new(usize::MAX))
        .with(ActionType::CreateTask, recorder.clone());
    let (store, engine) = engine_with(registry, vec![workflow.clone()]).await;

    let result = engine.run_workflow(workflow.id, trigger(json!({}))).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.results.len(), 2);
    assert!(result.results["step1"].success);
    assert!(!result.results["step2"].success);
    assert!(!result.results.contains_key("step3"));
    assert_eq!(recorder.calls(), 1);

    let execution = store.get_execution(result.execution_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.error_message.is_some());
    assert!(execution.completed_at.is_some());
}

#[tokio::test]
async fn test_unregistered_type_fails_the_run() {
    let workflow = single_action_workflow(ActionSpec::new("mystery", ActionType::Delay, 1, json!({})));
    let (_store, engine) = engine_with(HandlerRegistry::new(), vec![workflow.clone()]).await;

    let result = engine.run_workflow(workflow.id, trigger(json!({}))).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.results["mystery"].error.as_deref(), Some(UNKNOWN_ACTION_TYPE));
    assert_eq!(result.results["mystery"].attempts, 0);
}

#[tokio::test]
async fn test_engine_starts_next_to_a_workflow_with_an_unknown_tag() {
    let handler = RecordingHandler::new();
    let good = single_action_workflow(ActionSpec::create_task("task", 1, "x"));
    let mut legacy = single_action_workflow(ActionSpec::create_task("placeholder", 1, "x"));
    legacy.actions = serde_json::from_value(json!([
        { "id": "call", "type": "action_http", "position": 1, "config": { "url": "https://example.test" } }
    ]))
    .unwrap();

    let (store, engine) = engine_with(
        registry_for(&[ActionType::CreateTask], handler.clone()),
        vec![good.clone(), legacy.clone()],
    )
    .await;

    assert!(engine.run_workflow(good.id, trigger(json!({}))).await.unwrap().succeeded());

    let result = engine.run_workflow(legacy.id, trigger(json!({}))).await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.results["call"].error.as_deref(), Some(UNKNOWN_ACTION_TYPE));
    assert_eq!(handler.calls(), 1);

    let logs = store.list_action_logs(result.execution_id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action_type, "action_http");
}

#[tokio::test]
async fn test_success_rate_after_successful_run() {
    let handler = RecordingHandler::new();
    let mut workflow = single_action_workflow(ActionSpec::create_task("task", 1, "x"));
    workflow.run_count = 9;
    workflow.success_rate = Decimal::from(80);
    let (store, engine) = engine_with(
        registry_for(&[ActionType::CreateTask], handler),
        vec![workflow.clone()],
    )
    .await;

    engine.run_workflow(workflow.id, trigger(json!({}))).await.unwrap();

    let stored = store.get_workflow(workflow.id).await.unwrap().unwrap();
    assert_eq!(stored.run_count, 10);
    assert_eq!(stored.success_rate, Decimal::new(8200, 2));
    assert!(stored.last_run_at.is_some());
}

#[tokio::test]
async fn test_templates_resolved_before_handler_runs() {
    let handler = RecordingHandler::new();
    let workflow = single_action_workflow(ActionSpec::send_email(
        "welcome",
        1,
        "{{trigger.email}}",
        "Hello {{trigger.name}}",
        "Order {{order.id}} total {{order.total}}",
    ));
    let (_store, engine) = engine_with(
        registry_for(&[ActionType::SendEmail], handler.clone()),
        vec![workflow.clone()],
    )
    .await;

    let result = engine
        .run_workflow(
            workflow.id,
            trigger(json!({ "email": "a@b.com", "name": "Ann", "order": { "id": 7, "total": 12.5 } })),
        )
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(handler.calls(), 1);
    let configs = handler.configs().await;
    assert_eq!(configs[0]["to"], "a@b.com");
    assert_eq!(configs[0]["subject"], "Hello Ann");
    assert_eq!(configs[0]["body"], "Order 7 total 12.5");
}

#[tokio::test]
async fn test_later_actions_see_earlier_outputs() {
    let handler = RecordingHandler::new();
    let workflow = three_step_workflow(ActionType::CreateRecord);
    let mut workflow = workflow;
    workflow.actions[1].config = json!({ "previous": "{{action_step1.action}}", "call": "{{action_step1.call}}" });

    let (_store, engine) = engine_with(
        registry_for(&[ActionType::CreateRecord], handler.clone()),
        vec![workflow.clone()],
    )
    .await;

    engine.run_workflow(workflow.id, trigger(json!({}))).await.unwrap();

    let configs = handler.configs().await;
    assert_eq!(configs[1], json!({ "previous": "step1", "call": "1" }));
}

#[tokio::test]
async fn test_concurrent_runs_keep_every_count() {
    let handler = RecordingHandler::new();
    let workflow = single_action_workflow(ActionSpec::create_task("task", 1, "x"));
    let (store, engine) = engine_with(
        registry_for(&[ActionType::CreateTask], handler.clone()),
        vec![workflow.clone()],
    )
    .await;
    let engine = Arc::new(engine);

    let runs = (0..10).map(|_| {
        let engine = engine.clone();
        let id = workflow.id;
        tokio::spawn(async move { engine.run_workflow(id, trigger(json!({}))).await })
    });
    for run in futures::future::join_all(runs).await {
        assert!(run.unwrap().unwrap().succeeded());
    }

    let stored = store.get_workflow(workflow.id).await.unwrap().unwrap();
    assert_eq!(stored.run_count, 10);
    assert_eq!(stored.success_rate, Decimal::ONE_HUNDRED);
    assert_eq!(handler.calls(), 10);
}
