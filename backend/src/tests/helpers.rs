// Shared fakes and builders for the engine test suites

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::HandlerError;
use crate::workflows::executor::ExecutionContext;
use crate::workflows::{
    ActionHandler, ActionSpec, ActionType, HandlerRegistry, InMemoryStore, TriggerData, WorkflowDefinition,
    WorkflowEngine,
};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("relay_backend=debug")
            .try_init()
            .ok();
    });
}

pub fn trigger(value: Value) -> TriggerData {
    value.as_object().cloned().unwrap_or_default()
}

/// Succeeds every time and remembers the resolved config it was given
#[derive(Default)]
pub struct RecordingHandler {
    calls: AtomicUsize,
    configs: Mutex<Vec<Value>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn configs(&self) -> Vec<Value> {
        self.configs.lock().await.clone()
    }
}

#[async_trait]
impl ActionHandler for RecordingHandler {
    async fn execute(&self, action: &ActionSpec, _ctx: &ExecutionContext) -> Result<Option<Value>, HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.configs.lock().await.push(action.config.clone());
        Ok(Some(json!({ "call": call, "action": action.id })))
    }
}

/// Fails the first `failures` invocations, then succeeds
pub struct FlakyHandler {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyHandler {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionHandler for FlakyHandler {
    async fn execute(&self, _action: &ActionSpec, _ctx: &ExecutionContext) -> Result<Option<Value>, HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(HandlerError::Delivery(format!("transient failure #{}", call)))
        } else {
            Ok(Some(json!({ "succeeded_on": call })))
        }
    }
}

/// Never completes; only a timeout gets past it
pub struct HangingHandler;

#[async_trait]
impl ActionHandler for HangingHandler {
    async fn execute(&self, _action: &ActionSpec, _ctx: &ExecutionContext) -> Result<Option<Value>, HandlerError> {
        std::future::pending::<()>().await;
        Ok(None)
    }
}

/// Hangs on its first invocation, succeeds on every later one
#[derive(Default)]
pub struct StallOnceHandler {
    calls: AtomicUsize,
}

impl StallOnceHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionHandler for StallOnceHandler {
    async fn execute(&self, _action: &ActionSpec, _ctx: &ExecutionContext) -> Result<Option<Value>, HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == 1 {
            std::future::pending::<()>().await;
        }
        Ok(Some(json!({ "succeeded_on": call })))
    }
}

/// Store plus engine over the given workflows, with a short default timeout
pub async fn engine_with(
    registry: HandlerRegistry,
    workflows: Vec<WorkflowDefinition>,
) -> (Arc<InMemoryStore>, WorkflowEngine) {
    init_test_logging();

    let store = Arc::new(InMemoryStore::with_workflows(workflows).await);
    let engine = WorkflowEngine::new(store.clone(), store.clone(), registry, Duration::from_secs(2))
        .await
        .expect("engine should start");

    (store, engine)
}

/// Registry mapping the given types onto one shared handler
pub fn registry_for(types: &[ActionType], handler: Arc<dyn ActionHandler>) -> HandlerRegistry {
    types
        .iter()
        .fold(HandlerRegistry::new(), |registry, t| registry.with(*t, handler.clone()))
}
