use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use relay_backend::{
    build_router, config, database,
    services::MessagingService,
    workflows::{HandlerDeps, HandlerRegistry, PgWorkflowStore, WorkflowEngine},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;

    database::migrate(&db_pool).await?;

    let store = Arc::new(PgWorkflowStore::new(db_pool.clone()));
    let http = reqwest::Client::builder()
        .timeout(config.engine.http_timeout)
        .build()?;
    let messages = MessagingService::from_config(&config, http.clone())?;

    let registry = HandlerRegistry::standard(HandlerDeps {
        records: store.clone(),
        messages: Arc::new(messages),
        http,
    });

    let engine = WorkflowEngine::new(
        store.clone(),
        store.clone(),
        registry,
        config.engine.default_action_timeout,
    )
    .await?;

    let app_state = Arc::new(AppState::new(Arc::new(engine), store).with_db_pool(db_pool));
    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Server running on {}", config.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
