use sqlx::{migrate::MigrateDatabase, postgres::PgPoolOptions, PgPool, Postgres};
use std::time::Duration;

/// Connection pool sizing, overridable through `DB_*` variables
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}

impl PoolConfig {
    /// `DB_MAX_CONNECTIONS`, `DB_MIN_CONNECTIONS`, `DB_ACQUIRE_TIMEOUT` and
    /// `DB_IDLE_TIMEOUT` (seconds) over the defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_connections: env_u64("DB_MAX_CONNECTIONS").map_or(defaults.max_connections, |n| n as u32),
            min_connections: env_u64("DB_MIN_CONNECTIONS").map_or(defaults.min_connections, |n| n as u32),
            acquire_timeout: env_u64("DB_ACQUIRE_TIMEOUT").map_or(defaults.acquire_timeout, Duration::from_secs),
            idle_timeout: env_u64("DB_IDLE_TIMEOUT").map_or(defaults.idle_timeout, Duration::from_secs),
        }
    }

    /// Open a pool, creating the database first when it is missing
    pub async fn connect(&self, database_url: &str) -> anyhow::Result<PgPool> {
        if !Postgres::database_exists(database_url).await? {
            tracing::info!("Database missing, creating it");
            Postgres::create_database(database_url).await?;
        }

        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .connect(database_url)
            .await?;

        tracing::info!(
            "Connected to Postgres (pool {}..{})",
            self.min_connections,
            self.max_connections
        );
        Ok(pool)
    }
}

pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    PoolConfig::from_env().connect(database_url).await
}

/// Apply the embedded migrations under `backend/migrations`
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}
