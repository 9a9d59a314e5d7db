use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use vitrine_agent::assembly::{build_runtime, AssemblyError};
use vitrine_agent::runtime::AgentRuntime;
use vitrine_core::config::{AppConfig, ConfigError};
use vitrine_db::{migrations, open_pool, DbPool, SqlStateStore};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
}

impl Application {
    pub fn catalog_products(&self) -> usize {
        self.runtime.dispatcher().catalog().catalog().len()
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

/// Config is loaded by the caller so logging can start first.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting application bootstrap");

    let db_pool = open_pool(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let store = Arc::new(SqlStateStore::new(db_pool.clone()));
    let runtime = Arc::new(build_runtime(&config, store)?);

    Ok(Application { config, db_pool, runtime })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use vitrine_agent::dispatcher::TurnContext;
    use vitrine_agent::runtime::TurnOutcome;
    use vitrine_agent::tools::RawToolCall;
    use vitrine_core::config::{AppConfig, ConfigOverrides, LlmProvider, LoadOptions};
    use vitrine_core::domain::conversation::ConversationId;

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?).await
    }

    fn overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                llm_provider: Some(LlmProvider::Offline),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_persists_turns() {
        let app = bootstrap(overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with an in-memory database");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'conversation_state'",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("conversation table should exist after bootstrap");
        assert_eq!(table_count, 1);
        assert_eq!(app.catalog_products(), 21);

        let id = ConversationId("boot-1".to_string());
        let reply = app
            .runtime
            .dispatch(
                &id,
                &[RawToolCall::new("search_product_recommendation", json!({"product_query": "Ray-Ban Clubmaster Tortuga"}))],
                &TurnContext::default(),
            )
            .await;
        assert_eq!(reply.outcome, TurnOutcome::Completed);

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversation_state")
            .fetch_one(&app.db_pool)
            .await
            .expect("count rows");
        assert_eq!(rows, 1);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_database_url() {
        let result = bootstrap(overrides("postgres://nowhere/vitrine")).await;
        assert!(result.is_err());
    }
}
