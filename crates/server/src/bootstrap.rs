use std::sync::Arc;

use axum::Router;
use carecall_agent::{ChatCompletionsClient, CompletionError, ConversationStore, TurnController};
use carecall_core::config::{AppConfig, ConfigError, LoadOptions};
use carecall_db::{connect_with_settings, migrations, DbPool, SqlIntakeRepository};
use carecall_telephony::{CallPlacementError, CallPlacer, TwilioCallPlacer};
use thiserror::Error;
use tracing::info;

use crate::{calls, health, voice};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub store: Arc<ConversationStore>,
    pub controller: Arc<TurnController>,
    pub call_placer: Arc<dyn CallPlacer>,
}

impl Application {
    /// Full route surface: health check, voice webhook, call initiation.
    pub fn router(&self) -> Router {
        health::router(self.db_pool.clone(), self.store.clone())
            .merge(voice::router(
                self.controller.clone(),
                self.config.intake.apology_line.clone(),
            ))
            .merge(calls::router(self.call_placer.clone()))
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
    #[error("completion client setup failed: {0}")]
    Completions(#[source] CompletionError),
    #[error("call placer setup failed: {0}")]
    Telephony(#[source] CallPlacementError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let completions =
        ChatCompletionsClient::from_config(&config.llm).map_err(BootstrapError::Completions)?;
    let call_placer: Arc<dyn CallPlacer> = Arc::new(
        TwilioCallPlacer::from_config(&config.telephony).map_err(BootstrapError::Telephony)?,
    );

    let store = Arc::new(ConversationStore::new());
    let controller = Arc::new(TurnController::new(
        store.clone(),
        Arc::new(completions),
        Arc::new(SqlIntakeRepository::new(db_pool.clone())),
    ));
    info!(
        event_name = "system.bootstrap.collaborators_ready",
        llm_provider = ?config.llm.provider,
        llm_model = %config.llm.model,
        "turn controller assembled"
    );

    Ok(Application { config, db_pool, store, controller, call_placer })
}

#[cfg(test)]
mod tests {
    use carecall_core::config::{ConfigOverrides, LoadOptions};
    use carecall_core::IntakeRecord;
    use carecall_db::{IntakeRepository, SqlIntakeRepository};
    use serde_json::{json, Map, Value};

    use crate::bootstrap::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_without_valid_telephony_credentials() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                telephony_account_sid: Some("SKwrongkind".to_string()),
                telephony_auth_token: Some("token-valid".to_string()),
                telephony_from_number: Some("+15550100".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("telephony.account_sid"));
    }

    #[tokio::test]
    async fn integration_smoke_covers_startup_and_the_intake_data_path() {
        let app = bootstrap(valid_options("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name = 'intake_records'",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected intake table to be available after bootstrap");
        assert_eq!(table_count, 1, "bootstrap should expose the intake table");

        let repo = SqlIntakeRepository::new(app.db_pool.clone());
        repo.upsert(IntakeRecord::from_collected("+15550123", &collected_fixture()))
            .await
            .expect("upsert should work against the bootstrapped pool");
        let stored = repo
            .find_by_phone_number("+15550123")
            .await
            .expect("lookup should succeed")
            .expect("record should be present");
        assert_eq!(stored.full_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(stored.health_condition.as_deref(), Some("recurring migraines"));

        assert!(app.store.is_empty().await, "no conversations before the first webhook");
        let _router = app.router();

        app.db_pool.close().await;
    }

    fn valid_options(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                telephony_account_sid: Some("ACtest000000000000000000000000000".to_string()),
                telephony_auth_token: Some("token-test".to_string()),
                telephony_from_number: Some("+15550100".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    fn collected_fixture() -> Map<String, Value> {
        let mut collected = Map::new();
        collected.insert("full_name".to_string(), json!("Ada Lovelace"));
        collected.insert("address".to_string(), json!("12 Crescent Rd, London"));
        collected.insert("health_condition".to_string(), json!("recurring migraines"));
        collected
    }
}
