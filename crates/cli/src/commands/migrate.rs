use carecall_core::config::{AppConfig, LoadOptions};
use carecall_db::{connect_with_settings, migrations, DbPool};
use serde_json::json;
use sqlx::migrate::Migrate;

use crate::commands::CommandResult;

pub fn run(status_only: bool) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let outcome = if status_only {
            status_report(&pool).await
        } else {
            migrations::run_pending(&pool)
                .await
                .map(|()| CommandResult::success("migrate", "applied pending migrations"))
                .map_err(|error| ("migration", error.to_string(), 5u8))
        };
        pool.close().await;
        outcome
    });

    match result {
        Ok(command_result) => command_result,
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}

/// Compares the embedded migration set against the `_sqlx_migrations`
/// ledger without applying anything.
async fn status_report(pool: &DbPool) -> Result<CommandResult, (&'static str, String, u8)> {
    let mut conn =
        pool.acquire().await.map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    conn.ensure_migrations_table()
        .await
        .map_err(|error| ("migration", error.to_string(), 5u8))?;
    let applied_versions: Vec<i64> = conn
        .list_applied_migrations()
        .await
        .map_err(|error| ("migration", error.to_string(), 5u8))?
        .into_iter()
        .map(|applied| applied.version)
        .collect();

    let mut applied = Vec::new();
    let mut pending = Vec::new();
    for migration in migrations::MIGRATOR.iter() {
        if migration.migration_type.is_down_migration() {
            continue;
        }
        let entry = json!({
            "version": migration.version,
            "description": migration.description.as_ref(),
        });
        if applied_versions.contains(&migration.version) {
            applied.push(entry);
        } else {
            pending.push(entry);
        }
    }

    let message = format!("{} applied, {} pending", applied.len(), pending.len());
    Ok(CommandResult::success_with_details(
        "migrate",
        message,
        Some(json!({ "applied": applied, "pending": pending })),
    ))
}
