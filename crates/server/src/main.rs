mod bootstrap;
mod health;
mod reaper;
pub mod calls;
pub mod voice;

use std::future::IntoFuture;
use std::time::Duration;

use anyhow::Result;
use carecall_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use carecall_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let reaper = reaper::spawn(
        app.store.clone(),
        app.config.intake.idle_ttl_secs,
        app.config.intake.sweep_interval_secs,
    );

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        "carecall-server listening"
    );

    let drain_window = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let server = axum::serve(listener, app.router()).with_graceful_shutdown(wait_for_shutdown());

    // Both arms wake on the same ctrl-c; the second bounds how long in-flight
    // calls may hold the drain open.
    tokio::select! {
        result = server.into_future() => result?,
        () = drain_deadline(drain_window) => {
            tracing::warn!(
                event_name = "system.server.drain_timeout",
                drain_secs = app.config.server.graceful_shutdown_secs,
                "open connections did not drain in time; closing"
            );
        }
    }

    reaper.abort();
    tracing::info!(event_name = "system.server.stopping", "carecall-server stopping");

    Ok(())
}

async fn drain_deadline(window: Duration) {
    wait_for_shutdown().await;
    tokio::time::sleep(window).await;
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
