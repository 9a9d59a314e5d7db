mod api;
mod bootstrap;
mod health;
mod signature;

use std::time::Duration;

use anyhow::Result;
use vitrine_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use vitrine_core::config::LogFormat::*;

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
    // Logging comes up before the pool so bootstrap failures are visible.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);

    let router = api::router(app.runtime.clone(), app.config.payment.webhook_secret.clone())
        .merge(health::router(app.db_pool.clone(), app.catalog_products()));
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "vitrine-server listening"
    );
    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "vitrine-server stopping"
    );
    if tokio::time::timeout(grace, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.pool_close_timeout",
            correlation_id = "shutdown",
            "database pool did not close within the grace period"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for ctrl-c"
        );
        std::future::pending::<()>().await;
    }
}
