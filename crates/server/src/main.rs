mod bootstrap;
mod handlers;
mod health;
mod slack_http;

use std::time::Duration;

use anyhow::Result;
use requesty_core::config::{AppConfig, LoadOptions};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use requesty_core::config::LogFormat::*;

    // RUST_LOG wins over the configured level when present.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let mut http = health::router(app.db_pool.clone(), app.slack_http.is_some());
    if let Some(state) = app.slack_http.clone() {
        http = http.merge(slack_http::router(state));
    }
    health::spawn(&app.config.server.bind_address, app.config.server.health_check_port, http)
        .await?;

    tracing::info!(
        event_name = "system.server.slack_transport_mode",
        transport_mode = "socket",
        http_ingress = app.slack_http.is_some(),
        correlation_id = "bootstrap",
        "slack ingress initialized"
    );

    let runner = app.slack_runner;
    let socket_task = tokio::spawn(async move { runner.start().await });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "requesty-server started"
    );
    tokio::signal::ctrl_c().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "requesty-server stopping"
    );

    socket_task.abort();
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            "database pool did not close within the grace period"
        );
    }

    Ok(())
}
