use std::sync::Arc;

use requesty_core::config::{AppConfig, ConfigError, LoadOptions};
use requesty_core::ports::MessagingError;
use requesty_core::services::{QueueService, RequestIntakeService, RequestResponseService};
use requesty_db::{connect_and_migrate, ConnectError, DbPool, SqlQueueRepository, SqlRequestRepository};
use requesty_slack::events::request_dispatcher;
use requesty_slack::messenger::SlackWebClient;
use requesty_slack::signature::SignatureVerifier;
use requesty_slack::socket::{ReconnectPolicy, SocketModeRunner, TransportError};
use requesty_slack::websocket::WebSocketTransport;
use thiserror::Error;
use tracing::info;

use crate::handlers::RequestCommandHandler;
use crate::slack_http::SlackHttpState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub slack_runner: SocketModeRunner,
    /// Present only when a signing secret is configured.
    pub slack_http: Option<SlackHttpState>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Database(#[from] ConnectError),
    #[error("slack client setup failed: {0}")]
    SlackClient(#[source] MessagingError),
    #[error("slack socket mode setup failed: {0}")]
    SlackSocket(#[source] TransportError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    bootstrap_with_config(AppConfig::load(options)?).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_and_migrate(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await?;
    info!(
        event_name = "system.bootstrap.database_ready",
        correlation_id = "bootstrap",
        "database connected and migrations applied"
    );

    let requests = Arc::new(SqlRequestRepository::new(db_pool.clone()));
    let queues = Arc::new(SqlQueueRepository::new(db_pool.clone()));
    let slack = Arc::new(
        SlackWebClient::from_config(&config.slack).map_err(BootstrapError::SlackClient)?,
    );

    let handler = RequestCommandHandler::new(
        Arc::new(RequestIntakeService::new(requests.clone(), queues.clone(), slack.clone())),
        Arc::new(RequestResponseService::new(requests.clone(), queues.clone(), slack.clone())),
        Arc::new(QueueService::new(queues, requests)),
    );

    let transport =
        WebSocketTransport::from_config(&config.slack).map_err(BootstrapError::SlackSocket)?;
    let slack_runner = SocketModeRunner::new(
        Arc::new(transport),
        request_dispatcher(handler.clone()),
        ReconnectPolicy::default(),
    )
    .with_responder(slack.clone());

    let slack_http = config.slack.signing_secret.clone().map(|secret| {
        SlackHttpState::new(request_dispatcher(handler), SignatureVerifier::new(secret), slack)
    });

    info!(
        event_name = "system.bootstrap.complete",
        correlation_id = "bootstrap",
        http_ingress = slack_http.is_some(),
        "application wired"
    );

    Ok(Application { config, db_pool, slack_runner, slack_http })
}
