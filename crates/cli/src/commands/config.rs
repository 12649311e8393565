use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use requesty_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use secrecy::ExposeSecret;
use toml::Value;

/// One reported setting: its dotted key, the environment variable that can
/// override it, and its rendered (possibly redacted) value.
struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

impl Field {
    fn new(key: &'static str, env_key: &'static str, value: impl Into<String>) -> Self {
        Self { key, env_key, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    render(&config, config_file_doc.as_ref(), config_file_path.as_deref())
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let signing_secret = match &config.slack.signing_secret {
        Some(_) => "<redacted>",
        None => "<unset>",
    };

    vec![
        Field::new("database.url", "REQUESTY_DATABASE_URL", config.database.url.as_str()),
        Field::new(
            "database.max_connections",
            "REQUESTY_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        Field::new(
            "database.timeout_secs",
            "REQUESTY_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        Field::new(
            "slack.app_token",
            "REQUESTY_SLACK_APP_TOKEN",
            redact_token(config.slack.app_token.expose_secret()),
        ),
        Field::new(
            "slack.bot_token",
            "REQUESTY_SLACK_BOT_TOKEN",
            redact_token(config.slack.bot_token.expose_secret()),
        ),
        Field::new("slack.signing_secret", "REQUESTY_SLACK_SIGNING_SECRET", signing_secret),
        Field::new(
            "slack.api_base_url",
            "REQUESTY_SLACK_API_BASE_URL",
            config.slack.api_base_url.as_str(),
        ),
        Field::new(
            "slack.timeout_secs",
            "REQUESTY_SLACK_TIMEOUT_SECS",
            config.slack.timeout_secs.to_string(),
        ),
        Field::new(
            "server.bind_address",
            "REQUESTY_SERVER_BIND_ADDRESS",
            config.server.bind_address.as_str(),
        ),
        Field::new(
            "server.health_check_port",
            "REQUESTY_SERVER_HEALTH_CHECK_PORT",
            config.server.health_check_port.to_string(),
        ),
        Field::new(
            "server.graceful_shutdown_secs",
            "REQUESTY_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        Field::new("logging.level", "REQUESTY_LOGGING_LEVEL", config.logging.level.as_str()),
        Field::new(
            "logging.format",
            "REQUESTY_LOGGING_FORMAT",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
        ),
    ]
}

fn render(config: &AppConfig, doc: Option<&Value>, path: Option<&Path>) -> String {
    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields(config).into_iter().map(|field| {
        let source = field_source(field.key, field.env_key, doc, path);
        format!("- {} = {} (source: {source})", field.key, field.value)
    }));
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if config_file_doc.is_some_and(|doc| contains_path(doc, key_path)) {
        let file_path = config_file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps the `xapp-`/`xoxb-` prefix so the token kind stays visible.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('-') {
        Some((prefix, _)) => format!("{prefix}-***"),
        None => "<redacted>".to_string(),
    }
}
