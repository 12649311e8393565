use std::env;
use std::sync::{Mutex, OnceLock};

use requesty_cli::commands::{config, doctor, migrate};
use serde_json::Value;

const VALID_ENV: &[(&str, &str)] = &[
    ("REQUESTY_SLACK_APP_TOKEN", "xapp-test"),
    ("REQUESTY_SLACK_BOT_TOKEN", "xoxb-test"),
    ("REQUESTY_DATABASE_URL", "sqlite::memory:"),
];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(VALID_ENV, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "schema is at migration 3 (3 known)");
    });
}

#[test]
fn migrate_returns_config_failure_without_tokens() {
    with_env(&[], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_attributes_env_sources_and_redacts_tokens() {
    with_env(VALID_ENV, || {
        let output = config::run();
        assert!(output.starts_with("effective config"));
        assert!(output.contains(
            "- slack.bot_token = xoxb-*** (source: env (REQUESTY_SLACK_BOT_TOKEN))"
        ));
        assert!(output.contains("- slack.signing_secret = <unset> (source: default)"));
        assert!(!output.contains("xoxb-test"));
    });
}

#[test]
fn config_reports_validation_failure_without_tokens() {
    with_env(&[], || {
        assert!(config::run().starts_with("config validation failed"));
    });
}

#[test]
fn doctor_flags_unmigrated_database_in_json() {
    with_env(VALID_ENV, || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "fail");
        let checks = report["checks"].as_array().expect("checks array");
        let status_of = |name: &str| {
            checks
                .iter()
                .find(|check| check["name"] == name)
                .map(|check| check["status"].clone())
                .expect("check present")
        };
        assert_eq!(status_of("config_validation"), "pass");
        assert_eq!(status_of("slack_http_ingress"), "warn");
        assert_eq!(status_of("database_schema"), "fail");
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.contains("- [fail] config_validation"));
        assert!(result.output.contains("- [skip] database_schema"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "REQUESTY_DATABASE_URL",
        "REQUESTY_DATABASE_MAX_CONNECTIONS",
        "REQUESTY_DATABASE_TIMEOUT_SECS",
        "REQUESTY_SLACK_APP_TOKEN",
        "REQUESTY_SLACK_BOT_TOKEN",
        "REQUESTY_SLACK_SIGNING_SECRET",
        "REQUESTY_SLACK_API_BASE_URL",
        "REQUESTY_SLACK_TIMEOUT_SECS",
        "REQUESTY_SERVER_BIND_ADDRESS",
        "REQUESTY_SERVER_HEALTH_CHECK_PORT",
        "REQUESTY_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "REQUESTY_LOGGING_LEVEL",
        "REQUESTY_LOGGING_FORMAT",
        "REQUESTY_LOG_LEVEL",
        "REQUESTY_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
