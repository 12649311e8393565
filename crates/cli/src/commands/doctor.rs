use requesty_core::config::{AppConfig, LoadOptions};
use requesty_db::{connect_with_settings, migrations::MIGRATOR};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    /// Warnings do not fail the report; any failure or skip does.
    fn from_checks(checks: Vec<DoctorCheck>) -> Self {
        let failed = checks
            .iter()
            .any(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Skipped));
        let (overall_status, summary) = if failed {
            (CheckStatus::Fail, "doctor: one or more readiness checks failed")
        } else {
            (CheckStatus::Pass, "doctor: all readiness checks passed")
        };
        Self { overall_status, summary: summary.to_string(), checks }
    }
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            serde_json::json!({
                "overall_status": "fail",
                "summary": "doctor serialization failed",
                "error": error.to_string(),
            })
            .to_string()
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => vec![
            DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ),
            check_http_ingress(&config),
            check_database(&config),
        ],
        Err(error) => vec![
            DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()),
            DoctorCheck::new(
                "slack_http_ingress",
                CheckStatus::Skipped,
                "skipped because configuration did not load",
            ),
            DoctorCheck::new(
                "database_schema",
                CheckStatus::Skipped,
                "skipped because configuration did not load",
            ),
        ],
    };

    DoctorReport::from_checks(checks)
}

fn check_http_ingress(config: &AppConfig) -> DoctorCheck {
    match config.slack.signing_secret {
        Some(_) => DoctorCheck::new(
            "slack_http_ingress",
            CheckStatus::Pass,
            "signing secret set; /slack/commands and /slack/interactions are served",
        ),
        None => DoctorCheck::new(
            "slack_http_ingress",
            CheckStatus::Warn,
            "no signing secret; slash commands over HTTP are disabled",
        ),
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::new(
                "database_schema",
                CheckStatus::Fail,
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    runtime.block_on(database_check(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    ))
}

/// Connects without migrating and compares applied versions with the
/// embedded ones.
async fn database_check(url: &str, max_connections: u32, timeout_secs: u64) -> DoctorCheck {
    let pool = match connect_with_settings(url, max_connections, timeout_secs).await {
        Ok(pool) => pool,
        Err(error) => {
            return DoctorCheck::new(
                "database_schema",
                CheckStatus::Fail,
                format!("failed to connect to database: {error}"),
            );
        }
    };

    let applied = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1",
    )
    .fetch_one(&pool)
    .await
    .unwrap_or(0);
    pool.close().await;

    let known = MIGRATOR
        .iter()
        .filter(|migration| !migration.migration_type.is_down_migration())
        .count() as i64;

    if applied >= known {
        DoctorCheck::new(
            "database_schema",
            CheckStatus::Pass,
            format!("connected; {applied} of {known} migrations applied"),
        )
    } else {
        DoctorCheck::new(
            "database_schema",
            CheckStatus::Fail,
            format!("{applied} of {known} migrations applied; run `requesty migrate`"),
        )
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
