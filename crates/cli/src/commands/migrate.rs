use requesty_core::config::{AppConfig, LoadOptions};
use requesty_db::{connect_and_migrate, migrations::MIGRATOR, ConnectError};

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
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

    let database = &config.database;
    let result =
        runtime.block_on(migrate(&database.url, database.max_connections, database.timeout_secs));
    match result {
        Ok(()) => CommandResult::success(
            "migrate",
            format!("schema is at migration {} ({} known)", latest_version(), known_migrations()),
        ),
        Err(ConnectError::Connect(error)) => {
            CommandResult::failure("migrate", "db_connectivity", error.to_string(), 4)
        }
        Err(ConnectError::Migrate(error)) => {
            CommandResult::failure("migrate", "migration", error.to_string(), 5)
        }
    }
}

async fn migrate(url: &str, max_connections: u32, timeout_secs: u64) -> Result<(), ConnectError> {
    let pool = connect_and_migrate(url, max_connections, timeout_secs).await?;
    pool.close().await;
    Ok(())
}

/// Reversible migrations are embedded as separate up and down entries.
fn known_migrations() -> usize {
    MIGRATOR.iter().filter(|migration| !migration.migration_type.is_down_migration()).count()
}

fn latest_version() -> i64 {
    MIGRATOR.iter().map(|migration| migration.version).max().unwrap_or_default()
}
