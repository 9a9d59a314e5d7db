use vitrine_core::config::{AppConfig, LoadOptions};
use vitrine_db::{migrations, open_pool};

use crate::commands::{block_on_runtime, CommandResult};

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

    let runtime = match block_on_runtime("migrate") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        let applied = migrations::applied_count(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<i64, (&'static str, String, u8)>(applied)
    });

    match result {
        Ok(applied) => {
            CommandResult::success("migrate", format!("database schema current ({applied} migrations applied)"))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
