use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use vitrine_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// How long a turn waits on another turn's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens the pool behind the conversation state store. The database file is
/// created on first use so a fresh deployment only needs `migrate`.
pub async fn open_pool(database: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database.url.trim())?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    SqlitePoolOptions::new()
        .max_connections(database.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(database.timeout_secs.max(1)))
        .connect_with(options)
        .await
}
