pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{open_pool, DbPool};
pub use repositories::{InMemoryStateStore, RepositoryError, SqlStateStore, StateStore};
