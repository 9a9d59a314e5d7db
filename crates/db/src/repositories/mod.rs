use async_trait::async_trait;
use thiserror::Error;

use vitrine_core::domain::conversation::{ConversationId, ConversationState};

pub mod conversation;
pub mod memory;

pub use conversation::SqlStateStore;
pub use memory::InMemoryStateStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Durable per-conversation record. A missing record reads as the default
/// state, so callers never have to special-case first contact.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, id: &ConversationId) -> Result<ConversationState, RepositoryError>;
    async fn set(&self, id: &ConversationId, state: ConversationState)
        -> Result<(), RepositoryError>;
    async fn reset(&self, id: &ConversationId) -> Result<(), RepositoryError>;
}
