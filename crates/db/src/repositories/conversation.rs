use chrono::Utc;
use sqlx::Row;

use vitrine_core::domain::conversation::{ConversationId, ConversationState};

use super::{RepositoryError, StateStore};
use crate::DbPool;

/// SQLite-backed store keeping each conversation as one JSON document.
pub struct SqlStateStore {
    pool: DbPool,
}

impl SqlStateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_record(raw: &str) -> Result<ConversationState, RepositoryError> {
    serde_json::from_str(raw).map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn encode_record(state: &ConversationState) -> Result<String, RepositoryError> {
    serde_json::to_string(state).map_err(|error| RepositoryError::Decode(error.to_string()))
}

#[async_trait::async_trait]
impl StateStore for SqlStateStore {
    async fn get(&self, id: &ConversationId) -> Result<ConversationState, RepositoryError> {
        let row = sqlx::query(
            "SELECT record_json FROM conversation_state WHERE conversation_id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => {
                let raw: String = row
                    .try_get("record_json")
                    .map_err(|error| RepositoryError::Decode(error.to_string()))?;
                decode_record(&raw)
            }
            None => Ok(ConversationState::default()),
        }
    }

    async fn set(
        &self,
        id: &ConversationId,
        state: ConversationState,
    ) -> Result<(), RepositoryError> {
        let record_json = encode_record(&state)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO conversation_state (conversation_id, record_json, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(conversation_id) DO UPDATE SET
                 record_json = excluded.record_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&id.0)
        .bind(&record_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reset(&self, id: &ConversationId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM conversation_state WHERE conversation_id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
