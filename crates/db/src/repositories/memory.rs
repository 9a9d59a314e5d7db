use std::collections::HashMap;

use tokio::sync::RwLock;

use vitrine_core::domain::conversation::{ConversationId, ConversationState};

use super::{RepositoryError, StateStore};

#[derive(Default)]
pub struct InMemoryStateStore {
    records: RwLock<HashMap<String, ConversationState>>,
}

impl InMemoryStateStore {
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, id: &ConversationId) -> Result<ConversationState, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(&id.0).cloned().unwrap_or_default())
    }

    async fn set(
        &self,
        id: &ConversationId,
        state: ConversationState,
    ) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.insert(id.0.clone(), state);
        Ok(())
    }

    async fn reset(&self, id: &ConversationId) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.remove(&id.0);
        Ok(())
    }
}
