use crate::store::{
    CheckpointStore, StoreError, StoreResult, check_expected_version, validate_conversation_id,
};
use crate::types::{ConversationId, SaveCheckpointRequest, StoredCheckpoint};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Debug, Default)]
pub struct MemoryCheckpointStore {
    inner: Arc<Mutex<BTreeMap<ConversationId, StoredCheckpoint>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, BTreeMap<ConversationId, StoredCheckpoint>>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory checkpoint store mutex poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreResult<Option<StoredCheckpoint>> {
        validate_conversation_id(conversation_id)?;
        Ok(self.lock()?.get(conversation_id).cloned())
    }

    async fn save(&self, request: SaveCheckpointRequest) -> StoreResult<StoredCheckpoint> {
        validate_conversation_id(&request.conversation_id)?;
        let mut checkpoints = self.lock()?;
        let current = checkpoints.get(&request.conversation_id);
        check_expected_version(&request, current)?;

        let now = Utc::now();
        let stored = match current {
            Some(current) => current.replaced_by(request, now),
            None => StoredCheckpoint::first(request, now),
        };
        checkpoints.insert(stored.conversation_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn delete(&self, conversation_id: &ConversationId) -> StoreResult<bool> {
        validate_conversation_id(conversation_id)?;
        Ok(self.lock()?.remove(conversation_id).is_some())
    }

    async fn list_conversations(&self) -> StoreResult<Vec<ConversationId>> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}
